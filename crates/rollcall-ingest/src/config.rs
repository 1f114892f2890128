//! Ingestion and reconciliation settings.

use chrono::{FixedOffset, Offset, Utc};
use rollcall_core::constants::{
    DEFAULT_EVENT_PAGE_SIZE, DEFAULT_INGEST_CONCURRENCY, DEFAULT_INGEST_QUEUE_CAPACITY,
    DEFAULT_RECONCILE_INTERVAL_SECS, DEFAULT_RECONCILE_MAX_WINDOW_SECS, DEFAULT_RECONCILE_OVERLAP_SECS,
};
use std::time::Duration;

/// Settings for the push path and normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    /// Capacity of the webhook-to-worker queue
    pub queue_capacity: usize,
    /// Payloads processed at once by the worker
    pub concurrency: usize,
    /// Offset applied to event times reported without one
    pub naive_offset: FixedOffset,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_INGEST_QUEUE_CAPACITY,
            concurrency: DEFAULT_INGEST_CONCURRENCY,
            naive_offset: Utc.fix(),
        }
    }
}

impl IngestConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = capacity.max(1);
        self
    }

    pub fn concurrency(mut self, concurrency: usize) -> Self {
        self.concurrency = concurrency.max(1);
        self
    }

    pub fn naive_offset(mut self, offset: FixedOffset) -> Self {
        self.naive_offset = offset;
        self
    }
}

/// Settings for the pull path.
///
/// Each pass searches `[cursor - overlap, now]`, never reaching further back
/// than `max_window`. Devices without a cursor are searched over the whole
/// `max_window`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReconcilerConfig {
    pub interval: Duration,
    pub overlap: Duration,
    pub max_window: Duration,
    pub page_size: u32,
}

impl Default for ReconcilerConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(DEFAULT_RECONCILE_INTERVAL_SECS),
            overlap: Duration::from_secs(DEFAULT_RECONCILE_OVERLAP_SECS),
            max_window: Duration::from_secs(DEFAULT_RECONCILE_MAX_WINDOW_SECS),
            page_size: DEFAULT_EVENT_PAGE_SIZE,
        }
    }
}

impl ReconcilerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub fn overlap(mut self, overlap: Duration) -> Self {
        self.overlap = overlap;
        self
    }

    pub fn max_window(mut self, window: Duration) -> Self {
        self.max_window = window;
        self
    }

    pub fn page_size(mut self, size: u32) -> Self {
        self.page_size = size.max(1);
        self
    }
}
