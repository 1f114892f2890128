//! Pull-path reconciliation.
//!
//! Pushed events can be lost: the terminal may be offline from the
//! receiver's point of view, the queue may be full, the service may be down.
//! The reconciler closes those gaps by searching each terminal's event log
//! and replaying what it finds through the same pipeline. Replays of events
//! that already arrived by push are absorbed by deduplication.
//!
//! ```text
//!            overlap
//!         ┌────────┐
//! ────────┼────────●──────────────────────────●──────► time
//!       start    cursor                    now = end
//!         └──────────── searched window ───────┘
//! ```
//!
//! The window never starts earlier than `now - max_window`. After a pass
//! the cursor moves to the later of `end` and the newest event seen.

use crate::config::ReconcilerConfig;
use crate::pipeline::{IngestPipeline, IngestReport};
use chrono::{DateTime, TimeDelta, Utc};
use rollcall_core::{Clock, DeviceId, Error, EventSource, Result};
use rollcall_device::SessionManager;
use rollcall_network::TransportFactory;
use rollcall_protocol::commands::{EventSearchPage, EventSearchQuery};
use rollcall_protocol::{DeviceRequest, Endpoint};
use rollcall_storage::{EventCursor, EventCursorRepository, SqliteEventCursorRepository};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Outcome of one device pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ReconcileReport {
    pub pages: u32,
    pub fetched: usize,
    pub ingest: IngestReport,
    pub window_start: Option<DateTime<Utc>>,
    pub window_end: Option<DateTime<Utc>>,
}

/// Periodic event search over every registered terminal.
pub struct Reconciler<F: TransportFactory, C> {
    sessions: Arc<SessionManager<F, C>>,
    pipeline: Arc<IngestPipeline>,
    cursors: SqliteEventCursorRepository,
    clock: C,
    config: ReconcilerConfig,
}

impl<F, C> Reconciler<F, C>
where
    F: TransportFactory,
    C: Clock + Clone,
{
    pub fn new(sessions: Arc<SessionManager<F, C>>, pipeline: Arc<IngestPipeline>, config: ReconcilerConfig) -> Self {
        let clock = sessions.clock().clone();
        let cursors = SqliteEventCursorRepository::new(pipeline.pool().clone());
        Self {
            sessions,
            pipeline,
            cursors,
            clock,
            config,
        }
    }

    /// Search one terminal from its cursor to now and ingest the results.
    ///
    /// # Errors
    /// - `DeviceNotFound` for an unregistered device
    /// - `UnsupportedFeature` if the terminal does not advertise event
    ///   search; no search request is sent then
    /// - transport, validation or storage errors; the cursor is left
    ///   unchanged, so the next pass covers the same window
    pub async fn reconcile_device(&self, device_id: &DeviceId) -> Result<ReconcileReport> {
        let session = self.sessions.acquire(device_id)?;
        let (start, end) = self.window(device_id).await?;

        let mut query = EventSearchQuery::new(Uuid::new_v4().simple().to_string(), start, end, self.config.page_size);
        let mut report = ReconcileReport {
            window_start: Some(start),
            window_end: Some(end),
            ..ReconcileReport::default()
        };

        loop {
            let request = DeviceRequest::for_endpoint(Endpoint::SearchEvents, query.to_body())?;
            let reply = session.call(&request).await?;
            let page = EventSearchPage::from_payload(&reply.response.payload)?;
            report.pages += 1;
            report.fetched += page.events.len();

            let ingested = self
                .pipeline
                .ingest_raw(device_id, &page.events, EventSource::Pull)
                .await?;
            report.ingest.merge(ingested);

            debug!(
                device_id = %device_id,
                page = report.pages,
                returned = page.returned(),
                total = page.total_matches,
                "Event search page ingested"
            );
            if !page.has_more() {
                break;
            }
            query = query.next_page(&page);
        }

        let (last_observed_at, last_serial_no) = match report.ingest.latest.clone() {
            Some((at, serial)) if at >= end => (at, serial),
            _ => (end, None),
        };
        self.cursors
            .advance(&EventCursor {
                device_id: device_id.clone(),
                last_observed_at,
                last_serial_no,
                updated_at: self.clock.now(),
            })
            .await?;

        info!(
            device_id = %device_id,
            pages = report.pages,
            fetched = report.fetched,
            inserted = report.ingest.inserted,
            duplicates = report.ingest.duplicates,
            "Device reconciled"
        );
        Ok(report)
    }

    /// Reconcile every registered terminal, side by side.
    ///
    /// Terminals without event search are skipped quietly; other failures
    /// are logged and reported per device.
    pub async fn reconcile_all(&self) -> Vec<(DeviceId, Result<ReconcileReport>)> {
        let devices = self.sessions.list();
        let results =
            futures::future::join_all(devices.iter().map(|device_id| self.reconcile_device(device_id))).await;

        devices
            .into_iter()
            .zip(results)
            .inspect(|(device_id, result)| match result {
                Ok(_) => {}
                Err(Error::UnsupportedFeature { .. }) => {
                    debug!(device_id = %device_id, "Event search not supported, skipped");
                }
                Err(err) if err.is_retryable() => {
                    warn!(device_id = %device_id, error = %err, "Reconciliation deferred to next pass");
                }
                Err(err) => error!(device_id = %device_id, error = %err, "Reconciliation failed"),
            })
            .collect()
    }

    /// Reconcile every `interval` until `cancel` fires.
    pub async fn run(&self, cancel: CancellationToken) {
        info!(interval_secs = self.config.interval.as_secs(), "Reconciler started");
        loop {
            tokio::select! {
                biased;
                () = cancel.cancelled() => break,
                () = self.clock.sleep(self.config.interval) => {}
            }
            self.reconcile_all().await;
        }
        info!("Reconciler stopped");
    }

    async fn window(&self, device_id: &DeviceId) -> Result<(DateTime<Utc>, DateTime<Utc>)> {
        let end = self.clock.now();
        let earliest = end - to_delta(self.config.max_window)?;
        let start = match self.cursors.get(device_id).await? {
            Some(cursor) => (cursor.last_observed_at - to_delta(self.config.overlap)?).max(earliest),
            None => earliest,
        };
        Ok((start.min(end), end))
    }
}

fn to_delta(duration: std::time::Duration) -> Result<TimeDelta> {
    TimeDelta::from_std(duration).map_err(|_| Error::Config(format!("duration out of range: {duration:?}")))
}
