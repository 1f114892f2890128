//! Normalize → dedup → classify → persist.
//!
//! Both producers end here: the push worker with decoded notifications, the
//! reconciler with search pages. Each event is written in one SQLite
//! transaction while holding the lock of its (device, subject) partition:
//!
//! 1. insert with a provisional direction, or stop if the dedup key exists
//! 2. read the direction of the event just before it
//! 3. read the new event and everything after it
//! 4. re-derive that tail and update the rows whose direction changed
//!
//! A replay stops at step 1 and touches nothing. A late event is handled by
//! the same steps as an on-time one; its tail is simply longer.

use crate::classifier::{Reclassification, rederive};
use crate::config::IngestConfig;
use crate::locks::KeyedLocks;
use crate::normalize::{NormalizedEvent, normalize};
use chrono::{DateTime, Utc};
use rollcall_core::{DedupKey, DeviceId, Direction, EventSource, Result, SubjectId};
use rollcall_protocol::{Payload, RawAccessEvent, decode_notification};
use rollcall_storage::repositories::{AttendanceEventRepository, SqliteAttendanceEventRepository};
use rollcall_storage::{Database, StorageError, transaction};
use sqlx::SqlitePool;
use tracing::{debug, info, warn};

/// Result of ingesting one event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IngestOutcome {
    Inserted {
        id: i64,
        direction: Direction,
        /// Later events of the partition whose direction was corrected
        reclassified: Vec<Reclassification>,
    },
    Duplicate {
        dedup_key: DedupKey,
    },
}

/// Tally of a batch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct IngestReport {
    pub inserted: usize,
    pub duplicates: usize,
    /// Events without a subject
    pub skipped: usize,
    /// Events rejected as malformed
    pub rejected: usize,
    pub reclassified: usize,
    /// Latest event time seen in the batch, with its serial number
    pub latest: Option<(DateTime<Utc>, Option<String>)>,
}

impl IngestReport {
    pub fn merge(&mut self, other: IngestReport) {
        self.inserted += other.inserted;
        self.duplicates += other.duplicates;
        self.skipped += other.skipped;
        self.rejected += other.rejected;
        self.reclassified += other.reclassified;
        if let Some((at, serial)) = other.latest {
            self.observe(at, serial);
        }
    }

    fn observe(&mut self, at: DateTime<Utc>, serial: Option<String>) {
        if self.latest.as_ref().is_none_or(|(latest, _)| at >= *latest) {
            self.latest = Some((at, serial));
        }
    }
}

/// Event ingestion over a SQLite store.
#[derive(Debug)]
pub struct IngestPipeline {
    pool: SqlitePool,
    events: SqliteAttendanceEventRepository,
    locks: KeyedLocks<(DeviceId, SubjectId)>,
    config: IngestConfig,
}

impl IngestPipeline {
    pub fn new(db: &Database, config: IngestConfig) -> Self {
        Self {
            pool: db.pool().clone(),
            events: SqliteAttendanceEventRepository::new(db.pool().clone()),
            locks: KeyedLocks::new(),
            config,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn pool(&self) -> &SqlitePool {
        &self.pool
    }

    /// Decode a pushed notification and ingest its events.
    ///
    /// # Errors
    /// Returns `Validation` if the payload is not an event notification, or
    /// `Storage` if a write fails. Malformed individual events are counted as
    /// rejected, not returned.
    pub async fn ingest_payload(&self, device_id: &DeviceId, payload: &Payload) -> Result<IngestReport> {
        let events = decode_notification(payload)?;
        self.ingest_raw(device_id, &events, EventSource::Push).await
    }

    /// Normalize and ingest reported events in order.
    ///
    /// # Errors
    /// Returns `Storage` if a write fails; earlier events stay committed.
    pub async fn ingest_raw(
        &self,
        device_id: &DeviceId,
        events: &[RawAccessEvent],
        source: EventSource,
    ) -> Result<IngestReport> {
        let mut report = IngestReport::default();
        for raw in events {
            let event = match normalize(device_id, raw, source, self.config.naive_offset) {
                Ok(Some(event)) => event,
                Ok(None) => {
                    report.skipped += 1;
                    continue;
                }
                Err(err) => {
                    warn!(device_id = %device_id, error = %err, raw = %raw.raw, "Rejected malformed event");
                    report.rejected += 1;
                    continue;
                }
            };

            report.observe(event.observed_at, event.device_event_id.clone());
            match self.ingest(&event).await? {
                IngestOutcome::Inserted { reclassified, .. } => {
                    report.inserted += 1;
                    report.reclassified += reclassified.len();
                }
                IngestOutcome::Duplicate { .. } => report.duplicates += 1,
            }
        }
        Ok(report)
    }

    /// Deduplicate, classify and persist one event.
    ///
    /// # Errors
    /// Returns `Storage` if the transaction fails; nothing is written then.
    pub async fn ingest(&self, event: &NormalizedEvent) -> Result<IngestOutcome> {
        let _partition = self
            .locks
            .lock(&(event.device_id.clone(), event.subject_id.clone()))
            .await;
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let Some(id) = transaction::insert_event_if_absent(&mut tx, &event.to_new_event(Direction::Entry)).await?
        else {
            tx.commit().await.map_err(StorageError::from)?;
            debug!(
                device_id = %event.device_id,
                subject_id = %event.subject_id,
                dedup_key = %event.dedup_key,
                "Duplicate event ignored"
            );
            return Ok(IngestOutcome::Duplicate {
                dedup_key: event.dedup_key.clone(),
            });
        };

        let previous =
            transaction::previous_direction(&mut tx, &event.device_id, &event.subject_id, event.observed_at, id)
                .await?;
        let tail = transaction::events_from(&mut tx, &event.device_id, &event.subject_id, event.observed_at, id).await?;
        let changes = rederive(previous, tail.iter().map(|stored| (stored.id, stored.direction)));

        let now = Utc::now();
        for change in &changes {
            transaction::update_direction(&mut tx, change.id, change.to, now).await?;
        }
        tx.commit().await.map_err(StorageError::from)?;

        let direction = changes
            .iter()
            .find(|change| change.id == id)
            .map_or(Direction::Entry, |change| change.to);
        let reclassified: Vec<_> = changes.into_iter().filter(|change| change.id != id).collect();

        if reclassified.is_empty() {
            debug!(
                device_id = %event.device_id,
                subject_id = %event.subject_id,
                dedup_key = %event.dedup_key,
                direction = ?direction,
                "Event classified"
            );
        } else {
            info!(
                device_id = %event.device_id,
                subject_id = %event.subject_id,
                dedup_key = %event.dedup_key,
                direction = ?direction,
                reclassified = reclassified.len(),
                "Late event reclassified later history"
            );
        }

        Ok(IngestOutcome::Inserted {
            id,
            direction,
            reclassified,
        })
    }

    /// Re-derive every direction in one (device, subject) partition.
    ///
    /// # Errors
    /// Returns `Storage` if the transaction fails.
    pub async fn rederive_partition(
        &self,
        device_id: &DeviceId,
        subject_id: &SubjectId,
    ) -> Result<Vec<Reclassification>> {
        let _partition = self.locks.lock(&(device_id.clone(), subject_id.clone())).await;
        let mut tx = self.pool.begin().await.map_err(StorageError::from)?;

        let events = transaction::partition_events(&mut tx, device_id, subject_id).await?;
        let changes = rederive(None, events.iter().map(|stored| (stored.id, stored.direction)));
        let now = Utc::now();
        for change in &changes {
            transaction::update_direction(&mut tx, change.id, change.to, now).await?;
        }
        tx.commit().await.map_err(StorageError::from)?;

        if !changes.is_empty() {
            info!(
                device_id = %device_id,
                subject_id = %subject_id,
                changed = changes.len(),
                "Partition re-derived"
            );
        }
        Ok(changes)
    }

    /// Re-derive every partition of one device.
    ///
    /// # Errors
    /// Returns `Storage` if a lookup or transaction fails.
    pub async fn rederive_device(&self, device_id: &DeviceId) -> Result<Vec<Reclassification>> {
        let subjects = self.events.subjects_for_device(device_id).await?;
        let mut changes = Vec::new();
        for subject_id in &subjects {
            changes.extend(self.rederive_partition(device_id, subject_id).await?);
        }
        info!(
            device_id = %device_id,
            subjects = subjects.len(),
            changed = changes.len(),
            "Device re-derived"
        );
        Ok(changes)
    }

    /// Read access to stored events.
    pub fn events(&self) -> &SqliteAttendanceEventRepository {
        &self.events
    }
}
