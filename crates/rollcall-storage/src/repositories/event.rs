#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::AttendanceEvent;
use crate::models::event::{EVENT_COLUMNS, EventRow, rows_to_events};
use chrono::{DateTime, Utc};
use rollcall_core::{DedupKey, DeviceId, SubjectId};
use sqlx::SqlitePool;

/// Read side of the attendance event store.
///
/// Writes go through [`crate::transaction`] so that dedup, classification
/// and re-derivation happen in one transaction.
pub trait AttendanceEventRepository: Send + Sync {
    /// Events of one (device, subject) partition in classification order.
    async fn list_for_subject(
        &self,
        device_id: &DeviceId,
        subject_id: &SubjectId,
    ) -> StorageResult<Vec<AttendanceEvent>>;

    /// Events of one device with `from <= observed_at < to`, in time order.
    async fn list_by_device_range(
        &self,
        device_id: &DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<AttendanceEvent>>;

    async fn find_by_dedup_key(
        &self,
        device_id: &DeviceId,
        key: &DedupKey,
    ) -> StorageResult<Option<AttendanceEvent>>;

    async fn count_for_device(&self, device_id: &DeviceId) -> StorageResult<i64>;

    /// Distinct subjects with at least one event on the device.
    async fn subjects_for_device(&self, device_id: &DeviceId) -> StorageResult<Vec<SubjectId>>;
}

/// SQLite implementation of AttendanceEventRepository
#[derive(Debug, Clone)]
pub struct SqliteAttendanceEventRepository {
    pool: SqlitePool,
}

impl SqliteAttendanceEventRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl AttendanceEventRepository for SqliteAttendanceEventRepository {
    async fn list_for_subject(
        &self,
        device_id: &DeviceId,
        subject_id: &SubjectId,
    ) -> StorageResult<Vec<AttendanceEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM attendance_events \
             WHERE device_id = ? AND subject_id = ? \
             ORDER BY observed_at, id"
        ))
        .bind(device_id.as_str())
        .bind(subject_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        rows_to_events(rows)
    }

    async fn list_by_device_range(
        &self,
        device_id: &DeviceId,
        from: DateTime<Utc>,
        to: DateTime<Utc>,
    ) -> StorageResult<Vec<AttendanceEvent>> {
        let rows = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM attendance_events \
             WHERE device_id = ? AND observed_at >= ? AND observed_at < ? \
             ORDER BY observed_at, id"
        ))
        .bind(device_id.as_str())
        .bind(from.timestamp_millis())
        .bind(to.timestamp_millis())
        .fetch_all(&self.pool)
        .await?;

        rows_to_events(rows)
    }

    async fn find_by_dedup_key(
        &self,
        device_id: &DeviceId,
        key: &DedupKey,
    ) -> StorageResult<Option<AttendanceEvent>> {
        let row = sqlx::query_as::<_, EventRow>(&format!(
            "SELECT {EVENT_COLUMNS} FROM attendance_events WHERE device_id = ? AND dedup_key = ?"
        ))
        .bind(device_id.as_str())
        .bind(key.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(AttendanceEvent::try_from).transpose()
    }

    async fn count_for_device(&self, device_id: &DeviceId) -> StorageResult<i64> {
        let (count,): (i64,) =
            sqlx::query_as("SELECT COUNT(*) FROM attendance_events WHERE device_id = ?")
                .bind(device_id.as_str())
                .fetch_one(&self.pool)
                .await?;

        Ok(count)
    }

    async fn subjects_for_device(&self, device_id: &DeviceId) -> StorageResult<Vec<SubjectId>> {
        let rows: Vec<(String,)> = sqlx::query_as(
            "SELECT DISTINCT subject_id FROM attendance_events WHERE device_id = ? ORDER BY subject_id",
        )
        .bind(device_id.as_str())
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(s,)| SubjectId::new(s))
            .collect::<rollcall_core::Result<_>>()?)
    }
}
