//! Transaction-scoped event operations.
//!
//! Ingesting one event is a single transaction: idempotent insert, lookup of
//! the preceding event in the (device, subject) partition, scan of the events
//! at or after the new one, and direction corrections. These functions take a
//! live transaction so callers can compose them without interleaving writers.
//!
//! Partition order is `(observed_at, id)`. Because `id` is monotonically
//! assigned, an event inserted with the same `observed_at` as an existing one
//! sorts after it.
//!
//! # Usage Pattern
//!
//! ```no_run
//! use rollcall_storage::{Database, transaction};
//! use rollcall_storage::models::NewAttendanceEvent;
//!
//! # async fn example(db: Database, event: NewAttendanceEvent) -> Result<(), Box<dyn std::error::Error>> {
//! let mut tx = db.pool().begin().await?;
//!
//! if let Some(id) = transaction::insert_event_if_absent(&mut tx, &event).await? {
//!     let previous = transaction::previous_direction(
//!         &mut tx, &event.device_id, &event.subject_id, event.observed_at, id,
//!     )
//!     .await?;
//!     let tail = transaction::events_from(
//!         &mut tx, &event.device_id, &event.subject_id, event.observed_at, id,
//!     )
//!     .await?;
//!     // classify `tail` after `previous`, then update changed rows
//! }
//!
//! tx.commit().await?;
//! # Ok(())
//! # }
//! ```

use crate::error::StorageResult;
use crate::models::event::{EVENT_COLUMNS, EventRow, rows_to_events};
use crate::models::{AttendanceEvent, NewAttendanceEvent};
use chrono::{DateTime, Utc};
use rollcall_core::{DeviceId, Direction, SubjectId};
use sqlx::{Sqlite, Transaction};

/// Insert an event unless one with the same `(device_id, dedup_key)` exists.
///
/// Returns the new row id, or `None` for a duplicate delivery. Existing rows
/// are never modified.
pub async fn insert_event_if_absent(
    tx: &mut Transaction<'_, Sqlite>,
    event: &NewAttendanceEvent,
) -> StorageResult<Option<i64>> {
    let now = Utc::now();
    let result = sqlx::query(
        r#"
        INSERT INTO attendance_events (
            device_id, subject_id, observed_at, direction, dedup_key,
            device_event_id, source, raw_payload, created_at, updated_at
        )
        VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
        ON CONFLICT (device_id, dedup_key) DO NOTHING
        "#,
    )
    .bind(event.device_id.as_str())
    .bind(event.subject_id.as_str())
    .bind(event.observed_at.timestamp_millis())
    .bind(event.direction.code())
    .bind(event.dedup_key.as_str())
    .bind(&event.device_event_id)
    .bind(event.source.as_str())
    .bind(&event.raw_payload)
    .bind(now)
    .bind(now)
    .execute(&mut **tx)
    .await?;

    if result.rows_affected() == 0 {
        return Ok(None);
    }
    Ok(Some(result.last_insert_rowid()))
}

/// Direction of the last event ordered strictly before `(observed_at, id)`.
pub async fn previous_direction(
    tx: &mut Transaction<'_, Sqlite>,
    device_id: &DeviceId,
    subject_id: &SubjectId,
    observed_at: DateTime<Utc>,
    id: i64,
) -> StorageResult<Option<Direction>> {
    let at = observed_at.timestamp_millis();
    let row: Option<(i64,)> = sqlx::query_as(
        r#"
        SELECT direction FROM attendance_events
        WHERE device_id = ? AND subject_id = ?
          AND (observed_at < ? OR (observed_at = ? AND id < ?))
        ORDER BY observed_at DESC, id DESC
        LIMIT 1
        "#,
    )
    .bind(device_id.as_str())
    .bind(subject_id.as_str())
    .bind(at)
    .bind(at)
    .bind(id)
    .fetch_optional(&mut **tx)
    .await?;

    Ok(row.map(|(code,)| Direction::from_code(code)).transpose()?)
}

/// Events ordered at or after `(observed_at, id)` in the partition.
pub async fn events_from(
    tx: &mut Transaction<'_, Sqlite>,
    device_id: &DeviceId,
    subject_id: &SubjectId,
    observed_at: DateTime<Utc>,
    id: i64,
) -> StorageResult<Vec<AttendanceEvent>> {
    let at = observed_at.timestamp_millis();
    let rows = sqlx::query_as::<_, EventRow>(&format!(
        "SELECT {EVENT_COLUMNS} FROM attendance_events \
         WHERE device_id = ? AND subject_id = ? \
           AND (observed_at > ? OR (observed_at = ? AND id >= ?)) \
         ORDER BY observed_at, id"
    ))
    .bind(device_id.as_str())
    .bind(subject_id.as_str())
    .bind(at)
    .bind(at)
    .bind(id)
    .fetch_all(&mut **tx)
    .await?;

    rows_to_events(rows)
}

/// Every event of the partition in classification order.
pub async fn partition_events(
    tx: &mut Transaction<'_, Sqlite>,
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
    .fetch_all(&mut **tx)
    .await?;

    rows_to_events(rows)
}

/// Correct the direction of one event.
pub async fn update_direction(
    tx: &mut Transaction<'_, Sqlite>,
    id: i64,
    direction: Direction,
    now: DateTime<Utc>,
) -> StorageResult<()> {
    sqlx::query("UPDATE attendance_events SET direction = ?, updated_at = ? WHERE id = ?")
        .bind(direction.code())
        .bind(now)
        .bind(id)
        .execute(&mut **tx)
        .await?;

    Ok(())
}
