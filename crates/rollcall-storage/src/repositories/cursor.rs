#![allow(async_fn_in_trait)]

use crate::error::StorageResult;
use crate::models::EventCursor;
use crate::models::cursor::CursorRow;
use rollcall_core::DeviceId;
use sqlx::SqlitePool;

/// Repository for pull-path cursors.
pub trait EventCursorRepository: Send + Sync {
    async fn get(&self, device_id: &DeviceId) -> StorageResult<Option<EventCursor>>;

    /// Store the cursor. A cursor never moves backwards: an older
    /// `last_observed_at` than the stored one is ignored.
    async fn advance(&self, cursor: &EventCursor) -> StorageResult<()>;
}

/// SQLite implementation of EventCursorRepository
#[derive(Debug, Clone)]
pub struct SqliteEventCursorRepository {
    pool: SqlitePool,
}

impl SqliteEventCursorRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

impl EventCursorRepository for SqliteEventCursorRepository {
    async fn get(&self, device_id: &DeviceId) -> StorageResult<Option<EventCursor>> {
        let row = sqlx::query_as::<_, CursorRow>(
            "SELECT device_id, last_observed_at, last_serial_no, updated_at \
             FROM event_cursors WHERE device_id = ?",
        )
        .bind(device_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EventCursor::try_from).transpose()
    }

    async fn advance(&self, cursor: &EventCursor) -> StorageResult<()> {
        sqlx::query(
            r#"
            INSERT INTO event_cursors (device_id, last_observed_at, last_serial_no, updated_at)
            VALUES (?, ?, ?, ?)
            ON CONFLICT (device_id) DO UPDATE SET
                last_observed_at = excluded.last_observed_at,
                last_serial_no = excluded.last_serial_no,
                updated_at = excluded.updated_at
            WHERE excluded.last_observed_at >= event_cursors.last_observed_at
            "#,
        )
        .bind(cursor.device_id.as_str())
        .bind(cursor.last_observed_at.timestamp_millis())
        .bind(&cursor.last_serial_no)
        .bind(cursor.updated_at)
        .execute(&self.pool)
        .await?;

        Ok(())
    }
}
