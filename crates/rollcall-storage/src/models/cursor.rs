use crate::error::{StorageError, StorageResult};
use crate::models::event::from_millis;
use chrono::{DateTime, Utc};
use rollcall_core::DeviceId;

/// Pull-path high-water mark for one device.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventCursor {
    pub device_id: DeviceId,
    /// Latest event time processed by reconciliation
    pub last_observed_at: DateTime<Utc>,
    /// Serial number of the event at `last_observed_at`, if the device reports one
    pub last_serial_no: Option<String>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct CursorRow {
    pub device_id: String,
    pub last_observed_at: i64,
    pub last_serial_no: Option<String>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<CursorRow> for EventCursor {
    type Error = StorageError;

    fn try_from(row: CursorRow) -> StorageResult<Self> {
        Ok(Self {
            device_id: DeviceId::new(row.device_id)?,
            last_observed_at: from_millis(row.last_observed_at)?,
            last_serial_no: row.last_serial_no,
            updated_at: row.updated_at,
        })
    }
}
