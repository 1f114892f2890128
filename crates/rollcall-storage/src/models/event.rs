use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, TimeZone, Utc};
use rollcall_core::{DedupKey, DeviceId, Direction, EventSource, SubjectId};

/// Attendance event ready to be inserted.
///
/// `observed_at` must already be normalized to UTC millisecond precision;
/// it is stored as Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NewAttendanceEvent {
    pub device_id: DeviceId,
    pub subject_id: SubjectId,
    pub observed_at: DateTime<Utc>,
    pub direction: Direction,
    pub dedup_key: DedupKey,
    pub device_event_id: Option<String>,
    pub source: EventSource,
    pub raw_payload: String,
}

/// Stored, classified attendance event.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AttendanceEvent {
    pub id: i64,
    pub device_id: DeviceId,
    pub subject_id: SubjectId,
    pub observed_at: DateTime<Utc>,
    pub direction: Direction,
    pub dedup_key: DedupKey,
    pub device_event_id: Option<String>,
    pub source: EventSource,
    pub raw_payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EventRow {
    pub id: i64,
    pub device_id: String,
    pub subject_id: String,
    pub observed_at: i64,
    pub direction: i64,
    pub dedup_key: String,
    pub device_event_id: Option<String>,
    pub source: String,
    pub raw_payload: String,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Columns selected for [`EventRow`], in table order.
pub(crate) const EVENT_COLUMNS: &str = "id, device_id, subject_id, observed_at, direction, dedup_key, \
     device_event_id, source, raw_payload, created_at, updated_at";

impl TryFrom<EventRow> for AttendanceEvent {
    type Error = StorageError;

    fn try_from(row: EventRow) -> StorageResult<Self> {
        Ok(Self {
            id: row.id,
            device_id: DeviceId::new(row.device_id)?,
            subject_id: SubjectId::new(row.subject_id)?,
            observed_at: from_millis(row.observed_at)?,
            direction: Direction::from_code(row.direction)?,
            dedup_key: DedupKey::from_stored(row.dedup_key),
            device_event_id: row.device_event_id,
            source: EventSource::parse(&row.source)?,
            raw_payload: row.raw_payload,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

pub(crate) fn from_millis(ms: i64) -> StorageResult<DateTime<Utc>> {
    Utc.timestamp_millis_opt(ms)
        .single()
        .ok_or_else(|| StorageError::Validation(format!("timestamp out of range: {ms}")))
}

pub(crate) fn rows_to_events(rows: Vec<EventRow>) -> StorageResult<Vec<AttendanceEvent>> {
    rows.into_iter().map(AttendanceEvent::try_from).collect()
}
