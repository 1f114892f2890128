use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rollcall_core::{DeviceId, SubjectId};
use uuid::Uuid;

/// Persisted enrollment session.
///
/// Stage names are stored as text; their meaning belongs to the enrollment
/// orchestrator. `error_chain` holds every error message observed, oldest
/// first, and is stored as a JSON array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRecord {
    pub id: Uuid,
    pub device_id: DeviceId,
    pub subject_id: SubjectId,
    pub stage: String,
    /// Furthest stage reached before the session ended
    pub furthest_stage: String,
    pub attempt_count: u32,
    pub deadline: DateTime<Utc>,
    /// Locator of the captured photo, once known
    pub face_url: Option<String>,
    pub last_error: Option<String>,
    pub error_chain: Vec<String>,
    /// Last terminal status line, for operator diagnosis
    pub last_status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Set when the session reaches a terminal stage
    pub finished_at: Option<DateTime<Utc>>,
}

impl EnrollmentRecord {
    /// New unfinished session in `stage`.
    pub fn start(
        device_id: DeviceId,
        subject_id: SubjectId,
        stage: impl Into<String>,
        started_at: DateTime<Utc>,
        deadline: DateTime<Utc>,
    ) -> Self {
        let stage = stage.into();
        Self {
            id: Uuid::new_v4(),
            device_id,
            subject_id,
            furthest_stage: stage.clone(),
            stage,
            attempt_count: 0,
            deadline,
            face_url: None,
            last_error: None,
            error_chain: Vec::new(),
            last_status: None,
            started_at,
            updated_at: started_at,
            finished_at: None,
        }
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        self.finished_at.is_none()
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct EnrollmentRow {
    pub id: String,
    pub device_id: String,
    pub subject_id: String,
    pub stage: String,
    pub furthest_stage: String,
    pub attempt_count: i64,
    pub deadline: DateTime<Utc>,
    pub face_url: Option<String>,
    pub last_error: Option<String>,
    pub error_chain: String,
    pub last_status: Option<String>,
    pub started_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub finished_at: Option<DateTime<Utc>>,
}

impl TryFrom<EnrollmentRow> for EnrollmentRecord {
    type Error = StorageError;

    fn try_from(row: EnrollmentRow) -> StorageResult<Self> {
        Ok(Self {
            id: Uuid::parse_str(&row.id)
                .map_err(|e| StorageError::Validation(format!("invalid session id {}: {e}", row.id)))?,
            device_id: DeviceId::new(row.device_id)?,
            subject_id: SubjectId::new(row.subject_id)?,
            stage: row.stage,
            furthest_stage: row.furthest_stage,
            attempt_count: u32::try_from(row.attempt_count).unwrap_or(u32::MAX),
            deadline: row.deadline,
            face_url: row.face_url,
            last_error: row.last_error,
            error_chain: serde_json::from_str(&row.error_chain)?,
            last_status: row.last_status,
            started_at: row.started_at,
            updated_at: row.updated_at,
            finished_at: row.finished_at,
        })
    }
}
