#![allow(async_fn_in_trait)]

use crate::error::{StorageError, StorageResult};
use crate::models::EnrollmentRecord;
use crate::models::enrollment::EnrollmentRow;
use chrono::{DateTime, Utc};
use rollcall_core::{DeviceId, SubjectId};
use sqlx::SqlitePool;
use uuid::Uuid;

/// Repository for enrollment sessions.
///
/// The table enforces at most one unfinished session per (device, subject)
/// through a partial unique index; [`EnrollmentRepository::create`] reports a
/// violation as [`StorageError::ActiveEnrollment`].
pub trait EnrollmentRepository: Send + Sync {
    async fn create(&self, record: &EnrollmentRecord) -> StorageResult<()>;

    /// Persist the mutable fields of an existing session.
    async fn update(&self, record: &EnrollmentRecord) -> StorageResult<()>;

    async fn find(&self, id: Uuid) -> StorageResult<Option<EnrollmentRecord>>;

    /// Most recently started session for the pair, finished or not.
    async fn find_latest(
        &self,
        device_id: &DeviceId,
        subject_id: &SubjectId,
    ) -> StorageResult<Option<EnrollmentRecord>>;

    /// Unfinished sessions, oldest first.
    async fn list_active(&self) -> StorageResult<Vec<EnrollmentRecord>>;

    /// Finish every unfinished session with `stage` and `reason`.
    ///
    /// Used at startup to close sessions orphaned by a crash. Returns the
    /// number of sessions closed.
    async fn fail_unfinished(&self, stage: &str, reason: &str, now: DateTime<Utc>) -> StorageResult<u64>;

    /// Like [`fail_unfinished`](Self::fail_unfinished), restricted to sessions
    /// whose deadline is earlier than `cutoff`.
    async fn fail_expired(
        &self,
        stage: &str,
        reason: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64>;
}

const FAIL_SESSIONS: &str = "UPDATE enrollment_sessions SET \
     stage = ?, last_error = ?, error_chain = json_insert(error_chain, '$[#]', ?), \
     updated_at = ?, finished_at = ?";

/// SQLite implementation of EnrollmentRepository
#[derive(Debug, Clone)]
pub struct SqliteEnrollmentRepository {
    pool: SqlitePool,
}

impl SqliteEnrollmentRepository {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

const SESSION_COLUMNS: &str = "id, device_id, subject_id, stage, furthest_stage, attempt_count, \
     deadline, face_url, last_error, error_chain, last_status, started_at, updated_at, finished_at";

impl EnrollmentRepository for SqliteEnrollmentRepository {
    async fn create(&self, record: &EnrollmentRecord) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            INSERT INTO enrollment_sessions (
                id, device_id, subject_id, stage, furthest_stage, attempt_count,
                deadline, face_url, last_error, error_chain, last_status,
                started_at, updated_at, finished_at
            )
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            "#,
        )
        .bind(record.id.to_string())
        .bind(record.device_id.as_str())
        .bind(record.subject_id.as_str())
        .bind(&record.stage)
        .bind(&record.furthest_stage)
        .bind(i64::from(record.attempt_count))
        .bind(record.deadline)
        .bind(&record.face_url)
        .bind(&record.last_error)
        .bind(serde_json::to_string(&record.error_chain)?)
        .bind(&record.last_status)
        .bind(record.started_at)
        .bind(record.updated_at)
        .bind(record.finished_at)
        .execute(&self.pool)
        .await;

        match result.map_err(StorageError::from) {
            Ok(_) => Ok(()),
            Err(err) if err.is_unique_violation() => Err(StorageError::ActiveEnrollment {
                device_id: record.device_id.to_string(),
                subject_id: record.subject_id.to_string(),
            }),
            Err(err) => Err(err),
        }
    }

    async fn update(&self, record: &EnrollmentRecord) -> StorageResult<()> {
        let result = sqlx::query(
            r#"
            UPDATE enrollment_sessions SET
                stage = ?, furthest_stage = ?, attempt_count = ?, face_url = ?,
                last_error = ?, error_chain = ?, last_status = ?,
                updated_at = ?, finished_at = ?
            WHERE id = ?
            "#,
        )
        .bind(&record.stage)
        .bind(&record.furthest_stage)
        .bind(i64::from(record.attempt_count))
        .bind(&record.face_url)
        .bind(&record.last_error)
        .bind(serde_json::to_string(&record.error_chain)?)
        .bind(&record.last_status)
        .bind(record.updated_at)
        .bind(record.finished_at)
        .bind(record.id.to_string())
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(StorageError::NotFound {
                entity_type: "enrollment_session".to_string(),
                field: "id".to_string(),
                value: record.id.to_string(),
            });
        }
        Ok(())
    }

    async fn find(&self, id: Uuid) -> StorageResult<Option<EnrollmentRecord>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM enrollment_sessions WHERE id = ?"
        ))
        .bind(id.to_string())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EnrollmentRecord::try_from).transpose()
    }

    async fn find_latest(
        &self,
        device_id: &DeviceId,
        subject_id: &SubjectId,
    ) -> StorageResult<Option<EnrollmentRecord>> {
        let row = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM enrollment_sessions \
             WHERE device_id = ? AND subject_id = ? \
             ORDER BY started_at DESC, rowid DESC LIMIT 1"
        ))
        .bind(device_id.as_str())
        .bind(subject_id.as_str())
        .fetch_optional(&self.pool)
        .await?;

        row.map(EnrollmentRecord::try_from).transpose()
    }

    async fn list_active(&self) -> StorageResult<Vec<EnrollmentRecord>> {
        let rows = sqlx::query_as::<_, EnrollmentRow>(&format!(
            "SELECT {SESSION_COLUMNS} FROM enrollment_sessions \
             WHERE finished_at IS NULL ORDER BY started_at"
        ))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter().map(EnrollmentRecord::try_from).collect()
    }

    async fn fail_unfinished(&self, stage: &str, reason: &str, now: DateTime<Utc>) -> StorageResult<u64> {
        let result = sqlx::query(&format!("{FAIL_SESSIONS} WHERE finished_at IS NULL"))
            .bind(stage)
            .bind(reason)
            .bind(reason)
            .bind(now)
            .bind(now)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }

    async fn fail_expired(
        &self,
        stage: &str,
        reason: &str,
        cutoff: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> StorageResult<u64> {
        let result = sqlx::query(&format!("{FAIL_SESSIONS} WHERE finished_at IS NULL AND deadline < ?"))
            .bind(stage)
            .bind(reason)
            .bind(reason)
            .bind(now)
            .bind(now)
            .bind(cutoff)
            .execute(&self.pool)
            .await?;

        Ok(result.rows_affected())
    }
}
