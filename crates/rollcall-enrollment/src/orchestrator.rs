//! Enrollment orchestrator.
//!
//! Runs one enrollment session per (device, subject) through the stage
//! machine in [`crate::stage`]:
//!
//! ```text
//!            ┌──────── progress < 100: backoff, poll again ───────┐
//!            ▼                                                     │
//! capture ──► CaptureRequested / CaptureInProgress ────────────────┘
//!            │ progress 100 + locator
//!            ▼
//! create ──► UserCreatePending ──► UserCreated      (already-exists counts as created)
//!            ▼
//! bind   ──► FaceBindPending   ──► Bound
//!
//! fatal error, budget exhausted, deadline passed, cancelled ──► Failed
//! ```
//!
//! # Budgets
//!
//! - **Retries**: capture polls and retries after retryable errors (network,
//!   busy) draw from the same `max_retries` budget.
//! - **Deadline**: a wall-clock limit checked before each device call and
//!   after each backoff, independent of the retry budget.
//!
//! # Concurrency
//!
//! A second `enroll` for a pair that already has an active session fails with
//! `Error::Conflict` at once. Cancellation is observed only while waiting out
//! a backoff; a call already sent to the terminal runs to completion.
//!
//! # Examples
//!
//! ```no_run
//! use rollcall_core::{DeviceId, SubjectId, SystemClock};
//! use rollcall_device::{CapabilityConfig, SessionManager};
//! use rollcall_enrollment::{EnrollmentConfig, EnrollmentOrchestrator, EnrollmentOutcome, EnrollmentRequest};
//! use rollcall_network::{HttpTransportFactory, TransportConfig};
//! use rollcall_storage::{Database, SqliteEnrollmentRepository};
//! use std::sync::Arc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::in_memory().await?;
//! let sessions = Arc::new(SessionManager::new(
//!     HttpTransportFactory::new(TransportConfig::default()),
//!     SystemClock,
//!     CapabilityConfig::default(),
//! ));
//! let orchestrator = EnrollmentOrchestrator::new(
//!     sessions,
//!     SqliteEnrollmentRepository::new(db.pool().clone()),
//!     EnrollmentConfig::default(),
//! );
//!
//! let request = EnrollmentRequest::new(DeviceId::new("D1")?, SubjectId::new("S1")?).with_name("Ana Souza");
//! match orchestrator.enroll(request).await? {
//!     EnrollmentOutcome::Bound { face_url, .. } => println!("bound {face_url}"),
//!     EnrollmentOutcome::Failed(failure) => println!("failed at {}: {}", failure.furthest_stage, failure.error),
//! }
//! # Ok(())
//! # }
//! ```

use crate::config::EnrollmentConfig;
use crate::stage::{EnrollmentStage, StageMachine};
use chrono::{DateTime, TimeDelta, Utc};
use rollcall_core::constants::DEFAULT_REQUEST_TIMEOUT_MS;
use rollcall_core::{Clock, DeviceId, Error, Result, SubjectId};
use rollcall_device::{DeviceReply, SessionManager, SessionOf};
use rollcall_network::TransportFactory;
use rollcall_protocol::commands::{CaptureProgress, CaptureRequest, FaceBinding, UserRecord};
use rollcall_protocol::{DeviceRequest, Endpoint, StatusKind};
use rollcall_storage::{EnrollmentRecord, EnrollmentRepository};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

/// Reason recorded on sessions found unfinished at startup.
const INTERRUPTED_REASON: &str = "enrollment interrupted before completion";

type PairKey = (DeviceId, SubjectId);

/// What to enroll, and where.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentRequest {
    pub device_id: DeviceId,
    pub subject_id: SubjectId,
    /// Display name written into the terminal's user record
    pub name: Option<String>,
}

impl EnrollmentRequest {
    pub fn new(device_id: DeviceId, subject_id: SubjectId) -> Self {
        Self {
            device_id,
            subject_id,
            name: None,
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    fn user_record(&self) -> UserRecord {
        let record = UserRecord::new(self.subject_id.clone());
        match &self.name {
            Some(name) => record.with_name(name.clone()),
            None => record,
        }
    }
}

/// Diagnosis of a failed session.
#[derive(Debug)]
pub struct EnrollmentFailure {
    pub session_id: Uuid,
    /// Furthest stage reached along the success path
    pub furthest_stage: EnrollmentStage,
    /// Error that ended the session
    pub error: Error,
    /// Every error observed, oldest first, including `error`
    pub error_chain: Vec<String>,
    /// Last status line reported by the terminal
    pub last_status: Option<String>,
    pub attempts: u32,
}

/// Terminal result of [`EnrollmentOrchestrator::enroll`].
#[derive(Debug)]
pub enum EnrollmentOutcome {
    Bound {
        session_id: Uuid,
        face_url: String,
        attempts: u32,
    },
    Failed(EnrollmentFailure),
}

impl EnrollmentOutcome {
    pub fn is_bound(&self) -> bool {
        matches!(self, EnrollmentOutcome::Bound { .. })
    }

    pub fn session_id(&self) -> Uuid {
        match self {
            EnrollmentOutcome::Bound { session_id, .. } => *session_id,
            EnrollmentOutcome::Failed(failure) => failure.session_id,
        }
    }
}

struct ActiveEntry {
    cancel: CancellationToken,
    snapshot: Arc<Mutex<EnrollmentRecord>>,
}

/// Removes the pair from the active table when the session ends, whether it
/// finished, failed or the caller dropped the future.
struct ActiveGuard<'a> {
    active: &'a Mutex<HashMap<PairKey, ActiveEntry>>,
    key: PairKey,
}

impl Drop for ActiveGuard<'_> {
    fn drop(&mut self) {
        lock(self.active).remove(&self.key);
    }
}

/// Mutable state of one running session.
struct Run {
    machine: StageMachine,
    record: EnrollmentRecord,
    snapshot: Arc<Mutex<EnrollmentRecord>>,
    retries_used: u32,
}

impl Run {
    /// Take one retry from the budget; `false` once it is spent.
    fn take_retry(&mut self, max_retries: u32) -> bool {
        if self.retries_used >= max_retries {
            return false;
        }
        self.retries_used += 1;
        true
    }

    fn note_reply(&mut self, reply: &DeviceReply) {
        if let Some(status) = reply.response.response_status() {
            self.record.last_status = Some(status.to_device_status(reply.response.http_status).to_string());
        }
    }

    fn note_error(&mut self, err: &Error) {
        let message = err.to_string();
        self.record.error_chain.push(message.clone());
        self.record.last_error = Some(message);
        if let Some(status) = err.device_status() {
            self.record.last_status = Some(status.to_string());
        }
    }

    fn sync_stage(&mut self, now: DateTime<Utc>) {
        self.record.stage = self.machine.current().as_str().to_string();
        self.record.furthest_stage = self.machine.furthest().as_str().to_string();
        self.record.updated_at = now;
        if self.machine.is_terminal() {
            self.record.finished_at = Some(now);
        }
        *lock(&self.snapshot) = self.record.clone();
    }
}

/// Drives enrollment sessions against registered terminals.
pub struct EnrollmentOrchestrator<F: TransportFactory, C, R> {
    sessions: Arc<SessionManager<F, C>>,
    repository: R,
    clock: C,
    config: EnrollmentConfig,
    active: Mutex<HashMap<PairKey, ActiveEntry>>,
}

impl<F, C, R> EnrollmentOrchestrator<F, C, R>
where
    F: TransportFactory,
    C: Clock + Clone,
    R: EnrollmentRepository,
{
    /// Orchestrator sharing the session manager's clock.
    pub fn new(sessions: Arc<SessionManager<F, C>>, repository: R, config: EnrollmentConfig) -> Self {
        let clock = sessions.clock().clone();
        Self {
            sessions,
            repository,
            clock,
            config,
            active: Mutex::new(HashMap::new()),
        }
    }

    pub fn config(&self) -> &EnrollmentConfig {
        &self.config
    }

    /// Run one enrollment session to a terminal stage.
    ///
    /// Device-side failures do not surface as `Err`: they end the session in
    /// `Failed` and are reported as [`EnrollmentOutcome::Failed`] with the
    /// furthest stage reached and the full error chain.
    ///
    /// # Errors
    /// - `DeviceNotFound` if the device is not registered
    /// - `Conflict` if the pair already has an active session
    /// - `Storage` if the session row cannot be created
    pub async fn enroll(&self, request: EnrollmentRequest) -> Result<EnrollmentOutcome> {
        let session = self.sessions.acquire(&request.device_id)?;
        let key = (request.device_id.clone(), request.subject_id.clone());

        let started_at = self.clock.now();
        let deadline = TimeDelta::from_std(self.config.deadline)
            .map_err(|_| Error::Config(format!("enrollment deadline out of range: {:?}", self.config.deadline)))?;
        let record = EnrollmentRecord::start(
            request.device_id.clone(),
            request.subject_id.clone(),
            EnrollmentStage::Idle.as_str(),
            started_at,
            started_at + deadline,
        );
        let snapshot = Arc::new(Mutex::new(record.clone()));
        let cancel = CancellationToken::new();

        {
            let mut active = lock(&self.active);
            if active.contains_key(&key) {
                warn!(
                    device_id = %request.device_id,
                    subject_id = %request.subject_id,
                    "Enrollment rejected, session already active"
                );
                return Err(Error::Conflict {
                    device_id: request.device_id.to_string(),
                    subject_id: request.subject_id.to_string(),
                });
            }
            active.insert(
                key.clone(),
                ActiveEntry {
                    cancel: cancel.clone(),
                    snapshot: snapshot.clone(),
                },
            );
        }
        let _guard = ActiveGuard {
            active: &self.active,
            key,
        };

        self.repository.create(&record).await?;
        info!(
            device_id = %request.device_id,
            subject_id = %request.subject_id,
            session_id = %record.id,
            "Enrollment started"
        );

        let mut run = Run {
            machine: StageMachine::new(started_at),
            record,
            snapshot,
            retries_used: 0,
        };

        match self.drive(&session, &request, &mut run, &cancel).await {
            Ok(face_url) => {
                info!(
                    device_id = %request.device_id,
                    subject_id = %request.subject_id,
                    attempts = run.record.attempt_count,
                    "Enrollment bound"
                );
                Ok(EnrollmentOutcome::Bound {
                    session_id: run.record.id,
                    face_url,
                    attempts: run.record.attempt_count,
                })
            }
            Err(err) => Ok(EnrollmentOutcome::Failed(self.finish_failed(&request, &mut run, err).await)),
        }
    }

    /// Request cancellation of the active session for the pair.
    ///
    /// Returns `false` if no session is active. The session stops at its next
    /// backoff and ends in `Failed` with `Error::Cancelled`.
    pub fn cancel(&self, device_id: &DeviceId, subject_id: &SubjectId) -> bool {
        let active = lock(&self.active);
        match active.get(&(device_id.clone(), subject_id.clone())) {
            Some(entry) => {
                entry.cancel.cancel();
                info!(device_id = %device_id, subject_id = %subject_id, "Enrollment cancellation requested");
                true
            }
            None => false,
        }
    }

    /// Current state of the active session for the pair, else its latest
    /// persisted session.
    ///
    /// # Errors
    /// Returns `Storage` if the lookup fails.
    pub async fn status(&self, device_id: &DeviceId, subject_id: &SubjectId) -> Result<Option<EnrollmentRecord>> {
        let active = lock(&self.active)
            .get(&(device_id.clone(), subject_id.clone()))
            .map(|entry| lock(&entry.snapshot).clone());
        if active.is_some() {
            return Ok(active);
        }
        Ok(self.repository.find_latest(device_id, subject_id).await?)
    }

    /// Snapshots of every session running in this process.
    pub fn active_sessions(&self) -> Vec<EnrollmentRecord> {
        let mut sessions: Vec<_> = lock(&self.active)
            .values()
            .map(|entry| lock(&entry.snapshot).clone())
            .collect();
        sessions.sort_by_key(|record| record.started_at);
        sessions
    }

    /// Fail sessions left unfinished by a previous process.
    ///
    /// Call once at startup, before accepting enrollments.
    ///
    /// # Errors
    /// Returns `Storage` if the update fails.
    pub async fn recover(&self) -> Result<u64> {
        let closed = self
            .repository
            .fail_unfinished(EnrollmentStage::Failed.as_str(), INTERRUPTED_REASON, self.clock.now())
            .await?;
        if closed > 0 {
            warn!(sessions = closed, "Closed enrollment sessions left unfinished by a previous run");
        }
        Ok(closed)
    }

    /// Fail unfinished sessions whose deadline passed more than one request
    /// timeout ago.
    ///
    /// Unlike [`recover`](Self::recover) this leaves sessions other processes
    /// may still be driving alone, so it can run before every enrollment.
    ///
    /// # Errors
    /// Returns `Storage` if the update fails.
    pub async fn recover_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let cutoff = now - TimeDelta::milliseconds(DEFAULT_REQUEST_TIMEOUT_MS as i64);
        let closed = self
            .repository
            .fail_expired(EnrollmentStage::Failed.as_str(), INTERRUPTED_REASON, cutoff, now)
            .await?;
        if closed > 0 {
            warn!(sessions = closed, "Closed expired enrollment sessions");
        }
        Ok(closed)
    }

    async fn drive(
        &self,
        session: &SessionOf<F, C>,
        request: &EnrollmentRequest,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<String> {
        let face_url = self.capture(session, run, cancel).await?;

        self.advance(run, EnrollmentStage::UserCreatePending).await?;
        let create = DeviceRequest::for_endpoint(Endpoint::CreateUser, request.user_record().to_body())?;
        let reply = self.call_with_retry(session, &create, run, cancel).await?;
        if reply.status == StatusKind::AlreadyExists {
            debug!(subject_id = %request.subject_id, "User already present on terminal");
        }
        self.advance(run, EnrollmentStage::UserCreated).await?;

        self.advance(run, EnrollmentStage::FaceBindPending).await?;
        let binding = FaceBinding::new(
            self.config.face_library_id.clone(),
            request.subject_id.clone(),
            face_url.clone(),
        );
        let bind = DeviceRequest::for_endpoint(Endpoint::BindFace, binding.to_body())?;
        self.call_with_retry(session, &bind, run, cancel).await?;
        self.advance(run, EnrollmentStage::Bound).await?;

        Ok(face_url)
    }

    /// Issue the capture command and poll it until the photo locator arrives.
    async fn capture(&self, session: &SessionOf<F, C>, run: &mut Run, cancel: &CancellationToken) -> Result<String> {
        let command = CaptureRequest {
            infrared: self.config.capture_infrared,
        };
        let request = DeviceRequest::for_endpoint(Endpoint::CaptureFace, command.to_body())?;
        self.advance(run, EnrollmentStage::CaptureRequested).await?;

        let mut polls = 0u32;
        loop {
            let reply = self.call_with_retry(session, &request, run, cancel).await?;
            polls += 1;
            let progress = CaptureProgress::from_payload(&reply.response.payload)?;

            if progress.is_complete() {
                if let Some(url) = progress.face_data_url {
                    run.record.face_url = Some(url.clone());
                    self.advance(run, EnrollmentStage::CaptureComplete).await?;
                    return Ok(url);
                }
            }

            debug!(
                device_id = %run.record.device_id,
                subject_id = %run.record.subject_id,
                progress = progress.progress,
                attempt = polls,
                "Capture in progress"
            );
            self.advance(run, EnrollmentStage::CaptureInProgress).await?;
            if !run.take_retry(self.config.max_retries) {
                return Err(Error::CaptureTimeout { attempts: polls });
            }
            self.backoff(run, cancel).await?;
        }
    }

    /// Send `request`, retrying retryable errors within the shared budget.
    async fn call_with_retry(
        &self,
        session: &SessionOf<F, C>,
        request: &DeviceRequest,
        run: &mut Run,
        cancel: &CancellationToken,
    ) -> Result<DeviceReply> {
        loop {
            self.check_deadline(run)?;
            run.record.attempt_count += 1;

            match session.call(request).await {
                Ok(reply) => {
                    run.note_reply(&reply);
                    return Ok(reply);
                }
                Err(err) => {
                    if !err.is_retryable() || !run.take_retry(self.config.max_retries) {
                        return Err(err);
                    }
                    warn!(
                        device_id = %run.record.device_id,
                        subject_id = %run.record.subject_id,
                        stage = %run.machine.current(),
                        attempt = run.record.attempt_count,
                        error = %err,
                        "Retryable device error, backing off"
                    );
                    run.note_error(&err);
                    self.backoff(run, cancel).await?;
                }
            }
        }
    }

    /// Wait out one backoff, cut short by the deadline, aborted by cancellation.
    async fn backoff(&self, run: &Run, cancel: &CancellationToken) -> Result<()> {
        let remaining = (run.record.deadline - self.clock.now())
            .to_std()
            .unwrap_or(Duration::ZERO);
        let delay = self.config.capture_backoff.min(remaining);

        tokio::select! {
            biased;
            () = cancel.cancelled() => return Err(Error::Cancelled),
            () = self.clock.sleep(delay) => {}
        }
        if cancel.is_cancelled() {
            return Err(Error::Cancelled);
        }
        self.check_deadline(run)
    }

    fn check_deadline(&self, run: &Run) -> Result<()> {
        if self.clock.now() >= run.record.deadline {
            return Err(Error::DeadlineExceeded {
                deadline: self.config.deadline,
            });
        }
        Ok(())
    }

    async fn advance(&self, run: &mut Run, stage: EnrollmentStage) -> Result<()> {
        let now = self.clock.now();
        let transition = run.machine.transition_to(stage, now)?;
        run.sync_stage(now);
        if transition.from != transition.to {
            debug!(
                device_id = %run.record.device_id,
                subject_id = %run.record.subject_id,
                stage = %stage,
                "Enrollment stage changed"
            );
        }
        self.repository.update(&run.record).await?;
        Ok(())
    }

    async fn finish_failed(&self, request: &EnrollmentRequest, run: &mut Run, err: Error) -> EnrollmentFailure {
        let now = self.clock.now();
        run.note_error(&err);
        if let Err(transition_err) = run.machine.fail(now) {
            // Already terminal; keep the stored stage as is
            debug!(error = %transition_err, "Failure after terminal stage");
        }
        run.sync_stage(now);

        error!(
            device_id = %request.device_id,
            subject_id = %request.subject_id,
            furthest_stage = %run.machine.furthest(),
            attempts = run.record.attempt_count,
            error = %err,
            "Enrollment failed"
        );

        if let Err(storage_err) = self.repository.update(&run.record).await {
            error!(
                session_id = %run.record.id,
                error = %storage_err,
                "Could not persist failed enrollment"
            );
        }

        EnrollmentFailure {
            session_id: run.record.id,
            furthest_stage: run.machine.furthest(),
            error: err,
            error_chain: run.record.error_chain.clone(),
            last_status: run.record.last_status.clone(),
            attempts: run.record.attempt_count,
        }
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_user_record_carries_name() {
        let request = EnrollmentRequest::new(DeviceId::new("D1").unwrap(), SubjectId::new("S1").unwrap())
            .with_name("Ana");
        assert_eq!(request.user_record(), UserRecord::new(SubjectId::new("S1").unwrap()).with_name("Ana"));
    }

    #[test]
    fn test_retry_budget_is_shared() {
        let now = Utc::now();
        let record = EnrollmentRecord::start(
            DeviceId::new("D1").unwrap(),
            SubjectId::new("S1").unwrap(),
            "idle",
            now,
            now,
        );
        let mut run = Run {
            machine: StageMachine::new(now),
            snapshot: Arc::new(Mutex::new(record.clone())),
            record,
            retries_used: 0,
        };
        assert!(run.take_retry(2));
        assert!(run.take_retry(2));
        assert!(!run.take_retry(2));
        assert_eq!(run.retries_used, 2);
    }
}
