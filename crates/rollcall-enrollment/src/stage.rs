//! Enrollment stage machine.
//!
//! An enrollment walks a terminal through three device operations: capture a
//! face photo, create the subject's user record, bind the photo to the
//! subject in the face library.
//!
//! # Stages
//!
//! - `Idle`: session created, nothing sent yet
//! - `CaptureRequested`: capture command issued
//! - `CaptureInProgress`: terminal reported progress below 100; polled again
//!   after a backoff
//! - `CaptureComplete`: progress 100 with a photo locator
//! - `UserCreatePending` → `UserCreated`: user record created (or already there)
//! - `FaceBindPending` → `Bound`: photo bound to the subject (terminal success)
//! - `Failed`: terminal failure, reachable from every non-terminal stage
//!
//! # Valid Transitions
//!
//! ```text
//! Idle ─► CaptureRequested ─► CaptureInProgress ─┐ (poll again)
//!               │                   │ ◄──────────┘
//!               └───────► CaptureComplete ◄┘
//!                               │
//!                  UserCreatePending ─► UserCreated ─► FaceBindPending ─► Bound
//!
//! any non-terminal stage ─► Failed
//! ```
//!
//! # Examples
//!
//! ```
//! use rollcall_enrollment::{EnrollmentStage, StageMachine};
//! use chrono::Utc;
//!
//! let mut machine = StageMachine::new(Utc::now());
//! machine.transition_to(EnrollmentStage::CaptureRequested, Utc::now()).unwrap();
//! assert!(machine.transition_to(EnrollmentStage::Bound, Utc::now()).is_err());
//!
//! machine.fail(Utc::now()).unwrap();
//! assert_eq!(machine.furthest(), EnrollmentStage::CaptureRequested);
//! ```

use chrono::{DateTime, Utc};
use rollcall_core::constants::MAX_STAGE_HISTORY;
use rollcall_core::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::VecDeque;
use std::fmt;

/// Stage of one enrollment session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EnrollmentStage {
    Idle,
    CaptureRequested,
    CaptureInProgress,
    CaptureComplete,
    UserCreatePending,
    UserCreated,
    FaceBindPending,
    /// Photo bound to the subject; terminal success
    Bound,
    /// Terminal failure
    Failed,
}

impl EnrollmentStage {
    /// Check if transition to `target` is valid from this stage.
    ///
    /// # Examples
    ///
    /// ```
    /// use rollcall_enrollment::EnrollmentStage;
    ///
    /// assert!(EnrollmentStage::CaptureInProgress.can_transition_to(EnrollmentStage::CaptureInProgress));
    /// assert!(EnrollmentStage::UserCreated.can_transition_to(EnrollmentStage::Failed));
    /// assert!(!EnrollmentStage::Bound.can_transition_to(EnrollmentStage::Failed));
    /// ```
    pub fn can_transition_to(self, target: EnrollmentStage) -> bool {
        use EnrollmentStage::*;
        if target == Failed {
            return !self.is_terminal();
        }
        matches!(
            (self, target),
            (Idle, CaptureRequested)
                | (CaptureRequested, CaptureInProgress | CaptureComplete)
                | (CaptureInProgress, CaptureInProgress | CaptureComplete)
                | (CaptureComplete, UserCreatePending)
                | (UserCreatePending, UserCreated)
                | (UserCreated, FaceBindPending)
                | (FaceBindPending, Bound)
        )
    }

    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, EnrollmentStage::Bound | EnrollmentStage::Failed)
    }

    /// Position along the success path; `Failed` ranks below everything.
    fn rank(self) -> u8 {
        match self {
            EnrollmentStage::Failed => 0,
            EnrollmentStage::Idle => 1,
            EnrollmentStage::CaptureRequested => 2,
            EnrollmentStage::CaptureInProgress => 3,
            EnrollmentStage::CaptureComplete => 4,
            EnrollmentStage::UserCreatePending => 5,
            EnrollmentStage::UserCreated => 6,
            EnrollmentStage::FaceBindPending => 7,
            EnrollmentStage::Bound => 8,
        }
    }

    /// Storage name.
    pub fn as_str(self) -> &'static str {
        match self {
            EnrollmentStage::Idle => "idle",
            EnrollmentStage::CaptureRequested => "capture_requested",
            EnrollmentStage::CaptureInProgress => "capture_in_progress",
            EnrollmentStage::CaptureComplete => "capture_complete",
            EnrollmentStage::UserCreatePending => "user_create_pending",
            EnrollmentStage::UserCreated => "user_created",
            EnrollmentStage::FaceBindPending => "face_bind_pending",
            EnrollmentStage::Bound => "bound",
            EnrollmentStage::Failed => "failed",
        }
    }

    /// Parse a storage name.
    ///
    /// # Errors
    /// Returns `Error::Validation` for unknown names.
    pub fn parse(value: &str) -> Result<Self> {
        const ALL: [EnrollmentStage; 9] = [
            EnrollmentStage::Idle,
            EnrollmentStage::CaptureRequested,
            EnrollmentStage::CaptureInProgress,
            EnrollmentStage::CaptureComplete,
            EnrollmentStage::UserCreatePending,
            EnrollmentStage::UserCreated,
            EnrollmentStage::FaceBindPending,
            EnrollmentStage::Bound,
            EnrollmentStage::Failed,
        ];
        ALL.into_iter()
            .find(|stage| stage.as_str() == value)
            .ok_or_else(|| Error::validation(format!("unknown enrollment stage: {value}")))
    }
}

impl fmt::Display for EnrollmentStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One recorded stage change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StageTransition {
    pub from: EnrollmentStage,
    pub to: EnrollmentStage,
    pub at: DateTime<Utc>,
}

/// Stage tracker with validated transitions and bounded history.
///
/// Times come from the caller so the machine stays deterministic under a
/// manual clock.
#[derive(Debug, Clone)]
pub struct StageMachine {
    current: EnrollmentStage,
    entered_at: DateTime<Utc>,
    furthest: EnrollmentStage,
    history: VecDeque<StageTransition>,
}

impl StageMachine {
    /// Machine in `Idle`, entered at `now`.
    pub fn new(now: DateTime<Utc>) -> Self {
        Self {
            current: EnrollmentStage::Idle,
            entered_at: now,
            furthest: EnrollmentStage::Idle,
            history: VecDeque::with_capacity(MAX_STAGE_HISTORY),
        }
    }

    pub fn current(&self) -> EnrollmentStage {
        self.current
    }

    pub fn entered_at(&self) -> DateTime<Utc> {
        self.entered_at
    }

    /// Furthest stage reached along the success path.
    pub fn furthest(&self) -> EnrollmentStage {
        self.furthest
    }

    /// Recent transitions, oldest first, at most `MAX_STAGE_HISTORY`.
    pub fn history(&self) -> &VecDeque<StageTransition> {
        &self.history
    }

    /// Move to `target`, validating the transition.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if `target` is not reachable
    /// from the current stage; the machine is left unchanged.
    pub fn transition_to(&mut self, target: EnrollmentStage, now: DateTime<Utc>) -> Result<StageTransition> {
        if !self.current.can_transition_to(target) {
            return Err(Error::InvalidStateTransition {
                from: self.current.to_string(),
                to: target.to_string(),
            });
        }

        let transition = StageTransition {
            from: self.current,
            to: target,
            at: now,
        };
        if self.history.len() == MAX_STAGE_HISTORY {
            self.history.pop_front();
        }
        self.history.push_back(transition.clone());

        self.current = target;
        self.entered_at = now;
        if target.rank() > self.furthest.rank() {
            self.furthest = target;
        }
        Ok(transition)
    }

    /// Move to `Failed`.
    ///
    /// # Errors
    /// Returns `Error::InvalidStateTransition` if already terminal.
    pub fn fail(&mut self, now: DateTime<Utc>) -> Result<StageTransition> {
        self.transition_to(EnrollmentStage::Failed, now)
    }

    pub fn is_terminal(&self) -> bool {
        self.current.is_terminal()
    }
}
