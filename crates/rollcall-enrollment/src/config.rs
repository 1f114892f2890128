//! Enrollment timing and device options.

use rollcall_core::constants::{
    DEFAULT_CAPTURE_BACKOFF_MS, DEFAULT_ENROLLMENT_DEADLINE_SECS, DEFAULT_FACE_LIBRARY_ID,
    DEFAULT_MAX_RETRIES,
};
use std::time::Duration;

/// Configuration for the enrollment orchestrator.
///
/// `max_retries` is one budget shared by every step of a session: capture
/// polls and retries after transient errors all draw from it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnrollmentConfig {
    /// Delay before polling an unfinished capture or retrying a transient error
    pub capture_backoff: Duration,
    pub max_retries: u32,
    /// Wall-clock budget of one session
    pub deadline: Duration,
    /// Face library the photo is bound into
    pub face_library_id: String,
    /// Request an infrared frame along with the photo
    pub capture_infrared: bool,
}

impl Default for EnrollmentConfig {
    fn default() -> Self {
        Self {
            capture_backoff: Duration::from_millis(DEFAULT_CAPTURE_BACKOFF_MS),
            max_retries: DEFAULT_MAX_RETRIES,
            deadline: Duration::from_secs(DEFAULT_ENROLLMENT_DEADLINE_SECS),
            face_library_id: DEFAULT_FACE_LIBRARY_ID.to_string(),
            capture_infrared: false,
        }
    }
}

impl EnrollmentConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn capture_backoff(mut self, backoff: Duration) -> Self {
        self.capture_backoff = backoff;
        self
    }

    pub fn max_retries(mut self, retries: u32) -> Self {
        self.max_retries = retries;
        self
    }

    pub fn deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }

    pub fn face_library_id(mut self, id: impl Into<String>) -> Self {
        self.face_library_id = id.into();
        self
    }

    pub fn capture_infrared(mut self, infrared: bool) -> Self {
        self.capture_infrared = infrared;
        self
    }
}
