use std::fmt;
use std::time::Duration;
use thiserror::Error;

/// Last status reported by a terminal, attached to errors for operator diagnosis.
///
/// `code` is the vendor numeric `statusCode` (1 = OK) and `sub_status` the
/// textual `subStatusCode`. `http_status` is the transport-level status line.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct DeviceStatus {
    pub http_status: u16,
    pub code: Option<i64>,
    pub sub_status: Option<String>,
    pub message: Option<String>,
}

impl DeviceStatus {
    /// Status carrying only an HTTP status line.
    pub fn http(http_status: u16) -> Self {
        Self {
            http_status,
            ..Default::default()
        }
    }
}

impl fmt::Display for DeviceStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "http {}", self.http_status)?;
        if let Some(code) = self.code {
            write!(f, ", statusCode {code}")?;
        }
        if let Some(sub) = &self.sub_status {
            write!(f, ", subStatusCode {sub}")?;
        }
        if let Some(msg) = &self.message {
            write!(f, " ({msg})")?;
        }
        Ok(())
    }
}

/// How callers must react to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    /// Transient; the same call may succeed if retried within budget.
    Retryable,
    /// Permanent; retrying the same call cannot succeed.
    Fatal,
}

#[derive(Error, Debug)]
pub enum Error {
    // Transport errors
    #[error("Network error talking to device: {message}")]
    Network {
        message: String,
        status: Option<DeviceStatus>,
    },

    #[error("Authentication failed: {message}")]
    Auth {
        message: String,
        status: Option<DeviceStatus>,
    },

    // Device-reported errors
    #[error("Feature not supported by device: {feature}")]
    UnsupportedFeature {
        feature: String,
        status: Option<DeviceStatus>,
    },

    #[error("Device busy: {status}")]
    DeviceBusy { status: DeviceStatus },

    #[error("Face capture did not complete after {attempts} attempts")]
    CaptureTimeout { attempts: u32 },

    #[error("Device rejected request: {status}")]
    Device { status: DeviceStatus },

    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    // Orchestration errors
    #[error("Conflicting operation already active for device {device_id}, subject {subject_id}")]
    Conflict {
        device_id: String,
        subject_id: String,
    },

    #[error("Deadline of {}ms exceeded", .deadline.as_millis())]
    DeadlineExceeded { deadline: Duration },

    #[error("Operation cancelled")]
    Cancelled,

    #[error("Invalid state transition from {from} to {to}")]
    InvalidStateTransition { from: String, to: String },

    // Payload errors
    #[error("Validation error: {0}")]
    Validation(String),

    // Persistence errors
    #[error("Storage error: {0}")]
    Storage(String),

    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(String),
}

impl Error {
    /// Create a network error without device status.
    pub fn network(message: impl Into<String>) -> Self {
        Self::Network {
            message: message.into(),
            status: None,
        }
    }

    /// Create an authentication error without device status.
    pub fn auth(message: impl Into<String>) -> Self {
        Self::Auth {
            message: message.into(),
            status: None,
        }
    }

    /// Create an unsupported-feature error for a feature the cache reported as absent.
    pub fn unsupported(feature: impl Into<String>) -> Self {
        Self::UnsupportedFeature {
            feature: feature.into(),
            status: None,
        }
    }

    /// Create a validation error.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Classify this error for retry decisions.
    ///
    /// Only transport failures and busy terminals are retryable. Everything
    /// else, including an exhausted capture budget, is fatal.
    #[must_use]
    pub fn class(&self) -> ErrorClass {
        match self {
            Error::Network { .. } | Error::DeviceBusy { .. } => ErrorClass::Retryable,
            _ => ErrorClass::Fatal,
        }
    }

    /// Returns `true` if the error is [`ErrorClass::Retryable`].
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        self.class() == ErrorClass::Retryable
    }

    /// Returns `true` for authentication failures.
    #[must_use]
    pub fn is_auth(&self) -> bool {
        matches!(self, Error::Auth { .. })
    }

    /// Last device status attached to this error, if any.
    #[must_use]
    pub fn device_status(&self) -> Option<&DeviceStatus> {
        match self {
            Error::Network { status, .. }
            | Error::Auth { status, .. }
            | Error::UnsupportedFeature { status, .. } => status.as_ref(),
            Error::DeviceBusy { status } | Error::Device { status } => Some(status),
            _ => None,
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Error::network("timeout"), ErrorClass::Retryable)]
    #[case(Error::DeviceBusy { status: DeviceStatus::http(200) }, ErrorClass::Retryable)]
    #[case(Error::auth("bad digest"), ErrorClass::Fatal)]
    #[case(Error::unsupported("captureFace"), ErrorClass::Fatal)]
    #[case(Error::CaptureTimeout { attempts: 10 }, ErrorClass::Fatal)]
    #[case(Error::validation("missing time"), ErrorClass::Fatal)]
    #[case(Error::Conflict { device_id: "d1".into(), subject_id: "s1".into() }, ErrorClass::Fatal)]
    fn test_error_class(#[case] error: Error, #[case] expected: ErrorClass) {
        assert_eq!(error.class(), expected);
    }

    #[test]
    fn test_device_status_display() {
        let status = DeviceStatus {
            http_status: 400,
            code: Some(6),
            sub_status: Some("employeeNoAlreadyExist".to_string()),
            message: Some("Invalid Content".to_string()),
        };
        assert_eq!(
            status.to_string(),
            "http 400, statusCode 6, subStatusCode employeeNoAlreadyExist (Invalid Content)"
        );
    }

    #[test]
    fn test_device_status_attached() {
        let err = Error::Device {
            status: DeviceStatus::http(400),
        };
        assert_eq!(err.device_status().map(|s| s.http_status), Some(400));
        assert!(Error::Cancelled.device_status().is_none());
    }
}
