use crate::{
    Result,
    constants::{MAX_DEVICE_ID_LENGTH, MAX_SUBJECT_ID_LENGTH},
    error::Error,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Registered terminal identifier (1-64 ASCII characters, no whitespace)
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DeviceId(String);

impl DeviceId {
    /// Create a new device ID with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the ID is empty, too long, or contains
    /// whitespace or non-ASCII characters.
    pub fn new(id: impl Into<String>) -> Result<Self> {
        let id = id.into();
        validate_identifier("device id", &id, MAX_DEVICE_ID_LENGTH)?;
        Ok(DeviceId(id))
    }

    /// Get the device ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for DeviceId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        DeviceId::new(s)
    }
}

impl TryFrom<String> for DeviceId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        DeviceId::new(value)
    }
}

impl From<DeviceId> for String {
    fn from(id: DeviceId) -> String {
        id.0
    }
}

/// Subject (employee) number as known by the terminal's user table.
///
/// Terminals key users by `employeeNo`, a short ASCII string. The value is
/// trimmed before validation; leading zeros are significant.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SubjectId(String);

impl SubjectId {
    /// Create a new subject ID with validation.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the trimmed value is empty, longer than
    /// 32 characters, or contains whitespace or non-ASCII characters.
    pub fn new(id: impl AsRef<str>) -> Result<Self> {
        let id = id.as_ref().trim();
        validate_identifier("subject id", id, MAX_SUBJECT_ID_LENGTH)?;
        Ok(SubjectId(id.to_string()))
    }

    /// Get the subject ID as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SubjectId {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl std::str::FromStr for SubjectId {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        SubjectId::new(s)
    }
}

impl TryFrom<String> for SubjectId {
    type Error = Error;

    fn try_from(value: String) -> Result<Self> {
        SubjectId::new(value)
    }
}

impl From<SubjectId> for String {
    fn from(id: SubjectId) -> String {
        id.0
    }
}

fn validate_identifier(kind: &str, value: &str, max_len: usize) -> Result<()> {
    if value.is_empty() || value.len() > max_len {
        return Err(Error::Validation(format!(
            "{kind} must be 1-{max_len} chars, got {}",
            value.len()
        )));
    }
    if !value.is_ascii() || value.chars().any(|c| c.is_ascii_whitespace() || c.is_control()) {
        return Err(Error::Validation(format!(
            "{kind} must be printable ASCII without whitespace: {value:?}"
        )));
    }
    Ok(())
}

/// Classified attendance direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[repr(u8)]
pub enum Direction {
    Entry = 1,
    Exit = 2,
}

impl Direction {
    /// Create a direction from its stored code.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the value is not 1 or 2.
    #[inline]
    pub fn from_code(value: i64) -> Result<Self> {
        match value {
            1 => Ok(Direction::Entry),
            2 => Ok(Direction::Exit),
            _ => Err(Error::Validation(format!("Invalid direction code: {value}"))),
        }
    }

    /// Stored code for this direction.
    #[inline]
    #[must_use]
    pub fn code(self) -> i64 {
        self as i64
    }

    /// The opposite direction (entry ↔ exit).
    #[inline]
    #[must_use]
    pub fn toggled(self) -> Self {
        match self {
            Direction::Entry => Direction::Exit,
            Direction::Exit => Direction::Entry,
        }
    }

    /// Returns `true` if direction is Entry.
    #[inline]
    #[must_use]
    pub fn is_entry(self) -> bool {
        matches!(self, Direction::Entry)
    }
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Direction::Entry => write!(f, "entry"),
            Direction::Exit => write!(f, "exit"),
        }
    }
}

/// Where an attendance event entered the system
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventSource {
    /// Posted by the terminal to the webhook receiver
    Push,
    /// Fetched by the reconciliation poller
    Pull,
}

impl EventSource {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            EventSource::Push => "push",
            EventSource::Pull => "pull",
        }
    }

    /// Parse a stored source tag.
    ///
    /// # Errors
    /// Returns `Error::Validation` for unknown tags.
    pub fn parse(value: &str) -> Result<Self> {
        match value {
            "push" => Ok(EventSource::Push),
            "pull" => Ok(EventSource::Pull),
            other => Err(Error::Validation(format!("Invalid event source: {other}"))),
        }
    }
}

impl fmt::Display for EventSource {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Key collapsing duplicate deliveries of one device event into one row.
///
/// Uses the terminal's own event serial number when present, otherwise the
/// (subject, observed instant) pair. Unique per device.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DedupKey(String);

impl DedupKey {
    /// Key derived from the device-native event identifier.
    #[must_use]
    pub fn from_device_event(event_id: &str) -> Self {
        DedupKey(format!("sn:{}", event_id.trim()))
    }

    /// Fallback key derived from subject and observation time (millisecond precision).
    #[must_use]
    pub fn from_observation(subject: &SubjectId, observed_at: DateTime<Utc>) -> Self {
        DedupKey(format!("at:{}@{}", subject, observed_at.timestamp_millis()))
    }

    /// Select the key for an event, preferring the device-native identifier.
    #[must_use]
    pub fn for_event(
        device_event_id: Option<&str>,
        subject: &SubjectId,
        observed_at: DateTime<Utc>,
    ) -> Self {
        match device_event_id.map(str::trim).filter(|id| !id.is_empty()) {
            Some(id) => Self::from_device_event(id),
            None => Self::from_observation(subject, observed_at),
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Wrap a key loaded from storage.
    #[must_use]
    pub fn from_stored(value: String) -> Self {
        DedupKey(value)
    }
}

impl fmt::Display for DedupKey {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Authentication scheme a terminal is configured for
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMode {
    /// HTTP digest challenge/response (default for terminals)
    Digest,
    /// HTTP basic authentication (legacy firmware)
    Basic,
}

impl AuthMode {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            AuthMode::Digest => "digest",
            AuthMode::Basic => "basic",
        }
    }

    /// Parse a stored auth mode tag.
    ///
    /// # Errors
    /// Returns `Error::Config` for unknown modes.
    pub fn parse(value: &str) -> Result<Self> {
        match value.to_ascii_lowercase().as_str() {
            "digest" => Ok(AuthMode::Digest),
            "basic" => Ok(AuthMode::Basic),
            other => Err(Error::Config(format!("Invalid auth mode: {other}"))),
        }
    }
}

/// Credentials used to authenticate against one terminal
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

impl Credentials {
    pub fn new(username: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            password: password.into(),
        }
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Connection profile of a registered terminal
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceProfile {
    pub id: DeviceId,
    /// Base URL, e.g. `http://10.0.4.21`
    pub address: String,
    pub credentials: Credentials,
    pub auth_mode: AuthMode,
}

impl DeviceProfile {
    pub fn new(id: DeviceId, address: impl Into<String>, credentials: Credentials) -> Self {
        Self {
            id,
            address: address.into().trim_end_matches('/').to_string(),
            credentials,
            auth_mode: AuthMode::Digest,
        }
    }

    /// Set the authentication mode.
    pub fn with_auth_mode(mut self, auth_mode: AuthMode) -> Self {
        self.auth_mode = auth_mode;
        self
    }

    /// Returns `true` if reconnecting is required to pick up changes in `other`.
    #[must_use]
    pub fn connection_changed(&self, other: &DeviceProfile) -> bool {
        self.address != other.address
            || self.credentials != other.credentials
            || self.auth_mode != other.auth_mode
    }
}
