use crate::error::{StorageError, StorageResult};
use chrono::{DateTime, Utc};
use rollcall_core::{AuthMode, Credentials, DeviceId, DeviceProfile};

/// Registered terminal as stored in the `devices` table.
///
/// The connection part of the record ([`DeviceRecord::profile`]) is what the
/// session manager needs; `name` and `enabled` are registry metadata.
///
/// # Examples
///
/// ```
/// use rollcall_core::{Credentials, DeviceId, DeviceProfile};
/// use rollcall_storage::models::DeviceRecord;
/// use chrono::Utc;
///
/// let profile = DeviceProfile::new(
///     DeviceId::new("D1").unwrap(),
///     "http://10.0.4.21",
///     Credentials::new("admin", "secret"),
/// );
/// let record = DeviceRecord::new(profile, "Lobby east", Utc::now());
/// assert!(record.enabled);
/// assert_eq!(record.profile().address, "http://10.0.4.21");
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeviceRecord {
    pub id: DeviceId,
    pub name: String,
    pub address: String,
    pub credentials: Credentials,
    pub auth_mode: AuthMode,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl DeviceRecord {
    pub fn new(profile: DeviceProfile, name: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id: profile.id,
            name: name.into(),
            address: profile.address,
            credentials: profile.credentials,
            auth_mode: profile.auth_mode,
            enabled: true,
            created_at: now,
            updated_at: now,
        }
    }

    /// Connection profile for the session manager.
    #[must_use]
    pub fn profile(&self) -> DeviceProfile {
        DeviceProfile::new(self.id.clone(), self.address.clone(), self.credentials.clone())
            .with_auth_mode(self.auth_mode)
    }
}

#[derive(Debug, sqlx::FromRow)]
pub(crate) struct DeviceRow {
    pub id: String,
    pub name: String,
    pub address: String,
    pub username: String,
    pub password: String,
    pub auth_mode: String,
    pub enabled: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl TryFrom<DeviceRow> for DeviceRecord {
    type Error = StorageError;

    fn try_from(row: DeviceRow) -> StorageResult<Self> {
        Ok(Self {
            id: DeviceId::new(row.id)?,
            name: row.name,
            address: row.address,
            credentials: Credentials::new(row.username, row.password),
            auth_mode: AuthMode::parse(&row.auth_mode)?,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}
