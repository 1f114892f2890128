//! Registry of device sessions.
//!
//! The `SessionManager` owns one [`DeviceSession`] per registered terminal,
//! keyed by [`DeviceId`]. Enrollment and ingestion acquire sessions from it;
//! registry management (external CRUD) keeps it in sync through
//! [`register`](SessionManager::register) and [`remove`](SessionManager::remove).
//!
//! # Lifecycle
//!
//! 1. `register(profile)` creates a session through the transport factory
//! 2. Re-registering with the same address and credentials keeps the session
//!    (and its cached challenge and capabilities)
//! 3. Re-registering with a changed address, credentials or auth mode
//!    replaces the session; holders of the old `Arc` finish their call on it
//!    before the replacement sends anything, as both share one call lock
//! 4. `remove(id)` drops the session from the registry; the call lock stays,
//!    so a session registered again later still waits for stragglers
//!
//! # Examples
//!
//! ```no_run
//! use rollcall_core::{Credentials, DeviceId, DeviceProfile, SystemClock};
//! use rollcall_device::{CapabilityConfig, SessionManager};
//! use rollcall_network::{HttpTransportFactory, TransportConfig};
//!
//! # async fn example() -> rollcall_core::Result<()> {
//! let manager = SessionManager::new(
//!     HttpTransportFactory::new(TransportConfig::default()),
//!     SystemClock,
//!     CapabilityConfig::default(),
//! );
//!
//! let id = DeviceId::new("D1")?;
//! manager.register(DeviceProfile::new(id.clone(), "http://10.0.4.21", Credentials::new("admin", "pw")))?;
//!
//! let session = manager.acquire(&id)?;
//! let info = session.probe().await?;
//! println!("{} running {:?}", info.model, info.firmware_version);
//! # Ok(())
//! # }
//! ```

use crate::capability::CapabilityConfig;
use crate::session::DeviceSession;
use rollcall_core::{Clock, DeviceId, DeviceProfile, Error, Result};
use rollcall_network::{KnownDevices, TransportFactory};
use rollcall_protocol::Feature;
use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// Session type produced by a manager over factory `F` and clock `C`.
pub type SessionOf<F, C> = DeviceSession<<F as TransportFactory>::Transport, C>;

/// Outcome of [`SessionManager::register`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Registration {
    /// No session existed for the device
    Created,
    /// Connection settings changed; the old session was dropped
    Replaced,
    /// Same connection settings; the existing session was kept
    Unchanged,
}

/// Per-device session registry.
pub struct SessionManager<F: TransportFactory, C> {
    factory: F,
    clock: C,
    config: CapabilityConfig,
    sessions: RwLock<HashMap<DeviceId, Arc<SessionOf<F, C>>>>,
    /// One call lock per terminal, outliving its sessions
    call_locks: RwLock<HashMap<DeviceId, Arc<Mutex<()>>>>,
}

impl<F, C> SessionManager<F, C>
where
    F: TransportFactory,
    C: Clock + Clone,
{
    pub fn new(factory: F, clock: C, config: CapabilityConfig) -> Self {
        Self {
            factory,
            clock,
            config,
            sessions: RwLock::new(HashMap::new()),
            call_locks: RwLock::new(HashMap::new()),
        }
    }

    /// Create or replace the session for `profile.id`.
    ///
    /// # Errors
    /// Returns the factory error (usually `Error::Config`) if a transport
    /// cannot be built; the registry is left unchanged in that case.
    pub fn register(&self, profile: DeviceProfile) -> Result<Registration> {
        {
            let sessions = self.sessions.read().unwrap_or_else(PoisonError::into_inner);
            if let Some(existing) = sessions.get(&profile.id) {
                if !existing.profile().connection_changed(&profile) {
                    return Ok(Registration::Unchanged);
                }
            }
        }

        let transport = self.factory.connect(&profile)?;
        let id = profile.id.clone();
        let address = profile.address.clone();
        let lock = self.call_lock(&id);
        let session = Arc::new(DeviceSession::with_call_lock(
            profile,
            transport,
            self.clock.clone(),
            &self.config,
            lock,
        ));

        let previous = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id.clone(), session);

        let outcome = if previous.is_some() {
            Registration::Replaced
        } else {
            Registration::Created
        };
        info!(device_id = %id, address = %address, outcome = ?outcome, "Device session registered");
        Ok(outcome)
    }

    fn call_lock(&self, id: &DeviceId) -> Arc<Mutex<()>> {
        self.call_locks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(id.clone())
            .or_default()
            .clone()
    }

    /// Drop the session for `id`. Returns `false` if none existed.
    pub fn remove(&self, id: &DeviceId) -> bool {
        let removed = self
            .sessions
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(id)
            .is_some();
        if removed {
            info!(device_id = %id, "Device session removed");
        }
        removed
    }

    /// Session for `id`.
    ///
    /// # Errors
    /// Returns `Error::DeviceNotFound` for an unregistered device.
    pub fn acquire(&self, id: &DeviceId) -> Result<Arc<SessionOf<F, C>>> {
        let session = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned();
        match session {
            Some(session) => Ok(session),
            None => {
                debug!(device_id = %id, "Session requested for unknown device");
                Err(Error::DeviceNotFound(id.to_string()))
            }
        }
    }

    /// Whether device `id` advertises `feature`.
    ///
    /// # Errors
    /// `DeviceNotFound`, or the capability request's error when a refresh fails.
    pub async fn supports(&self, id: &DeviceId, feature: Feature) -> Result<bool> {
        self.acquire(id)?.supports(feature).await
    }

    /// Registered device ids, sorted.
    pub fn list(&self) -> Vec<DeviceId> {
        let mut ids: Vec<_> = self
            .sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .keys()
            .cloned()
            .collect();
        ids.sort();
        ids
    }

    pub fn len(&self) -> usize {
        self.sessions.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clock(&self) -> &C {
        &self.clock
    }
}

impl<F, C> KnownDevices for SessionManager<F, C>
where
    F: TransportFactory,
    C: Clock + Clone,
{
    fn is_known(&self, device_id: &DeviceId) -> bool {
        self.sessions
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(device_id)
    }
}
