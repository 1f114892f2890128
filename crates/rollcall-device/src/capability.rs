//! Per-device capability snapshot with a time-to-live.
//!
//! Terminals advertise optional APIs through the capability endpoint. The
//! cache keeps the last parsed [`CapabilitySet`] together with the time it was
//! fetched; once older than the TTL it is reported stale and the session
//! refreshes it before the next gated call.

use chrono::{DateTime, Utc};
use rollcall_core::Clock;
use rollcall_core::constants::DEFAULT_CAPABILITY_TTL_SECS;
use rollcall_protocol::commands::CapabilitySet;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

/// Capability cache settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilityConfig {
    /// Age after which a snapshot is refreshed
    pub ttl: Duration,
}

impl Default for CapabilityConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(DEFAULT_CAPABILITY_TTL_SECS),
        }
    }
}

impl CapabilityConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn ttl(mut self, ttl: Duration) -> Self {
        self.ttl = ttl;
        self
    }
}

/// Capability flags as last fetched from a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CapabilitySnapshot {
    pub capabilities: CapabilitySet,
    pub fetched_at: DateTime<Utc>,
}

/// Single-device capability cache.
#[derive(Debug)]
pub struct CapabilityCache<C> {
    clock: C,
    ttl: Duration,
    snapshot: Mutex<Option<CapabilitySnapshot>>,
}

impl<C: Clock> CapabilityCache<C> {
    pub fn new(clock: C, config: &CapabilityConfig) -> Self {
        Self {
            clock,
            ttl: config.ttl,
            snapshot: Mutex::new(None),
        }
    }

    /// The cached set if it is younger than the TTL.
    pub fn fresh(&self) -> Option<CapabilitySet> {
        let snapshot = self.snapshot.lock().unwrap_or_else(PoisonError::into_inner);
        let snapshot = snapshot.as_ref()?;
        let age = self.clock.now() - snapshot.fetched_at;
        let ttl = chrono::Duration::from_std(self.ttl).unwrap_or(chrono::Duration::MAX);
        (age < ttl).then(|| snapshot.capabilities.clone())
    }

    /// Replace the snapshot with `capabilities`, stamped with the current time.
    pub fn store(&self, capabilities: CapabilitySet) {
        let snapshot = CapabilitySnapshot {
            capabilities,
            fetched_at: self.clock.now(),
        };
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = Some(snapshot);
    }

    /// Force the next lookup to refresh.
    pub fn invalidate(&self) {
        *self.snapshot.lock().unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Last snapshot regardless of age.
    pub fn snapshot(&self) -> Option<CapabilitySnapshot> {
        self.snapshot
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::ManualClock;
    use rollcall_protocol::Feature;

    #[test]
    fn test_snapshot_expires_after_ttl() {
        let clock = ManualClock::default();
        let cache = CapabilityCache::new(clock.clone(), &CapabilityConfig::new().ttl(Duration::from_secs(600)));
        assert!(cache.fresh().is_none());

        cache.store(CapabilitySet::from_features([Feature::UserInfo]));
        clock.advance(Duration::from_secs(599));
        assert!(cache.fresh().is_some_and(|c| c.supports(Feature::UserInfo)));

        clock.advance(Duration::from_secs(1));
        assert!(cache.fresh().is_none());
        // Stale snapshot is still visible for diagnostics
        assert!(cache.snapshot().is_some());
    }

    #[test]
    fn test_invalidate() {
        let cache = CapabilityCache::new(ManualClock::default(), &CapabilityConfig::default());
        cache.store(CapabilitySet::all());
        cache.invalidate();
        assert!(cache.fresh().is_none());
        assert!(cache.snapshot().is_none());
    }
}
