//! Service configuration from `ROLLCALL_*` environment variables.
//!
//! | Variable | Default |
//! |----------|---------|
//! | `ROLLCALL_DATABASE` | `rollcall.db` |
//! | `ROLLCALL_WEBHOOK_BIND` | `0.0.0.0:8089` |
//! | `ROLLCALL_WEBHOOK_KEY` | unset (no key check) |
//! | `ROLLCALL_REQUEST_TIMEOUT_SECS` | 30 |
//! | `ROLLCALL_ACCEPT_INVALID_CERTS` | `false` |
//! | `ROLLCALL_CAPABILITY_TTL_SECS` | 600 |
//! | `ROLLCALL_ENROLL_BACKOFF_MS` | 2000 |
//! | `ROLLCALL_ENROLL_MAX_RETRIES` | 10 |
//! | `ROLLCALL_ENROLL_DEADLINE_SECS` | 90 |
//! | `ROLLCALL_FACE_LIBRARY` | `1` |
//! | `ROLLCALL_INGEST_QUEUE` | 1024 |
//! | `ROLLCALL_INGEST_CONCURRENCY` | 8 |
//! | `ROLLCALL_EVENT_OFFSET` | `+00:00` |
//! | `ROLLCALL_RECONCILE_INTERVAL_SECS` | 300 |
//! | `ROLLCALL_RECONCILE_OVERLAP_SECS` | 120 |
//! | `ROLLCALL_RECONCILE_MAX_WINDOW_SECS` | 86400 |
//!
//! Unset variables keep the defaults of the individual config structs.

use chrono::FixedOffset;
use rollcall_core::{Error, Result};
use rollcall_device::CapabilityConfig;
use rollcall_enrollment::EnrollmentConfig;
use rollcall_ingest::{IngestConfig, ReconcilerConfig};
use rollcall_network::{TransportConfig, WebhookConfig};
use rollcall_storage::DatabaseConfig;
use std::str::FromStr;
use std::time::Duration;

/// Every tunable of the service.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub database: DatabaseConfig,
    pub webhook: WebhookConfig,
    pub transport: TransportConfig,
    pub capability: CapabilityConfig,
    pub enrollment: EnrollmentConfig,
    pub ingest: IngestConfig,
    pub reconciler: ReconcilerConfig,
}

impl ServiceConfig {
    /// Read the process environment.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the variable that failed to parse.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Read configuration through `lookup`, which maps a variable name to its value.
    ///
    /// # Errors
    /// Returns `Error::Config` naming the variable that failed to parse.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let env = Env(lookup);
        let mut config = ServiceConfig::default();

        if let Some(path) = env.string("ROLLCALL_DATABASE") {
            config.database = DatabaseConfig::file(path);
        }

        if let Some(addr) = env.string("ROLLCALL_WEBHOOK_BIND") {
            config.webhook = config.webhook.bind_addr(addr);
        }
        if let Some(key) = env.string("ROLLCALL_WEBHOOK_KEY") {
            config.webhook = config.webhook.shared_key(key);
        }

        if let Some(timeout) = env.secs("ROLLCALL_REQUEST_TIMEOUT_SECS")? {
            config.transport = config.transport.request_timeout(timeout);
        }
        if let Some(accept) = env.parse::<bool>("ROLLCALL_ACCEPT_INVALID_CERTS")? {
            config.transport = config.transport.accept_invalid_certs(accept);
        }

        if let Some(ttl) = env.secs("ROLLCALL_CAPABILITY_TTL_SECS")? {
            config.capability = config.capability.ttl(ttl);
        }

        if let Some(ms) = env.parse::<u64>("ROLLCALL_ENROLL_BACKOFF_MS")? {
            config.enrollment = config.enrollment.capture_backoff(Duration::from_millis(ms));
        }
        if let Some(retries) = env.parse::<u32>("ROLLCALL_ENROLL_MAX_RETRIES")? {
            config.enrollment = config.enrollment.max_retries(retries);
        }
        if let Some(deadline) = env.secs("ROLLCALL_ENROLL_DEADLINE_SECS")? {
            config.enrollment = config.enrollment.deadline(deadline);
        }
        if let Some(library) = env.string("ROLLCALL_FACE_LIBRARY") {
            config.enrollment = config.enrollment.face_library_id(library);
        }

        if let Some(capacity) = env.parse::<usize>("ROLLCALL_INGEST_QUEUE")? {
            config.ingest = config.ingest.queue_capacity(capacity.max(1));
        }
        if let Some(concurrency) = env.parse::<usize>("ROLLCALL_INGEST_CONCURRENCY")? {
            config.ingest = config.ingest.concurrency(concurrency.max(1));
        }
        if let Some(offset) = env.parse::<FixedOffset>("ROLLCALL_EVENT_OFFSET")? {
            config.ingest = config.ingest.naive_offset(offset);
        }

        if let Some(interval) = env.secs("ROLLCALL_RECONCILE_INTERVAL_SECS")? {
            config.reconciler = config.reconciler.interval(interval);
        }
        if let Some(overlap) = env.secs("ROLLCALL_RECONCILE_OVERLAP_SECS")? {
            config.reconciler = config.reconciler.overlap(overlap);
        }
        if let Some(window) = env.secs("ROLLCALL_RECONCILE_MAX_WINDOW_SECS")? {
            config.reconciler = config.reconciler.max_window(window);
        }

        Ok(config)
    }
}

struct Env<L>(L);

impl<L: Fn(&str) -> Option<String>> Env<L> {
    fn string(&self, key: &str) -> Option<String> {
        (self.0)(key).map(|v| v.trim().to_string()).filter(|v| !v.is_empty())
    }

    fn parse<T>(&self, key: &str) -> Result<Option<T>>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        self.string(key)
            .map(|raw| {
                raw.parse::<T>()
                    .map_err(|e| Error::Config(format!("{key}={raw:?}: {e}")))
            })
            .transpose()
    }

    fn secs(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self.parse::<u64>(key)?.map(Duration::from_secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_storage::DatabaseLocation;
    use rstest::rstest;
    use std::collections::HashMap;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults_without_environment() {
        let config = ServiceConfig::from_lookup(|_| None).unwrap();
        assert_eq!(config.database.location, DatabaseLocation::File("rollcall.db".into()));
        assert_eq!(config.reconciler.overlap, Duration::from_secs(120));
        assert_eq!(config.enrollment.max_retries, 10);
        assert!(config.webhook.shared_key.is_none());
    }

    #[test]
    fn test_overrides_applied() {
        let config = ServiceConfig::from_lookup(lookup(&[
            ("ROLLCALL_DATABASE", "/var/lib/rollcall/events.db"),
            ("ROLLCALL_WEBHOOK_KEY", "s3cret"),
            ("ROLLCALL_ENROLL_MAX_RETRIES", "4"),
            ("ROLLCALL_ENROLL_BACKOFF_MS", "250"),
            ("ROLLCALL_EVENT_OFFSET", "-03:00"),
            ("ROLLCALL_RECONCILE_INTERVAL_SECS", "60"),
            ("ROLLCALL_INGEST_CONCURRENCY", "0"),
        ]))
        .unwrap();

        assert_eq!(config.database.location.to_string(), "/var/lib/rollcall/events.db");
        assert_eq!(config.webhook.shared_key.as_deref(), Some("s3cret"));
        assert_eq!(config.enrollment.max_retries, 4);
        assert_eq!(config.enrollment.capture_backoff, Duration::from_millis(250));
        assert_eq!(config.ingest.naive_offset.local_minus_utc(), -3 * 3600);
        assert_eq!(config.reconciler.interval, Duration::from_secs(60));
        assert_eq!(config.ingest.concurrency, 1);
    }

    #[test]
    fn test_blank_value_ignored() {
        let config = ServiceConfig::from_lookup(lookup(&[("ROLLCALL_WEBHOOK_KEY", "  ")])).unwrap();
        assert!(config.webhook.shared_key.is_none());
    }

    #[rstest]
    #[case("ROLLCALL_ENROLL_MAX_RETRIES", "many")]
    #[case("ROLLCALL_ACCEPT_INVALID_CERTS", "yes")]
    #[case("ROLLCALL_EVENT_OFFSET", "BRT")]
    #[case("ROLLCALL_RECONCILE_OVERLAP_SECS", "-5")]
    fn test_invalid_value_names_variable(#[case] key: &str, #[case] value: &str) {
        let err = ServiceConfig::from_lookup(lookup(&[(key, value)])).unwrap_err();
        assert!(matches!(&err, Error::Config(msg) if msg.contains(key)), "{err}");
    }
}
