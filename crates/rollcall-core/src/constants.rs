//! Engine-wide constants and defaults.
//!
//! These values are the defaults used when a component is built from its
//! `Default` configuration. Every timing value here can be overridden through
//! the component's config struct or the service environment.
//!
//! # Usage
//!
//! ```
//! use rollcall_core::constants::*;
//! use std::time::Duration;
//!
//! let backoff = Duration::from_millis(DEFAULT_CAPTURE_BACKOFF_MS);
//! assert_eq!(backoff, Duration::from_secs(2));
//! assert_eq!(CAPTURE_COMPLETE_PROGRESS, 100);
//! ```

// ============================================================================
// Identifiers
// ============================================================================

/// Maximum length of a device identifier.
pub const MAX_DEVICE_ID_LENGTH: usize = 64;

/// Maximum length of a subject (employee) number.
///
/// Terminals reject `employeeNo` values longer than 32 bytes.
pub const MAX_SUBJECT_ID_LENGTH: usize = 32;

// ============================================================================
// Transport
// ============================================================================

/// Default timeout for a single device HTTP call in milliseconds.
pub const DEFAULT_REQUEST_TIMEOUT_MS: u64 = 30_000;

/// Default connect timeout in milliseconds.
///
/// Shorter than the request timeout so unreachable terminals fail fast.
pub const DEFAULT_CONNECT_TIMEOUT_MS: u64 = 5_000;

// ============================================================================
// Capability cache
// ============================================================================

/// Default capability snapshot lifetime in seconds (10 minutes).
pub const DEFAULT_CAPABILITY_TTL_SECS: u64 = 600;

// ============================================================================
// Enrollment
// ============================================================================

/// Capture progress value reported once the photo is ready.
pub const CAPTURE_COMPLETE_PROGRESS: u8 = 100;

/// Default delay between capture polls in milliseconds.
pub const DEFAULT_CAPTURE_BACKOFF_MS: u64 = 2_000;

/// Default retry budget for one enrollment session.
pub const DEFAULT_MAX_RETRIES: u32 = 10;

/// Default wall-clock deadline for one enrollment session in seconds.
pub const DEFAULT_ENROLLMENT_DEADLINE_SECS: u64 = 90;

/// Default face library identifier on the terminal.
pub const DEFAULT_FACE_LIBRARY_ID: &str = "1";

/// Maximum number of stage transitions kept per enrollment session.
pub const MAX_STAGE_HISTORY: usize = 32;

// ============================================================================
// Ingestion
// ============================================================================

/// Default interval between reconciliation runs in seconds.
pub const DEFAULT_RECONCILE_INTERVAL_SECS: u64 = 300;

/// Default overlap subtracted from the cursor before fetching, in seconds.
///
/// Terminals occasionally commit events a few seconds late; the overlap lets
/// the pull path pick them up. Dedup absorbs the re-fetched rows.
pub const DEFAULT_RECONCILE_OVERLAP_SECS: u64 = 120;

/// Default maximum span of one reconciliation window in seconds (24 hours).
pub const DEFAULT_RECONCILE_MAX_WINDOW_SECS: u64 = 86_400;

/// Default page size for event search requests.
///
/// Terminals cap `maxResults` at 30.
pub const DEFAULT_EVENT_PAGE_SIZE: u32 = 30;

/// Default capacity of the push ingestion queue.
pub const DEFAULT_INGEST_QUEUE_CAPACITY: usize = 1_024;

/// Default number of events processed concurrently by the ingest worker.
pub const DEFAULT_INGEST_CONCURRENCY: usize = 8;

// ============================================================================
// Webhook
// ============================================================================

/// Header carrying the optional pre-shared webhook key.
pub const WEBHOOK_KEY_HEADER: &str = "x-webhook-key";

/// Default webhook bind address.
pub const DEFAULT_WEBHOOK_BIND: &str = "0.0.0.0:8089";

/// Maximum accepted webhook body size in bytes (event pictures included).
pub const MAX_WEBHOOK_BODY_BYTES: usize = 4 * 1024 * 1024;
