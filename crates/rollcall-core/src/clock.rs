//! Time source abstraction.
//!
//! Retry scheduling, enrollment deadlines and capability TTLs all read time
//! through [`Clock`] so they can be driven deterministically in tests.
//!
//! - [`SystemClock`] uses wall-clock UTC and Tokio timers.
//! - [`ManualClock`] keeps virtual time; `sleep` advances it instantly.
//!
//! # Examples
//!
//! ```
//! use rollcall_core::clock::{Clock, ManualClock};
//! use std::time::Duration;
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let clock = ManualClock::default();
//! let start = clock.now();
//! clock.sleep(Duration::from_secs(2)).await;
//! assert_eq!((clock.now() - start).num_seconds(), 2);
//! assert_eq!(clock.sleep_count(), 1);
//! # }
//! ```

use chrono::{DateTime, TimeZone, Utc};
use std::future::Future;
use std::sync::Arc;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::time::Duration;

/// Source of the current time and of non-blocking delays.
pub trait Clock: Send + Sync + 'static {
    /// Current UTC time.
    fn now(&self) -> DateTime<Utc>;

    /// Wait for `duration` without blocking the executor.
    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send;
}

/// Wall-clock time with Tokio timers.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }
}

/// Virtual clock for tests and simulations.
///
/// Clones share the same virtual time. `sleep` advances the shared time by the
/// requested duration and yields once to the scheduler.
#[derive(Debug, Clone)]
pub struct ManualClock {
    inner: Arc<ManualClockInner>,
}

#[derive(Debug)]
struct ManualClockInner {
    now_ms: AtomicI64,
    sleeps: AtomicU64,
    slept_ms: AtomicU64,
}

impl ManualClock {
    /// Create a clock frozen at `start`.
    pub fn new(start: DateTime<Utc>) -> Self {
        Self {
            inner: Arc::new(ManualClockInner {
                now_ms: AtomicI64::new(start.timestamp_millis()),
                sleeps: AtomicU64::new(0),
                slept_ms: AtomicU64::new(0),
            }),
        }
    }

    /// Move virtual time forward without counting a sleep.
    pub fn advance(&self, duration: Duration) {
        self.inner
            .now_ms
            .fetch_add(duration_millis(duration), Ordering::SeqCst);
    }

    /// Number of `sleep` calls observed.
    pub fn sleep_count(&self) -> u64 {
        self.inner.sleeps.load(Ordering::SeqCst)
    }

    /// Total virtual time spent in `sleep`.
    pub fn total_slept(&self) -> Duration {
        Duration::from_millis(self.inner.slept_ms.load(Ordering::SeqCst))
    }
}

impl Default for ManualClock {
    /// A clock starting at 2025-01-01T00:00:00Z.
    fn default() -> Self {
        Self::new(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).single().unwrap_or_default())
    }
}

impl Clock for ManualClock {
    fn now(&self) -> DateTime<Utc> {
        let ms = self.inner.now_ms.load(Ordering::SeqCst);
        Utc.timestamp_millis_opt(ms).single().unwrap_or_default()
    }

    fn sleep(&self, duration: Duration) -> impl Future<Output = ()> + Send {
        self.inner.sleeps.fetch_add(1, Ordering::SeqCst);
        self.inner
            .slept_ms
            .fetch_add(duration.as_millis() as u64, Ordering::SeqCst);
        self.advance(duration);
        tokio::task::yield_now()
    }
}

fn duration_millis(duration: Duration) -> i64 {
    i64::try_from(duration.as_millis()).unwrap_or(i64::MAX)
}
