//! Shared vocabulary of the rollcall engine.
//!
//! Identifiers, the attendance direction, the error taxonomy consumed by every
//! crate, engine-wide defaults and the injectable [`Clock`](clock::Clock).

pub mod clock;
pub mod constants;
pub mod error;
pub mod types;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::{DeviceStatus, Error, ErrorClass, Result};
pub use types::*;

/// Version info
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
