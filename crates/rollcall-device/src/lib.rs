//! Device session layer for the rollcall engine.
//!
//! Terminals are stateful and single-threaded: they expect one request at a
//! time, authenticate with a digest challenge that expires, and advertise
//! optional APIs through a capability document. This crate wraps each
//! registered terminal in a session that takes care of all three.
//!
//! # Components
//!
//! - [`SessionManager`]: registry of sessions keyed by device id
//! - [`DeviceSession`]: serialized calls, one auth refresh, capability gate
//! - [`CapabilityCache`]: feature flags with a time-to-live
//!
//! # Design Philosophy
//!
//! - **Serialized per device**: an async mutex in each session; different
//!   devices proceed in parallel.
//! - **Gate before send**: a request whose capability is absent is never
//!   sent.
//! - **Errors classified once**: sessions return `rollcall_core::Error`
//!   with its retry class already decided by the protocol layer.
//!
//! # Example
//!
//! ```no_run
//! use rollcall_core::{DeviceId, SystemClock};
//! use rollcall_device::{CapabilityConfig, SessionManager};
//! use rollcall_network::{HttpTransportFactory, TransportConfig};
//! use rollcall_protocol::Feature;
//! use std::time::Duration;
//!
//! # async fn example() -> rollcall_core::Result<()> {
//! let manager = SessionManager::new(
//!     HttpTransportFactory::new(TransportConfig::default()),
//!     SystemClock,
//!     CapabilityConfig::new().ttl(Duration::from_secs(300)),
//! );
//! if manager.supports(&DeviceId::new("D1")?, Feature::CaptureFace).await? {
//!     println!("terminal can capture faces");
//! }
//! # Ok(())
//! # }
//! ```

pub mod capability;
pub mod manager;
pub mod session;

pub use capability::{CapabilityCache, CapabilityConfig, CapabilitySnapshot};
pub use manager::{Registration, SessionManager, SessionOf};
pub use session::{DeviceReply, DeviceSession};
