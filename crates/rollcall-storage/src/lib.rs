//! SQLite persistence for the rollcall engine.
//!
//! Four tables back the engine:
//!
//! - `devices`: the terminal registry (connection profile plus metadata)
//! - `enrollment_sessions`: one row per enrollment attempt, kept as history
//! - `attendance_events`: classified events, unique per `(device_id, dedup_key)`
//! - `event_cursors`: the reconciliation high-water mark per device
//!
//! # Architecture
//!
//! - [`Database`]: connection pool with embedded migrations
//! - [`repositories`]: one trait per table with a SQLite implementation
//! - [`transaction`]: transaction-scoped event writes used by ingestion
//!
//! # Examples
//!
//! ```no_run
//! use rollcall_core::{Credentials, DeviceId, DeviceProfile};
//! use rollcall_storage::{Database, DatabaseConfig};
//! use rollcall_storage::models::DeviceRecord;
//! use rollcall_storage::repositories::{DeviceRepository, SqliteDeviceRepository};
//! use chrono::Utc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let db = Database::open(DatabaseConfig::file("rollcall.db")).await?;
//! let devices = SqliteDeviceRepository::new(db.pool().clone());
//!
//! let profile = DeviceProfile::new(
//!     DeviceId::new("D1")?,
//!     "http://10.0.4.21",
//!     Credentials::new("admin", "secret"),
//! );
//! devices.upsert(&DeviceRecord::new(profile, "Lobby east", Utc::now())).await?;
//!
//! for device in devices.list_enabled().await? {
//!     println!("{} at {}", device.id, device.address);
//! }
//! # Ok(())
//! # }
//! ```

pub mod connection;
pub mod error;
pub mod models;
pub mod repositories;
pub mod transaction;

pub use connection::{Database, DatabaseConfig, DatabaseLocation};
pub use error::{StorageError, StorageResult};
pub use models::{AttendanceEvent, DeviceRecord, EnrollmentRecord, EventCursor, NewAttendanceEvent};
pub use repositories::{
    AttendanceEventRepository, DeviceRepository, EnrollmentRepository, EventCursorRepository,
    SqliteAttendanceEventRepository, SqliteDeviceRepository, SqliteEnrollmentRepository,
    SqliteEventCursorRepository,
};
