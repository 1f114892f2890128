pub mod cursor;
pub mod device;
pub mod enrollment;
pub mod event;

pub use cursor::{EventCursorRepository, SqliteEventCursorRepository};
pub use device::{DeviceRepository, SqliteDeviceRepository};
pub use enrollment::{EnrollmentRepository, SqliteEnrollmentRepository};
pub use event::{AttendanceEventRepository, SqliteAttendanceEventRepository};
