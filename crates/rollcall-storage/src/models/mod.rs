pub mod cursor;
pub mod device;
pub mod enrollment;
pub mod event;

pub use cursor::EventCursor;
pub use device::DeviceRecord;
pub use enrollment::EnrollmentRecord;
pub use event::{AttendanceEvent, NewAttendanceEvent};
