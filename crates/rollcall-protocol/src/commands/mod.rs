//! Request bodies and response parsers for each terminal operation.

pub mod capability;
pub mod capture;
pub mod device_info;
pub mod event_search;
pub mod face;
pub mod user;

pub use capability::CapabilitySet;
pub use capture::{CaptureProgress, CaptureRequest};
pub use device_info::DeviceInfo;
pub use event_search::{EventSearchPage, EventSearchQuery, SearchStatus};
pub use face::{FaceBinding, FaceImageUpload};
pub use user::UserRecord;
