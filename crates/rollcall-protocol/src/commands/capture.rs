//! Face capture command.
//!
//! `POST /ISAPI/AccessControl/CaptureFaceData` asks the terminal to take a
//! face photo with its own camera. The first call starts the capture; later
//! calls poll it. The response reports `captureProgress` (0-100) and, once the
//! photo is ready, a `faceDataUrl` locator on the terminal.
//!
//! ```text
//! <CaptureFaceDataCond version="2.0" xmlns="http://www.isapi.org/ver20/XMLSchema">
//!   <captureInfrared>false</captureInfrared>
//!   <dataType>url</dataType>
//! </CaptureFaceDataCond>
//! ```

use crate::request::Body;
use crate::response::Payload;
use crate::xml::XmlElement;
use rollcall_core::constants::CAPTURE_COMPLETE_PROGRESS;
use rollcall_core::{Error, Result};
use serde_json::Value;

/// Request namespace used by terminal XML bodies.
pub const ISAPI_NAMESPACE: &str = "http://www.isapi.org/ver20/XMLSchema";

/// Capture command body.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CaptureRequest {
    /// Also capture an infrared frame (dual-sensor terminals only)
    pub infrared: bool,
}

impl CaptureRequest {
    #[must_use]
    pub fn to_body(&self) -> Body {
        Body::Xml(
            XmlElement::new("CaptureFaceDataCond")
                .namespace(ISAPI_NAMESPACE)
                .child("captureInfrared", self.infrared)
                .child("dataType", "url")
                .render(),
        )
    }
}

/// Progress of an on-device capture.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CaptureProgress {
    /// Percentage in 0..=100
    pub progress: u8,
    /// Locator of the captured photo, present once complete
    pub face_data_url: Option<String>,
}

impl CaptureProgress {
    /// Capture finished and the photo locator is known.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.progress >= CAPTURE_COMPLETE_PROGRESS && self.face_data_url.is_some()
    }

    /// Parse a capture response.
    ///
    /// A response carrying a locator but no progress counts as complete.
    ///
    /// # Errors
    /// Returns `Error::Validation` when neither field is present or the
    /// progress value is not a number.
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let (progress, url) = match payload {
            Payload::Xml(doc) => (doc.value("captureProgress"), doc.value("faceDataUrl")),
            Payload::Json(value) => {
                let root = value.get("CaptureFaceData").unwrap_or(value);
                let progress = match root.get("captureProgress") {
                    Some(Value::Number(n)) => Some(n.to_string()),
                    Some(Value::String(s)) => Some(s.clone()),
                    _ => None,
                };
                let url = root
                    .get("faceDataUrl")
                    .and_then(Value::as_str)
                    .filter(|s| !s.is_empty())
                    .map(str::to_string);
                (progress, url)
            }
            Payload::Empty | Payload::Binary { .. } => (None, None),
        };

        let progress = match (progress, &url) {
            (Some(p), _) => p
                .trim()
                .parse::<u8>()
                .map_err(|_| Error::validation(format!("invalid captureProgress: {p}")))?
                .min(CAPTURE_COMPLETE_PROGRESS),
            (None, Some(_)) => CAPTURE_COMPLETE_PROGRESS,
            (None, None) => {
                return Err(Error::validation("capture response without progress or locator"));
            }
        };

        Ok(Self {
            progress,
            face_data_url: url,
        })
    }
}
