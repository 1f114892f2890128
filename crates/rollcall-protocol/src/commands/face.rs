//! Face library records.
//!
//! Two ways to attach a photo to a subject in the terminal's face library:
//!
//! - [`FaceBinding`]: `POST /ISAPI/Intelligent/FDLib/FaceDataRecord?format=json`
//!   with a `faceURL` locator, used after an on-device capture.
//! - [`FaceImageUpload`]: `PUT /ISAPI/Intelligent/FDLib/FDSetUp?format=json`
//!   as multipart, carrying the JPEG itself.
//!
//! `FPID` (face person id) is the subject's employee number, which is what
//! links the face record to the user record.

use crate::request::{Body, Part};
use bytes::Bytes;
use rollcall_core::SubjectId;
use serde_json::{Value, json};

/// Face library type for the normal (allow) list.
const FACE_LIB_TYPE: &str = "blackFD";

/// Bind a captured photo locator to a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceBinding {
    pub library_id: String,
    pub subject: SubjectId,
    pub face_url: String,
}

impl FaceBinding {
    pub fn new(library_id: impl Into<String>, subject: SubjectId, face_url: impl Into<String>) -> Self {
        Self {
            library_id: library_id.into(),
            subject,
            face_url: face_url.into(),
        }
    }

    #[must_use]
    pub fn to_body(&self) -> Body {
        Body::Json(json!({
            "faceURL": self.face_url,
            "faceLibType": FACE_LIB_TYPE,
            "FDID": self.library_id,
            "FPID": self.subject.as_str(),
        }))
    }
}

/// Upload a face photo for a subject.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FaceImageUpload {
    pub library_id: String,
    pub subject: SubjectId,
    pub jpeg: Bytes,
}

impl FaceImageUpload {
    pub fn new(library_id: impl Into<String>, subject: SubjectId, jpeg: Bytes) -> Self {
        Self {
            library_id: library_id.into(),
            subject,
            jpeg,
        }
    }

    fn record(&self) -> Value {
        json!({
            "faceLibType": FACE_LIB_TYPE,
            "FDID": self.library_id,
            "FPID": self.subject.as_str(),
        })
    }

    #[must_use]
    pub fn to_body(&self) -> Body {
        Body::Multipart(vec![
            Part::text("FaceDataRecord", "application/json", self.record().to_string()),
            Part::file(
                "img",
                format!("{}.jpg", self.subject),
                "image/jpeg",
                self.jpeg.clone(),
            ),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_binding_body() {
        let binding = FaceBinding::new("1", SubjectId::new("S1").unwrap(), "http://10.0.0.5/pic/1.jpg");
        let Body::Json(value) = binding.to_body() else {
            panic!("binding body must be JSON");
        };
        assert_eq!(value["FPID"], "S1");
        assert_eq!(value["FDID"], "1");
        assert_eq!(value["faceURL"], "http://10.0.0.5/pic/1.jpg");
    }

    #[test]
    fn test_upload_parts() {
        let upload = FaceImageUpload::new("1", SubjectId::new("S1").unwrap(), Bytes::from_static(&[0xFF, 0xD8]));
        let Body::Multipart(parts) = upload.to_body() else {
            panic!("upload body must be multipart");
        };
        assert_eq!(parts.len(), 2);
        assert_eq!(parts[0].name, "FaceDataRecord");
        assert!(String::from_utf8_lossy(&parts[0].data).contains("\"FPID\":\"S1\""));
        assert_eq!(parts[1].filename.as_deref(), Some("S1.jpg"));
        assert_eq!(parts[1].data.len(), 2);
    }
}
