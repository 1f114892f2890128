//! Outgoing terminal requests.
//!
//! A [`DeviceRequest`] is transport-agnostic: method, path relative to the
//! terminal's base address, and an encoded [`Body`]. Requests are normally
//! built with [`DeviceRequest::for_endpoint`], which rejects a body whose
//! encoding differs from the one the endpoint declares.
//!
//! # Examples
//!
//! ```
//! use rollcall_protocol::endpoint::{Encoding, Endpoint};
//! use rollcall_protocol::request::{Body, DeviceRequest};
//! use serde_json::json;
//!
//! let request = DeviceRequest::for_endpoint(
//!     Endpoint::CreateUser,
//!     Body::Json(json!({"UserInfo": {"employeeNo": "S1"}})),
//! )
//! .unwrap();
//! assert_eq!(request.encoding(), Encoding::Json);
//!
//! // Wrong encoding for the endpoint is rejected
//! assert!(DeviceRequest::for_endpoint(Endpoint::CreateUser, Body::Xml("<a/>".into())).is_err());
//! ```

use crate::endpoint::{Encoding, Endpoint, Feature, Method};
use bytes::Bytes;
use rollcall_core::{Error, Result};

/// One part of a multipart form body.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Part {
    pub name: String,
    pub filename: Option<String>,
    pub content_type: String,
    pub data: Bytes,
}

impl Part {
    /// Text part with the given content type.
    pub fn text(name: impl Into<String>, content_type: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            filename: None,
            content_type: content_type.into(),
            data: Bytes::from(text.into()),
        }
    }

    /// Binary file part.
    pub fn file(
        name: impl Into<String>,
        filename: impl Into<String>,
        content_type: impl Into<String>,
        data: Bytes,
    ) -> Self {
        Self {
            name: name.into(),
            filename: Some(filename.into()),
            content_type: content_type.into(),
            data,
        }
    }
}

/// Encoded request body.
#[derive(Debug, Clone, PartialEq)]
pub enum Body {
    Empty,
    Json(serde_json::Value),
    Xml(String),
    Multipart(Vec<Part>),
}

impl Body {
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        match self {
            Body::Empty => Encoding::None,
            Body::Json(_) => Encoding::Json,
            Body::Xml(_) => Encoding::Xml,
            Body::Multipart(_) => Encoding::Multipart,
        }
    }
}

/// Request ready to be sent to a terminal.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceRequest {
    pub method: Method,
    /// Path and query relative to the terminal base address
    pub path: String,
    pub body: Body,
    /// Capability required before this request may be issued
    pub gate: Option<Feature>,
}

impl DeviceRequest {
    /// Build a request for a known endpoint.
    ///
    /// # Errors
    /// Returns `Error::Validation` if `body` is not encoded the way the
    /// endpoint declares.
    pub fn for_endpoint(endpoint: Endpoint, body: Body) -> Result<Self> {
        if body.encoding() != endpoint.encoding() {
            return Err(Error::validation(format!(
                "{endpoint} expects {:?} body, got {:?}",
                endpoint.encoding(),
                body.encoding()
            )));
        }
        Ok(Self {
            method: endpoint.method(),
            path: endpoint.path().to_string(),
            body,
            gate: endpoint.feature(),
        })
    }

    /// Request for an endpoint that takes no body.
    ///
    /// # Errors
    /// Returns `Error::Validation` if the endpoint requires a body.
    pub fn bodyless(endpoint: Endpoint) -> Result<Self> {
        Self::for_endpoint(endpoint, Body::Empty)
    }

    /// Encoding of the body, derived from the body variant.
    #[must_use]
    pub fn encoding(&self) -> Encoding {
        self.body.encoding()
    }

    /// Path without the query string, used in log fields.
    #[must_use]
    pub fn path_only(&self) -> &str {
        self.path.split('?').next().unwrap_or(&self.path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_for_endpoint_carries_gate() {
        let request = DeviceRequest::for_endpoint(
            Endpoint::SearchEvents,
            Body::Json(json!({"AcsEventCond": {}})),
        )
        .unwrap();
        assert_eq!(request.method, Method::Post);
        assert_eq!(request.gate, Some(Feature::EventSearch));
        assert_eq!(request.path_only(), "/ISAPI/AccessControl/AcsEvent");
    }

    #[test]
    fn test_bodyless_rejects_body_endpoints() {
        assert!(DeviceRequest::bodyless(Endpoint::Capabilities).is_ok());
        assert!(DeviceRequest::bodyless(Endpoint::CaptureFace).is_err());
    }

    #[test]
    fn test_multipart_encoding() {
        let body = Body::Multipart(vec![Part::file(
            "img",
            "face.jpg",
            "image/jpeg",
            Bytes::from_static(&[0xFF, 0xD8]),
        )]);
        let request = DeviceRequest::for_endpoint(Endpoint::UploadFace, body).unwrap();
        assert_eq!(request.encoding(), Encoding::Multipart);
        assert_eq!(request.encoding().content_type(), None);
    }
}
