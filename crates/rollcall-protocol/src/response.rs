//! Terminal responses.
//!
//! Response bodies are decoded into a tagged [`Payload`] chosen strictly by
//! the declared `Content-Type`. A body whose type is not JSON or XML is kept as
//! binary; the decoder never sniffs content.

use crate::status::{self, ResponseStatus, StatusKind};
use crate::xml::XmlDocument;
use bytes::Bytes;
use rollcall_core::{Error, Result};

/// Decoded response body.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Empty,
    Json(serde_json::Value),
    Xml(XmlDocument),
    Binary { content_type: Option<String>, data: Bytes },
}

impl Payload {
    /// Decode a body according to its declared content type.
    ///
    /// # Errors
    /// Returns `Error::Validation` when a body declared as JSON does not parse
    /// or an XML/JSON body is not valid UTF-8.
    pub fn decode(content_type: Option<&str>, body: Bytes) -> Result<Self> {
        if body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Payload::Empty);
        }
        let media = content_type.map(media_type).unwrap_or_default();

        if is_json(&media) {
            let value = serde_json::from_slice(&body)
                .map_err(|e| Error::validation(format!("invalid JSON body: {e}")))?;
            return Ok(Payload::Json(value));
        }
        if is_xml(&media) {
            let text = String::from_utf8(body.to_vec())
                .map_err(|e| Error::validation(format!("XML body is not UTF-8: {e}")))?;
            return Ok(Payload::Xml(XmlDocument::new(text)));
        }
        Ok(Payload::Binary {
            content_type: content_type.map(str::to_string),
            data: body,
        })
    }

    #[must_use]
    pub fn as_json(&self) -> Option<&serde_json::Value> {
        match self {
            Payload::Json(value) => Some(value),
            _ => None,
        }
    }

    #[must_use]
    pub fn as_xml(&self) -> Option<&XmlDocument> {
        match self {
            Payload::Xml(doc) => Some(doc),
            _ => None,
        }
    }

    /// Text form for logs and raw event storage.
    #[must_use]
    pub fn to_text(&self) -> String {
        match self {
            Payload::Empty => String::new(),
            Payload::Json(value) => value.to_string(),
            Payload::Xml(doc) => doc.as_str().to_string(),
            Payload::Binary { data, .. } => format!("<{} bytes>", data.len()),
        }
    }
}

/// Lower-cased media type without parameters.
fn media_type(content_type: &str) -> String {
    content_type
        .split(';')
        .next()
        .unwrap_or_default()
        .trim()
        .to_ascii_lowercase()
}

fn is_json(media: &str) -> bool {
    media == "application/json" || media == "text/json" || media.ends_with("+json")
}

fn is_xml(media: &str) -> bool {
    media == "application/xml" || media == "text/xml" || media.ends_with("+xml")
}

/// Response as returned by a transport.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceResponse {
    pub http_status: u16,
    pub payload: Payload,
}

impl DeviceResponse {
    pub fn new(http_status: u16, payload: Payload) -> Self {
        Self {
            http_status,
            payload,
        }
    }

    /// 200 response with a JSON body.
    pub fn json(value: serde_json::Value) -> Self {
        Self::new(200, Payload::Json(value))
    }

    /// 200 response with an XML body.
    pub fn xml(text: impl Into<String>) -> Self {
        Self::new(200, Payload::Xml(XmlDocument::new(text)))
    }

    /// Vendor `ResponseStatus` carried in the body, if any.
    #[must_use]
    pub fn response_status(&self) -> Option<ResponseStatus> {
        ResponseStatus::from_payload(&self.payload)
    }

    /// Classify this response against the local status taxonomy.
    ///
    /// # Errors
    /// See [`status::classify`].
    pub fn classify(&self, context: &str) -> Result<StatusKind> {
        status::classify(self.http_status, &self.payload, context)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Some("application/json; charset=UTF-8"), r#"{"a":1}"#, "json")]
    #[case(Some("text/xml"), "<a>1</a>", "xml")]
    #[case(Some("application/xml"), "<a>1</a>", "xml")]
    #[case(Some("image/jpeg"), "\u{1}\u{2}", "binary")]
    #[case(None, "{\"a\":1}", "binary")]
    #[case(Some("application/json"), "  ", "empty")]
    fn test_decode_by_content_type(
        #[case] content_type: Option<&str>,
        #[case] body: &str,
        #[case] expected: &str,
    ) {
        let payload = Payload::decode(content_type, Bytes::from(body.to_string())).unwrap();
        let kind = match payload {
            Payload::Empty => "empty",
            Payload::Json(_) => "json",
            Payload::Xml(_) => "xml",
            Payload::Binary { .. } => "binary",
        };
        assert_eq!(kind, expected);
    }

    #[test]
    fn test_invalid_json_rejected() {
        let err = Payload::decode(Some("application/json"), Bytes::from_static(b"<a/>")).unwrap_err();
        assert!(matches!(err, Error::Validation(_)));
    }

    #[test]
    fn test_xml_declared_as_json_is_not_probed() {
        // A terminal mislabelling XML as JSON is a protocol error, not XML
        assert!(Payload::decode(Some("application/json"), Bytes::from_static(b"<ok/>")).is_err());
    }
}
