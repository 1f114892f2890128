//! Vendor status translation.
//!
//! Terminals report the outcome of a call in a `ResponseStatus` body (XML) or
//! an object with the same fields (JSON): a numeric `statusCode`, a textual
//! `statusString` and a refining `subStatusCode`. This module maps them to
//! [`StatusKind`] and then to the engine's error taxonomy. It is the only
//! place responses are classified.
//!
//! # Status Table
//!
//! | statusCode | subStatusCode | StatusKind |
//! |---|---|---|
//! | 1 | - | `Ok` |
//! | 2, 3, 7 | - | `Busy` |
//! | 4 | `unAuthorized`, `noPermission`, `badAuthorization` | `AuthFailed` |
//! | 4 | other | `Unsupported` |
//! | 5 | - | `InvalidFormat` |
//! | 6 | contains `AlreadyExist` | `AlreadyExists` |
//! | 6 | other | `InvalidFormat` |
//! | other | - | `InvalidFormat` |
//!
//! HTTP 401 is `AuthFailed` regardless of the body.

use crate::response::Payload;
use rollcall_core::{DeviceStatus, Error, Result};
use serde_json::Value;

/// Local outcome taxonomy for a terminal response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StatusKind {
    Ok,
    AlreadyExists,
    Unsupported,
    InvalidFormat,
    AuthFailed,
    Busy,
}

/// Map a vendor status code and optional sub-status to a [`StatusKind`].
#[must_use]
pub fn status_kind(code: i64, sub_status: Option<&str>) -> StatusKind {
    let sub = sub_status.unwrap_or_default();
    match code {
        1 => StatusKind::Ok,
        2 | 3 | 7 => StatusKind::Busy,
        4 if matches!(sub, "unAuthorized" | "noPermission" | "badAuthorization") => {
            StatusKind::AuthFailed
        }
        4 => StatusKind::Unsupported,
        6 if sub.contains("AlreadyExist") => StatusKind::AlreadyExists,
        _ => StatusKind::InvalidFormat,
    }
}

/// Parsed vendor `ResponseStatus`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResponseStatus {
    pub code: i64,
    pub status_string: Option<String>,
    pub sub_status: Option<String>,
    pub error_msg: Option<String>,
}

impl ResponseStatus {
    /// Extract the status from a JSON or XML payload.
    ///
    /// Returns `None` for payloads without a `statusCode` field, which is the
    /// normal shape of data-returning responses.
    #[must_use]
    pub fn from_payload(payload: &Payload) -> Option<Self> {
        match payload {
            Payload::Json(value) => Self::from_json(value),
            Payload::Xml(doc) => {
                let code = doc.value("statusCode")?.parse().ok()?;
                Some(Self {
                    code,
                    status_string: doc.value("statusString"),
                    sub_status: doc.value("subStatusCode"),
                    error_msg: doc.value("errorMsg"),
                })
            }
            Payload::Empty | Payload::Binary { .. } => None,
        }
    }

    fn from_json(value: &Value) -> Option<Self> {
        let object = value.as_object()?;
        let code = match object.get("statusCode")? {
            Value::Number(n) => n.as_i64()?,
            Value::String(s) => s.trim().parse().ok()?,
            _ => return None,
        };
        let text = |key: &str| {
            object
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .filter(|s| !s.is_empty())
        };
        Some(Self {
            code,
            status_string: text("statusString"),
            sub_status: text("subStatusCode"),
            error_msg: text("errorMsg"),
        })
    }

    #[must_use]
    pub fn kind(&self) -> StatusKind {
        status_kind(self.code, self.sub_status.as_deref())
    }

    /// Diagnostic form attached to errors.
    #[must_use]
    pub fn to_device_status(&self, http_status: u16) -> DeviceStatus {
        DeviceStatus {
            http_status,
            code: Some(self.code),
            sub_status: self.sub_status.clone(),
            message: self.error_msg.clone().or_else(|| self.status_string.clone()),
        }
    }
}

/// Classify a response.
///
/// Returns `Ok(StatusKind::Ok)` or `Ok(StatusKind::AlreadyExists)` for
/// successful outcomes and maps every other outcome to an error whose
/// [`Error::class`] tells the caller whether to retry. `context` names the
/// call (usually the request path) in unsupported-feature errors.
///
/// | Outcome | Error |
/// |---|---|
/// | HTTP 401, `AuthFailed` | `Auth` |
/// | `Busy`, HTTP 429 | `DeviceBusy` (retryable) |
/// | HTTP 500/502/503/504 without vendor status | `Network` (retryable) |
/// | `Unsupported`, HTTP 501 | `UnsupportedFeature` |
/// | `InvalidFormat`, other non-2xx | `Device` |
///
/// # Errors
/// As listed in the table above.
pub fn classify(http_status: u16, payload: &Payload, context: &str) -> Result<StatusKind> {
    let vendor = ResponseStatus::from_payload(payload);
    let status = vendor
        .as_ref()
        .map(|s| s.to_device_status(http_status))
        .unwrap_or_else(|| DeviceStatus::http(http_status));

    if http_status == 401 {
        return Err(Error::Auth {
            message: format!("{context}: challenge rejected"),
            status: Some(status),
        });
    }

    let Some(vendor) = vendor else {
        return classify_http(http_status, status, context);
    };

    match vendor.kind() {
        StatusKind::Ok => Ok(StatusKind::Ok),
        StatusKind::AlreadyExists => Ok(StatusKind::AlreadyExists),
        StatusKind::Busy => Err(Error::DeviceBusy { status }),
        StatusKind::AuthFailed => Err(Error::Auth {
            message: format!("{context}: {}", vendor.sub_status.as_deref().unwrap_or("unauthorized")),
            status: Some(status),
        }),
        StatusKind::Unsupported => Err(Error::UnsupportedFeature {
            feature: context.to_string(),
            status: Some(status),
        }),
        StatusKind::InvalidFormat => Err(Error::Device { status }),
    }
}

fn classify_http(http_status: u16, status: DeviceStatus, context: &str) -> Result<StatusKind> {
    match http_status {
        200..=299 => Ok(StatusKind::Ok),
        429 => Err(Error::DeviceBusy { status }),
        500 | 502 | 503 | 504 => Err(Error::Network {
            message: format!("{context}: transient HTTP {http_status}"),
            status: Some(status),
        }),
        501 => Err(Error::UnsupportedFeature {
            feature: context.to_string(),
            status: Some(status),
        }),
        _ => Err(Error::Device { status }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::xml::XmlDocument;
    use rollcall_core::ErrorClass;
    use rstest::rstest;
    use serde_json::json;

    #[rstest]
    #[case(1, None, StatusKind::Ok)]
    #[case(2, None, StatusKind::Busy)]
    #[case(3, Some("deviceError"), StatusKind::Busy)]
    #[case(4, Some("notSupport"), StatusKind::Unsupported)]
    #[case(4, Some("methodNotAllowed"), StatusKind::Unsupported)]
    #[case(4, Some("unAuthorized"), StatusKind::AuthFailed)]
    #[case(4, Some("noPermission"), StatusKind::AuthFailed)]
    #[case(5, Some("badXmlFormat"), StatusKind::InvalidFormat)]
    #[case(6, Some("employeeNoAlreadyExist"), StatusKind::AlreadyExists)]
    #[case(6, Some("badParameters"), StatusKind::InvalidFormat)]
    #[case(7, Some("rebootRequired"), StatusKind::Busy)]
    #[case(42, None, StatusKind::InvalidFormat)]
    fn test_status_table(#[case] code: i64, #[case] sub: Option<&str>, #[case] expected: StatusKind) {
        assert_eq!(status_kind(code, sub), expected);
    }

    #[test]
    fn test_json_status_parsed() {
        let payload = Payload::Json(json!({
            "statusCode": 6,
            "statusString": "Invalid Content",
            "subStatusCode": "employeeNoAlreadyExist",
            "errorCode": 1610637344,
            "errorMsg": "checkEmployeeNo"
        }));
        let status = ResponseStatus::from_payload(&payload).unwrap();
        assert_eq!(status.code, 6);
        assert_eq!(status.kind(), StatusKind::AlreadyExists);
        assert_eq!(status.to_device_status(400).message.as_deref(), Some("checkEmployeeNo"));
    }

    #[test]
    fn test_xml_status_parsed() {
        let payload = Payload::Xml(XmlDocument::new(
            "<ResponseStatus><requestURL>/ISAPI/x</requestURL><statusCode>4</statusCode>\
             <statusString>Invalid Operation</statusString><subStatusCode>notSupport</subStatusCode>\
             </ResponseStatus>",
        ));
        let status = ResponseStatus::from_payload(&payload).unwrap();
        assert_eq!(status.kind(), StatusKind::Unsupported);
    }

    #[test]
    fn test_data_payload_has_no_status() {
        let payload = Payload::Json(json!({"UserInfoSearch": {"numOfMatches": 0}}));
        assert!(ResponseStatus::from_payload(&payload).is_none());
        assert_eq!(classify(200, &payload, "search").unwrap(), StatusKind::Ok);
    }

    #[test]
    fn test_already_exists_is_not_an_error() {
        let payload = Payload::Json(json!({"statusCode": 6, "subStatusCode": "employeeNoAlreadyExist"}));
        assert_eq!(classify(400, &payload, "create").unwrap(), StatusKind::AlreadyExists);
    }

    #[test]
    fn test_401_is_auth_regardless_of_body() {
        let payload = Payload::Json(json!({"statusCode": 1}));
        let err = classify(401, &payload, "caps").unwrap_err();
        assert!(err.is_auth());
        assert_eq!(err.class(), ErrorClass::Fatal);
    }

    #[rstest]
    #[case(500, ErrorClass::Retryable)]
    #[case(502, ErrorClass::Retryable)]
    #[case(503, ErrorClass::Retryable)]
    #[case(504, ErrorClass::Retryable)]
    #[case(429, ErrorClass::Retryable)]
    #[case(400, ErrorClass::Fatal)]
    #[case(404, ErrorClass::Fatal)]
    #[case(501, ErrorClass::Fatal)]
    fn test_http_only_classification(#[case] http: u16, #[case] class: ErrorClass) {
        let err = classify(http, &Payload::Empty, "call").unwrap_err();
        assert_eq!(err.class(), class);
        assert_eq!(err.device_status().map(|s| s.http_status), Some(http));
    }

    #[test]
    fn test_busy_status_is_retryable() {
        let payload = Payload::Json(json!({"statusCode": 2, "subStatusCode": "deviceBusy"}));
        let err = classify(200, &payload, "capture").unwrap_err();
        assert!(matches!(err, Error::DeviceBusy { .. }));
        assert!(err.is_retryable());
    }

    #[test]
    fn test_vendor_status_wins_over_http_5xx() {
        let payload = Payload::Json(json!({"statusCode": 5, "subStatusCode": "badJsonFormat"}));
        let err = classify(500, &payload, "bind").unwrap_err();
        assert!(matches!(err, Error::Device { .. }));
        assert!(!err.is_retryable());
    }
}
