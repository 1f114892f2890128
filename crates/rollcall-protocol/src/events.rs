//! Access events as reported by terminals.
//!
//! Terminals report access events in two ways, with the same core fields:
//!
//! - **push**: an `EventNotificationAlert` posted to the webhook, as JSON, as
//!   XML, or as a multipart form whose first part holds one of the two.
//! - **pull**: entries of `AcsEvent.InfoList` in event search responses
//!   (see [`crate::commands::event_search`]).
//!
//! [`RawAccessEvent`] keeps those fields as reported. Turning them into typed
//! identifiers and UTC instants is the ingestion pipeline's job.
//!
//! ```text
//! {
//!   "ipAddress": "10.0.4.21",
//!   "dateTime": "2025-03-04T09:00:00-03:00",
//!   "eventType": "AccessControllerEvent",
//!   "AccessControllerEvent": {
//!     "majorEventType": 5,
//!     "subEventType": 75,
//!     "employeeNoString": "S1",
//!     "serialNo": 1234
//!   }
//! }
//! ```

use crate::response::Payload;
use crate::xml::XmlDocument;
use rollcall_core::{Error, Result};
use serde_json::{Map, Value};

/// Notification type carrying access events.
const ACCESS_EVENT_TYPE: &str = "AccessControllerEvent";

/// One access event as reported by a terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawAccessEvent {
    /// Employee number; absent for door, alarm and tamper events
    pub subject: Option<String>,
    /// Event time as reported, usually RFC 3339 with the terminal's offset
    pub time: Option<String>,
    /// Terminal-assigned event serial number
    pub serial_no: Option<String>,
    pub major: Option<i64>,
    pub minor: Option<i64>,
    /// Serialized source record, kept for audit
    pub raw: String,
}

impl RawAccessEvent {
    /// Build from one JSON event object (search entry or notification body).
    ///
    /// `fallback_time` is used when the object has no `time` of its own.
    pub fn from_json(object: &Map<String, Value>, fallback_time: Option<&str>) -> Self {
        let subject = text_field(object, "employeeNoString").or_else(|| text_field(object, "employeeNo"));
        let time = text_field(object, "time")
            .or_else(|| text_field(object, "dateTime"))
            .or_else(|| fallback_time.map(str::to_string));
        Self {
            subject,
            time,
            serial_no: text_field(object, "serialNo"),
            major: int_field(object, "majorEventType").or_else(|| int_field(object, "major")),
            minor: int_field(object, "subEventType").or_else(|| int_field(object, "minor")),
            raw: Value::Object(object.clone()).to_string(),
        }
    }

    fn from_xml(section: &XmlDocument, fallback_time: Option<String>, raw: &XmlDocument) -> Self {
        Self {
            subject: section
                .value("employeeNoString")
                .or_else(|| section.value("employeeNo")),
            time: section.value("time").or(fallback_time),
            serial_no: section.value("serialNo"),
            major: section.value("majorEventType").and_then(|v| v.parse().ok()),
            minor: section.value("subEventType").and_then(|v| v.parse().ok()),
            raw: raw.as_str().to_string(),
        }
    }
}

/// Decode a pushed notification into its access events.
///
/// Heartbeats and non-access notifications decode to an empty list.
///
/// # Errors
/// Returns `Error::Validation` for payloads that are neither a JSON object
/// nor an `EventNotificationAlert` document.
pub fn decode_notification(payload: &Payload) -> Result<Vec<RawAccessEvent>> {
    match payload {
        Payload::Json(Value::Object(object)) => {
            let event_type = object.get("eventType").and_then(Value::as_str);
            if event_type.is_some_and(|t| t != ACCESS_EVENT_TYPE) {
                return Ok(Vec::new());
            }
            let fallback = object.get("dateTime").and_then(Value::as_str);
            match object.get(ACCESS_EVENT_TYPE) {
                Some(Value::Object(event)) => Ok(vec![RawAccessEvent::from_json(event, fallback)]),
                Some(_) => Err(Error::validation("AccessControllerEvent is not an object")),
                None => Err(Error::validation("notification without AccessControllerEvent")),
            }
        }
        Payload::Json(_) => Err(Error::validation("notification is not a JSON object")),
        Payload::Xml(doc) => {
            if doc.root_name().as_deref() != Some("EventNotificationAlert") {
                return Err(Error::validation("XML notification is not an EventNotificationAlert"));
            }
            if doc.value("eventType").is_some_and(|t| t != ACCESS_EVENT_TYPE) {
                return Ok(Vec::new());
            }
            let section = doc
                .section(ACCESS_EVENT_TYPE)
                .ok_or_else(|| Error::validation("notification without AccessControllerEvent"))?;
            Ok(vec![RawAccessEvent::from_xml(&section, doc.value("dateTime"), doc)])
        }
        Payload::Empty | Payload::Binary { .. } => Err(Error::validation("notification has no event document")),
    }
}

fn text_field(object: &Map<String, Value>, key: &str) -> Option<String> {
    match object.get(key)? {
        Value::String(s) => Some(s.trim().to_string()).filter(|s| !s.is_empty()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

fn int_field(object: &Map<String, Value>, key: &str) -> Option<i64> {
    match object.get(key)? {
        Value::Number(n) => n.as_i64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_json_notification() {
        let payload = Payload::Json(json!({
            "ipAddress": "10.0.4.21",
            "dateTime": "2025-03-04T09:00:00-03:00",
            "eventType": "AccessControllerEvent",
            "AccessControllerEvent": {
                "majorEventType": 5,
                "subEventType": 75,
                "employeeNoString": "S1",
                "serialNo": 1234
            }
        }));
        let events = decode_notification(&payload).unwrap();
        assert_eq!(events.len(), 1);
        let event = &events[0];
        assert_eq!(event.subject.as_deref(), Some("S1"));
        assert_eq!(event.serial_no.as_deref(), Some("1234"));
        assert_eq!(event.time.as_deref(), Some("2025-03-04T09:00:00-03:00"));
        assert_eq!((event.major, event.minor), (Some(5), Some(75)));
    }

    #[test]
    fn test_xml_notification() {
        let payload = Payload::Xml(XmlDocument::new(
            "<EventNotificationAlert version=\"2.0\"><dateTime>2025-03-04T12:00:00+00:00</dateTime>\
             <eventType>AccessControllerEvent</eventType><AccessControllerEvent>\
             <majorEventType>5</majorEventType><subEventType>75</subEventType>\
             <employeeNoString>S1</employeeNoString><serialNo>77</serialNo>\
             </AccessControllerEvent></EventNotificationAlert>",
        ));
        let events = decode_notification(&payload).unwrap();
        assert_eq!(events[0].subject.as_deref(), Some("S1"));
        assert_eq!(events[0].serial_no.as_deref(), Some("77"));
        assert_eq!(events[0].time.as_deref(), Some("2025-03-04T12:00:00+00:00"));
    }

    #[test]
    fn test_heartbeat_has_no_events() {
        let payload = Payload::Json(json!({"eventType": "heartBeat", "dateTime": "2025-03-04T12:00:00Z"}));
        assert!(decode_notification(&payload).unwrap().is_empty());
    }

    #[test]
    fn test_door_event_without_subject() {
        let payload = Payload::Json(json!({
            "eventType": "AccessControllerEvent",
            "dateTime": "2025-03-04T12:00:00Z",
            "AccessControllerEvent": {"majorEventType": 3, "subEventType": 1024}
        }));
        let events = decode_notification(&payload).unwrap();
        assert_eq!(events[0].subject, None);
    }

    #[test]
    fn test_malformed_notifications() {
        assert!(decode_notification(&Payload::Json(json!([1, 2]))).is_err());
        assert!(decode_notification(&Payload::Json(json!({"eventType": "AccessControllerEvent"}))).is_err());
        assert!(decode_notification(&Payload::Xml(XmlDocument::new("<Other/>"))).is_err());
        assert!(decode_notification(&Payload::Empty).is_err());
    }
}
