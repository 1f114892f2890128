//! Person record creation.
//!
//! `POST /ISAPI/AccessControl/UserInfo/Record?format=json` creates the subject
//! on the terminal. A subject that already exists is answered with
//! `statusCode` 6 / `employeeNoAlreadyExist`, which callers treat as success.

use crate::request::Body;
use chrono::{DateTime, TimeZone, Utc};
use rollcall_core::SubjectId;
use serde_json::json;

/// Format of `Valid.beginTime` / `Valid.endTime` (terminal local time, no offset).
const VALIDITY_FORMAT: &str = "%Y-%m-%dT%H:%M:%S";

/// Subject record sent to the terminal.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserRecord {
    pub subject: SubjectId,
    /// Display name shown on the terminal; defaults to the subject number
    pub name: Option<String>,
    pub valid_from: DateTime<Utc>,
    pub valid_until: DateTime<Utc>,
}

impl UserRecord {
    /// Record valid from 2000-01-01 to 2037-12-31, the widest range
    /// terminals accept.
    pub fn new(subject: SubjectId) -> Self {
        Self {
            subject,
            name: None,
            valid_from: Utc.with_ymd_and_hms(2000, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            valid_until: Utc
                .with_ymd_and_hms(2037, 12, 31, 23, 59, 59)
                .single()
                .unwrap_or_default(),
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_validity(mut self, from: DateTime<Utc>, until: DateTime<Utc>) -> Self {
        self.valid_from = from;
        self.valid_until = until;
        self
    }

    #[must_use]
    pub fn to_body(&self) -> Body {
        Body::Json(json!({
            "UserInfo": {
                "employeeNo": self.subject.as_str(),
                "name": self.name.as_deref().unwrap_or(self.subject.as_str()),
                "userType": "normal",
                "Valid": {
                    "enable": true,
                    "beginTime": self.valid_from.format(VALIDITY_FORMAT).to_string(),
                    "endTime": self.valid_until.format(VALIDITY_FORMAT).to_string(),
                    "timeType": "local"
                },
                "doorRight": "1",
                "RightPlan": [{"doorNo": 1, "planTemplateNo": "1"}]
            }
        }))
    }
}
