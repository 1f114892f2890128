//! Historical access event search.
//!
//! `POST /ISAPI/AccessControl/AcsEvent?format=json` returns one page of events
//! in a time window. Paging is by `searchResultPosition`; the response's
//! `responseStatusStrg` is `MORE` while further pages exist, `OK` on the last
//! page and `NO MATCH` when the window is empty.

use crate::events::RawAccessEvent;
use crate::request::Body;
use crate::response::Payload;
use chrono::{DateTime, Utc};
use rollcall_core::{Error, Result};
use serde_json::{Value, json};

/// Major event type for access control events.
const MAJOR_ACCESS_EVENT: i64 = 5;

const SEARCH_TIME_FORMAT: &str = "%Y-%m-%dT%H:%M:%S%:z";

/// One page request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSearchQuery {
    /// Client-chosen id, constant across pages of one search
    pub search_id: String,
    pub position: u32,
    pub max_results: u32,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl EventSearchQuery {
    pub fn new(search_id: impl Into<String>, start: DateTime<Utc>, end: DateTime<Utc>, max_results: u32) -> Self {
        Self {
            search_id: search_id.into(),
            position: 0,
            max_results,
            start,
            end,
        }
    }

    /// Query for the page following `page`.
    #[must_use]
    pub fn next_page(&self, page: &EventSearchPage) -> Self {
        Self {
            position: self.position + page.returned(),
            ..self.clone()
        }
    }

    #[must_use]
    pub fn to_body(&self) -> Body {
        Body::Json(json!({
            "AcsEventCond": {
                "searchID": self.search_id,
                "searchResultPosition": self.position,
                "maxResults": self.max_results,
                "major": MAJOR_ACCESS_EVENT,
                "minor": 0,
                "startTime": self.start.format(SEARCH_TIME_FORMAT).to_string(),
                "endTime": self.end.format(SEARCH_TIME_FORMAT).to_string(),
                "timeReverseOrder": false
            }
        }))
    }
}

/// Search progress reported by the terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SearchStatus {
    More,
    Done,
    NoMatch,
}

/// One page of results.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EventSearchPage {
    pub status: SearchStatus,
    pub total_matches: u32,
    pub events: Vec<RawAccessEvent>,
}

impl EventSearchPage {
    /// Number of entries in this page.
    #[must_use]
    pub fn returned(&self) -> u32 {
        u32::try_from(self.events.len()).unwrap_or(u32::MAX)
    }

    /// More pages are available.
    #[must_use]
    pub fn has_more(&self) -> bool {
        self.status == SearchStatus::More && !self.events.is_empty()
    }

    /// Parse a search response.
    ///
    /// # Errors
    /// Returns `Error::Validation` when the payload is not JSON, has no
    /// `AcsEvent` object, or reports an unknown status string.
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let value = payload
            .as_json()
            .ok_or_else(|| Error::validation("event search response is not JSON"))?;
        let root = value
            .get("AcsEvent")
            .ok_or_else(|| Error::validation("event search response without AcsEvent"))?;

        let status = match root.get("responseStatusStrg").and_then(Value::as_str) {
            Some("MORE") => SearchStatus::More,
            Some("OK") => SearchStatus::Done,
            Some("NO MATCH") => SearchStatus::NoMatch,
            other => {
                return Err(Error::validation(format!("unknown search status: {other:?}")));
            }
        };

        let events = match root.get("InfoList") {
            None | Some(Value::Null) => Vec::new(),
            Some(Value::Array(entries)) => entries
                .iter()
                .map(|entry| {
                    entry
                        .as_object()
                        .map(|object| RawAccessEvent::from_json(object, None))
                        .ok_or_else(|| Error::validation("InfoList entry is not an object"))
                })
                .collect::<Result<Vec<_>>>()?,
            Some(_) => return Err(Error::validation("InfoList is not an array")),
        };

        let total_matches = root
            .get("totalMatches")
            .and_then(Value::as_u64)
            .and_then(|n| u32::try_from(n).ok())
            .unwrap_or_default();

        Ok(Self {
            status,
            total_matches,
            events,
        })
    }
}
