//! Capability document parsing.
//!
//! `GET /ISAPI/AccessControl/capabilities` returns an `AccessControl` document
//! whose `isSupport*` elements advertise optional APIs. Most firmware answers
//! in XML; some newer builds answer in JSON with the same field names.
//!
//! ```text
//! <AccessControl version="2.0" xmlns="http://www.isapi.org/ver20/XMLSchema">
//!   <isSupportUserInfo>true</isSupportUserInfo>
//!   <isSupportFDLib>true</isSupportFDLib>
//!   <isSupportCaptureFace>false</isSupportCaptureFace>
//!   <isSupportAcsEvent>true</isSupportAcsEvent>
//! </AccessControl>
//! ```
//!
//! A flag that is absent is treated as unsupported.

use crate::endpoint::Feature;
use crate::response::Payload;
use rollcall_core::{Error, Result};
use serde_json::Value;
use std::collections::BTreeSet;

/// Feature flags advertised by one terminal.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CapabilitySet {
    supported: BTreeSet<Feature>,
}

impl CapabilitySet {
    /// Set advertising exactly `features`.
    pub fn from_features(features: impl IntoIterator<Item = Feature>) -> Self {
        Self {
            supported: features.into_iter().collect(),
        }
    }

    /// Set advertising every known feature.
    #[must_use]
    pub fn all() -> Self {
        Self::from_features(Feature::ALL)
    }

    /// Parse a capability response payload.
    ///
    /// # Errors
    /// Returns `Error::Validation` for binary or empty payloads and for JSON
    /// that is not an object.
    pub fn from_payload(payload: &Payload) -> Result<Self> {
        let mut supported = BTreeSet::new();
        match payload {
            Payload::Xml(doc) => {
                for feature in Feature::ALL {
                    if doc
                        .value(feature.capability_tag())
                        .is_some_and(|v| v.eq_ignore_ascii_case("true"))
                    {
                        supported.insert(feature);
                    }
                }
            }
            Payload::Json(value) => {
                let root = value.get("AccessControl").unwrap_or(value);
                let object = root
                    .as_object()
                    .ok_or_else(|| Error::validation("capability document is not an object"))?;
                for feature in Feature::ALL {
                    let flag = match object.get(feature.capability_tag()) {
                        Some(Value::Bool(b)) => *b,
                        Some(Value::String(s)) => s.eq_ignore_ascii_case("true"),
                        _ => false,
                    };
                    if flag {
                        supported.insert(feature);
                    }
                }
            }
            Payload::Empty | Payload::Binary { .. } => {
                return Err(Error::validation("capability response has no document"));
            }
        }
        Ok(Self { supported })
    }

    #[must_use]
    pub fn supports(&self, feature: Feature) -> bool {
        self.supported.contains(&feature)
    }

    pub fn features(&self) -> impl Iterator<Item = Feature> + '_ {
        self.supported.iter().copied()
    }
}
