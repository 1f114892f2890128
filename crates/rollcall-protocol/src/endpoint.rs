//! Terminal API endpoints.
//!
//! Every operation the engine performs against a terminal is an [`Endpoint`].
//! An endpoint fixes the HTTP method, the path, the body [`Encoding`] and the
//! optional capability [`Feature`] that must be present before the call may be
//! issued. Callers name the endpoint; they never choose the encoding.
//!
//! # Endpoint Table
//!
//! | Endpoint | Method | Path | Body | Gate |
//! |---|---|---|---|---|
//! | `Capabilities` | GET | `/ISAPI/AccessControl/capabilities` | none | - |
//! | `DeviceInfo` | GET | `/ISAPI/System/deviceInfo` | none | - |
//! | `CaptureFace` | POST | `/ISAPI/AccessControl/CaptureFaceData` | XML | `CaptureFace` |
//! | `CreateUser` | POST | `/ISAPI/AccessControl/UserInfo/Record?format=json` | JSON | `UserInfo` |
//! | `BindFace` | POST | `/ISAPI/Intelligent/FDLib/FaceDataRecord?format=json` | JSON | `FaceLibrary` |
//! | `UploadFace` | PUT | `/ISAPI/Intelligent/FDLib/FDSetUp?format=json` | multipart | `FaceLibrary` |
//! | `SearchEvents` | POST | `/ISAPI/AccessControl/AcsEvent?format=json` | JSON | `EventSearch` |

use serde::{Deserialize, Serialize};
use std::fmt;

/// HTTP method used by an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    Get,
    Post,
    Put,
    Delete,
}

impl Method {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Put => "PUT",
            Method::Delete => "DELETE",
        }
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Body encoding of a request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Encoding {
    None,
    Json,
    Xml,
    Multipart,
}

impl Encoding {
    /// `Content-Type` header value for this encoding.
    ///
    /// Multipart returns `None` because the boundary is chosen by the HTTP
    /// client when the form is serialized.
    #[must_use]
    pub fn content_type(self) -> Option<&'static str> {
        match self {
            Encoding::Json => Some("application/json"),
            Encoding::Xml => Some("application/xml"),
            Encoding::None | Encoding::Multipart => None,
        }
    }
}

/// Optional firmware API advertised in the capability document.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    /// Person records (`UserInfo`)
    UserInfo,
    /// Face library records and uploads (`FDLib`)
    FaceLibrary,
    /// On-device face capture (`CaptureFaceData`)
    CaptureFace,
    /// Historical access event search (`AcsEvent`)
    EventSearch,
}

impl Feature {
    pub const ALL: [Feature; 4] = [
        Feature::UserInfo,
        Feature::FaceLibrary,
        Feature::CaptureFace,
        Feature::EventSearch,
    ];

    /// Capability document element that advertises this feature.
    #[must_use]
    pub fn capability_tag(self) -> &'static str {
        match self {
            Feature::UserInfo => "isSupportUserInfo",
            Feature::FaceLibrary => "isSupportFDLib",
            Feature::CaptureFace => "isSupportCaptureFace",
            Feature::EventSearch => "isSupportAcsEvent",
        }
    }

    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::UserInfo => "user_info",
            Feature::FaceLibrary => "face_library",
            Feature::CaptureFace => "capture_face",
            Feature::EventSearch => "event_search",
        }
    }
}

impl fmt::Display for Feature {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Terminal API operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Endpoint {
    Capabilities,
    DeviceInfo,
    CaptureFace,
    CreateUser,
    BindFace,
    UploadFace,
    SearchEvents,
}

impl Endpoint {
    #[must_use]
    pub fn method(self) -> Method {
        match self {
            Endpoint::Capabilities | Endpoint::DeviceInfo => Method::Get,
            Endpoint::UploadFace => Method::Put,
            Endpoint::CaptureFace
            | Endpoint::CreateUser
            | Endpoint::BindFace
            | Endpoint::SearchEvents => Method::Post,
        }
    }

    #[must_use]
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Capabilities => "/ISAPI/AccessControl/capabilities",
            Endpoint::DeviceInfo => "/ISAPI/System/deviceInfo",
            Endpoint::CaptureFace => "/ISAPI/AccessControl/CaptureFaceData",
            Endpoint::CreateUser => "/ISAPI/AccessControl/UserInfo/Record?format=json",
            Endpoint::BindFace => "/ISAPI/Intelligent/FDLib/FaceDataRecord?format=json",
            Endpoint::UploadFace => "/ISAPI/Intelligent/FDLib/FDSetUp?format=json",
            Endpoint::SearchEvents => "/ISAPI/AccessControl/AcsEvent?format=json",
        }
    }

    #[must_use]
    pub fn encoding(self) -> Encoding {
        match self {
            Endpoint::Capabilities | Endpoint::DeviceInfo => Encoding::None,
            Endpoint::CaptureFace => Encoding::Xml,
            Endpoint::CreateUser | Endpoint::BindFace | Endpoint::SearchEvents => Encoding::Json,
            Endpoint::UploadFace => Encoding::Multipart,
        }
    }

    /// Capability that must be advertised before this endpoint is called.
    #[must_use]
    pub fn feature(self) -> Option<Feature> {
        match self {
            Endpoint::Capabilities | Endpoint::DeviceInfo => None,
            Endpoint::CaptureFace => Some(Feature::CaptureFace),
            Endpoint::CreateUser => Some(Feature::UserInfo),
            Endpoint::BindFace | Endpoint::UploadFace => Some(Feature::FaceLibrary),
            Endpoint::SearchEvents => Some(Feature::EventSearch),
        }
    }

    /// Short name for logs.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Endpoint::Capabilities => "capabilities",
            Endpoint::DeviceInfo => "device_info",
            Endpoint::CaptureFace => "capture_face",
            Endpoint::CreateUser => "create_user",
            Endpoint::BindFace => "bind_face",
            Endpoint::UploadFace => "upload_face",
            Endpoint::SearchEvents => "search_events",
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        f.write_str(self.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(Endpoint::Capabilities, Method::Get, Encoding::None, None)]
    #[case(Endpoint::CaptureFace, Method::Post, Encoding::Xml, Some(Feature::CaptureFace))]
    #[case(Endpoint::CreateUser, Method::Post, Encoding::Json, Some(Feature::UserInfo))]
    #[case(Endpoint::BindFace, Method::Post, Encoding::Json, Some(Feature::FaceLibrary))]
    #[case(Endpoint::UploadFace, Method::Put, Encoding::Multipart, Some(Feature::FaceLibrary))]
    #[case(Endpoint::SearchEvents, Method::Post, Encoding::Json, Some(Feature::EventSearch))]
    fn test_endpoint_table(
        #[case] endpoint: Endpoint,
        #[case] method: Method,
        #[case] encoding: Encoding,
        #[case] feature: Option<Feature>,
    ) {
        assert_eq!(endpoint.method(), method);
        assert_eq!(endpoint.encoding(), encoding);
        assert_eq!(endpoint.feature(), feature);
        assert!(endpoint.path().starts_with("/ISAPI/"));
    }

    #[test]
    fn test_json_endpoints_request_json_format() {
        for endpoint in [Endpoint::CreateUser, Endpoint::BindFace, Endpoint::SearchEvents] {
            assert!(endpoint.path().ends_with("?format=json"), "{endpoint}");
        }
    }

    #[test]
    fn test_feature_tags_unique() {
        let mut tags: Vec<_> = Feature::ALL.iter().map(|f| f.capability_tag()).collect();
        tags.sort_unstable();
        tags.dedup();
        assert_eq!(tags.len(), Feature::ALL.len());
    }
}
