//! End-to-end codec flows built from recorded terminal exchanges.
//!
//! Each test builds requests the way the engine does and feeds the bodies a
//! DS-K1T341 series terminal returned into the response side.

use bytes::Bytes;
use rollcall_core::{Error, SubjectId};
use rollcall_protocol::commands::{
    CapabilitySet, CaptureProgress, CaptureRequest, EventSearchPage, FaceBinding, UserRecord,
};
use rollcall_protocol::{
    DeviceRequest, DeviceResponse, Encoding, Endpoint, Feature, Payload, StatusKind,
    decode_notification,
};

const CAPABILITIES_XML: &str = r#"<?xml version="1.0" encoding="UTF-8"?>
<AccessControl version="2.0" xmlns="http://www.isapi.org/ver20/XMLSchema">
<isSupportUserInfo>true</isSupportUserInfo>
<isSupportFDLib>true</isSupportFDLib>
<isSupportCaptureFace>true</isSupportCaptureFace>
<isSupportAcsEvent>true</isSupportAcsEvent>
</AccessControl>"#;

fn decode(content_type: &str, body: &str) -> Payload {
    Payload::decode(Some(content_type), Bytes::from(body.to_string())).unwrap()
}

#[test]
fn test_enrollment_exchange() {
    let subject = SubjectId::new("S1").unwrap();

    let caps = CapabilitySet::from_payload(&decode("application/xml", CAPABILITIES_XML)).unwrap();
    assert!(Feature::ALL.iter().all(|f| caps.supports(*f)));

    // Capture: first poll still running, second returns the locator
    let request = DeviceRequest::for_endpoint(Endpoint::CaptureFace, CaptureRequest::default().to_body()).unwrap();
    assert_eq!(request.encoding(), Encoding::Xml);

    let first = DeviceResponse::new(
        200,
        decode("application/xml", "<CaptureFaceData><captureProgress>0</captureProgress></CaptureFaceData>"),
    );
    assert_eq!(first.classify(&request.path).unwrap(), StatusKind::Ok);
    assert!(!CaptureProgress::from_payload(&first.payload).unwrap().is_complete());

    let second = DeviceResponse::new(
        200,
        decode(
            "application/xml",
            "<CaptureFaceData><faceDataUrl>http://10.0.0.5/LOCALS/pic/L.jpg</faceDataUrl>\
             <captureProgress>100</captureProgress></CaptureFaceData>",
        ),
    );
    let done = CaptureProgress::from_payload(&second.payload).unwrap();
    let locator = done.face_data_url.clone().unwrap();
    assert!(done.is_complete());

    // Create user: the subject already exists on the terminal
    let request = DeviceRequest::for_endpoint(Endpoint::CreateUser, UserRecord::new(subject.clone()).to_body()).unwrap();
    let exists = DeviceResponse::new(
        400,
        decode(
            "application/json",
            r#"{"statusCode":6,"statusString":"Invalid Content","subStatusCode":"employeeNoAlreadyExist","errorCode":1610637344,"errorMsg":"checkEmployeeNo"}"#,
        ),
    );
    assert_eq!(exists.classify(&request.path).unwrap(), StatusKind::AlreadyExists);

    // Bind
    let request =
        DeviceRequest::for_endpoint(Endpoint::BindFace, FaceBinding::new("1", subject, locator).to_body()).unwrap();
    let bound = DeviceResponse::new(
        200,
        decode("application/json", r#"{"statusCode":1,"statusString":"OK","subStatusCode":"ok"}"#),
    );
    assert_eq!(bound.classify(&request.path).unwrap(), StatusKind::Ok);
}

#[test]
fn test_bind_with_bad_locator_is_fatal() {
    let response = DeviceResponse::new(
        400,
        decode(
            "application/json",
            r#"{"statusCode":6,"statusString":"Invalid Content","subStatusCode":"badURL"}"#,
        ),
    );
    let err = response.classify(Endpoint::BindFace.path()).unwrap_err();
    assert!(matches!(err, Error::Device { .. }));
    assert!(!err.is_retryable());
    assert_eq!(err.device_status().and_then(|s| s.sub_status.as_deref()), Some("badURL"));
}

#[test]
fn test_unsupported_endpoint_reported_by_terminal() {
    let response = DeviceResponse::new(
        403,
        decode(
            "application/xml",
            "<ResponseStatus><statusCode>4</statusCode><subStatusCode>notSupport</subStatusCode></ResponseStatus>",
        ),
    );
    let err = response.classify(Endpoint::CaptureFace.path()).unwrap_err();
    assert!(matches!(err, Error::UnsupportedFeature { .. }));
}

#[test]
fn test_push_and_pull_report_same_fields() {
    let pushed = decode_notification(&decode(
        "application/json",
        r#"{"dateTime":"2025-03-04T09:00:00+00:00","eventType":"AccessControllerEvent",
            "AccessControllerEvent":{"majorEventType":5,"subEventType":75,"employeeNoString":"S1","serialNo":10}}"#,
    ))
    .unwrap();

    let pulled = EventSearchPage::from_payload(&decode(
        "application/json",
        r#"{"AcsEvent":{"searchID":"q","responseStatusStrg":"OK","numOfMatches":1,"totalMatches":1,
            "InfoList":[{"major":5,"minor":75,"time":"2025-03-04T09:00:00+00:00","employeeNoString":"S1","serialNo":10}]}}"#,
    ))
    .unwrap();

    let (a, b) = (&pushed[0], &pulled.events[0]);
    assert_eq!(a.subject, b.subject);
    assert_eq!(a.time, b.time);
    assert_eq!(a.serial_no, b.serial_no);
    assert_eq!((a.major, a.minor), (b.major, b.minor));
}
