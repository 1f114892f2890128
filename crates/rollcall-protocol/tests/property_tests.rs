//! Property-based tests for the terminal codec.
//!
//! Terminal payloads come from firmware we do not control, so the decoders
//! must never panic and the status mapping must be total.

use bytes::Bytes;
use proptest::prelude::*;
use rollcall_protocol::status::{StatusKind, status_kind};
use rollcall_protocol::{DigestChallenge, Payload, XmlDocument, XmlElement, classify};

/// Strategy for XML element names.
fn element_name() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z][A-Za-z0-9]{0,15}").expect("element name regex")
}

/// Strategy for text values, including characters that need escaping.
fn element_text() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z0-9 &<>\"'/:.?=-]{1,40}").expect("element text regex")
}

fn content_type() -> impl Strategy<Value = Option<String>> {
    prop_oneof![
        Just(None),
        Just(Some("application/json".to_string())),
        Just(Some("application/xml; charset=UTF-8".to_string())),
        Just(Some("text/xml".to_string())),
        Just(Some("image/jpeg".to_string())),
    ]
}

proptest! {
    /// Property: every vendor status code maps to some kind, and only code 1 is Ok.
    #[test]
    fn prop_status_mapping_total(code in any::<i64>(), sub in proptest::option::of("[A-Za-z]{0,24}")) {
        let kind = status_kind(code, sub.as_deref());
        prop_assert_eq!(kind == StatusKind::Ok, code == 1);
    }

    /// Property: AlreadyExists only ever comes from code 6.
    #[test]
    fn prop_already_exists_requires_code_6(code in any::<i64>(), sub in "[A-Za-z]{0,24}") {
        if status_kind(code, Some(&sub)) == StatusKind::AlreadyExists {
            prop_assert_eq!(code, 6);
        }
    }

    /// Property: a leaf written by XmlElement is read back unchanged.
    #[test]
    fn prop_xml_leaf_values_survive_escaping(
        root in element_name(),
        name in element_name(),
        text in element_text(),
    ) {
        prop_assume!(root != name);
        let xml = XmlElement::new(root).child(name.clone(), text.clone()).render();
        let doc = XmlDocument::new(xml);
        prop_assert_eq!(doc.value(&name), Some(text.trim().to_string()).filter(|t| !t.is_empty()));
    }

    /// Property: decoding arbitrary bytes never panics, whatever the declared type.
    #[test]
    fn prop_payload_decode_never_panics(
        content_type in content_type(),
        body in prop::collection::vec(any::<u8>(), 0..256),
    ) {
        if let Ok(payload) = Payload::decode(content_type.as_deref(), Bytes::from(body)) {
            let _ = classify(200, &payload, "prop");
        }
    }

    /// Property: arbitrary XML-ish text never panics the extractor.
    #[test]
    fn prop_xml_extraction_never_panics(text in "[<>/a-z: =\"]{0,80}") {
        let doc = XmlDocument::new(text);
        let _ = doc.value("a");
        let _ = doc.section("b");
        let _ = doc.root_name();
    }

    /// Property: challenge parsing never panics on arbitrary header values.
    #[test]
    fn prop_digest_parse_never_panics(header in "(Digest )?[a-z=\", ]{0,80}") {
        let _ = DigestChallenge::parse(&header);
    }
}
