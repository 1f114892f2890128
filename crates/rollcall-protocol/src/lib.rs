//! Codec for the terminal HTTP dialect.
//!
//! This crate is transport-free: it knows how requests are shaped and how
//! responses are read, and leaves sending them to `rollcall-network`.
//!
//! - [`endpoint`]: method, path, body encoding and capability gate per operation
//! - [`request`] / [`response`]: encoded bodies and tagged payloads
//! - [`status`]: vendor status codes mapped to the engine's error taxonomy
//! - [`digest`]: digest and basic authentication headers
//! - [`commands`]: per-operation bodies and parsers
//! - [`events`]: pushed event notifications

pub mod commands;
pub mod digest;
pub mod endpoint;
pub mod events;
pub mod request;
pub mod response;
pub mod status;
pub mod xml;

pub use digest::DigestChallenge;
pub use endpoint::{Encoding, Endpoint, Feature, Method};
pub use events::{RawAccessEvent, decode_notification};
pub use request::{Body, DeviceRequest, Part};
pub use response::{DeviceResponse, Payload};
pub use status::{ResponseStatus, StatusKind, classify};
pub use xml::{XmlDocument, XmlElement};
