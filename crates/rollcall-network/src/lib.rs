//! Network layer for rollcall
//!
//! This crate moves terminal-dialect messages over HTTP in both directions.
//!
//! # Components
//!
//! - **Transport**: outbound requests to a terminal. [`HttpTransport`] uses
//!   `reqwest` with digest or basic authentication and bounded timeouts;
//!   [`MockTransport`] replays a script for tests.
//! - **WebhookReceiver**: inbound `axum` endpoint where terminals push access
//!   events. Payloads are queued on a bounded channel for ingestion.
//!
//! # Example
//!
//! ```no_run
//! use rollcall_network::{PushedPayload, WebhookConfig, WebhookReceiver};
//! use tokio::sync::mpsc;
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (tx, mut rx) = mpsc::channel::<PushedPayload>(1024);
//! let receiver = WebhookReceiver::new(WebhookConfig::new().shared_key("s3cret"), tx);
//! tokio::spawn(receiver.serve(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }));
//!
//! while let Some(pushed) = rx.recv().await {
//!     println!("event from {}", pushed.device_id);
//! }
//! # Ok(())
//! # }
//! ```

mod mock;
mod transport;
mod webhook;

pub use mock::{MockTransport, MockTransportFactory};
pub use transport::{HttpTransport, HttpTransportFactory, Transport, TransportConfig, TransportFactory};
pub use webhook::{KnownDevices, PushedPayload, WebhookConfig, WebhookError, WebhookReceiver};
