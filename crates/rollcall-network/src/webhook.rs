//! Inbound event webhook.
//!
//! Terminals push access events to `POST /devices/{device_id}/events` as JSON,
//! XML or a multipart form whose first JSON/XML part carries the event. The
//! receiver decodes the body by content type, puts a [`PushedPayload`] on a
//! bounded queue and acknowledges immediately; ingestion happens elsewhere.
//!
//! | Condition | Status |
//! |---|---|
//! | Payload queued | 200 |
//! | Body not JSON/XML/multipart, or undecodable | 400 |
//! | `X-Webhook-Key` missing or wrong (when a key is configured) | 401 |
//! | Device unknown (when a device check is configured) | 404 |
//! | Queue full or closed | 503 |
//!
//! `GET /healthz` answers 200 with the remaining queue capacity.

use axum::extract::{FromRequest, Multipart, Path, Request, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use bytes::Bytes;
use chrono::{DateTime, Utc};
use rollcall_core::DeviceId;
use rollcall_core::constants::{
    DEFAULT_WEBHOOK_BIND, MAX_WEBHOOK_BODY_BYTES, WEBHOOK_KEY_HEADER,
};
use rollcall_protocol::Payload;
use serde_json::json;
use std::future::Future;
use std::sync::Arc;
use subtle::ConstantTimeEq;
use thiserror::Error;
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Raw payload received from a terminal, waiting for ingestion.
#[derive(Debug, Clone, PartialEq)]
pub struct PushedPayload {
    pub device_id: DeviceId,
    pub payload: Payload,
    pub received_at: DateTime<Utc>,
}

/// Lookup used to reject pushes from unregistered devices.
pub trait KnownDevices: Send + Sync + 'static {
    fn is_known(&self, device_id: &DeviceId) -> bool;
}

/// Webhook listener settings.
#[derive(Debug, Clone)]
pub struct WebhookConfig {
    pub bind_addr: String,
    /// Pre-shared key expected in `X-Webhook-Key`; `None` disables the check
    pub shared_key: Option<String>,
    pub body_limit: usize,
}

impl Default for WebhookConfig {
    fn default() -> Self {
        Self {
            bind_addr: DEFAULT_WEBHOOK_BIND.to_string(),
            shared_key: None,
            body_limit: MAX_WEBHOOK_BODY_BYTES,
        }
    }
}

impl WebhookConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn bind_addr(mut self, addr: impl Into<String>) -> Self {
        self.bind_addr = addr.into();
        self
    }

    pub fn shared_key(mut self, key: impl Into<String>) -> Self {
        self.shared_key = Some(key.into());
        self
    }

    pub fn body_limit(mut self, limit: usize) -> Self {
        self.body_limit = limit;
        self
    }
}

/// Rejections returned to the pushing terminal.
#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("missing or invalid webhook key")]
    Unauthorized,

    #[error("unknown device: {0}")]
    UnknownDevice(String),

    #[error("unreadable payload: {0}")]
    BadPayload(String),

    #[error("ingest queue is full")]
    QueueFull,

    #[error("ingest queue is closed")]
    QueueClosed,

    #[error("failed to bind webhook listener on {addr}: {source}")]
    Bind {
        addr: String,
        #[source]
        source: std::io::Error,
    },

    #[error("webhook server failed: {0}")]
    Serve(#[from] std::io::Error),
}

impl IntoResponse for WebhookError {
    fn into_response(self) -> Response {
        let (status, code) = match &self {
            WebhookError::Unauthorized => (StatusCode::UNAUTHORIZED, "UNAUTHORIZED"),
            WebhookError::UnknownDevice(_) => (StatusCode::NOT_FOUND, "UNKNOWN_DEVICE"),
            WebhookError::BadPayload(_) => (StatusCode::BAD_REQUEST, "BAD_PAYLOAD"),
            WebhookError::QueueFull | WebhookError::QueueClosed => {
                (StatusCode::SERVICE_UNAVAILABLE, "QUEUE_UNAVAILABLE")
            }
            WebhookError::Bind { .. } | WebhookError::Serve(_) => {
                (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR")
            }
        };
        let body = Json(json!({
            "error": code,
            "message": self.to_string(),
        }));
        (status, body).into_response()
    }
}

#[derive(Clone)]
struct WebhookState {
    sender: mpsc::Sender<PushedPayload>,
    shared_key: Option<Arc<str>>,
    known: Option<Arc<dyn KnownDevices>>,
    body_limit: usize,
}

/// HTTP receiver feeding the ingest queue.
pub struct WebhookReceiver {
    config: WebhookConfig,
    state: WebhookState,
}

impl WebhookReceiver {
    pub fn new(config: WebhookConfig, sender: mpsc::Sender<PushedPayload>) -> Self {
        let state = WebhookState {
            sender,
            shared_key: config.shared_key.as_deref().map(Arc::from),
            known: None,
            body_limit: config.body_limit,
        };
        Self { config, state }
    }

    /// Reject pushes for devices `known` does not report.
    pub fn with_known_devices(mut self, known: Arc<dyn KnownDevices>) -> Self {
        self.state.known = Some(known);
        self
    }

    pub fn router(&self) -> Router {
        Router::new()
            .route("/healthz", get(health))
            .route("/devices/:device_id/events", post(receive))
            .layer(axum::extract::DefaultBodyLimit::max(self.config.body_limit))
            .with_state(self.state.clone())
    }

    /// Bind `config.bind_addr` and serve until `shutdown` resolves.
    ///
    /// # Errors
    /// Returns [`WebhookError::Bind`] if the address cannot be bound.
    pub async fn serve<F>(self, shutdown: F) -> Result<(), WebhookError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind(&self.config.bind_addr)
            .await
            .map_err(|source| WebhookError::Bind {
                addr: self.config.bind_addr.clone(),
                source,
            })?;
        self.serve_on(listener, shutdown).await
    }

    /// Serve on an already bound listener until `shutdown` resolves.
    pub async fn serve_on<F>(self, listener: TcpListener, shutdown: F) -> Result<(), WebhookError>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let addr = listener.local_addr()?;
        info!(%addr, "Webhook receiver listening");
        axum::serve(listener, self.router())
            .with_graceful_shutdown(shutdown)
            .await?;
        info!(%addr, "Webhook receiver stopped");
        Ok(())
    }
}

async fn health(State(state): State<WebhookState>) -> impl IntoResponse {
    Json(json!({
        "status": "ok",
        "queue_capacity": state.sender.capacity(),
    }))
}

async fn receive(
    State(state): State<WebhookState>,
    Path(device_id): Path<String>,
    request: Request,
) -> Result<StatusCode, WebhookError> {
    check_key(&state, request.headers())?;

    let device_id =
        DeviceId::new(device_id.as_str()).map_err(|_| WebhookError::UnknownDevice(device_id))?;
    if let Some(known) = &state.known {
        if !known.is_known(&device_id) {
            warn!(device_id = %device_id, "Push from unregistered device rejected");
            return Err(WebhookError::UnknownDevice(device_id.to_string()));
        }
    }

    let payload = read_payload(&state, request).await?;
    let pushed = PushedPayload {
        device_id: device_id.clone(),
        payload,
        received_at: Utc::now(),
    };

    match state.sender.try_send(pushed) {
        Ok(()) => {
            debug!(device_id = %device_id, "Pushed payload queued");
            Ok(StatusCode::OK)
        }
        Err(mpsc::error::TrySendError::Full(_)) => {
            warn!(device_id = %device_id, "Ingest queue full, push rejected");
            Err(WebhookError::QueueFull)
        }
        Err(mpsc::error::TrySendError::Closed(_)) => Err(WebhookError::QueueClosed),
    }
}

fn check_key(state: &WebhookState, headers: &HeaderMap) -> Result<(), WebhookError> {
    let Some(expected) = &state.shared_key else {
        return Ok(());
    };
    let provided = headers
        .get(WEBHOOK_KEY_HEADER)
        .map(|v| v.as_bytes())
        .unwrap_or_default();
    if bool::from(provided.ct_eq(expected.as_bytes())) {
        Ok(())
    } else {
        warn!("Webhook key mismatch");
        Err(WebhookError::Unauthorized)
    }
}

async fn read_payload(state: &WebhookState, request: Request) -> Result<Payload, WebhookError> {
    let content_type = request
        .headers()
        .get(header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string);

    if content_type
        .as_deref()
        .is_some_and(|ct| ct.trim_start().starts_with("multipart/"))
    {
        let multipart = Multipart::from_request(request, &())
            .await
            .map_err(|e| WebhookError::BadPayload(e.to_string()))?;
        return read_multipart(multipart).await;
    }

    let body = axum::body::to_bytes(request.into_body(), state.body_limit)
        .await
        .map_err(|e| WebhookError::BadPayload(e.to_string()))?;
    decode(content_type.as_deref(), body)
}

async fn read_multipart(mut multipart: Multipart) -> Result<Payload, WebhookError> {
    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| WebhookError::BadPayload(e.to_string()))?
    {
        let content_type = field.content_type().map(str::to_string);
        let textual = match content_type.as_deref() {
            Some(ct) => is_textual(ct),
            None => field.file_name().is_none(),
        };
        if !textual {
            // pictures attached to the event
            continue;
        }
        let data = field
            .bytes()
            .await
            .map_err(|e| WebhookError::BadPayload(e.to_string()))?;
        return decode(content_type.as_deref(), data);
    }
    Err(WebhookError::BadPayload("multipart body without an event part".to_string()))
}

fn decode(content_type: Option<&str>, body: Bytes) -> Result<Payload, WebhookError> {
    let content_type = match content_type {
        Some(ct) if !ct.starts_with("text/plain") => Some(ct),
        _ => sniff(&body),
    };
    match Payload::decode(content_type, body)? {
        Payload::Binary { content_type, .. } => Err(WebhookError::BadPayload(format!(
            "unsupported content type: {}",
            content_type.as_deref().unwrap_or("none")
        ))),
        Payload::Empty => Err(WebhookError::BadPayload("empty body".to_string())),
        payload => Ok(payload),
    }
}

fn is_textual(content_type: &str) -> bool {
    let media = content_type.split(';').next().unwrap_or("").trim();
    media.ends_with("json") || media.ends_with("xml") || media == "text/plain"
}

// Untyped form fields are plain text; treat them by their first byte.
fn sniff(data: &[u8]) -> Option<&'static str> {
    match data.iter().find(|b| !b.is_ascii_whitespace()) {
        Some(b'{') | Some(b'[') => Some("application/json"),
        Some(b'<') => Some("application/xml"),
        _ => None,
    }
}

impl From<rollcall_core::Error> for WebhookError {
    fn from(error: rollcall_core::Error) -> Self {
        WebhookError::BadPayload(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = WebhookConfig::default();
        assert_eq!(config.bind_addr, "0.0.0.0:8089");
        assert!(config.shared_key.is_none());
        assert_eq!(config.body_limit, MAX_WEBHOOK_BODY_BYTES);
    }

    #[test]
    fn test_sniff_form_fields() {
        assert_eq!(sniff(b"  {\"a\":1}"), Some("application/json"));
        assert_eq!(sniff(b"<EventNotificationAlert/>"), Some("application/xml"));
        assert_eq!(sniff(b"\xff\xd8"), None);
    }

    #[test]
    fn test_textual_parts() {
        assert!(is_textual("text/plain; charset=utf-8"));
        assert!(is_textual("application/json"));
        assert!(!is_textual("image/jpeg"));
    }

    #[test]
    fn test_error_status_codes() {
        let cases = [
            (WebhookError::Unauthorized, StatusCode::UNAUTHORIZED),
            (WebhookError::UnknownDevice("D9".into()), StatusCode::NOT_FOUND),
            (WebhookError::BadPayload("x".into()), StatusCode::BAD_REQUEST),
            (WebhookError::QueueFull, StatusCode::SERVICE_UNAVAILABLE),
        ];
        for (error, status) in cases {
            assert_eq!(error.into_response().status(), status);
        }
    }
}
