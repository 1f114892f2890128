//! HTTP transport for terminal requests.
//!
//! [`Transport`] is the seam between the session layer and the wire. The
//! production implementation, [`HttpTransport`], speaks HTTP through
//! `reqwest` and handles digest authentication:
//!
//! 1. The first request goes out without credentials.
//! 2. The terminal answers 401 with a `WWW-Authenticate: Digest` challenge.
//! 3. The challenge is cached and the request is resent with an
//!    `Authorization` header. Later requests reuse the cached challenge with an
//!    incrementing nonce count.
//!
//! A 401 received while a cached challenge was in use is reported as
//! `Error::Auth`; the new challenge is kept, and the session layer decides
//! whether to retry. A `stale=true` challenge is adopted and retried here since
//! it only means the nonce expired.
//!
//! Every request carries the configured timeout. Timeouts and connection
//! failures map to the retryable `Error::Network`.
//!
//! # Examples
//!
//! ```no_run
//! use rollcall_core::{Credentials, DeviceId, DeviceProfile};
//! use rollcall_network::{HttpTransport, Transport, TransportConfig};
//! use rollcall_protocol::{DeviceRequest, Endpoint};
//!
//! # async fn example() -> rollcall_core::Result<()> {
//! let profile = DeviceProfile::new(
//!     DeviceId::new("D1")?,
//!     "http://10.0.4.21",
//!     Credentials::new("admin", "secret"),
//! );
//! let transport = HttpTransport::new(&profile, &TransportConfig::default())?;
//!
//! let response = transport
//!     .send(&DeviceRequest::bodyless(Endpoint::DeviceInfo)?)
//!     .await?;
//! println!("{}", response.http_status);
//! # Ok(())
//! # }
//! ```

use rollcall_core::constants::{DEFAULT_CONNECT_TIMEOUT_MS, DEFAULT_REQUEST_TIMEOUT_MS};
use rollcall_core::{AuthMode, Credentials, DeviceProfile, Error, Result};
use rollcall_protocol::digest::basic_authorization;
use rollcall_protocol::{Body, DeviceRequest, DeviceResponse, DigestChallenge, Method, Payload};
use std::future::Future;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;
use tracing::{debug, trace, warn};

/// Sends requests to one terminal.
///
/// Implementations hold the terminal address and authentication state.
/// `send` returns the raw response for any HTTP status except an
/// authentication failure; status classification is left to the caller.
pub trait Transport: Send + Sync + 'static {
    /// Send one request and wait for the response.
    fn send(&self, request: &DeviceRequest) -> impl Future<Output = Result<DeviceResponse>> + Send;

    /// Drop cached authentication state so the next request renegotiates.
    fn reset_auth(&self);
}

/// Creates a [`Transport`] for a device profile.
pub trait TransportFactory: Send + Sync + 'static {
    type Transport: Transport;

    /// # Errors
    /// Returns `Error::Config` if the profile cannot be turned into a transport.
    fn connect(&self, profile: &DeviceProfile) -> Result<Self::Transport>;
}

/// Transport timeouts and TLS options.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    /// Upper bound for one request, including reading the body
    pub request_timeout: Duration,
    pub connect_timeout: Duration,
    /// Accept self-signed terminal certificates
    pub accept_invalid_certs: bool,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            request_timeout: Duration::from_millis(DEFAULT_REQUEST_TIMEOUT_MS),
            connect_timeout: Duration::from_millis(DEFAULT_CONNECT_TIMEOUT_MS),
            accept_invalid_certs: false,
        }
    }
}

impl TransportConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn connect_timeout(mut self, timeout: Duration) -> Self {
        self.connect_timeout = timeout;
        self
    }

    pub fn accept_invalid_certs(mut self, accept: bool) -> Self {
        self.accept_invalid_certs = accept;
        self
    }
}

#[derive(Debug, Default)]
struct AuthState {
    challenge: Option<DigestChallenge>,
    nonce_count: u32,
}

/// `reqwest` based transport for one terminal.
#[derive(Debug)]
pub struct HttpTransport {
    client: reqwest::Client,
    base_url: String,
    credentials: Credentials,
    auth_mode: AuthMode,
    auth: Mutex<AuthState>,
    request_timeout: Duration,
}

impl HttpTransport {
    /// Build a transport for `profile`.
    ///
    /// # Errors
    /// Returns `Error::Config` if the HTTP client cannot be built or the
    /// address is not an `http`/`https` URL.
    pub fn new(profile: &DeviceProfile, config: &TransportConfig) -> Result<Self> {
        let base_url = profile.address.trim_end_matches('/').to_string();
        if !(base_url.starts_with("http://") || base_url.starts_with("https://")) {
            return Err(Error::Config(format!(
                "device {} address must be an http(s) URL: {}",
                profile.id, profile.address
            )));
        }

        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .connect_timeout(config.connect_timeout)
            .danger_accept_invalid_certs(config.accept_invalid_certs)
            .build()
            .map_err(|e| Error::Config(format!("failed to build HTTP client: {e}")))?;

        Ok(Self {
            client,
            base_url,
            credentials: profile.credentials.clone(),
            auth_mode: profile.auth_mode,
            auth: Mutex::new(AuthState::default()),
            request_timeout: config.request_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn authorization(&self, request: &DeviceRequest) -> Option<String> {
        match self.auth_mode {
            AuthMode::Basic => Some(basic_authorization(&self.credentials)),
            AuthMode::Digest => {
                let mut state = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
                let challenge = state.challenge.clone()?;
                state.nonce_count = state.nonce_count.wrapping_add(1);
                let cnonce = uuid::Uuid::new_v4().simple().to_string();
                Some(challenge.authorization(
                    &self.credentials,
                    request.method.as_str(),
                    &request.path,
                    state.nonce_count,
                    &cnonce[..16],
                ))
            }
        }
    }

    fn adopt_challenge(&self, challenge: DigestChallenge) {
        let mut state = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
        state.challenge = Some(challenge);
        state.nonce_count = 0;
    }

    fn build(&self, request: &DeviceRequest, authorization: Option<String>) -> Result<reqwest::RequestBuilder> {
        let url = format!("{}{}", self.base_url, request.path);
        let mut builder = self.client.request(to_reqwest_method(request.method), url);

        if let Some(authorization) = authorization {
            builder = builder.header(reqwest::header::AUTHORIZATION, authorization);
        }
        if let Some(content_type) = request.encoding().content_type() {
            builder = builder.header(reqwest::header::CONTENT_TYPE, content_type);
        }

        builder = match &request.body {
            Body::Empty => builder,
            Body::Json(value) => builder.body(serde_json::to_vec(value).map_err(|e| {
                Error::validation(format!("failed to encode JSON body: {e}"))
            })?),
            Body::Xml(text) => builder.body(text.clone()),
            Body::Multipart(parts) => {
                let mut form = reqwest::multipart::Form::new();
                for part in parts {
                    let mut field = reqwest::multipart::Part::bytes(part.data.to_vec())
                        .mime_str(&part.content_type)
                        .map_err(|e| Error::validation(format!("bad part content type: {e}")))?;
                    if let Some(filename) = &part.filename {
                        field = field.file_name(filename.clone());
                    }
                    form = form.part(part.name.clone(), field);
                }
                builder.multipart(form)
            }
        };

        Ok(builder)
    }

    async fn execute(&self, request: &DeviceRequest) -> Result<reqwest::Response> {
        let authorization = self.authorization(request);
        self.build(request, authorization)?
            .send()
            .await
            .map_err(|e| self.map_send_error(request, e))
    }

    fn map_send_error(&self, request: &DeviceRequest, error: reqwest::Error) -> Error {
        let message = if error.is_timeout() {
            format!(
                "{} {} timed out after {}ms",
                request.method.as_str(),
                request.path_only(),
                self.request_timeout.as_millis()
            )
        } else if error.is_connect() {
            format!("failed to connect to {}: {error}", self.base_url)
        } else {
            format!("{} {} failed: {error}", request.method.as_str(), request.path_only())
        };
        warn!(url = %self.base_url, "{}", message);
        Error::network(message)
    }

    fn challenge_from(response: &reqwest::Response) -> Option<DigestChallenge> {
        response
            .headers()
            .get_all(reqwest::header::WWW_AUTHENTICATE)
            .iter()
            .filter_map(|value| value.to_str().ok())
            .find_map(|value| DigestChallenge::parse(value).ok())
    }

    async fn read(&self, request: &DeviceRequest, response: reqwest::Response) -> Result<DeviceResponse> {
        let status = response.status().as_u16();
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let body = response
            .bytes()
            .await
            .map_err(|e| self.map_send_error(request, e))?;

        trace!(
            path = request.path_only(),
            status,
            content_type = content_type.as_deref().unwrap_or(""),
            bytes = body.len(),
            "Received response"
        );

        let payload = Payload::decode(content_type.as_deref(), body)?;
        Ok(DeviceResponse::new(status, payload))
    }
}

impl Transport for HttpTransport {
    async fn send(&self, request: &DeviceRequest) -> Result<DeviceResponse> {
        debug!(
            url = %self.base_url,
            method = request.method.as_str(),
            path = request.path_only(),
            "Sending request"
        );

        let had_challenge = self.auth_mode == AuthMode::Digest
            && self
                .auth
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .challenge
                .is_some();

        let response = self.execute(request).await?;
        if response.status() != reqwest::StatusCode::UNAUTHORIZED {
            return self.read(request, response).await;
        }

        if self.auth_mode == AuthMode::Basic {
            return Err(Error::Auth {
                message: "terminal rejected basic credentials".to_string(),
                status: Some(rollcall_core::DeviceStatus::http(401)),
            });
        }

        let Some(challenge) = Self::challenge_from(&response) else {
            return Err(Error::Auth {
                message: "401 without a usable digest challenge".to_string(),
                status: Some(rollcall_core::DeviceStatus::http(401)),
            });
        };

        let stale = challenge.stale;
        self.adopt_challenge(challenge);
        if had_challenge && !stale {
            return Err(Error::Auth {
                message: "terminal rejected digest credentials".to_string(),
                status: Some(rollcall_core::DeviceStatus::http(401)),
            });
        }

        trace!(url = %self.base_url, stale, "Answering digest challenge");
        let response = self.execute(request).await?;
        if response.status() == reqwest::StatusCode::UNAUTHORIZED {
            if let Some(challenge) = Self::challenge_from(&response) {
                self.adopt_challenge(challenge);
            }
            return Err(Error::Auth {
                message: "terminal rejected digest credentials".to_string(),
                status: Some(rollcall_core::DeviceStatus::http(401)),
            });
        }
        self.read(request, response).await
    }

    fn reset_auth(&self) {
        let mut state = self.auth.lock().unwrap_or_else(PoisonError::into_inner);
        *state = AuthState::default();
    }
}

/// Builds an [`HttpTransport`] per device with a shared configuration.
#[derive(Debug, Clone, Default)]
pub struct HttpTransportFactory {
    config: TransportConfig,
}

impl HttpTransportFactory {
    pub fn new(config: TransportConfig) -> Self {
        Self { config }
    }
}

impl TransportFactory for HttpTransportFactory {
    type Transport = HttpTransport;

    fn connect(&self, profile: &DeviceProfile) -> Result<HttpTransport> {
        HttpTransport::new(profile, &self.config)
    }
}

fn to_reqwest_method(method: Method) -> reqwest::Method {
    match method {
        Method::Get => reqwest::Method::GET,
        Method::Post => reqwest::Method::POST,
        Method::Put => reqwest::Method::PUT,
        Method::Delete => reqwest::Method::DELETE,
    }
}
