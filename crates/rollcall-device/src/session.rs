//! One terminal's session: serialized calls, auth refresh and capability gate.
//!
//! Every call to a terminal goes through [`DeviceSession::call`], which:
//!
//! 1. takes the terminal's call lock, so it handles one request at a time.
//!    The lock belongs to the terminal rather than the session: a session
//!    that replaces another one (new address or credentials) shares it;
//! 2. for gated requests, consults the capability cache (refreshing it when
//!    stale) and fails with `Error::UnsupportedFeature` without sending
//!    anything when the feature is absent;
//! 3. sends the request and classifies the response status;
//! 4. on an authentication failure, drops the cached challenge and retries
//!    once. A second authentication failure is returned as is.
//!
//! ```text
//! caller ──► lock ──► gate? ──► send ──► classify ──► DeviceReply
//!                        │                  │
//!                        │                  └─ Auth ─► reset_auth ─► send again (once)
//!                        └─ flag false ─► UnsupportedFeature
//! ```

use crate::capability::{CapabilityCache, CapabilityConfig, CapabilitySnapshot};
use rollcall_core::{Clock, DeviceId, DeviceProfile, Error, Result};
use rollcall_network::Transport;
use rollcall_protocol::commands::{CapabilitySet, DeviceInfo};
use rollcall_protocol::{DeviceRequest, DeviceResponse, Endpoint, Feature, StatusKind};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, warn};

/// Classified response of a successful call.
#[derive(Debug, Clone, PartialEq)]
pub struct DeviceReply {
    pub response: DeviceResponse,
    /// `Ok` or `AlreadyExists`; every other status is returned as an error
    pub status: StatusKind,
}

/// Session for one registered terminal.
#[derive(Debug)]
pub struct DeviceSession<T, C> {
    profile: DeviceProfile,
    transport: T,
    capabilities: CapabilityCache<C>,
    lock: Arc<Mutex<()>>,
}

impl<T: Transport, C: Clock> DeviceSession<T, C> {
    pub fn new(profile: DeviceProfile, transport: T, clock: C, config: &CapabilityConfig) -> Self {
        Self::with_call_lock(profile, transport, clock, config, Arc::default())
    }

    /// Session whose calls serialize on `lock`, shared with earlier sessions
    /// for the same terminal.
    pub fn with_call_lock(
        profile: DeviceProfile,
        transport: T,
        clock: C,
        config: &CapabilityConfig,
        lock: Arc<Mutex<()>>,
    ) -> Self {
        Self {
            profile,
            transport,
            capabilities: CapabilityCache::new(clock, config),
            lock,
        }
    }

    pub fn device_id(&self) -> &DeviceId {
        &self.profile.id
    }

    pub fn profile(&self) -> &DeviceProfile {
        &self.profile
    }

    /// Send one request, honoring its capability gate.
    ///
    /// # Errors
    /// - `UnsupportedFeature` if the request's gate is not advertised
    /// - `Auth` if authentication fails after one refresh
    /// - any error produced by the transport or by status classification
    pub async fn call(&self, request: &DeviceRequest) -> Result<DeviceReply> {
        let _guard = self.lock.lock().await;
        if let Some(feature) = request.gate {
            self.ensure_supported(feature).await?;
        }
        self.exchange(request).await
    }

    /// Send a request that requires `feature`, whatever its declared gate.
    ///
    /// # Errors
    /// As [`call`](Self::call).
    pub async fn call_gated(&self, feature: Feature, request: &DeviceRequest) -> Result<DeviceReply> {
        let _guard = self.lock.lock().await;
        self.ensure_supported(feature).await?;
        if let Some(gate) = request.gate.filter(|g| *g != feature) {
            self.ensure_supported(gate).await?;
        }
        self.exchange(request).await
    }

    /// Whether the terminal advertises `feature`, refreshing a stale snapshot.
    ///
    /// # Errors
    /// Returns the error of the capability request if a refresh fails.
    pub async fn supports(&self, feature: Feature) -> Result<bool> {
        let _guard = self.lock.lock().await;
        Ok(self.current_capabilities().await?.supports(feature))
    }

    /// Drop the capability snapshot; the next gated call refreshes it.
    pub fn invalidate_capabilities(&self) {
        self.capabilities.invalidate();
    }

    pub fn capability_snapshot(&self) -> Option<CapabilitySnapshot> {
        self.capabilities.snapshot()
    }

    /// Read model and firmware from the terminal.
    ///
    /// # Errors
    /// Returns transport errors or `Validation` for an unreadable document.
    pub async fn probe(&self) -> Result<DeviceInfo> {
        let reply = self.call(&DeviceRequest::bodyless(Endpoint::DeviceInfo)?).await?;
        DeviceInfo::from_payload(&reply.response.payload)
    }

    async fn ensure_supported(&self, feature: Feature) -> Result<()> {
        if self.current_capabilities().await?.supports(feature) {
            return Ok(());
        }
        debug!(device_id = %self.profile.id, feature = feature.as_str(), "Gated call skipped");
        Err(Error::unsupported(feature.as_str()))
    }

    async fn current_capabilities(&self) -> Result<CapabilitySet> {
        if let Some(capabilities) = self.capabilities.fresh() {
            return Ok(capabilities);
        }
        let reply = self
            .exchange(&DeviceRequest::bodyless(Endpoint::Capabilities)?)
            .await?;
        let capabilities = CapabilitySet::from_payload(&reply.response.payload)?;
        debug!(
            device_id = %self.profile.id,
            features = ?capabilities.features().collect::<Vec<_>>(),
            "Capabilities refreshed"
        );
        self.capabilities.store(capabilities.clone());
        Ok(capabilities)
    }

    async fn exchange(&self, request: &DeviceRequest) -> Result<DeviceReply> {
        match self.send_once(request).await {
            Err(err) if err.is_auth() => {
                warn!(
                    device_id = %self.profile.id,
                    path = request.path_only(),
                    error = %err,
                    "Authentication failed, refreshing session"
                );
                self.transport.reset_auth();
                self.send_once(request).await
            }
            other => other,
        }
    }

    async fn send_once(&self, request: &DeviceRequest) -> Result<DeviceReply> {
        let response = self.transport.send(request).await?;
        let context = request
            .gate
            .map(Feature::as_str)
            .unwrap_or_else(|| request.path_only());
        let status = response.classify(context)?;
        Ok(DeviceReply { response, status })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_core::{Credentials, ManualClock};
    use rollcall_network::MockTransport;
    use rollcall_protocol::DeviceResponse;
    use serde_json::json;

    const CAPS: &str = "<AccessControl><isSupportUserInfo>true</isSupportUserInfo>\
        <isSupportFDLib>true</isSupportFDLib><isSupportCaptureFace>false</isSupportCaptureFace>\
        </AccessControl>";

    fn session(mock: &MockTransport) -> DeviceSession<MockTransport, ManualClock> {
        let profile = DeviceProfile::new(DeviceId::new("D1").unwrap(), "http://10.0.4.21", Credentials::new("a", "b"));
        DeviceSession::new(profile, mock.clone(), ManualClock::default(), &CapabilityConfig::default())
    }

    #[tokio::test]
    async fn test_unsupported_gate_never_sends() {
        let mock = MockTransport::new();
        mock.route("/ISAPI/AccessControl/capabilities", DeviceResponse::xml(CAPS));
        let session = session(&mock);

        let request = DeviceRequest::for_endpoint(
            Endpoint::CaptureFace,
            rollcall_protocol::commands::CaptureRequest::default().to_body(),
        )
        .unwrap();
        let err = session.call(&request).await.unwrap_err();

        assert!(matches!(err, Error::UnsupportedFeature { .. }));
        assert_eq!(mock.count_for("/ISAPI/AccessControl/CaptureFaceData"), 0);
    }

    #[tokio::test]
    async fn test_auth_refreshed_once() {
        let mock = MockTransport::new();
        mock.push_error(Error::auth("stale digest"));
        mock.push_response(DeviceResponse::json(json!({"statusCode": 1})));
        let session = session(&mock);

        let reply = session.call(&DeviceRequest::bodyless(Endpoint::DeviceInfo).unwrap()).await.unwrap();
        assert_eq!(reply.status, StatusKind::Ok);
        assert_eq!(mock.auth_resets(), 1);
    }

    #[tokio::test]
    async fn test_second_auth_failure_is_fatal() {
        let mock = MockTransport::new();
        mock.push_error(Error::auth("bad digest"));
        mock.push_error(Error::auth("bad digest"));
        mock.push_response(DeviceResponse::json(json!({"statusCode": 1})));
        let session = session(&mock);

        let err = session.call(&DeviceRequest::bodyless(Endpoint::DeviceInfo).unwrap()).await.unwrap_err();
        assert!(err.is_auth());
        assert_eq!(mock.requests().len(), 2);
        assert_eq!(mock.remaining(), 1);
    }

    #[tokio::test]
    async fn test_vendor_auth_status_also_refreshes() {
        let mock = MockTransport::new();
        mock.push_response(DeviceResponse::json(
            json!({"statusCode": 4, "subStatusCode": "badAuthorization"}),
        ));
        mock.push_response(DeviceResponse::json(json!({"statusCode": 1})));
        let session = session(&mock);

        session.call(&DeviceRequest::bodyless(Endpoint::DeviceInfo).unwrap()).await.unwrap();
        assert_eq!(mock.auth_resets(), 1);
    }
}
