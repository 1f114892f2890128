//! Scripted in-memory transport.
//!
//! [`MockTransport`] answers requests from two sources:
//!
//! - **routes**: standing responses keyed by path prefix, served every time
//! - **script**: a FIFO of one-shot responses or errors, consumed in order by
//!   requests that match no route
//!
//! Every request is recorded so tests can assert what was (and was not) sent.
//! Clones share state, which lets a test keep a handle while a session owns
//! the transport.
//!
//! # Examples
//!
//! ```
//! use rollcall_network::{MockTransport, Transport};
//! use rollcall_protocol::{DeviceRequest, DeviceResponse, Endpoint};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() {
//! let mock = MockTransport::new();
//! mock.push_response(DeviceResponse::xml("<DeviceInfo><model>DS-K1T341</model></DeviceInfo>"));
//!
//! let request = DeviceRequest::bodyless(Endpoint::DeviceInfo).unwrap();
//! let response = mock.send(&request).await.unwrap();
//! assert_eq!(response.http_status, 200);
//! assert_eq!(mock.count_for("/ISAPI/System/deviceInfo"), 1);
//! # }
//! ```

use crate::transport::{Transport, TransportFactory};
use rollcall_core::{DeviceId, DeviceProfile, Error, Result};
use rollcall_protocol::{DeviceRequest, DeviceResponse};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

#[derive(Debug, Default)]
struct MockState {
    routes: Mutex<Vec<(String, DeviceResponse)>>,
    script: Mutex<VecDeque<Result<DeviceResponse>>>,
    sent: Mutex<Vec<DeviceRequest>>,
    latency: Mutex<Option<Duration>>,
    resets: AtomicU32,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Scripted transport for tests and simulations.
#[derive(Debug, Clone, Default)]
pub struct MockTransport {
    state: Arc<MockState>,
}

impl MockTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Serve `response` for every request whose path starts with `prefix`.
    pub fn route(&self, prefix: impl Into<String>, response: DeviceResponse) -> &Self {
        lock(&self.state.routes).push((prefix.into(), response));
        self
    }

    /// Queue a one-shot response.
    pub fn push_response(&self, response: DeviceResponse) -> &Self {
        lock(&self.state.script).push_back(Ok(response));
        self
    }

    /// Queue a one-shot error.
    pub fn push_error(&self, error: Error) -> &Self {
        lock(&self.state.script).push_back(Err(error));
        self
    }

    /// Delay every response by `latency` (Tokio time).
    pub fn set_latency(&self, latency: Duration) {
        *lock(&self.state.latency) = Some(latency);
    }

    /// All requests sent so far, in order.
    pub fn requests(&self) -> Vec<DeviceRequest> {
        lock(&self.state.sent).clone()
    }

    /// Number of requests whose path starts with `prefix`.
    pub fn count_for(&self, prefix: &str) -> usize {
        lock(&self.state.sent)
            .iter()
            .filter(|r| r.path.starts_with(prefix))
            .count()
    }

    /// Number of `reset_auth` calls.
    pub fn auth_resets(&self) -> u32 {
        self.state.resets.load(Ordering::SeqCst)
    }

    /// Highest number of requests observed in flight at once.
    pub fn max_in_flight(&self) -> usize {
        self.state.max_in_flight.load(Ordering::SeqCst)
    }

    /// Scripted entries not yet consumed.
    pub fn remaining(&self) -> usize {
        lock(&self.state.script).len()
    }

    fn next_reply(&self, request: &DeviceRequest) -> Result<DeviceResponse> {
        let routed = lock(&self.state.routes)
            .iter()
            .find(|(prefix, _)| request.path.starts_with(prefix.as_str()))
            .map(|(_, response)| response.clone());
        if let Some(response) = routed {
            return Ok(response);
        }
        lock(&self.state.script).pop_front().unwrap_or_else(|| {
            Err(Error::network(format!(
                "no scripted response for {} {}",
                request.method.as_str(),
                request.path
            )))
        })
    }
}

impl Transport for MockTransport {
    async fn send(&self, request: &DeviceRequest) -> Result<DeviceResponse> {
        let current = self.state.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.state.max_in_flight.fetch_max(current, Ordering::SeqCst);
        lock(&self.state.sent).push(request.clone());

        let latency = *lock(&self.state.latency);
        if let Some(latency) = latency {
            tokio::time::sleep(latency).await;
        }

        let reply = self.next_reply(request);
        self.state.in_flight.fetch_sub(1, Ordering::SeqCst);
        reply
    }

    fn reset_auth(&self) {
        self.state.resets.fetch_add(1, Ordering::SeqCst);
    }
}

/// Hands out one shared [`MockTransport`] per device id.
#[derive(Debug, Clone, Default)]
pub struct MockTransportFactory {
    transports: Arc<Mutex<HashMap<DeviceId, MockTransport>>>,
    connects: Arc<AtomicU32>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    /// Transport for `device`, created on first use.
    pub fn transport(&self, device: &DeviceId) -> MockTransport {
        lock(&self.transports).entry(device.clone()).or_default().clone()
    }

    /// Number of `connect` calls, i.e. sessions created.
    pub fn connects(&self) -> u32 {
        self.connects.load(Ordering::SeqCst)
    }
}

impl TransportFactory for MockTransportFactory {
    type Transport = MockTransport;

    fn connect(&self, profile: &DeviceProfile) -> Result<MockTransport> {
        self.connects.fetch_add(1, Ordering::SeqCst);
        Ok(self.transport(&profile.id))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rollcall_protocol::Endpoint;
    use serde_json::json;

    #[tokio::test]
    async fn test_routes_take_precedence_over_script() {
        let mock = MockTransport::new();
        mock.route("/ISAPI/AccessControl/capabilities", DeviceResponse::xml("<AccessControl/>"));
        mock.push_response(DeviceResponse::json(json!({"statusCode": 1})));

        let caps = DeviceRequest::bodyless(Endpoint::Capabilities).unwrap();
        let info = DeviceRequest::bodyless(Endpoint::DeviceInfo).unwrap();

        mock.send(&caps).await.unwrap();
        mock.send(&caps).await.unwrap();
        assert_eq!(mock.remaining(), 1);

        mock.send(&info).await.unwrap();
        assert_eq!(mock.remaining(), 0);

        let err = mock.send(&info).await.unwrap_err();
        assert!(err.is_retryable());
        assert_eq!(mock.requests().len(), 4);
    }

    #[tokio::test]
    async fn test_factory_shares_transport_per_device() {
        let factory = MockTransportFactory::new();
        let id = DeviceId::new("D1").unwrap();
        let handle = factory.transport(&id);

        let profile = DeviceProfile::new(id, "http://10.0.0.1", rollcall_core::Credentials::new("a", "b"));
        let transport = factory.connect(&profile).unwrap();
        transport.reset_auth();

        assert_eq!(handle.auth_resets(), 1);
        assert_eq!(factory.connects(), 1);
    }
}
