//! Test doubles for transports and steps.

use crate::errors::{Failure, Outcome};
use crate::transport::{RawResponse, ServiceRequest, Transport};
use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// Transport that replays a queue of scripted outcomes and records every
/// request it receives.
#[derive(Debug, Default)]
pub struct ScriptedTransport {
    script: Mutex<VecDeque<Outcome<RawResponse>>>,
    requests: Mutex<Vec<ServiceRequest>>,
}

impl ScriptedTransport {
    /// Creates a transport with an empty script.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Queues a raw response.
    pub fn push_response(&self, status: u16, body: impl Into<String>) {
        self.script
            .lock()
            .push_back(Ok(RawResponse::new(status, body)));
    }

    /// Queues a response wrapping the payload in a status envelope with
    /// the given embedded status.
    pub fn push_envelope(&self, status: u16, body: &serde_json::Value) {
        let envelope = serde_json::json!({ "status": status, "body": body });
        self.push_response(200, envelope.to_string());
    }

    /// Queues a failure.
    pub fn push_failure(&self, failure: Failure) {
        self.script.lock().push_back(Err(failure));
    }

    /// Requests seen so far, in order.
    #[must_use]
    pub fn recorded_requests(&self) -> Vec<ServiceRequest> {
        self.requests.lock().clone()
    }

    /// Number of fetches performed.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.requests.lock().len()
    }
}

#[async_trait]
impl Transport for ScriptedTransport {
    async fn fetch(&self, request: &ServiceRequest) -> Outcome<RawResponse> {
        self.requests.lock().push(request.clone());
        self.script
            .lock()
            .pop_front()
            .unwrap_or_else(|| Err(Failure::transport("scripted transport exhausted")))
    }
}

/// Shared counter for verifying which steps actually ran.
#[derive(Debug, Default, Clone)]
pub struct StepCounter(Arc<AtomicUsize>);

impl StepCounter {
    /// Creates a counter at zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Increments and returns the new count.
    pub fn hit(&self) -> usize {
        self.0.fetch_add(1, Ordering::SeqCst) + 1
    }

    /// Current count.
    #[must_use]
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_scripted_transport_replays_in_order() {
        tokio_test::block_on(async {
            let transport = ScriptedTransport::new();
            transport.push_response(200, "first");
            transport.push_failure(Failure::transport("down"));

            let request = ServiceRequest::get("http://service/a");
            let raw = transport.fetch(&request).await.unwrap();
            assert_eq!(raw.body, "first");

            let failure = transport.fetch(&request).await.unwrap_err();
            assert_eq!(failure.kind(), "transport");

            // Exhausted scripts fail rather than hanging the caller.
            assert!(transport.fetch(&request).await.is_err());
            assert_eq!(transport.call_count(), 3);
            assert_eq!(transport.recorded_requests()[0].url, "http://service/a");
        });
    }

    #[test]
    fn test_step_counter() {
        let counter = StepCounter::new();
        assert_eq!(counter.count(), 0);
        assert_eq!(counter.hit(), 1);
        assert_eq!(counter.clone().hit(), 2);
        assert_eq!(counter.count(), 2);
    }
}
