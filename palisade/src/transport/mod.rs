//! Boundary contract for talking to external services.
//!
//! The core owns no wire protocol. It consumes three capabilities at this
//! boundary: performing a transport operation, deserializing its body, and
//! inspecting an embedded status field in the parsed body. Transport-level
//! problems surface as [`Failure::Transport`]; a non-success *embedded*
//! status surfaces as [`Failure::Response`] even though the exchange
//! itself succeeded.

use crate::errors::{Failure, Outcome};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

/// A request to an external service.
///
/// URI construction is the caller's concern; the URL arrives fully formed.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceRequest {
    /// Fully formed request URL.
    pub url: String,
}

impl ServiceRequest {
    /// Creates a request for a fully formed URL.
    #[must_use]
    pub fn get(url: impl Into<String>) -> Self {
        Self { url: url.into() }
    }
}

/// The raw result of a completed transport operation.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RawResponse {
    /// HTTP status code of the exchange.
    pub status: u16,
    /// Response body text.
    pub body: String,
}

impl RawResponse {
    /// Creates a raw response.
    #[must_use]
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }
}

/// Capability to perform a transport operation.
///
/// A completed exchange is a success regardless of HTTP status, which
/// rides along as data on the [`RawResponse`]; only a failure of the
/// exchange itself (connect, I/O, protocol) is a [`Failure::Transport`].
#[async_trait]
pub trait Transport: Send + Sync {
    /// Performs the request and returns the raw response.
    async fn fetch(&self, request: &ServiceRequest) -> Outcome<RawResponse>;
}

/// Deserializes a raw response body.
///
/// A body the boundary cannot deserialize is a transport-level defect and
/// surfaces as [`Failure::Transport`].
pub fn parse<T: DeserializeOwned>(raw: &RawResponse) -> Outcome<T> {
    serde_json::from_str(&raw.body)
        .map_err(|err| Failure::transport(format!("malformed response body: {err}")))
}

/// A service reply that embeds its own status alongside the payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusEnvelope<T> {
    /// Status code reported inside the body by the service.
    pub status: u16,
    /// The payload.
    pub body: T,
}

/// Fetches and parses a [`StatusEnvelope`], then inspects the embedded
/// status: non-2xx yields [`Failure::Response`].
pub async fn fetch_with_status<T: DeserializeOwned>(
    transport: &dyn Transport,
    request: &ServiceRequest,
) -> Outcome<T> {
    let raw = transport.fetch(request).await?;
    let envelope: StatusEnvelope<T> = parse(&raw)?;
    if (200..300).contains(&envelope.status) {
        Ok(envelope.body)
    } else {
        Err(Failure::response(format!(
            "service reported status {}",
            envelope.status
        )))
    }
}

/// Default transport backed by a shared reqwest client.
#[derive(Debug, Clone, Default)]
pub struct HttpTransport {
    client: reqwest::Client,
}

impl HttpTransport {
    /// Creates a transport with a fresh client.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a transport around an existing client, so one connection
    /// pool can serve many contexts.
    #[must_use]
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Transport for HttpTransport {
    async fn fetch(&self, request: &ServiceRequest) -> Outcome<RawResponse> {
        let response = self
            .client
            .get(&request.url)
            .send()
            .await
            .map_err(|err| Failure::transport(err.to_string()))?;

        let status = response.status().as_u16();
        let body = response
            .text()
            .await
            .map_err(|err| Failure::transport(err.to_string()))?;

        Ok(RawResponse { status, body })
    }
}
