//! Transport abstraction for outbound API calls
//!
//! Defines the `Transport` trait that decouples the authentication core from
//! the HTTP stack. `ReqwestTransport` is the production implementation; tests
//! substitute scripted transports that count calls and gate responses.
//!
//! Requests and responses are plain descriptors (`ApiRequest`, `ApiResponse`)
//! so a failed request can be held in a queue and replayed verbatim.

pub mod request;
pub mod reqwest_transport;

pub use request::{ApiRequest, ApiResponse};
pub use reqwest_transport::{DEFAULT_BASE_URL, ReqwestTransport};

use std::future::Future;
use std::pin::Pin;

/// Network-level failures. Status codes are never errors at this layer:
/// a 401 or 500 is a successful `ApiResponse` with that status.
#[derive(Debug, Clone, thiserror::Error)]
pub enum TransportError {
    #[error("HTTP request failed: {0}")]
    Http(String),

    #[error("request timed out: {0}")]
    Timeout(String),

    #[error("failed to read response body: {0}")]
    Body(String),

    #[error("invalid request: {0}")]
    InvalidRequest(String),
}

/// Result alias for transport operations.
pub type Result<T> = std::result::Result<T, TransportError>;

/// Boxed future returned by `Transport::send`.
pub type SendFuture<'a> = Pin<Box<dyn Future<Output = Result<ApiResponse>> + Send + 'a>>;

/// Abstraction over the HTTP client that actually talks to the API.
///
/// Uses `Pin<Box<dyn Future>>` return types for dyn-compatibility
/// (`Arc<dyn Transport>`). Implementations send the request exactly as given:
/// header injection and retry decisions belong to the caller.
pub trait Transport: Send + Sync {
    /// Identifier for logging (e.g. "reqwest", "scripted").
    fn id(&self) -> &str;

    /// Send one request and return the complete response.
    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a>;
}
