//! reqwest-backed transport.
//!
//! Joins each request path onto the configured base URL, forwards headers and
//! body as-is, and returns the upstream response verbatim (including error
//! status codes). The client keeps a cookie store so cookie-based refresh
//! sessions survive between calls.

use std::time::Duration;

use reqwest::header::HeaderMap;
use tracing::{debug, warn};

use crate::{ApiRequest, ApiResponse, Result, SendFuture, Transport, TransportError};

/// Base URL used when nothing is configured.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000/api";

/// Default per-request timeout.
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(30);

/// Production transport over a shared `reqwest::Client`.
#[derive(Debug, Clone)]
pub struct ReqwestTransport {
    client: reqwest::Client,
    base_url: String,
    timeout: Duration,
}

impl ReqwestTransport {
    /// Build a transport with its own cookie-enabled client.
    pub fn new(base_url: impl Into<String>) -> Result<Self> {
        let client = reqwest::Client::builder()
            .cookie_store(true)
            .build()
            .map_err(|e| TransportError::Http(format!("building HTTP client: {e}")))?;
        Ok(Self::with_client(client, base_url))
    }

    /// Wrap an existing client (shared connection pool).
    pub fn with_client(client: reqwest::Client, base_url: impl Into<String>) -> Self {
        Self {
            client,
            base_url: base_url.into(),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Resolve a request path against the base URL. Absolute URLs pass through.
    pub fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            return path.to_string();
        }
        format!(
            "{}/{}",
            self.base_url.trim_end_matches('/'),
            path.trim_start_matches('/')
        )
    }

    async fn execute(&self, request: &ApiRequest) -> Result<ApiResponse> {
        let url = self.url_for(request.path());
        debug!(method = %request.method(), url = %url, "sending request");

        let mut builder = self
            .client
            .request(request.method().clone(), &url)
            .headers(request.headers().clone())
            .timeout(self.timeout);
        if let Some(body) = request.body_bytes() {
            builder = builder.body(body.clone());
        }

        let response = builder.send().await.map_err(|e| {
            if e.is_timeout() {
                TransportError::Timeout(format!("{url} after {}s", self.timeout.as_secs()))
            } else {
                TransportError::Http(format!("{url}: {e}"))
            }
        })?;

        let status = response.status();
        let headers: HeaderMap = response.headers().clone();
        let body = response.bytes().await.map_err(|e| {
            warn!(url = %url, error = %e, "failed to read response body");
            TransportError::Body(e.to_string())
        })?;

        debug!(url = %url, status = status.as_u16(), bytes = body.len(), "received response");
        Ok(ApiResponse::new(status, headers, body))
    }
}

impl Transport for ReqwestTransport {
    fn id(&self) -> &str {
        "reqwest"
    }

    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(self.execute(request))
    }
}
