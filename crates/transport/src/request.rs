//! Request and response descriptors
//!
//! `ApiRequest` is owned data (method, path, headers, body) rather than a
//! builder bound to a client, so it can be cloned into a retry queue and
//! replayed after a credential refresh without losing anything.

use bytes::Bytes;
use reqwest::header::{AUTHORIZATION, CONTENT_TYPE, HeaderMap, HeaderName, HeaderValue};
use reqwest::{Method, StatusCode};
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::str::FromStr;

use crate::{Result, TransportError};

/// Scheme used for the `Authorization` header.
const BEARER_PREFIX: &str = "Bearer ";

/// An outbound API call.
///
/// `path` is relative to the transport's base URL (e.g. `/categories/7`).
/// The `retried` flag records that this request already went through one
/// refresh-and-replay cycle; it is never sent on the wire.
#[derive(Debug, Clone)]
pub struct ApiRequest {
    method: Method,
    path: String,
    headers: HeaderMap,
    body: Option<Bytes>,
    retried: bool,
}

impl ApiRequest {
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            headers: HeaderMap::new(),
            body: None,
            retried: false,
        }
    }

    pub fn get(path: impl Into<String>) -> Self {
        Self::new(Method::GET, path)
    }

    pub fn post(path: impl Into<String>) -> Self {
        Self::new(Method::POST, path)
    }

    pub fn put(path: impl Into<String>) -> Self {
        Self::new(Method::PUT, path)
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self::new(Method::DELETE, path)
    }

    /// Add or replace a header.
    pub fn header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Add or replace a header from string parts, validating both.
    pub fn try_header(self, name: &str, value: &str) -> Result<Self> {
        let name = HeaderName::from_str(name)
            .map_err(|e| TransportError::InvalidRequest(format!("header name {name:?}: {e}")))?;
        let value = HeaderValue::from_str(value)
            .map_err(|e| TransportError::InvalidRequest(format!("header value for {name}: {e}")))?;
        Ok(self.header(name, value))
    }

    /// Serialize `body` as JSON and set `content-type: application/json`.
    pub fn json<T: Serialize + ?Sized>(mut self, body: &T) -> Result<Self> {
        let bytes = serde_json::to_vec(body)
            .map_err(|e| TransportError::InvalidRequest(format!("serializing JSON body: {e}")))?;
        self.headers
            .insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        self.body = Some(Bytes::from(bytes));
        Ok(self)
    }

    /// Set a raw body. The caller is responsible for `content-type`.
    pub fn body(mut self, body: impl Into<Bytes>) -> Self {
        self.body = Some(body.into());
        self
    }

    pub fn method(&self) -> &Method {
        &self.method
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body_bytes(&self) -> Option<&Bytes> {
        self.body.as_ref()
    }

    /// Whether this request has already been replayed once after a refresh.
    pub fn is_retry(&self) -> bool {
        self.retried
    }

    pub fn mark_retried(&mut self) {
        self.retried = true;
    }

    /// Set `Authorization: Bearer <token>`, marked sensitive so it never
    /// shows up in `Debug` output.
    pub fn set_bearer(&mut self, token: &str) -> Result<()> {
        let mut value = HeaderValue::from_str(&format!("{BEARER_PREFIX}{token}"))
            .map_err(|e| TransportError::InvalidRequest(format!("invalid bearer token: {e}")))?;
        value.set_sensitive(true);
        self.headers.insert(AUTHORIZATION, value);
        Ok(())
    }

    pub fn clear_authorization(&mut self) {
        self.headers.remove(AUTHORIZATION);
    }

    /// Copy of this request with the authorization header removed.
    pub fn without_authorization(&self) -> Self {
        let mut copy = self.clone();
        copy.clear_authorization();
        copy
    }

    /// Whether this request targets `endpoint`, ignoring query string and
    /// surrounding slashes. An absolute URL matches when its path ends with the
    /// endpoint on a segment boundary, since it also carries the base path.
    pub fn targets(&self, endpoint: &str) -> bool {
        let (path, path_absolute) = normalize_path(&self.path);
        let (endpoint, endpoint_absolute) = normalize_path(endpoint);
        path == endpoint
            || (path_absolute && ends_with_segments(path, endpoint))
            || (endpoint_absolute && ends_with_segments(endpoint, path))
    }
}

/// Path with scheme, authority, query, fragment and surrounding slashes
/// removed, and whether the input was an absolute URL.
fn normalize_path(path: &str) -> (&str, bool) {
    let (path, absolute) = match path
        .strip_prefix("http://")
        .or_else(|| path.strip_prefix("https://"))
    {
        Some(rest) => (rest.find('/').map_or("", |i| &rest[i..]), true),
        None => (path, false),
    };
    let without_query = path.split(['?', '#']).next().unwrap_or(path);
    (without_query.trim_matches('/'), absolute)
}

fn ends_with_segments(path: &str, tail: &str) -> bool {
    !tail.is_empty()
        && path
            .strip_suffix(tail)
            .is_some_and(|prefix| prefix.ends_with('/'))
}

/// A complete response: status, headers and the fully-read body.
#[derive(Debug, Clone)]
pub struct ApiResponse {
    status: StatusCode,
    headers: HeaderMap,
    body: Bytes,
}

impl ApiResponse {
    pub fn new(status: StatusCode, headers: HeaderMap, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers,
            body: body.into(),
        }
    }

    /// Response with a JSON body and matching content type.
    pub fn json_body(status: StatusCode, body: &serde_json::Value) -> Self {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        Self::new(status, headers, body.to_string())
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }

    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    pub fn body(&self) -> &Bytes {
        &self.body
    }

    pub fn is_success(&self) -> bool {
        self.status.is_success()
    }

    pub fn is_unauthorized(&self) -> bool {
        self.status == StatusCode::UNAUTHORIZED
    }

    /// Body as UTF-8 text, replacing invalid sequences.
    pub fn text(&self) -> String {
        String::from_utf8_lossy(&self.body).into_owned()
    }

    pub fn json<T: DeserializeOwned>(&self) -> serde_json::Result<T> {
        serde_json::from_slice(&self.body)
    }
}
