//! Auth endpoint calls: login, registration and credential refresh
//!
//! These go straight to the transport, never through the request dispatcher:
//! a 401 from a wrong password or an expired refresh session must be reported
//! as such, not trigger another refresh.
//!
//! Response shapes:
//! - login / register: `{"data": <user>, "token": "<credential>"}`
//! - refresh: `{"token": "<credential>"}`

use common::Secret;
use serde::ser::SerializeStruct;
use serde::{Deserialize, Serialize, Serializer};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::error::{Error, Result};
use crate::session::Identity;

/// Response body of the login and register endpoints.
#[derive(Debug, Deserialize)]
pub struct AuthResponse {
    #[serde(rename = "data")]
    pub user: Identity,
    pub token: String,
}

/// Response body of the refresh endpoint.
#[derive(Debug, Deserialize, Serialize)]
pub struct RefreshResponse {
    pub token: String,
}

/// Email/password pair for the login endpoint. The password is only exposed
/// while serializing the request body.
#[derive(Debug)]
pub struct LoginRequest {
    pub email: String,
    pub password: Secret<String>,
}

impl LoginRequest {
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: Secret::new(password.into()),
        }
    }
}

impl Serialize for LoginRequest {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let mut state = serializer.serialize_struct("LoginRequest", 2)?;
        state.serialize_field("email", &self.email)?;
        state.serialize_field("password", self.password.expose())?;
        state.end()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct RefreshRequest<'a> {
    refresh_token: &'a str,
}

/// Log in with email and password.
pub async fn login(
    transport: &dyn Transport,
    path: &str,
    credentials: &LoginRequest,
) -> Result<AuthResponse> {
    let request = ApiRequest::post(path).json(credentials)?;
    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("login request failed: {e}")))?;
    parse_auth_response(response, "login")
}

/// Register a new account. `user` is the caller-built registration body.
pub async fn register(
    transport: &dyn Transport,
    path: &str,
    user: &serde_json::Value,
) -> Result<AuthResponse> {
    let request = ApiRequest::post(path).json(user)?;
    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("register request failed: {e}")))?;
    parse_auth_response(response, "register")
}

/// Exchange the refresh session for a new credential.
///
/// With a long-lived `refresh` token the body is `{"refreshToken": ..}`;
/// without one no body is sent and the server relies on its refresh cookie.
/// `expired` is the credential that was rejected, sent as the bearer so the
/// server can correlate the session.
pub async fn refresh_token(
    transport: &dyn Transport,
    path: &str,
    refresh: Option<&str>,
    expired: Option<&str>,
) -> Result<RefreshResponse> {
    let mut request = ApiRequest::post(path);
    if let Some(refresh_token) = refresh {
        request = request.json(&RefreshRequest { refresh_token })?;
    }
    if let Some(token) = expired {
        request.set_bearer(token)?;
    }

    let response = transport
        .send(&request)
        .await
        .map_err(|e| Error::Http(format!("token refresh request failed: {e}")))?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text();
        // 401/403 means the refresh session is revoked or expired
        if status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "refresh rejected ({status}): {body}"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "token refresh returned {status}: {body}"
        )));
    }

    response
        .json::<RefreshResponse>()
        .map_err(|e| Error::TokenExchange(format!("invalid refresh response: {e}")))
}

fn parse_auth_response(response: ApiResponse, operation: &str) -> Result<AuthResponse> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text();
        if status.as_u16() == 400 || status.as_u16() == 401 || status.as_u16() == 403 {
            return Err(Error::InvalidCredentials(format!(
                "{operation} rejected ({status}): {body}"
            )));
        }
        return Err(Error::TokenExchange(format!(
            "{operation} returned {status}: {body}"
        )));
    }

    response
        .json::<AuthResponse>()
        .map_err(|e| Error::CredentialParse(format!("invalid {operation} response: {e}")))
}
