//! Application-facing API client
//!
//! `ApiClient` bundles one transport, one session store, one coordinator and
//! one dispatcher. Clones share all of them, so a single client can be handed
//! to every part of an application.

use std::sync::Arc;

use auth_session::{
    Identity, LOGIN_PATH, LoginRequest, REFRESH_PATH, REGISTER_PATH, SessionStore, sanitize,
};
use common::Secret;
use serde::Serialize;
use tokio::sync::broadcast;
use tracing::info;
use transport::{ApiRequest, ApiResponse, Transport};

use crate::classify::RefreshPolicy;
use crate::coordinator::{AuthEvent, LogoutReason, RefreshConfig, RefreshCoordinator};
use crate::dispatcher::Dispatcher;
use crate::error::{Error, Result};

/// Endpoint paths and refresh behaviour.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    pub refresh_path: String,
    pub login_path: String,
    pub register_path: String,
    pub policy: RefreshPolicy,
    pub refresh_token: Option<Secret<String>>,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self {
            refresh_path: REFRESH_PATH.to_string(),
            login_path: LOGIN_PATH.to_string(),
            register_path: REGISTER_PATH.to_string(),
            policy: RefreshPolicy::default(),
            refresh_token: None,
        }
    }
}

#[derive(Clone)]
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    dispatcher: Dispatcher,
    login_path: String,
    register_path: String,
}

impl ApiClient {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        options: ClientOptions,
    ) -> Self {
        let coordinator = RefreshCoordinator::new(
            transport.clone(),
            session.clone(),
            RefreshConfig {
                refresh_path: options.refresh_path,
                refresh_token: options.refresh_token,
            },
        );
        let dispatcher = Dispatcher::new(transport.clone(), coordinator, options.policy);
        Self {
            transport,
            session,
            dispatcher,
            login_path: options.login_path,
            register_path: options.register_path,
        }
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.session
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        self.dispatcher.coordinator()
    }

    /// Session lifecycle events (refreshes, logouts).
    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.coordinator().subscribe()
    }

    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        self.dispatcher.dispatch(request).await
    }

    pub async fn get(&self, path: &str) -> Result<ApiResponse> {
        self.dispatch(ApiRequest::get(path)).await
    }

    pub async fn delete(&self, path: &str) -> Result<ApiResponse> {
        self.dispatch(ApiRequest::delete(path)).await
    }

    pub async fn post_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.dispatch(ApiRequest::post(path).json(body)?).await
    }

    pub async fn put_json<T: Serialize + ?Sized>(&self, path: &str, body: &T) -> Result<ApiResponse> {
        self.dispatch(ApiRequest::put(path).json(body)?).await
    }

    /// Log in and establish the session. Goes to the transport directly, so a
    /// wrong password is an `Auth` error rather than a refresh trigger.
    pub async fn login(&self, email: &str, password: &str) -> Result<Identity> {
        let response = auth_session::login(
            self.transport.as_ref(),
            &self.login_path,
            &LoginRequest::new(email, password),
        )
        .await?;
        self.establish(response.user, &response.token, "login").await
    }

    /// Register an account and establish the session for it.
    pub async fn register(&self, user: &serde_json::Value) -> Result<Identity> {
        let response =
            auth_session::register(self.transport.as_ref(), &self.register_path, user).await?;
        self.establish(response.user, &response.token, "register").await
    }

    /// End the session explicitly.
    pub async fn logout(&self) {
        self.session.clear().await;
        info!("logged out");
        self.coordinator().emit(AuthEvent::LoggedOut {
            reason: LogoutReason::UserLogout,
        });
    }

    async fn establish(&self, user: Identity, raw_token: &str, operation: &str) -> Result<Identity> {
        if sanitize(raw_token).is_none() {
            return Err(Error::Auth(auth_session::Error::CredentialParse(format!(
                "{operation} returned an empty token"
            ))));
        }
        self.session.set_session(user.clone(), raw_token).await;
        info!(operation, "session established");
        Ok(user)
    }
}
