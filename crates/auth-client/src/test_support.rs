//! In-process API double shared by the unit tests.
//!
//! Routes:
//! - `/auth/refresh-token`: counted, optionally gated, answers per `RefreshBehavior`
//! - `/auth/login`: 200 for password `secret`, 401 otherwise
//! - `/auth/register`: 201 echoing the body as the user
//! - `/public`: 200 without auth
//! - `/status/500`: 500 regardless of auth
//! - `/network-error`: transport failure
//! - `/slow/..`: protected, held until `open_resource_gate`
//! - anything else: protected, 200 only for `Bearer <accepted>`

use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use auth_session::sanitize;
use reqwest::StatusCode;
use reqwest::header::AUTHORIZATION;
use serde_json::json;
use tokio::sync::Semaphore;
use transport::{ApiRequest, ApiResponse, SendFuture, Transport, TransportError};

use crate::coordinator::RefreshCoordinator;

const OPEN: usize = 1 << 20;

#[derive(Debug, Clone)]
pub enum RefreshBehavior {
    /// 200 with `{"token": value}`.
    Token(String),
    /// Non-2xx with this status.
    Status(u16),
    NetworkError,
}

pub struct MockApi {
    refresh: RefreshBehavior,
    accepted: Mutex<String>,
    refresh_gate: Semaphore,
    resource_gate: Semaphore,
    refresh_calls: AtomicU64,
    always_unauthorized: AtomicBool,
    seen: Mutex<Vec<ApiRequest>>,
}

impl MockApi {
    pub fn new(refresh: RefreshBehavior) -> Self {
        let accepted = match &refresh {
            RefreshBehavior::Token(raw) => sanitize(raw)
                .map(|c| c.as_str().to_string())
                .unwrap_or_default(),
            _ => "valid".to_string(),
        };
        Self {
            refresh,
            accepted: Mutex::new(accepted),
            refresh_gate: Semaphore::new(OPEN),
            resource_gate: Semaphore::new(OPEN),
            refresh_calls: AtomicU64::new(0),
            always_unauthorized: AtomicBool::new(false),
            seen: Mutex::new(Vec::new()),
        }
    }

    /// Refresh calls block until `open_refresh_gate`.
    pub fn gated(refresh: RefreshBehavior) -> Self {
        let api = Self::new(refresh);
        api.refresh_gate.forget_permits(OPEN);
        api
    }

    /// `/slow` requests block until `open_resource_gate`.
    pub fn with_resource_gate(self) -> Self {
        self.resource_gate.forget_permits(OPEN);
        self
    }

    pub fn always_unauthorized(self) -> Self {
        self.always_unauthorized.store(true, Ordering::SeqCst);
        self
    }

    pub fn open_refresh_gate(&self) {
        self.refresh_gate.add_permits(OPEN);
    }

    pub fn open_resource_gate(&self) {
        self.resource_gate.add_permits(OPEN);
    }

    pub fn refresh_calls(&self) -> u64 {
        self.refresh_calls.load(Ordering::SeqCst)
    }

    /// Requests received for `path`, in arrival order.
    pub fn requests_to(&self, path: &str) -> Vec<ApiRequest> {
        self.seen
            .lock()
            .unwrap()
            .iter()
            .filter(|r| r.path() == path)
            .cloned()
            .collect()
    }

    /// Authorization header values received for `path`, in arrival order.
    pub fn bearers_for(&self, path: &str) -> Vec<Option<String>> {
        self.requests_to(path)
            .iter()
            .map(|r| {
                r.headers()
                    .get(AUTHORIZATION)
                    .and_then(|v| v.to_str().ok())
                    .map(str::to_string)
            })
            .collect()
    }

    fn authorized(&self, request: &ApiRequest) -> bool {
        if self.always_unauthorized.load(Ordering::SeqCst) {
            return false;
        }
        let expected = format!("Bearer {}", self.accepted.lock().unwrap());
        request
            .headers()
            .get(AUTHORIZATION)
            .is_some_and(|v| v.as_bytes() == expected.as_bytes())
    }

    async fn respond(&self, request: &ApiRequest) -> transport::Result<ApiResponse> {
        self.seen.lock().unwrap().push(request.clone());
        // Same resolution as the HTTP transport: the leading slash is optional.
        let path = format!("/{}", request.path().trim_start_matches('/'));
        let path = path.as_str();

        match path {
            "/auth/refresh-token" => {
                self.refresh_calls.fetch_add(1, Ordering::SeqCst);
                let _permit = self
                    .refresh_gate
                    .acquire()
                    .await
                    .map_err(|e| TransportError::Http(e.to_string()))?;
                match &self.refresh {
                    RefreshBehavior::Token(token) => {
                        Ok(ApiResponse::json_body(StatusCode::OK, &json!({ "token": token })))
                    }
                    RefreshBehavior::Status(code) => Ok(ApiResponse::json_body(
                        StatusCode::from_u16(*code).unwrap(),
                        &json!({ "message": "refresh rejected" }),
                    )),
                    RefreshBehavior::NetworkError => {
                        Err(TransportError::Http("connection reset".into()))
                    }
                }
            }
            "/auth/login" => {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body_bytes().unwrap()).unwrap();
                if body["password"] == "secret" {
                    let token = self.accepted.lock().unwrap().clone();
                    Ok(ApiResponse::json_body(
                        StatusCode::OK,
                        &json!({
                            "data": { "id": 7, "email": body["email"], "role": "student" },
                            "token": format!("Bearer {token}"),
                        }),
                    ))
                } else {
                    Ok(ApiResponse::json_body(
                        StatusCode::UNAUTHORIZED,
                        &json!({ "message": "invalid email or password" }),
                    ))
                }
            }
            "/auth/register" => {
                let body: serde_json::Value =
                    serde_json::from_slice(request.body_bytes().unwrap()).unwrap();
                let token = self.accepted.lock().unwrap().clone();
                Ok(ApiResponse::json_body(
                    StatusCode::CREATED,
                    &json!({ "data": body, "token": token }),
                ))
            }
            "/public" => Ok(ApiResponse::json_body(StatusCode::OK, &json!({ "public": true }))),
            "/status/500" => Ok(ApiResponse::json_body(
                StatusCode::INTERNAL_SERVER_ERROR,
                &json!({ "message": "boom" }),
            )),
            "/network-error" => Err(TransportError::Http("connection refused".into())),
            _ => {
                if path.starts_with("/slow") {
                    let _permit = self
                        .resource_gate
                        .acquire()
                        .await
                        .map_err(|e| TransportError::Http(e.to_string()))?;
                }
                if self.authorized(request) {
                    Ok(ApiResponse::json_body(
                        StatusCode::OK,
                        &json!({ "path": path, "method": request.method().as_str() }),
                    ))
                } else {
                    Ok(ApiResponse::json_body(
                        StatusCode::UNAUTHORIZED,
                        &json!({ "message": "token expired" }),
                    ))
                }
            }
        }
    }
}

impl Transport for MockApi {
    fn id(&self) -> &str {
        "mock"
    }

    fn send<'a>(&'a self, request: &'a ApiRequest) -> SendFuture<'a> {
        Box::pin(self.respond(request))
    }
}

/// Poll until `n` callers are queued on the coordinator.
pub async fn wait_until_waiting(coordinator: &RefreshCoordinator, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while coordinator.waiting().await < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {n} queued callers"));
}

/// Poll until `path` has been requested `n` times.
pub async fn wait_until_requested(api: &MockApi, path: &str, n: usize) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while api.requests_to(path).len() < n {
            tokio::time::sleep(Duration::from_millis(1)).await;
        }
    })
    .await
    .unwrap_or_else(|_| panic!("timed out waiting for {n} requests to {path}"));
}
