//! Response classification
//!
//! Decides, from the status alone, what the dispatcher does with a response.
//! Only a 401 is interesting; every other status is handed back to the caller
//! unchanged. Whether a 401 is recoverable depends on the request: the refresh
//! endpoint itself and already-replayed requests are terminal, which is what
//! keeps a permanently rejecting server from looping us. A request sent without
//! a bearer has no credential to renew, so its 401 is terminal too.

use reqwest::header::AUTHORIZATION;
use transport::{ApiRequest, ApiResponse};

/// Whether a 401 triggers automatic refresh-and-replay.
///
/// `Disabled` hands 401 responses back to the caller like any other status
/// and never logs the session out.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum RefreshPolicy {
    #[default]
    Automatic,
    Disabled,
}

impl RefreshPolicy {
    pub fn from_flag(auto_refresh: bool) -> Self {
        if auto_refresh {
            RefreshPolicy::Automatic
        } else {
            RefreshPolicy::Disabled
        }
    }
}

/// Why a 401 is terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinalReason {
    /// The refresh endpoint itself answered 401.
    RefreshEndpoint,
    /// The request was already replayed once with a renewed credential.
    AlreadyRetried,
    /// The request carried no credential (logged out).
    NoCredential,
}

impl FinalReason {
    pub fn describe(self) -> &'static str {
        match self {
            FinalReason::RefreshEndpoint => "refresh endpoint returned 401",
            FinalReason::AlreadyRetried => "401 after credential refresh",
            FinalReason::NoCredential => "401 without a credential",
        }
    }
}

/// What the dispatcher does with a response.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Disposition {
    /// Return the response to the caller as-is.
    Deliver,
    /// Credential expired: refresh, then replay once.
    CredentialExpired,
    /// 401 that must not trigger a refresh.
    AuthFinal(FinalReason),
}

/// Classify `response` to `request`.
pub fn classify(
    request: &ApiRequest,
    response: &ApiResponse,
    refresh_path: &str,
    policy: RefreshPolicy,
) -> Disposition {
    if !response.is_unauthorized() || policy == RefreshPolicy::Disabled {
        return Disposition::Deliver;
    }
    if request.targets(refresh_path) {
        return Disposition::AuthFinal(FinalReason::RefreshEndpoint);
    }
    if request.is_retry() {
        return Disposition::AuthFinal(FinalReason::AlreadyRetried);
    }
    if !request.headers().contains_key(AUTHORIZATION) {
        return Disposition::AuthFinal(FinalReason::NoCredential);
    }
    Disposition::CredentialExpired
}
