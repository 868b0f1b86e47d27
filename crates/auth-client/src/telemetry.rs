//! Metrics emitted by the dispatcher and refresh coordinator
//!
//! - `auth_dispatch_total` (counter): label `outcome`
//! - `auth_refresh_total` (counter): label `outcome`
//! - `auth_refresh_waiters` (histogram): callers settled per refresh cycle
//! - `auth_refresh_duration_seconds` (histogram)
//!
//! Without an installed recorder these calls are no-ops.

pub const DISPATCH_TOTAL: &str = "auth_dispatch_total";
pub const REFRESH_TOTAL: &str = "auth_refresh_total";
pub const REFRESH_WAITERS: &str = "auth_refresh_waiters";
pub const REFRESH_DURATION: &str = "auth_refresh_duration_seconds";

/// Final outcome of one `dispatch` call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Returned without touching the refresh path.
    Delivered,
    /// Returned after a refresh-and-replay.
    Replayed,
    TransportError,
    RefreshFailed,
    AuthFinal,
    /// The request could not be built, e.g. a credential unusable as a header.
    InvalidRequest,
}

impl DispatchOutcome {
    pub fn label(self) -> &'static str {
        match self {
            DispatchOutcome::Delivered => "delivered",
            DispatchOutcome::Replayed => "replayed",
            DispatchOutcome::TransportError => "transport_error",
            DispatchOutcome::RefreshFailed => "refresh_failed",
            DispatchOutcome::AuthFinal => "auth_final",
            DispatchOutcome::InvalidRequest => "invalid_request",
        }
    }
}

pub fn record_dispatch(outcome: DispatchOutcome) {
    metrics::counter!(DISPATCH_TOTAL, "outcome" => outcome.label()).increment(1);
}

pub fn record_refresh(success: bool, waiters: usize, duration_secs: f64) {
    let outcome = if success { "success" } else { "failure" };
    metrics::counter!(REFRESH_TOTAL, "outcome" => outcome).increment(1);
    metrics::histogram!(REFRESH_WAITERS).record(waiters as f64);
    metrics::histogram!(REFRESH_DURATION, "outcome" => outcome).record(duration_secs);
}
