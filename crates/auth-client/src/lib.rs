//! Authenticated API client with single-flight credential refresh
//!
//! Builds on `auth-session` (who is calling) and `transport` (how bytes move)
//! to make credential expiry invisible to callers:
//!
//! - `Dispatcher` injects the current credential into every request and
//!   classifies responses; a first 401 becomes refresh-then-replay-once.
//! - `RefreshCoordinator` guarantees at most one refresh call in flight, no
//!   matter how many requests expire together, and settles every waiter in
//!   arrival order.
//! - A failed refresh tears the session down exactly once and broadcasts
//!   `AuthEvent::LoggedOut`.
//!
//! `ApiClient` wires the pieces together for applications.

pub mod classify;
pub mod client;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod queue;
pub mod telemetry;

#[cfg(test)]
mod test_support;

pub use classify::{Disposition, FinalReason, RefreshPolicy, classify};
pub use client::{ApiClient, ClientOptions};
pub use coordinator::{AuthEvent, LogoutReason, RefreshConfig, RefreshCoordinator, RefreshPhase};
pub use dispatcher::Dispatcher;
pub use error::{Error, Result};
pub use queue::{PendingRequest, RefreshFailure, Replay, RetryBatch, RetryQueue};
