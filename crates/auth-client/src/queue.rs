//! Retry queue
//!
//! Holds the requests that hit a 401 while a refresh is pending. Each entry
//! keeps the original request (authorization stripped) and a one-shot reply
//! channel back to the caller waiting on it. When the refresh settles the
//! coordinator takes the whole queue as a `RetryBatch` and settles every entry
//! exactly once, in arrival order: on success each caller receives its own
//! request re-stamped with the new credential, ready to replay; on failure each
//! caller receives the refresh error.

use std::collections::VecDeque;
use std::time::Instant;

use auth_session::Credential;
use tokio::sync::oneshot;
use tracing::debug;
use transport::ApiRequest;

/// A request ready to be replayed with a renewed credential.
#[derive(Debug, Clone)]
pub struct Replay {
    pub request: ApiRequest,
    pub credential: Credential,
}

impl Replay {
    /// Stamp `request` with `credential`. The request keeps its method, path,
    /// body, non-auth headers and retried flag.
    pub fn prepare(request: &ApiRequest, credential: Credential) -> Result<Self, RefreshFailure> {
        let mut request = request.without_authorization();
        request
            .set_bearer(credential.as_str())
            .map_err(|e| RefreshFailure(format!("renewed credential unusable: {e}")))?;
        Ok(Self {
            request,
            credential,
        })
    }
}

/// Why a refresh cycle failed, as delivered to every waiter.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("{0}")]
pub struct RefreshFailure(pub String);

/// What a waiter receives when the refresh settles.
pub type ReplayOutcome = Result<Replay, RefreshFailure>;

/// A caller waiting on the in-flight refresh.
#[derive(Debug)]
pub struct PendingRequest {
    request: ApiRequest,
    reply: oneshot::Sender<ReplayOutcome>,
    enqueued_at: Instant,
}

impl PendingRequest {
    pub fn new(request: ApiRequest, reply: oneshot::Sender<ReplayOutcome>) -> Self {
        Self {
            request: request.without_authorization(),
            reply,
            enqueued_at: Instant::now(),
        }
    }

    pub fn request(&self) -> &ApiRequest {
        &self.request
    }

    /// Deliver the outcome. Returns false if the caller stopped waiting.
    fn settle(self, outcome: ReplayOutcome) -> bool {
        self.reply.send(outcome).is_ok()
    }
}

/// FIFO queue of waiters for the current refresh cycle.
#[derive(Debug, Default)]
pub struct RetryQueue {
    waiters: VecDeque<PendingRequest>,
}

impl RetryQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a waiter; returns its 1-based position.
    pub fn push(&mut self, pending: PendingRequest) -> usize {
        self.waiters.push_back(pending);
        self.waiters.len()
    }

    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Take every waiter, leaving the queue empty for the next cycle.
    pub fn take(&mut self) -> RetryBatch {
        RetryBatch {
            waiters: std::mem::take(&mut self.waiters),
        }
    }
}

/// The waiters of one settled cycle, consumed exactly once.
#[derive(Debug)]
pub struct RetryBatch {
    waiters: VecDeque<PendingRequest>,
}

impl RetryBatch {
    pub fn len(&self) -> usize {
        self.waiters.len()
    }

    pub fn is_empty(&self) -> bool {
        self.waiters.is_empty()
    }

    /// Requests in delivery order.
    pub fn requests(&self) -> impl Iterator<Item = &ApiRequest> {
        self.waiters.iter().map(PendingRequest::request)
    }

    /// Hand each waiter its request stamped with `credential`, oldest first.
    /// Returns how many callers were still waiting.
    pub fn resolve(self, credential: &Credential) -> usize {
        let mut delivered = 0;
        for (position, pending) in self.waiters.into_iter().enumerate() {
            let outcome = Replay::prepare(&pending.request, credential.clone());
            let waited_ms = pending.enqueued_at.elapsed().as_millis() as u64;
            if pending.settle(outcome) {
                delivered += 1;
                debug!(position, waited_ms, "waiter resolved");
            } else {
                debug!(position, "waiter dropped before refresh settled");
            }
        }
        delivered
    }

    /// Fail each waiter with `failure`, oldest first.
    /// Returns how many callers were still waiting.
    pub fn reject(self, failure: &RefreshFailure) -> usize {
        let mut delivered = 0;
        for (position, pending) in self.waiters.into_iter().enumerate() {
            if pending.settle(Err(failure.clone())) {
                delivered += 1;
            } else {
                debug!(position, "waiter dropped before refresh settled");
            }
        }
        delivered
    }
}
