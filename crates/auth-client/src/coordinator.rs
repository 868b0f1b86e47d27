//! Single-flight credential refresh
//!
//! The coordinator is a two-state machine guarded by a tokio Mutex:
//!
//! - `Idle` + caller → `Refreshing`: the caller becomes the first waiter and
//!   exactly one refresh call is spawned.
//! - `Refreshing` + caller → the caller is queued; no new call.
//! - refresh settles → the queue is taken and the state reset to `Idle` in the
//!   same critical section, then every waiter is settled in arrival order.
//!
//! The check-and-set into `Refreshing` happens under the lock, so the number of
//! refresh calls equals the number of transitions into `Refreshing`, never the
//! number of waiters. The refresh itself runs on a spawned task: if the caller
//! that started it is cancelled, the cycle still settles for everyone else.
//!
//! A request rejected with a credential that an already-settled cycle replaced
//! is replayed with the stored credential instead of starting a new cycle; the
//! check runs under the same lock, so it cannot race a settling refresh.
//!
//! On failure the session is torn down once per cycle (store cleared, then
//! `AuthEvent::LoggedOut` broadcast) before waiters are rejected, so a rejected
//! caller that reads the store sees it logged out.
//!
//! Both the store write and the teardown are conditional on the store still
//! holding the credential the refresh started from. A logout or a new login
//! during the call wins: the refresh result is dropped and waiters are
//! rejected without a `LoggedOut` event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use auth_session::{Credential, SessionStore, sanitize};
use common::Secret;
use tokio::sync::{Mutex, MutexGuard, broadcast, oneshot};
use tracing::{debug, info, warn};
use transport::{ApiRequest, Transport};

use crate::error::{Error, Result};
use crate::queue::{PendingRequest, RefreshFailure, Replay, ReplayOutcome, RetryQueue};
use crate::telemetry;

/// Capacity of the auth event channel. Slow subscribers lose old events.
const EVENT_CAPACITY: usize = 16;

/// Refresh state machine phase.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RefreshPhase {
    Idle,
    Refreshing,
}

/// Why the session ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogoutReason {
    /// The refresh call failed; the message is the refresh error.
    RefreshFailed(String),
    /// The application logged out explicitly.
    UserLogout,
}

/// Session lifecycle notifications for the surrounding application.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthEvent {
    /// A refresh cycle succeeded and `waiters` callers were released.
    Refreshed { cycle: u64, waiters: usize },
    /// The session was torn down. React by returning to a public view.
    LoggedOut { reason: LogoutReason },
}

/// Refresh endpoint settings.
#[derive(Debug, Clone)]
pub struct RefreshConfig {
    pub refresh_path: String,
    /// Long-lived refresh token sent in the body. `None` relies on the
    /// server's refresh cookie.
    pub refresh_token: Option<Secret<String>>,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            refresh_path: auth_session::REFRESH_PATH.to_string(),
            refresh_token: None,
        }
    }
}

#[derive(Debug)]
struct RefreshState {
    phase: RefreshPhase,
    queue: RetryQueue,
    cycle: u64,
}

impl RefreshState {
    /// Atomic `Idle → Refreshing`. Returns false if a refresh is already in flight.
    fn begin(&mut self) -> bool {
        if self.phase == RefreshPhase::Refreshing {
            return false;
        }
        self.phase = RefreshPhase::Refreshing;
        self.cycle += 1;
        true
    }

    /// `Refreshing → Idle`, taking the waiters of the finished cycle.
    fn finish(&mut self) -> crate::queue::RetryBatch {
        self.phase = RefreshPhase::Idle;
        self.queue.take()
    }
}

struct Inner {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    config: RefreshConfig,
    state: Mutex<RefreshState>,
    events: broadcast::Sender<AuthEvent>,
    refresh_calls: AtomicU64,
}

/// Shared handle to the refresh state machine. Clones share state.
#[derive(Clone)]
pub struct RefreshCoordinator {
    inner: Arc<Inner>,
}

impl RefreshCoordinator {
    pub fn new(
        transport: Arc<dyn Transport>,
        session: Arc<SessionStore>,
        config: RefreshConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            inner: Arc::new(Inner {
                transport,
                session,
                config,
                state: Mutex::new(RefreshState {
                    phase: RefreshPhase::Idle,
                    queue: RetryQueue::new(),
                    cycle: 0,
                }),
                events,
                refresh_calls: AtomicU64::new(0),
            }),
        }
    }

    pub fn refresh_path(&self) -> &str {
        &self.inner.config.refresh_path
    }

    pub fn session(&self) -> &Arc<SessionStore> {
        &self.inner.session
    }

    /// Number of refresh calls issued so far.
    pub fn refresh_count(&self) -> u64 {
        self.inner.refresh_calls.load(Ordering::SeqCst)
    }

    pub async fn phase(&self) -> RefreshPhase {
        self.inner.state.lock().await.phase
    }

    /// Callers currently waiting on the in-flight refresh.
    pub async fn waiting(&self) -> usize {
        self.inner.state.lock().await.queue.len()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<AuthEvent> {
        self.inner.events.subscribe()
    }

    pub(crate) fn emit(&self, event: AuthEvent) {
        // No subscribers is fine: nobody needs to react.
        let _ = self.inner.events.send(event);
    }

    /// Wait for a renewed credential on behalf of `request`.
    ///
    /// Starts a refresh if none is in flight, otherwise joins the current one.
    /// Returns `request` stamped with the new credential, or `RefreshFailed`.
    pub async fn await_refresh(&self, request: ApiRequest) -> Result<Replay> {
        let state = self.inner.state.lock().await;
        self.enqueue(state, request).await
    }

    /// Like `await_refresh`, for a request that was rejected while carrying
    /// `sent_with`. If no refresh is in flight and the store already holds a
    /// different credential, a previous cycle renewed it after the request
    /// left: the request is stamped with it directly and no call is made.
    /// If the store holds no credential at all, the session ended after the
    /// request left and the request fails without a refresh.
    pub async fn renew(
        &self,
        request: ApiRequest,
        sent_with: Option<&Credential>,
    ) -> Result<Replay> {
        let state = self.inner.state.lock().await;
        if state.phase == RefreshPhase::Idle {
            match (self.inner.session.credential(), sent_with) {
                (None, Some(_)) => {
                    debug!("session ended after the request was sent, not refreshing");
                    return Err(Error::RefreshFailed("session ended".into()));
                }
                (Some(current), _) if Some(&current) != sent_with => {
                    drop(state);
                    debug!("credential already renewed, replaying directly");
                    return Replay::prepare(&request, current)
                        .map_err(|e| Error::InvalidRequest(e.0));
                }
                _ => {}
            }
        }
        self.enqueue(state, request).await
    }

    async fn enqueue(
        &self,
        mut state: MutexGuard<'_, RefreshState>,
        request: ApiRequest,
    ) -> Result<Replay> {
        let (tx, rx) = oneshot::channel::<ReplayOutcome>();
        let started = state.begin();
        let position = state.queue.push(PendingRequest::new(request, tx));
        let cycle = state.cycle;
        // Read while the cycle is claimed so a logout after this point is seen.
        let expired = started.then(|| self.inner.session.credential());
        drop(state);

        if let Some(expired) = expired {
            info!(cycle, "credential expired, starting refresh");
            tokio::spawn(run_refresh(self.clone(), cycle, expired));
        } else {
            debug!(cycle, position, "refresh in flight, queued behind it");
        }

        match rx.await {
            Ok(Ok(replay)) => Ok(replay),
            Ok(Err(failure)) => Err(Error::RefreshFailed(failure.0)),
            Err(_) => Err(Error::RefreshFailed(
                "refresh ended without settling waiters".into(),
            )),
        }
    }

    /// Call the refresh endpoint once and store the result, unless the
    /// session moved on (logout or a new login) while the call was out.
    async fn refresh_credential(
        &self,
        cycle: u64,
        expired: Option<Credential>,
    ) -> CycleOutcome {
        self.inner.refresh_calls.fetch_add(1, Ordering::SeqCst);
        let response = auth_session::refresh_token(
            self.inner.transport.as_ref(),
            &self.inner.config.refresh_path,
            self.inner
                .config
                .refresh_token
                .as_ref()
                .map(|token| token.expose().as_str()),
            expired.as_ref().map(Credential::as_str),
        )
        .await;

        let failure = match response {
            Ok(response) => match sanitize(&response.token) {
                Some(credential) => {
                    let stored = self
                        .inner
                        .session
                        .replace_credential_if(expired.as_ref(), credential.as_str())
                        .await;
                    return if stored {
                        CycleOutcome::Renewed(credential)
                    } else {
                        CycleOutcome::Superseded
                    };
                }
                None => RefreshFailure("refresh returned an empty token".into()),
            },
            Err(e) => RefreshFailure(e.to_string()),
        };

        warn!(cycle, error = %failure, "credential refresh failed, ending session");
        if self.inner.session.clear_if(expired.as_ref()).await {
            CycleOutcome::Failed(failure)
        } else {
            CycleOutcome::Superseded
        }
    }
}

/// How a refresh cycle ended, after the session store was updated.
enum CycleOutcome {
    /// New credential stored.
    Renewed(Credential),
    /// The session was cleared or replaced during the call; nothing stored.
    Superseded,
    /// The call failed and the session was torn down.
    Failed(RefreshFailure),
}

/// One refresh cycle: call, update or tear down the session, settle waiters.
async fn run_refresh(
    coordinator: RefreshCoordinator,
    cycle: u64,
    expired: Option<Credential>,
) {
    let started_at = Instant::now();
    let outcome = coordinator.refresh_credential(cycle, expired).await;

    let batch = coordinator.inner.state.lock().await.finish();
    let waiters = batch.len();
    telemetry::record_refresh(
        matches!(outcome, CycleOutcome::Renewed(_)),
        waiters,
        started_at.elapsed().as_secs_f64(),
    );

    match outcome {
        CycleOutcome::Renewed(credential) => {
            let delivered = batch.resolve(&credential);
            info!(cycle, waiters, delivered, "credential refreshed");
            coordinator.emit(AuthEvent::Refreshed { cycle, waiters });
        }
        CycleOutcome::Superseded => {
            let failure =
                RefreshFailure("session ended while the credential was being refreshed".into());
            let delivered = batch.reject(&failure);
            info!(
                cycle,
                waiters, delivered, "session changed during refresh, waiters rejected"
            );
        }
        CycleOutcome::Failed(failure) => {
            let delivered = batch.reject(&failure);
            debug!(cycle, waiters, delivered, "waiters rejected");
            coordinator.emit(AuthEvent::LoggedOut {
                reason: LogoutReason::RefreshFailed(failure.0),
            });
        }
    }
}
