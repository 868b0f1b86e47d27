//! Request dispatch with transparent credential renewal
//!
//! Every outbound call goes through `Dispatcher::dispatch`: the current
//! credential is injected, the response classified, and a first 401 is turned
//! into refresh-then-replay-once. Responses that never see a 401 do not touch
//! the coordinator at all.

use std::sync::Arc;

use auth_session::{Credential, SessionStore};
use tracing::{debug, instrument, warn};
use transport::{ApiRequest, ApiResponse, Transport};

use crate::classify::{Disposition, RefreshPolicy, classify};
use crate::coordinator::RefreshCoordinator;
use crate::error::{Error, Result};
use crate::queue::Replay;
use crate::telemetry::{self, DispatchOutcome};

#[derive(Clone)]
pub struct Dispatcher {
    transport: Arc<dyn Transport>,
    session: Arc<SessionStore>,
    coordinator: RefreshCoordinator,
    policy: RefreshPolicy,
}

impl Dispatcher {
    pub fn new(
        transport: Arc<dyn Transport>,
        coordinator: RefreshCoordinator,
        policy: RefreshPolicy,
    ) -> Self {
        Self {
            transport,
            session: coordinator.session().clone(),
            coordinator,
            policy,
        }
    }

    pub fn policy(&self) -> RefreshPolicy {
        self.policy
    }

    pub fn coordinator(&self) -> &RefreshCoordinator {
        &self.coordinator
    }

    /// Send `request` with the current credential.
    ///
    /// Every non-401 status comes back as `Ok`. A 401 on a fresh request is
    /// recovered by refreshing and replaying once; what the caller sees is the
    /// replay's response, `RefreshFailed`, or `AuthFinal`.
    pub async fn dispatch(&self, request: ApiRequest) -> Result<ApiResponse> {
        let request_id = format!("req_{}", uuid::Uuid::new_v4().as_simple());
        self.dispatch_with_id(request, request_id).await
    }

    #[instrument(skip_all, fields(request_id = %request_id, method = %request.method(), path = %request.path()))]
    async fn dispatch_with_id(&self, request: ApiRequest, request_id: String) -> Result<ApiResponse> {
        let result = self.run(request).await;
        let outcome = outcome_of(&result);
        telemetry::record_dispatch(outcome);
        debug!(outcome = outcome.label(), "dispatch finished");
        result.map(|(response, _)| response)
    }

    /// Returns the final response and whether it came from a replay.
    async fn run(&self, request: ApiRequest) -> Result<(ApiResponse, bool)> {
        let sent_with = self.session.credential();
        let outgoing = stamp(&request, sent_with.as_ref())?;
        let response = self.transport.send(&outgoing).await?;

        match classify(
            &outgoing,
            &response,
            self.coordinator.refresh_path(),
            self.policy,
        ) {
            Disposition::Deliver => Ok((response, false)),
            Disposition::AuthFinal(reason) => {
                warn!(reason = reason.describe(), "unauthorized, not refreshing");
                Err(Error::AuthFinal(reason.describe().to_string()))
            }
            Disposition::CredentialExpired => {
                let mut retry = outgoing.without_authorization();
                retry.mark_retried();
                let replay = self
                    .coordinator
                    .renew(retry, sent_with.as_ref())
                    .await?;
                self.replay(replay).await.map(|response| (response, true))
            }
        }
    }

    async fn replay(&self, replay: Replay) -> Result<ApiResponse> {
        let response = self.transport.send(&replay.request).await?;
        match classify(
            &replay.request,
            &response,
            self.coordinator.refresh_path(),
            self.policy,
        ) {
            Disposition::AuthFinal(reason) => {
                warn!(reason = reason.describe(), "replay rejected");
                Err(Error::AuthFinal(reason.describe().to_string()))
            }
            // A replay is always marked retried, so a 401 never classifies as
            // expired again.
            Disposition::Deliver | Disposition::CredentialExpired => Ok(response),
        }
    }
}

fn outcome_of(result: &Result<(ApiResponse, bool)>) -> DispatchOutcome {
    match result {
        Ok((_, false)) => DispatchOutcome::Delivered,
        Ok((_, true)) => DispatchOutcome::Replayed,
        Err(Error::Transport(_)) => DispatchOutcome::TransportError,
        Err(Error::RefreshFailed(_)) => DispatchOutcome::RefreshFailed,
        Err(Error::AuthFinal(_) | Error::Auth(_)) => DispatchOutcome::AuthFinal,
        Err(Error::InvalidRequest(_)) => DispatchOutcome::InvalidRequest,
    }
}

/// Copy of `request` carrying `credential`, or no authorization at all.
fn stamp(request: &ApiRequest, credential: Option<&Credential>) -> Result<ApiRequest> {
    let mut outgoing = request.without_authorization();
    if let Some(credential) = credential {
        outgoing
            .set_bearer(credential.as_str())
            .map_err(|e| Error::InvalidRequest(e.to_string()))?;
    }
    Ok(outgoing)
}
