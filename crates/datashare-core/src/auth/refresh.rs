//! Single-flight refresh coordination.
//!
//! Any number of requests can observe an authentication rejection in the
//! same window; exactly one refresh network call may be outstanding for the
//! episode. The first caller to find the coordinator idle becomes the
//! leader and owns that call. Everyone else enqueues as a waiter and is
//! resolved, in enqueue order, when the episode concludes. Every
//! participant ends in a terminal state - resolved and resubmitted, or
//! rejected - no request is silently dropped.
//!
//! State classification happens synchronously under a lock that is never
//! held across an await, so two callers can never both see "idle".

use std::sync::{Arc, Mutex, MutexGuard};

use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::transport::{ApiRequest, Transport};
use crate::api::ApiError;
use crate::auth::recovery::RecoveryController;
use crate::auth::store::TokenStore;
use crate::models::TokenPair;

/// Episode outcome delivered to queued waiters. Cloneable so one failure
/// fans out to every participant.
#[derive(Debug, Clone)]
pub(crate) struct RefreshError {
    pub message: String,
}

enum EpisodeState {
    Idle,
    Refreshing {
        waiters: Vec<oneshot::Sender<Result<(), RefreshError>>>,
    },
}

/// How a caller participates in the current episode.
enum Role {
    /// Coordinator was idle; this caller owns the one refresh call.
    Leader,
    /// An episode is in flight; await its outcome.
    Follower(oneshot::Receiver<Result<(), RefreshError>>),
    /// Refresh credential absent or expired; no episode is worth starting.
    Denied,
}

pub struct RefreshCoordinator {
    state: Mutex<EpisodeState>,
    store: Arc<TokenStore>,
    recovery: Arc<RecoveryController>,
    transport: Arc<dyn Transport>,
    refresh_path: String,
}

impl RefreshCoordinator {
    pub fn new(
        store: Arc<TokenStore>,
        recovery: Arc<RecoveryController>,
        transport: Arc<dyn Transport>,
        refresh_path: &str,
    ) -> Self {
        Self {
            state: Mutex::new(EpisodeState::Idle),
            store,
            recovery,
            transport,
            refresh_path: refresh_path.to_string(),
        }
    }

    fn lock_state(&self) -> MutexGuard<'_, EpisodeState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Classify the caller. The credential gate runs first: a dead refresh
    /// credential means recovery, not a doomed round-trip, and the state
    /// machine is never entered.
    fn begin(&self) -> Role {
        if !self.store.is_authenticated() {
            return Role::Denied;
        }

        let mut state = self.lock_state();
        match &mut *state {
            EpisodeState::Refreshing { waiters } => {
                let (tx, rx) = oneshot::channel();
                waiters.push(tx);
                debug!(queued = waiters.len(), "request queued behind in-flight refresh");
                Role::Follower(rx)
            }
            EpisodeState::Idle => {
                *state = EpisodeState::Refreshing {
                    waiters: Vec::new(),
                };
                Role::Leader
            }
        }
    }

    /// Conclude the episode: back to idle, then resolve waiters in enqueue
    /// order. Each resumed waiter resubmits its own request; completion
    /// order beyond the FIFO flush is unordered.
    fn finish(&self, outcome: Result<(), RefreshError>) {
        let waiters = {
            let mut state = self.lock_state();
            match std::mem::replace(&mut *state, EpisodeState::Idle) {
                EpisodeState::Refreshing { waiters } => waiters,
                EpisodeState::Idle => Vec::new(),
            }
        };
        for tx in waiters {
            // A waiter may have been dropped; that is its own terminal state.
            let _ = tx.send(outcome.clone());
        }
    }

    /// Entry point for a request that was rejected for authentication.
    /// Returns `Ok(())` once a fresh credential pair is in the store and the
    /// caller should resubmit; any `Err` is terminal for the caller.
    pub async fn recover(&self) -> Result<(), ApiError> {
        match self.begin() {
            Role::Denied => {
                debug!("refresh credential absent or expired, invoking recovery");
                self.recovery.handle().await;
                Err(ApiError::SessionExpired)
            }
            Role::Follower(rx) => match rx.await {
                Ok(Ok(())) => Ok(()),
                Ok(Err(e)) => Err(ApiError::RefreshFailed(e.message)),
                // Leader dropped mid-episode; nothing more will happen.
                Err(_) => Err(ApiError::RefreshFailed(
                    "refresh episode terminated without an outcome".to_string(),
                )),
            },
            Role::Leader => self.run_refresh().await,
        }
    }

    /// Leader path: issue exactly one refresh network call, then conclude
    /// the episode for every participant.
    async fn run_refresh(&self) -> Result<(), ApiError> {
        let result = self.call_refresh_endpoint().await;
        match result {
            Ok(pair) => {
                self.store.set_pair(&pair.access_token, &pair.refresh_token);
                info!("credential refresh succeeded, flushing queued requests");
                self.finish(Ok(()));
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "credential refresh failed, rejecting queued requests");
                let shared = RefreshError {
                    message: e.to_string(),
                };
                self.finish(Err(shared.clone()));
                self.recovery.handle().await;
                Err(ApiError::RefreshFailed(shared.message))
            }
        }
    }

    async fn call_refresh_endpoint(&self) -> Result<TokenPair, ApiError> {
        // begin() verified presence; a concurrent clear between then and now
        // reads as an unusable session.
        let refresh = self
            .store
            .refresh_credential()
            .ok_or(ApiError::SessionExpired)?;

        let req = ApiRequest::post(
            &self.refresh_path,
            serde_json::json!({ "refreshToken": refresh }),
        );
        // The refresh credential rides in the payload; no bearer here.
        let raw = self.transport.send(&req, None).await?;
        if !(200..300).contains(&raw.status) {
            return Err(ApiError::from_status(
                raw.status,
                &String::from_utf8_lossy(&raw.body),
            ));
        }

        let envelope: crate::api::Envelope<TokenPair> = serde_json::from_slice(&raw.body)
            .map_err(|e| ApiError::InvalidResponse(format!("refresh envelope parse failed: {e}")))?;
        if !envelope.success {
            return Err(ApiError::Rejected(envelope.message.unwrap_or_default()));
        }
        envelope
            .data
            .ok_or_else(|| ApiError::InvalidResponse("refresh envelope carried no data".to_string()))
    }
}
