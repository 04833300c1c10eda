//! Single-flight token refresh.
//!
//! Many concurrent callers can discover an expired token at the same
//! instant; only one network call may hit the refresh endpoint per expiry
//! event. The first caller becomes the flight leader, everyone else parks a
//! oneshot waiter and receives a clone of the leader's outcome. The state
//! mutex is never held across an await, so the check-then-set of
//! `in_flight` and the waiter enqueue stay atomic under real parallelism.

use std::sync::Arc;

use parking_lot::Mutex;
use serde::Deserialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use crate::api::transport::{Transport, TransportRequest};
use crate::models::UserRecord;

use super::TokenStore;

/// Wire shape of the refresh endpoint response. Some providers piggyback a
/// fresh user record; it is stored when present.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RefreshResponse {
    access_token: String,
    refresh_token: String,
    #[serde(default)]
    user: Option<UserRecord>,
}

/// Failure modes of a refresh round. Internal: the request executor
/// translates every variant into session teardown, application callers
/// never see this type.
#[derive(Debug, Clone, Error)]
pub enum RefreshError {
    #[error("no refresh token in store")]
    NoRefreshToken,

    #[error("refresh rejected with HTTP {status}")]
    Rejected { status: u16 },

    #[error("network error during refresh: {0}")]
    Network(String),

    #[error("invalid refresh response: {0}")]
    Invalid(String),

    #[error("refresh round dropped before completing")]
    Interrupted,
}

type Outcome = Result<String, RefreshError>;

#[derive(Default)]
struct RefreshState {
    in_flight: bool,
    waiters: Vec<oneshot::Sender<Outcome>>,
}

pub struct RefreshCoordinator {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    refresh_url: String,
    state: Mutex<RefreshState>,
}

impl RefreshCoordinator {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenStore>, base_url: &str) -> Self {
        Self {
            transport,
            tokens,
            refresh_url: format!("{}/auth/refresh", base_url.trim_end_matches('/')),
            state: Mutex::new(RefreshState::default()),
        }
    }

    /// Obtain a fresh access token, coalescing concurrent callers into one
    /// network round. All callers of a round observe the same outcome.
    pub async fn refresh(&self) -> Outcome {
        let waiter = {
            let mut state = self.state.lock();
            if state.in_flight {
                let (tx, rx) = oneshot::channel();
                state.waiters.push(tx);
                Some(rx)
            } else {
                state.in_flight = true;
                None
            }
        };

        if let Some(rx) = waiter {
            debug!("Joining in-flight token refresh");
            return match rx.await {
                Ok(outcome) => outcome,
                Err(_) => Err(RefreshError::Interrupted),
            };
        }

        let outcome = self.refresh_once().await;

        // Reset the flight and drain waiters in one critical section so no
        // late caller can observe waiters pending on a finished round.
        let waiters = {
            let mut state = self.state.lock();
            state.in_flight = false;
            std::mem::take(&mut state.waiters)
        };
        if !waiters.is_empty() {
            debug!(waiters = waiters.len(), "Releasing refresh waiters");
        }
        for tx in waiters {
            let _ = tx.send(outcome.clone());
        }

        outcome
    }

    /// One network round against the refresh endpoint. Only the flight
    /// leader runs this. Failures never clear the token store; that policy
    /// belongs to the caller.
    async fn refresh_once(&self) -> Outcome {
        let Some(refresh_token) = self.tokens.refresh_token() else {
            warn!("Refresh requested with no refresh token in store");
            return Err(RefreshError::NoRefreshToken);
        };

        debug!("Refreshing access token");
        let request = TransportRequest::post(self.refresh_url.as_str())
            .with_body(serde_json::json!({ "refreshToken": refresh_token }));
        let response = self
            .transport
            .send(request)
            .await
            .map_err(|e| RefreshError::Network(e.to_string()))?;

        if !response.is_success() {
            warn!(status = response.status, "Refresh token rejected");
            return Err(RefreshError::Rejected {
                status: response.status,
            });
        }

        let parsed: RefreshResponse = serde_json::from_str(&response.body)
            .map_err(|e| RefreshError::Invalid(e.to_string()))?;

        self.tokens
            .set_tokens(&parsed.access_token, &parsed.refresh_token);
        if let Some(user) = parsed.user {
            self.tokens.set_user(user);
        }

        info!("Access token refreshed");
        Ok(parsed.access_token)
    }
}
