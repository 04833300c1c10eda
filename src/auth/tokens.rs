//! Token and user storage with atomic session swaps.
//!
//! Both tokens and the cached user record live behind one lock, so a
//! concurrent reader never observes an access token without its companion
//! refresh token or a stale half of a session. State is mirrored to the
//! injected `KeyValueStore`; persistence failures are logged and do not
//! poison the in-memory session.

use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine as _};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Deserialize;
use tracing::{debug, warn};

use crate::models::UserRecord;
use crate::storage::KeyValueStore;

const ACCESS_TOKEN_KEY: &str = "access_token";
const REFRESH_TOKEN_KEY: &str = "refresh_token";
const USER_KEY: &str = "user";

#[derive(Default)]
struct SessionState {
    access: Option<String>,
    refresh: Option<String>,
    user: Option<UserRecord>,
}

pub struct TokenStore {
    store: Box<dyn KeyValueStore>,
    state: RwLock<SessionState>,
}

impl TokenStore {
    /// Create a store, seeding in-memory state from whatever the backend
    /// already holds.
    pub fn new(store: Box<dyn KeyValueStore>) -> Self {
        let access = Self::load(&*store, ACCESS_TOKEN_KEY);
        let refresh = Self::load(&*store, REFRESH_TOKEN_KEY);
        // A lone token is useless; only restore complete pairs, and scrub
        // the incomplete half from the backend so it cannot outlive the
        // session it belonged to.
        let (access, refresh) = match (access, refresh) {
            (Some(a), Some(r)) => (Some(a), Some(r)),
            (None, None) => (None, None),
            _ => {
                warn!("Discarding incomplete persisted token pair");
                for key in [ACCESS_TOKEN_KEY, REFRESH_TOKEN_KEY] {
                    if let Err(e) = store.remove(key) {
                        warn!(key, error = %e, "Failed to remove persisted session value");
                    }
                }
                (None, None)
            }
        };
        let user = Self::load(&*store, USER_KEY).and_then(|raw| {
            serde_json::from_str(&raw)
                .map_err(|e| warn!(error = %e, "Discarding unparsable persisted user record"))
                .ok()
        });

        Self {
            store,
            state: RwLock::new(SessionState {
                access,
                refresh,
                user,
            }),
        }
    }

    fn load(store: &dyn KeyValueStore, key: &str) -> Option<String> {
        match store.get(key) {
            Ok(value) => value,
            Err(e) => {
                warn!(key, error = %e, "Failed to read persisted session value");
                None
            }
        }
    }

    fn persist(&self, key: &str, value: &str) {
        if let Err(e) = self.store.set(key, value) {
            warn!(key, error = %e, "Failed to persist session value");
        }
    }

    fn unpersist(&self, key: &str) {
        if let Err(e) = self.store.remove(key) {
            warn!(key, error = %e, "Failed to remove persisted session value");
        }
    }

    pub fn access_token(&self) -> Option<String> {
        self.state.read().access.clone()
    }

    pub fn refresh_token(&self) -> Option<String> {
        self.state.read().refresh.clone()
    }

    pub fn user(&self) -> Option<UserRecord> {
        self.state.read().user.clone()
    }

    /// Replace both tokens in one atomic swap.
    pub fn set_tokens(&self, access: &str, refresh: &str) {
        let mut state = self.state.write();
        state.access = Some(access.to_string());
        state.refresh = Some(refresh.to_string());
        self.persist(ACCESS_TOKEN_KEY, access);
        self.persist(REFRESH_TOKEN_KEY, refresh);
        debug!("Session tokens updated");
    }

    pub fn set_user(&self, user: UserRecord) {
        let mut state = self.state.write();
        match serde_json::to_string(&user) {
            Ok(raw) => self.persist(USER_KEY, &raw),
            Err(e) => warn!(error = %e, "Failed to serialize user record"),
        }
        state.user = Some(user);
    }

    /// Drop tokens and user together. Safe to call on an already-empty
    /// store; the backend keys are removed unconditionally, so a durable
    /// value the in-memory session never saw still gets purged.
    pub fn clear(&self) {
        let mut state = self.state.write();
        *state = SessionState::default();
        self.unpersist(ACCESS_TOKEN_KEY);
        self.unpersist(REFRESH_TOKEN_KEY);
        self.unpersist(USER_KEY);
        debug!("Session cleared");
    }

    /// Expiry heuristic: decode the JWT `exp` claim without verifying the
    /// signature. Returns `true` when the claim is missing, malformed, or
    /// in the past. This only exists to skip doomed calls; the server
    /// enforces expiry on every request regardless.
    pub fn is_expired(token: &str) -> bool {
        match token_expiry(token) {
            Some(expiry) => expiry <= Utc::now(),
            None => true,
        }
    }
}

#[derive(Deserialize)]
struct ExpClaim {
    exp: i64,
}

fn token_expiry(token: &str) -> Option<DateTime<Utc>> {
    let payload = token.split('.').nth(1)?;
    let bytes = URL_SAFE_NO_PAD.decode(payload.as_bytes()).ok()?;
    let claim: ExpClaim = serde_json::from_slice(&bytes).ok()?;
    DateTime::from_timestamp(claim.exp, 0)
}

#[cfg(test)]
pub(crate) mod testing {
    use base64::Engine as _;

    use super::*;

    /// Build an unsigned JWT whose `exp` claim sits `ttl_secs` from now
    /// (negative for already-expired tokens).
    pub(crate) fn bearer_token(ttl_secs: i64) -> String {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(
            serde_json::json!({ "sub": "u-1", "exp": Utc::now().timestamp() + ttl_secs })
                .to_string(),
        );
        format!("{header}.{payload}.test-signature")
    }
}
