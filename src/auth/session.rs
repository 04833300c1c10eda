//! Session lifecycle against the identity endpoints.
//!
//! Login, registration, and social login all return the same
//! `{accessToken, refreshToken, user}` shape and seed the token store the
//! same way. Logout revokes the refresh token best-effort: a flaky server
//! must never block local sign-out.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::api::transport::{Transport, TransportRequest};
use crate::api::ApiError;
use crate::models::UserRecord;

use super::TokenStore;

/// Details for creating a new account.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewAccount {
    pub email: String,
    pub password: String,
    pub display_name: String,
}

/// An established session as returned by the identity endpoints.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub access_token: String,
    pub refresh_token: String,
    pub user: UserRecord,
}

pub struct SessionManager {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    base_url: String,
}

impl SessionManager {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenStore>, base_url: &str) -> Self {
        Self {
            transport,
            tokens,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        info!(email, "Logging in");
        let body = serde_json::json!({ "email": email, "password": password });
        self.establish("/auth/login", body).await
    }

    pub async fn register(&self, account: &NewAccount) -> Result<Session, ApiError> {
        info!(email = %account.email, "Registering account");
        let body =
            serde_json::to_value(account).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.establish("/auth/register", body).await
    }

    pub async fn social_login(&self, provider: &str, code: &str) -> Result<Session, ApiError> {
        info!(provider, "Social login");
        let body = serde_json::json!({ "code": code });
        self.establish(&format!("/auth/social/{}", provider), body).await
    }

    /// Call an identity endpoint and seed the token store from its
    /// response. Provider errors (e.g. invalid credentials) propagate
    /// unchanged as HTTP errors.
    async fn establish(&self, path: &str, body: serde_json::Value) -> Result<Session, ApiError> {
        let request = TransportRequest::post(self.url_for(path)).with_body(body);
        let response = self.transport.send(request).await?;

        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }

        let session: Session = serde_json::from_str(&response.body)
            .map_err(|e| ApiError::InvalidResponse(format!("identity response: {e}")))?;

        self.tokens
            .set_tokens(&session.access_token, &session.refresh_token);
        self.tokens.set_user(session.user.clone());
        info!(user = %session.user.email, "Session established");
        Ok(session)
    }

    /// Best-effort revoke, then unconditional local teardown.
    pub async fn logout(&self) {
        if let Some(refresh_token) = self.tokens.refresh_token() {
            let request = TransportRequest::post(self.url_for("/auth/logout"))
                .with_body(serde_json::json!({ "refreshToken": refresh_token }));
            match self.transport.send(request).await {
                Ok(response) if response.is_success() => debug!("Refresh token revoked"),
                Ok(response) => warn!(status = response.status, "Logout revoke rejected"),
                Err(e) => warn!(error = %e, "Logout revoke unreachable"),
            }
        }

        self.tokens.clear();
        info!("Signed out");
    }

    /// Cheap, synchronous gate for UI: token present and not past its
    /// claimed expiry. No network; may read slightly stale until the next
    /// real request refreshes the session.
    pub fn is_authenticated(&self) -> bool {
        match self.tokens.access_token() {
            Some(token) => !TokenStore::is_expired(&token),
            None => false,
        }
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.tokens.user()
    }
}
