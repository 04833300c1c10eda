//! Request executor: attaches bearer tokens, detects expiry, and retries
//! once behind the single-flight refresh.
//!
//! The retry path is a separate primitive that always carries an explicit
//! token and never consults the refresh coordinator, which makes the
//! "no second refresh" invariant structural rather than incidental.

use std::sync::Arc;

use reqwest::Method;
use serde::{de::DeserializeOwned, Serialize};
use tracing::{debug, warn};

use crate::auth::{RefreshCoordinator, TokenStore};

use super::transport::{Transport, TransportRequest, TransportResponse};
use super::ApiError;

/// Deserialized response body: JSON when the server says so, raw text
/// otherwise.
#[derive(Debug, Clone)]
pub enum Payload {
    Json(serde_json::Value),
    Text(String),
}

impl Payload {
    /// Reinterpret the payload as a caller-chosen type. Text payloads are
    /// parsed as JSON too, since some endpoints omit the content type.
    pub fn parse<T: DeserializeOwned>(self) -> Result<T, ApiError> {
        match self {
            Payload::Json(value) => {
                serde_json::from_value(value).map_err(|e| ApiError::InvalidResponse(e.to_string()))
            }
            Payload::Text(text) => {
                serde_json::from_str(&text).map_err(|e| ApiError::InvalidResponse(e.to_string()))
            }
        }
    }
}

/// Authenticated request executor for the PipeForge API.
pub struct ApiClient {
    transport: Arc<dyn Transport>,
    tokens: Arc<TokenStore>,
    refresher: RefreshCoordinator,
    base_url: String,
}

impl ApiClient {
    pub fn new(transport: Arc<dyn Transport>, tokens: Arc<TokenStore>, base_url: &str) -> Self {
        let refresher = RefreshCoordinator::new(transport.clone(), tokens.clone(), base_url);
        Self {
            transport,
            tokens,
            refresher,
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }

    fn url_for(&self, path: &str) -> String {
        if path.starts_with("http://") || path.starts_with("https://") {
            path.to_string()
        } else {
            format!("{}{}", self.base_url, path)
        }
    }

    /// Perform a request. With `requires_auth`, the current access token is
    /// attached and a 401 triggers one refresh-and-retry cycle; without it,
    /// the call goes out bare and a 401 surfaces as a plain HTTP error.
    pub async fn execute(
        &self,
        method: Method,
        path: &str,
        body: Option<serde_json::Value>,
        requires_auth: bool,
    ) -> Result<Payload, ApiError> {
        let url = self.url_for(path);

        let token = if requires_auth {
            match self.tokens.access_token() {
                Some(token) => Some(token),
                None => {
                    debug!(url = %url, "Rejecting authenticated request with no stored token");
                    return Err(ApiError::NotAuthenticated);
                }
            }
        } else {
            None
        };

        let mut request = TransportRequest::new(method.clone(), url.as_str());
        if let Some(ref token) = token {
            request = request.with_bearer(token.as_str());
        }
        if let Some(ref body) = body {
            request = request.with_body(body.clone());
        }

        let response = self.transport.send(request).await?;

        if response.status == 401 && requires_auth {
            debug!(url = %url, "Request unauthorized, attempting token refresh");
            return self.retry_after_refresh(method, &url, body).await;
        }

        Self::into_payload(response)
    }

    /// The single refresh-and-retry cycle for a request that came back 401.
    /// Carries the freshly issued token explicitly; a second 401 is
    /// terminal and tears the session down.
    async fn retry_after_refresh(
        &self,
        method: Method,
        url: &str,
        body: Option<serde_json::Value>,
    ) -> Result<Payload, ApiError> {
        let token = match self.refresher.refresh().await {
            Ok(token) => token,
            Err(e) => {
                warn!(url = %url, error = %e, "Token refresh failed, tearing down session");
                self.tokens.clear();
                return Err(ApiError::AuthExpired);
            }
        };

        let mut request = TransportRequest::new(method, url).with_bearer(token);
        if let Some(body) = body {
            request = request.with_body(body);
        }
        let response = self.transport.send(request).await?;

        if response.status == 401 {
            warn!(url = %url, "Request still unauthorized after refresh");
            self.tokens.clear();
            return Err(ApiError::AuthExpired);
        }

        Self::into_payload(response)
    }

    fn into_payload(response: TransportResponse) -> Result<Payload, ApiError> {
        if !response.is_success() {
            return Err(ApiError::from_response(&response));
        }
        if response.is_json() {
            let value = serde_json::from_str(&response.body)
                .map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
            Ok(Payload::Json(value))
        } else {
            Ok(Payload::Text(response.body))
        }
    }

    // ===== Typed convenience methods (the surface pages use) =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.execute(Method::GET, path, None, true).await?.parse()
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.execute(Method::POST, path, Some(body), true)
            .await?
            .parse()
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        let body = serde_json::to_value(body).map_err(|e| ApiError::InvalidResponse(e.to_string()))?;
        self.execute(Method::PUT, path, Some(body), true)
            .await?
            .parse()
    }

    /// DELETE, discarding whatever body the server returns.
    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.execute(Method::DELETE, path, None, true).await?;
        Ok(())
    }
}
