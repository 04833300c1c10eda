//! PipeForge API client library.
//!
//! Authenticated HTTP client for the PipeForge learning platform: bearer
//! token attachment, expiry detection, single-flight token refresh, and
//! session management. The `Client` facade wires the pieces together;
//! each piece can also be constructed directly with injected transport
//! and storage, so tests run against isolated instances.
//!
//! ```no_run
//! use pipeforge_client::{Client, Config};
//!
//! # #[tokio::main]
//! # async fn main() -> anyhow::Result<()> {
//! let client = Client::new(&Config::load()?)?;
//! client.login("dev@example.com", "hunter2").await?;
//! let missions: serde_json::Value = client.get("/missions").await?;
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod auth;
pub mod config;
pub mod models;
pub mod storage;

use std::sync::Arc;

use anyhow::Result;
use serde::{de::DeserializeOwned, Serialize};

pub use api::{ApiClient, ApiError, HttpTransport, Payload, Transport};
pub use auth::{NewAccount, Session, SessionManager, TokenStore};
pub use config::Config;
pub use models::{UserRecord, UserRole};
pub use storage::{FileStore, KeyValueStore, KeyringStore, MemoryStore};

/// The assembled client: one shared token store behind the request
/// executor and the session manager. Always an explicit constructed
/// object, never a process-wide global.
pub struct Client {
    tokens: Arc<TokenStore>,
    api: ApiClient,
    session: SessionManager,
}

impl Client {
    /// Build a production client: reqwest transport, file-backed session
    /// storage under the platform config directory.
    pub fn new(config: &Config) -> Result<Self> {
        let transport = Arc::new(HttpTransport::new(config.request_timeout())?);
        let storage = Box::new(FileStore::new(Config::storage_path()?));
        Ok(Self::with_parts(&config.base_url, transport, storage))
    }

    /// Build a client from injected parts.
    pub fn with_parts(
        base_url: &str,
        transport: Arc<dyn Transport>,
        storage: Box<dyn KeyValueStore>,
    ) -> Self {
        let tokens = Arc::new(TokenStore::new(storage));
        let api = ApiClient::new(transport.clone(), tokens.clone(), base_url);
        let session = SessionManager::new(transport, tokens.clone(), base_url);
        Self {
            tokens,
            api,
            session,
        }
    }

    pub fn api(&self) -> &ApiClient {
        &self.api
    }

    pub fn session(&self) -> &SessionManager {
        &self.session
    }

    pub fn tokens(&self) -> &TokenStore {
        &self.tokens
    }

    // ===== Request surface =====

    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, ApiError> {
        self.api.get(path).await
    }

    pub async fn post<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.api.post(path, body).await
    }

    pub async fn put<T: DeserializeOwned, B: Serialize>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ApiError> {
        self.api.put(path, body).await
    }

    pub async fn delete(&self, path: &str) -> Result<(), ApiError> {
        self.api.delete(path).await
    }

    // ===== Session surface =====

    pub async fn login(&self, email: &str, password: &str) -> Result<Session, ApiError> {
        self.session.login(email, password).await
    }

    pub async fn register(&self, account: &NewAccount) -> Result<Session, ApiError> {
        self.session.register(account).await
    }

    pub async fn social_login(&self, provider: &str, code: &str) -> Result<Session, ApiError> {
        self.session.social_login(provider, code).await
    }

    pub async fn logout(&self) {
        self.session.logout().await
    }

    pub fn is_authenticated(&self) -> bool {
        self.session.is_authenticated()
    }

    pub fn current_user(&self) -> Option<UserRecord> {
        self.session.current_user()
    }
}
