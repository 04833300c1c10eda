//! Authentication: token storage, single-flight refresh, and session
//! lifecycle.
//!
//! This module provides:
//! - `TokenStore`: atomic holder of the access/refresh token pair and user
//! - `RefreshCoordinator`: one refresh call per expiry event, fanned out
//! - `SessionManager`: login/logout/registration against the identity API

pub mod refresh;
pub mod session;
pub mod tokens;

pub use refresh::{RefreshCoordinator, RefreshError};
pub use session::{NewAccount, Session, SessionManager};
pub use tokens::TokenStore;
