//! HTTP layer: transport seam, request executor, and error taxonomy.
//!
//! All protected calls go through `ApiClient`, which attaches the bearer
//! token and handles the 401 refresh-and-retry cycle.

pub mod client;
pub mod error;
pub mod transport;

pub use client::{ApiClient, Payload};
pub use error::ApiError;
pub use transport::{HttpTransport, Transport, TransportRequest, TransportResponse};
