use thiserror::Error;

use super::transport::TransportResponse;

#[derive(Error, Debug)]
pub enum ApiError {
    /// Transport-level failure: no HTTP response was obtained.
    #[error("Network error: {0}")]
    Network(String),

    /// Any non-2xx response that is not an auth failure. Thrown back to
    /// the caller unchanged; no local recovery is attempted.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// A 401 persisted after an attempted refresh, or the refresh itself
    /// failed. Raising this also tears down the local session.
    #[error("Session expired - re-authentication required")]
    AuthExpired,

    /// An authenticated call was attempted with no token in the store.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// The response body did not match the caller's expected shape.
    #[error("Invalid response: {0}")]
    InvalidResponse(String),
}

/// Maximum length for error response bodies in error messages
const MAX_ERROR_BODY_LENGTH: usize = 500;

impl ApiError {
    /// Truncate a response body to avoid logging excessive data
    fn truncate_body(body: &str) -> String {
        if body.len() <= MAX_ERROR_BODY_LENGTH {
            return body.to_string();
        }
        let mut end = MAX_ERROR_BODY_LENGTH;
        while !body.is_char_boundary(end) {
            end -= 1;
        }
        format!(
            "{}... (truncated, {} total bytes)",
            &body[..end],
            body.len()
        )
    }

    pub fn from_response(response: &TransportResponse) -> Self {
        ApiError::Http {
            status: response.status,
            body: Self::truncate_body(&response.body),
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        ApiError::Network(err.to_string())
    }
}
