//! Error types for the Lamad client core

use thiserror::Error;

/// Client error taxonomy.
///
/// Variants are `Clone` so that callers attached to a shared single-flight
/// operation (credential renewal, chapter load) can all receive the same
/// outcome; transport errors are captured as strings for that reason.
#[derive(Debug, Clone, Error)]
pub enum ApiError {
    /// No valid session and renewal failed (or was impossible).
    /// Terminal for the session: the caller is expected to force a logout.
    #[error("unauthorized: session renewal failed or no session present")]
    Unauthorized,

    /// Transport-level failure (timeout, DNS, connection reset).
    /// The core never retries these; retry policy belongs to the caller.
    #[error("network error: {0}")]
    Network(String),

    /// Server returned a non-2xx status that is not 401/404/409.
    #[error("server error {status}: {message}")]
    Server { status: u16, message: String },

    /// Resource not found (404).
    #[error("not found: {0}")]
    NotFound(String),

    /// Write rejected by the server (409), e.g. an optimistic
    /// completion write that lost a race.
    #[error("conflict: {0}")]
    Conflict(String),

    /// Response body could not be decoded into the expected shape.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}

impl From<reqwest::Error> for ApiError {
    fn from(e: reqwest::Error) -> Self {
        ApiError::Network(e.to_string())
    }
}

impl From<serde_json::Error> for ApiError {
    fn from(e: serde_json::Error) -> Self {
        ApiError::InvalidResponse(e.to_string())
    }
}

/// Result type for client operations
pub type Result<T> = std::result::Result<T, ApiError>;
