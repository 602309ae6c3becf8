//! Cart operation errors.
//!
//! Every store operation resolves to a discriminated result. Failures carry
//! one of the kinds below; a result dropped for staleness is not a failure and
//! is reported through [`MutationOutcome::Superseded`](crate::MutationOutcome)
//! instead.

use thiserror::Error;

/// Errors surfaced by the gateway and the store.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CartError {
    /// No credential, or the remote service rejected it.
    #[error("Not authenticated")]
    NotAuthenticated,

    /// Client-side precondition failed. Never reaches the remote service.
    #[error("Invalid operation: {0}")]
    InvalidOperation(String),

    /// The line or product no longer exists server-side.
    #[error("Not found: {0}")]
    NotFound(String),

    /// Transport failure, including timeouts.
    #[error("Network error: {0}")]
    Network(String),

    /// 5xx status, unexpected status, or malformed payload.
    #[error("Server error: {0}")]
    ServerError(String),

    /// Rate limited by the remote service.
    #[error("Rate limited, retry after {retry_after_secs} seconds")]
    RateLimited { retry_after_secs: u64 },
}

impl CartError {
    /// Whether retrying the same operation later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::Network(_) | Self::RateLimited { .. })
    }
}

impl From<reqwest::Error> for CartError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::ServerError(format!("Malformed response: {err}"))
        } else {
            Self::Network(err.to_string())
        }
    }
}

/// Result type alias for `CartError`.
pub type Result<T> = std::result::Result<T, CartError>;
