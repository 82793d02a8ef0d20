//! Rate limiter error types.

use common::ContextError;
use coordination_store::StoreError;
use thiserror::Error;

/// Errors that can occur while checking a rate limit.
///
/// Being rate limited is not one of them; see
/// [`RateLimitDecision::Denied`](crate::RateLimitDecision::Denied).
#[derive(Debug, Error)]
pub enum RateLimitError {
    /// The coordination store failed.
    #[error("Rate limiter store error: {0}")]
    Store(StoreError),

    /// The caller's context was cancelled or timed out.
    #[error("Rate limit check abandoned: {0}")]
    Cancelled(ContextError),

    /// The limiter configuration cannot work.
    #[error("Invalid rate limit configuration: {0}")]
    InvalidConfig(String),
}

impl From<StoreError> for RateLimitError {
    fn from(err: StoreError) -> Self {
        match err.context_error() {
            Some(ctx_err) => RateLimitError::Cancelled(ctx_err),
            None => RateLimitError::Store(err),
        }
    }
}

/// Result type for rate limiter operations.
pub type Result<T> = std::result::Result<T, RateLimitError>;
