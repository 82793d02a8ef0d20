//! Idempotency guard error types.

use common::ContextError;
use coordination_store::StoreError;
use thiserror::Error;

/// Errors returned by [`IdempotencyGuard::execute`](crate::IdempotencyGuard::execute).
///
/// `InProgress` is an expected, retry-later outcome; it does not mean the
/// operation failed.
#[derive(Debug, Error)]
pub enum IdempotencyError<E> {
    /// The idempotency key was empty.
    #[error("Idempotency key must not be empty")]
    InvalidKey,

    /// Another execution holds the lock for this key.
    #[error("Operation for idempotency key '{key}' is already in progress")]
    InProgress { key: String },

    /// The operation ran and failed. No completion record was written.
    #[error("Operation failed: {0}")]
    Operation(#[source] E),

    /// The operation succeeded but its completion record could not be
    /// written. The lock is left to expire rather than released.
    #[error("Operation for idempotency key '{key}' completed but was not recorded: {source}")]
    CompletionNotRecorded {
        key: String,
        #[source]
        source: StoreError,
    },

    /// The coordination store failed before the operation ran.
    #[error("Idempotency store error: {0}")]
    Store(#[source] StoreError),

    /// The caller's context was cancelled or timed out before the operation ran.
    #[error("Idempotency check abandoned: {0}")]
    Cancelled(ContextError),
}

impl<E> IdempotencyError<E> {
    /// Returns true if the same request may succeed when retried later with
    /// the same key. Operation failures are not: the operation decided, and
    /// only the caller knows whether its error is transient.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            IdempotencyError::InProgress { .. }
                | IdempotencyError::Store(_)
                | IdempotencyError::Cancelled(_)
        )
    }

    /// Returns the operation's error, if the operation ran and failed.
    pub fn into_operation_error(self) -> Option<E> {
        match self {
            IdempotencyError::Operation(err) => Some(err),
            _ => None,
        }
    }
}

impl<E> From<StoreError> for IdempotencyError<E> {
    fn from(err: StoreError) -> Self {
        match err.context_error() {
            Some(ctx_err) => IdempotencyError::Cancelled(ctx_err),
            None => IdempotencyError::Store(err),
        }
    }
}
