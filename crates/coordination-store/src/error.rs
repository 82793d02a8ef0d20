use common::ContextError;
use thiserror::Error;

/// Errors that can occur when talking to the coordination store.
#[derive(Debug, Error)]
pub enum StoreError {
    /// The store could not be reached or refused the request.
    #[error("Coordination store unavailable: {0}")]
    Unavailable(String),

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A stored value could not be encoded or decoded.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// The caller's context was cancelled or timed out before the store answered.
    #[error("Store call abandoned: {0}")]
    Context(#[from] ContextError),
}

impl StoreError {
    /// Returns true for infrastructure failures (as opposed to cancellation
    /// or bad data).
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            StoreError::Unavailable(_) | StoreError::Database(_) | StoreError::Migration(_)
        )
    }

    /// Returns the context error if the call was abandoned because of the caller.
    pub fn context_error(&self) -> Option<ContextError> {
        match self {
            StoreError::Context(err) => Some(*err),
            _ => None,
        }
    }
}

/// Result type for coordination store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
