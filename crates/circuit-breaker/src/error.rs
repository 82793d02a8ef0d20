//! Circuit breaker error types.

use thiserror::Error;

/// Error returned by a protected call.
///
/// `Open` means the breaker refused to run the call; `Call` carries the
/// protected call's own error.
#[derive(Debug, Error)]
pub enum BreakerError<E> {
    /// The breaker is open (or its half-open probe slots are taken).
    #[error("Circuit breaker '{name}' is open")]
    Open { name: String },

    /// The protected call ran and failed.
    #[error("Protected call failed: {0}")]
    Call(#[source] E),
}

impl<E> BreakerError<E> {
    /// Returns true if the breaker rejected the call without running it.
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerError::Open { .. })
    }

    /// Returns the protected call's error, if the call ran.
    pub fn into_inner(self) -> Option<E> {
        match self {
            BreakerError::Open { .. } => None,
            BreakerError::Call(err) => Some(err),
        }
    }
}

/// Invalid breaker configuration.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    /// A threshold or limit was zero.
    #[error("{field} must be greater than zero")]
    Zero { field: &'static str },

    /// Fewer half-open probes are allowed than successes are required to close.
    #[error(
        "half_open_max_calls ({max_calls}) must be at least success_threshold ({success_threshold})"
    )]
    ProbeLimitTooLow {
        max_calls: u32,
        success_threshold: u32,
    },
}
