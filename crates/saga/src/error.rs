//! Saga error types.

use common::ContextError;
use thiserror::Error;

use crate::state::SagaState;

/// Error produced by a step action or compensation.
pub type StepError = Box<dyn std::error::Error + Send + Sync>;

/// A compensation that returned an error during rollback.
#[derive(Debug, Error)]
#[error("Compensation for step '{step}' (#{index}) failed: {source}")]
pub struct CompensationFailure {
    pub step: String,
    pub index: usize,
    #[source]
    pub source: StepError,
}

/// Errors returned by [`Saga::execute`](crate::Saga::execute).
///
/// Both variants report the compensation outcome. A non-empty
/// `compensation_failures` list means the system may be partially applied.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A step's action failed; earlier steps were compensated.
    #[error("Saga '{saga}' step '{step}' (#{index}) failed, saga {state}: {source}")]
    StepFailed {
        saga: String,
        step: String,
        index: usize,
        #[source]
        source: StepError,
        compensation_failures: Vec<CompensationFailure>,
        state: SagaState,
    },

    /// The context was cancelled or timed out before step `index` started;
    /// earlier steps were compensated.
    #[error("Saga '{saga}' cancelled before step '{step}' (#{index}), saga {state}: {reason}")]
    Cancelled {
        saga: String,
        step: String,
        index: usize,
        #[source]
        reason: ContextError,
        compensation_failures: Vec<CompensationFailure>,
        state: SagaState,
    },
}

impl SagaError {
    /// Name and index of the step that failed or was never started.
    pub fn step(&self) -> (&str, usize) {
        match self {
            SagaError::StepFailed { step, index, .. } | SagaError::Cancelled { step, index, .. } => {
                (step, *index)
            }
        }
    }

    /// Compensations that failed, in the order they were attempted.
    pub fn compensation_failures(&self) -> &[CompensationFailure] {
        match self {
            SagaError::StepFailed {
                compensation_failures,
                ..
            }
            | SagaError::Cancelled {
                compensation_failures,
                ..
            } => compensation_failures,
        }
    }

    /// Terminal state the saga ended in.
    pub fn state(&self) -> SagaState {
        match self {
            SagaError::StepFailed { state, .. } | SagaError::Cancelled { state, .. } => *state,
        }
    }

    /// Returns true if every executed step was rolled back.
    pub fn is_fully_compensated(&self) -> bool {
        self.state() == SagaState::Compensated
    }

    /// Returns the failing step's error, if a step failed.
    pub fn step_error(&self) -> Option<&(dyn std::error::Error + Send + Sync + 'static)> {
        match self {
            SagaError::StepFailed { source, .. } => Some(source.as_ref()),
            SagaError::Cancelled { .. } => None,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
