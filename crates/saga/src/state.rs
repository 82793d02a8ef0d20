//! Saga state machine.

use serde::{Deserialize, Serialize};

/// The state of a saga in its lifecycle.
///
/// State transitions:
/// ```text
/// Pending ──► Running ──┬──► Committed
///                       └──► Compensating ──┬──► Compensated
///                                           └──► CompensationFailed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum SagaState {
    /// Saga has not started yet.
    #[default]
    Pending,

    /// Saga steps are being executed.
    Running,

    /// All steps completed successfully (terminal state).
    Committed,

    /// A step failed or the saga was cancelled; compensations are running.
    Compensating,

    /// Every executed step was compensated (terminal state).
    Compensated,

    /// At least one compensation failed (terminal state). Needs an operator.
    CompensationFailed,
}

impl SagaState {
    /// Returns true if the saga can begin running.
    pub fn can_run(&self) -> bool {
        matches!(self, SagaState::Pending)
    }

    /// Returns true if the saga can begin compensation.
    pub fn can_compensate(&self) -> bool {
        matches!(self, SagaState::Running)
    }

    /// Returns true if this is a terminal state.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            SagaState::Committed | SagaState::Compensated | SagaState::CompensationFailed
        )
    }

    /// Returns true if moving from this state to `next` is a legal transition.
    pub fn can_transition_to(&self, next: SagaState) -> bool {
        match next {
            SagaState::Pending => false,
            SagaState::Running => self.can_run(),
            SagaState::Compensating => self.can_compensate(),
            SagaState::Committed => *self == SagaState::Running,
            SagaState::Compensated | SagaState::CompensationFailed => {
                *self == SagaState::Compensating
            }
        }
    }

    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            SagaState::Pending => "Pending",
            SagaState::Running => "Running",
            SagaState::Committed => "Committed",
            SagaState::Compensating => "Compensating",
            SagaState::Compensated => "Compensated",
            SagaState::CompensationFailed => "CompensationFailed",
        }
    }
}

impl std::fmt::Display for SagaState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_pending() {
        assert_eq!(SagaState::default(), SagaState::Pending);
    }

    #[test]
    fn test_can_run() {
        assert!(SagaState::Pending.can_run());
        assert!(!SagaState::Running.can_run());
        assert!(!SagaState::Compensating.can_run());
        assert!(!SagaState::Committed.can_run());
        assert!(!SagaState::Compensated.can_run());
    }

    #[test]
    fn test_can_compensate() {
        assert!(!SagaState::Pending.can_compensate());
        assert!(SagaState::Running.can_compensate());
        assert!(!SagaState::Compensating.can_compensate());
        assert!(!SagaState::Committed.can_compensate());
        assert!(!SagaState::CompensationFailed.can_compensate());
    }

    #[test]
    fn test_terminal_states() {
        assert!(!SagaState::Pending.is_terminal());
        assert!(!SagaState::Running.is_terminal());
        assert!(!SagaState::Compensating.is_terminal());
        assert!(SagaState::Committed.is_terminal());
        assert!(SagaState::Compensated.is_terminal());
        assert!(SagaState::CompensationFailed.is_terminal());
    }

    #[test]
    fn test_transitions() {
        assert!(SagaState::Pending.can_transition_to(SagaState::Running));
        assert!(SagaState::Running.can_transition_to(SagaState::Committed));
        assert!(SagaState::Running.can_transition_to(SagaState::Compensating));
        assert!(SagaState::Compensating.can_transition_to(SagaState::CompensationFailed));
        assert!(!SagaState::Pending.can_transition_to(SagaState::Committed));
        assert!(!SagaState::Committed.can_transition_to(SagaState::Compensating));
        assert!(!SagaState::Compensated.can_transition_to(SagaState::Running));
    }

    #[test]
    fn test_run_and_compensate_gate_transitions() {
        let all = [
            SagaState::Pending,
            SagaState::Running,
            SagaState::Committed,
            SagaState::Compensating,
            SagaState::Compensated,
            SagaState::CompensationFailed,
        ];
        for state in all {
            assert_eq!(state.can_transition_to(SagaState::Running), state.can_run());
            assert_eq!(
                state.can_transition_to(SagaState::Compensating),
                state.can_compensate()
            );
            assert!(!state.can_transition_to(SagaState::Pending));
        }
    }

    #[test]
    fn test_display() {
        assert_eq!(SagaState::Pending.to_string(), "Pending");
        assert_eq!(SagaState::Committed.to_string(), "Committed");
        assert_eq!(
            SagaState::CompensationFailed.to_string(),
            "CompensationFailed"
        );
    }

    #[test]
    fn test_serialization() {
        let state = SagaState::Compensating;
        let json = serde_json::to_string(&state).unwrap();
        let deserialized: SagaState = serde_json::from_str(&json).unwrap();
        assert_eq!(state, deserialized);
    }
}
