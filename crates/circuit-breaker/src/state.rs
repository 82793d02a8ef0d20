//! Circuit breaker state machine.

use serde::{Deserialize, Serialize};

/// The state of a circuit breaker.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum BreakerState {
    /// Calls pass through; consecutive failures are counted.
    #[default]
    Closed,

    /// Calls are rejected without reaching the dependency.
    Open,

    /// A limited number of probe calls test whether the dependency recovered.
    HalfOpen,
}

impl BreakerState {
    /// Returns the state name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            BreakerState::Closed => "Closed",
            BreakerState::Open => "Open",
            BreakerState::HalfOpen => "HalfOpen",
        }
    }
}

impl std::fmt::Display for BreakerState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_state_is_closed() {
        assert_eq!(BreakerState::default(), BreakerState::Closed);
    }

    #[test]
    fn test_display() {
        assert_eq!(BreakerState::Closed.to_string(), "Closed");
        assert_eq!(BreakerState::Open.to_string(), "Open");
        assert_eq!(BreakerState::HalfOpen.to_string(), "HalfOpen");
    }
}
