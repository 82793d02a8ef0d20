//! Rate limiter configuration.

use std::str::FromStr;
use std::time::Duration;

use crate::error::RateLimitError;

/// Upper bound on how long idle bucket state is kept, whatever the refill
/// rate. Keeps expiry timestamps representable in every backend.
pub const MAX_STATE_TTL: Duration = Duration::from_secs(30 * 24 * 60 * 60);

/// What to do when the coordination store cannot be consulted.
/// Has no `Default`; every caller picks one explicitly.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailurePolicy {
    /// Admit the call.
    FailOpen,
    /// Reject the call.
    FailClosed,
}

impl FailurePolicy {
    /// Returns the policy name as a string.
    pub fn as_str(&self) -> &'static str {
        match self {
            FailurePolicy::FailOpen => "open",
            FailurePolicy::FailClosed => "closed",
        }
    }
}

impl FromStr for FailurePolicy {
    type Err = RateLimitError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "open" | "fail_open" | "fail-open" => Ok(FailurePolicy::FailOpen),
            "closed" | "fail_closed" | "fail-closed" => Ok(FailurePolicy::FailClosed),
            other => Err(RateLimitError::InvalidConfig(format!(
                "unknown failure policy '{other}', expected 'open' or 'closed'"
            ))),
        }
    }
}

impl std::fmt::Display for FailurePolicy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Tuning for a [`TokenBucketLimiter`](crate::TokenBucketLimiter).
#[derive(Debug, Clone, PartialEq)]
pub struct RateLimitConfig {
    /// Maximum burst size.
    pub capacity: u32,
    /// Tokens credited per second.
    pub refill_rate: f64,
    /// Prefix prepended to every bucket key in the store.
    pub key_prefix: String,
    /// How long idle bucket state is kept. `None` keeps it for twice the
    /// time an empty bucket needs to refill; after that a fresh full bucket
    /// is indistinguishable anyway. Capped at [`MAX_STATE_TTL`].
    pub state_ttl: Option<Duration>,
}

impl RateLimitConfig {
    /// Creates a config with the given capacity and refill rate.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity,
            refill_rate,
            ..Self::default()
        }
    }

    /// Sets the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    /// Sets the idle state TTL.
    pub fn with_state_ttl(mut self, ttl: Duration) -> Self {
        self.state_ttl = Some(ttl);
        self
    }

    /// Checks that the configuration can admit anything at all.
    pub fn validate(&self) -> Result<(), RateLimitError> {
        if self.capacity == 0 {
            return Err(RateLimitError::InvalidConfig(
                "capacity must be greater than zero".to_string(),
            ));
        }
        if !self.refill_rate.is_finite() || self.refill_rate <= 0.0 {
            return Err(RateLimitError::InvalidConfig(format!(
                "refill_rate must be a positive number, got {}",
                self.refill_rate
            )));
        }
        Ok(())
    }
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            capacity: 100,
            refill_rate: 10.0,
            key_prefix: "ratelimit:".to_string(),
            state_ttl: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(RateLimitConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_values_rejected() {
        assert!(RateLimitConfig::new(0, 1.0).validate().is_err());
        assert!(RateLimitConfig::new(10, 0.0).validate().is_err());
        assert!(RateLimitConfig::new(10, -1.0).validate().is_err());
        assert!(RateLimitConfig::new(10, f64::NAN).validate().is_err());
    }

    #[test]
    fn test_failure_policy_parsing() {
        assert_eq!("open".parse::<FailurePolicy>().unwrap(), FailurePolicy::FailOpen);
        assert_eq!(
            "Fail-Closed".parse::<FailurePolicy>().unwrap(),
            FailurePolicy::FailClosed
        );
        assert!("maybe".parse::<FailurePolicy>().is_err());
    }

    #[test]
    fn test_failure_policy_display() {
        assert_eq!(FailurePolicy::FailOpen.to_string(), "open");
        assert_eq!(FailurePolicy::FailClosed.to_string(), "closed");
    }
}
