//! Circuit breaker configuration.

use std::time::Duration;

use crate::error::ConfigError;

/// Tuning for a [`CircuitBreaker`](crate::CircuitBreaker).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BreakerConfig {
    /// Consecutive failures in Closed that open the breaker.
    pub failure_threshold: u32,
    /// Consecutive half-open successes that close the breaker.
    pub success_threshold: u32,
    /// Probe calls admitted per half-open period.
    pub half_open_max_calls: u32,
    /// Time the breaker stays open before admitting a probe.
    pub reset_timeout: Duration,
}

impl BreakerConfig {
    /// Sets the failure threshold.
    pub fn with_failure_threshold(mut self, threshold: u32) -> Self {
        self.failure_threshold = threshold;
        self
    }

    /// Sets the success threshold. Raises the probe limit to match if needed.
    pub fn with_success_threshold(mut self, threshold: u32) -> Self {
        self.success_threshold = threshold;
        self.half_open_max_calls = self.half_open_max_calls.max(threshold);
        self
    }

    /// Sets the half-open probe limit.
    pub fn with_half_open_max_calls(mut self, max_calls: u32) -> Self {
        self.half_open_max_calls = max_calls;
        self
    }

    /// Sets the reset timeout.
    pub fn with_reset_timeout(mut self, timeout: Duration) -> Self {
        self.reset_timeout = timeout;
        self
    }

    /// Checks that the configuration can make progress.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.failure_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "failure_threshold",
            });
        }
        if self.success_threshold == 0 {
            return Err(ConfigError::Zero {
                field: "success_threshold",
            });
        }
        if self.half_open_max_calls < self.success_threshold {
            return Err(ConfigError::ProbeLimitTooLow {
                max_calls: self.half_open_max_calls,
                success_threshold: self.success_threshold,
            });
        }
        Ok(())
    }
}

impl Default for BreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            success_threshold: 2,
            half_open_max_calls: 2,
            reset_timeout: Duration::from_secs(30),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let config = BreakerConfig::default();
        assert_eq!(config.failure_threshold, 5);
        assert_eq!(config.success_threshold, 2);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_thresholds_rejected() {
        let err = BreakerConfig::default()
            .with_failure_threshold(0)
            .validate()
            .unwrap_err();
        assert_eq!(
            err,
            ConfigError::Zero {
                field: "failure_threshold"
            }
        );

        let config = BreakerConfig {
            success_threshold: 0,
            ..BreakerConfig::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_probe_limit_below_success_threshold_rejected() {
        let err = BreakerConfig::default()
            .with_half_open_max_calls(1)
            .validate()
            .unwrap_err();
        assert!(matches!(err, ConfigError::ProbeLimitTooLow { .. }));
    }

    #[test]
    fn test_success_threshold_raises_probe_limit() {
        let config = BreakerConfig::default().with_success_threshold(4);
        assert_eq!(config.half_open_max_calls, 4);
        assert!(config.validate().is_ok());
    }
}
