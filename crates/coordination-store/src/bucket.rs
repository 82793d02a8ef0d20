//! Token-bucket arithmetic.
//!
//! Backends call [`BucketState::take`] inside whatever makes the
//! read-compute-write sequence indivisible for them (a mutex, a row lock).
//! The refill is lazy: no background task ticks buckets, tokens are
//! credited from the elapsed time on the next access.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Static parameters of a bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketSpec {
    /// Maximum number of tokens the bucket holds.
    pub capacity: f64,
    /// Tokens credited per second.
    pub refill_rate: f64,
}

impl BucketSpec {
    /// Creates a bucket spec.
    pub fn new(capacity: u32, refill_rate: f64) -> Self {
        Self {
            capacity: f64::from(capacity),
            refill_rate,
        }
    }

    /// Time for an empty bucket to fill up completely.
    pub fn time_to_full(&self) -> Duration {
        if self.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64(self.capacity / self.refill_rate).unwrap_or(Duration::MAX)
    }
}

/// Persistent state of one bucket.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BucketState {
    /// Tokens available as of `last_refill`. Fractional accrual is kept.
    pub tokens: f64,
    /// Time the tokens were last brought up to date.
    pub last_refill: DateTime<Utc>,
}

/// Outcome of one refill-and-consume step.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct BucketDecision {
    /// Whether one token was consumed.
    pub allowed: bool,
    /// Tokens left after the decision.
    pub tokens: f64,
}

impl BucketDecision {
    /// How long until one whole token is available, or zero if one already is.
    pub fn retry_after(&self, spec: &BucketSpec) -> Duration {
        if self.tokens >= 1.0 {
            return Duration::ZERO;
        }
        if spec.refill_rate <= 0.0 {
            return Duration::MAX;
        }
        Duration::try_from_secs_f64((1.0 - self.tokens) / spec.refill_rate)
            .unwrap_or(Duration::MAX)
    }
}

impl BucketState {
    /// A full bucket, used when no state exists yet for a key.
    pub fn full(spec: &BucketSpec, now: DateTime<Utc>) -> Self {
        Self {
            tokens: spec.capacity,
            last_refill: now,
        }
    }

    /// Refills the bucket up to `now` and tries to consume one token.
    ///
    /// A clock that moved backwards credits nothing and never moves
    /// `last_refill` backwards, so the same interval cannot be credited twice.
    pub fn take(self, spec: &BucketSpec, now: DateTime<Utc>) -> (BucketState, BucketDecision) {
        let elapsed = (now - self.last_refill)
            .num_microseconds()
            .map(|micros| micros as f64 / 1_000_000.0)
            .unwrap_or(f64::MAX)
            .max(0.0);

        let refilled = (self.tokens + elapsed * spec.refill_rate)
            .min(spec.capacity)
            .max(0.0);
        let last_refill = now.max(self.last_refill);

        let (tokens, allowed) = if refilled >= 1.0 {
            (refilled - 1.0, true)
        } else {
            (refilled, false)
        };

        (
            BucketState {
                tokens,
                last_refill,
            },
            BucketDecision { allowed, tokens },
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn t0() -> DateTime<Utc> {
        DateTime::from_timestamp(1_700_000_000, 0).unwrap()
    }

    #[test]
    fn test_full_bucket_admits_capacity_then_denies() {
        let spec = BucketSpec::new(3, 1.0);
        let mut state = BucketState::full(&spec, t0());

        for _ in 0..3 {
            let (next, decision) = state.take(&spec, t0());
            assert!(decision.allowed);
            state = next;
        }

        let (next, decision) = state.take(&spec, t0());
        assert!(!decision.allowed);
        assert_eq!(next.tokens, 0.0);
    }

    #[test]
    fn test_refill_credits_elapsed_time() {
        let spec = BucketSpec::new(5, 2.0);
        let empty = BucketState {
            tokens: 0.0,
            last_refill: t0(),
        };

        let (state, decision) = empty.take(&spec, t0() + chrono::Duration::milliseconds(500));
        assert!(decision.allowed);
        assert_eq!(state.tokens, 0.0);
    }

    #[test]
    fn test_refill_is_capped_at_capacity() {
        let spec = BucketSpec::new(2, 10.0);
        let empty = BucketState {
            tokens: 0.0,
            last_refill: t0(),
        };

        let (state, decision) = empty.take(&spec, t0() + chrono::Duration::hours(1));
        assert!(decision.allowed);
        assert_eq!(state.tokens, 1.0);
    }

    #[test]
    fn test_denial_keeps_fractional_accrual() {
        let spec = BucketSpec::new(1, 1.0);
        let empty = BucketState {
            tokens: 0.0,
            last_refill: t0(),
        };

        let half = t0() + chrono::Duration::milliseconds(500);
        let (state, decision) = empty.take(&spec, half);
        assert!(!decision.allowed);
        assert_eq!(state.tokens, 0.5);
        assert_eq!(state.last_refill, half);

        let (_, decision) = state.take(&spec, t0() + chrono::Duration::seconds(1));
        assert!(decision.allowed);
    }

    #[test]
    fn test_clock_going_backwards_credits_nothing() {
        let spec = BucketSpec::new(1, 1.0);
        let empty = BucketState {
            tokens: 0.0,
            last_refill: t0(),
        };

        let (state, decision) = empty.take(&spec, t0() - chrono::Duration::seconds(10));
        assert!(!decision.allowed);
        assert_eq!(state.tokens, 0.0);
        assert_eq!(state.last_refill, t0());
    }

    #[test]
    fn test_retry_after() {
        let spec = BucketSpec::new(1, 4.0);
        let decision = BucketDecision {
            allowed: false,
            tokens: 0.5,
        };
        assert_eq!(decision.retry_after(&spec), Duration::from_millis(125));

        let decision = BucketDecision {
            allowed: true,
            tokens: 1.5,
        };
        assert_eq!(decision.retry_after(&spec), Duration::ZERO);
    }

    #[test]
    fn test_time_to_full() {
        assert_eq!(BucketSpec::new(10, 5.0).time_to_full(), Duration::from_secs(2));
        assert_eq!(BucketSpec::new(10, 0.0).time_to_full(), Duration::MAX);
    }
}
