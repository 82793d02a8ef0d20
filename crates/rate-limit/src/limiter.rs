//! Token-bucket limiter.

use std::time::Duration;

use common::Context;
use coordination_store::{BucketDecision, BucketSpec, CoordinationStore};

use crate::config::{FailurePolicy, MAX_STATE_TTL, RateLimitConfig};
use crate::error::{RateLimitError, Result};

/// Outcome of a rate limit check.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RateLimitDecision {
    /// One token was consumed.
    Allowed {
        /// Whole tokens left in the bucket.
        remaining: u32,
    },
    /// No token was available.
    Denied {
        /// Time until the next token accrues.
        retry_after: Duration,
    },
}

impl RateLimitDecision {
    /// Returns true if the call may proceed.
    pub fn is_allowed(&self) -> bool {
        matches!(self, RateLimitDecision::Allowed { .. })
    }
}

/// Distributed token-bucket rate limiter.
///
/// One limiter serves any number of buckets; the `key` passed to
/// [`allow`](Self::allow) picks the bucket (per caller, per route, ...).
/// Every bucket shares the limiter's capacity and refill rate.
#[derive(Debug, Clone)]
pub struct TokenBucketLimiter<S> {
    store: S,
    config: RateLimitConfig,
    spec: BucketSpec,
    state_ttl: Duration,
}

impl<S> TokenBucketLimiter<S>
where
    S: CoordinationStore,
{
    /// Creates a limiter over `store`.
    pub fn new(store: S, config: RateLimitConfig) -> Result<Self> {
        config.validate()?;
        let spec = BucketSpec::new(config.capacity, config.refill_rate);
        let state_ttl = config
            .state_ttl
            .unwrap_or_else(|| spec.time_to_full().saturating_mul(2))
            .clamp(Duration::from_secs(1), MAX_STATE_TTL);

        Ok(Self {
            store,
            config,
            spec,
            state_ttl,
        })
    }

    /// Returns the limiter configuration.
    pub fn config(&self) -> &RateLimitConfig {
        &self.config
    }

    /// How long idle bucket state is kept in the store.
    pub fn state_ttl(&self) -> Duration {
        self.state_ttl
    }

    /// Consumes one token from the bucket for `key` if one is available.
    ///
    /// Store failures are returned as errors, never as denials.
    #[tracing::instrument(skip(self, ctx))]
    pub async fn allow(&self, ctx: &Context, key: &str) -> Result<RateLimitDecision> {
        let bucket_key = format!("{}{}", self.config.key_prefix, key);
        let decision = self
            .store
            .take_token(ctx, &bucket_key, &self.spec, self.state_ttl)
            .await?;

        if decision.allowed {
            metrics::counter!("rate_limit_decisions_total", "outcome" => "allowed").increment(1);
            // Tokens never exceed capacity, which fits in u32.
            Ok(RateLimitDecision::Allowed {
                remaining: decision.tokens.floor() as u32,
            })
        } else {
            metrics::counter!("rate_limit_decisions_total", "outcome" => "denied").increment(1);
            let retry_after = decision.retry_after(&self.spec);
            tracing::debug!(?retry_after, "rate limit exceeded");
            Ok(RateLimitDecision::Denied { retry_after })
        }
    }

    /// Like [`allow`](Self::allow), but resolves store failures with `policy`.
    ///
    /// Cancellation of `ctx` is still returned as an error.
    pub async fn allow_with_policy(
        &self,
        ctx: &Context,
        key: &str,
        policy: FailurePolicy,
    ) -> Result<RateLimitDecision> {
        match self.allow(ctx, key).await {
            Err(RateLimitError::Store(err)) => {
                metrics::counter!("rate_limit_store_failures_total", "policy" => policy.as_str())
                    .increment(1);
                tracing::warn!(error = %err, %policy, key, "rate limiter store failed, applying failure policy");
                Ok(match policy {
                    FailurePolicy::FailOpen => RateLimitDecision::Allowed { remaining: 0 },
                    FailurePolicy::FailClosed => RateLimitDecision::Denied {
                        retry_after: BucketDecision {
                            allowed: false,
                            tokens: 0.0,
                        }
                        .retry_after(&self.spec),
                    },
                })
            }
            other => other,
        }
    }
}
