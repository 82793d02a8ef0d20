//! Token-bucket rate limiting shared across service instances.
//!
//! Bucket state lives in the coordination store and every decision is one
//! atomic refill-and-consume step against it, so concurrent callers on any
//! number of instances never collectively over-admit.
//!
//! A denial is an ordinary [`RateLimitDecision`], not an error. A store
//! failure is a [`RateLimitError`]; whether that admits or rejects traffic
//! is an explicit [`FailurePolicy`] the caller chooses.

pub mod config;
pub mod error;
pub mod limiter;

pub use config::{FailurePolicy, MAX_STATE_TTL, RateLimitConfig};
pub use error::{RateLimitError, Result};
pub use limiter::{RateLimitDecision, TokenBucketLimiter};
