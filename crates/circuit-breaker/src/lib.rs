//! Circuit breaker for protecting calls to an unstable dependency.
//!
//! One [`CircuitBreaker`] instance guards one call-site (typically one
//! downstream dependency). State is in-memory and per process.
//!
//! ```text
//! Closed ──(failure_threshold consecutive failures)──► Open
//! Open ──(reset_timeout elapsed, next call)──► HalfOpen
//! HalfOpen ──(success_threshold consecutive successes)──► Closed
//! HalfOpen ──(any failure)──► Open
//! ```

pub mod breaker;
pub mod config;
pub mod error;
pub mod state;

pub use breaker::{BreakerSnapshot, CircuitBreaker};
pub use config::BreakerConfig;
pub use error::{BreakerError, ConfigError};
pub use state::BreakerState;
