//! Idempotency guard.
//!
//! Ensures an operation submitted under an idempotency key runs to
//! successful completion at most once, even when the client retries
//! concurrently or after a crash:
//!
//! 1. A completion record for the key short-circuits the call.
//! 2. A TTL-bounded lock admits a single executor; concurrent callers get
//!    [`IdempotencyError::InProgress`] instead of waiting.
//! 3. Success writes the completion record before the lock is released.
//!    Failure releases the lock without a record so a retry can run again.
//!
//! The operation's result is not stored; callers that need to replay a
//! response persist it themselves under the same key.

pub mod config;
pub mod error;
pub mod guard;
pub mod record;

pub use config::IdempotencyConfig;
pub use error::IdempotencyError;
pub use guard::{IdempotencyGuard, IdempotencyOutcome};
pub use record::CompletionRecord;
