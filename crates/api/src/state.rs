//! Shared application state.

use std::sync::Arc;
use std::time::Duration;

use circuit_breaker::{CircuitBreaker, ConfigError};
use coordination_store::CoordinationStore;
use idempotency::IdempotencyGuard;
use rate_limit::{FailurePolicy, RateLimitError, TokenBucketLimiter};
use saga::AccountService;
use thiserror::Error;

use crate::accounts::GuardedAccountService;
use crate::config::Config;

/// Coordination store shared by every component.
pub type SharedStore = Arc<dyn CoordinationStore>;

/// Name of the breaker guarding the account service.
pub const ACCOUNTS_BREAKER: &str = "accounts";

/// Invalid component settings detected at startup.
#[derive(Debug, Error)]
pub enum StartupError {
    #[error("Invalid rate limit settings: {0}")]
    RateLimit(#[from] RateLimitError),

    #[error("Invalid circuit breaker settings: {0}")]
    Breaker(#[from] ConfigError),
}

/// Shared application state accessible from all handlers.
pub struct AppState {
    pub limiter: TokenBucketLimiter<SharedStore>,
    pub failure_policy: FailurePolicy,
    pub idempotency: IdempotencyGuard<SharedStore>,
    /// Account service behind [`breaker`](Self::breaker).
    pub accounts: Arc<dyn AccountService>,
    pub breaker: CircuitBreaker,
    pub request_timeout: Duration,
}

impl AppState {
    /// Wires every component from `config` over `store`, protecting
    /// `accounts` with a circuit breaker.
    pub fn new<A>(config: &Config, store: SharedStore, accounts: A) -> Result<Self, StartupError>
    where
        A: AccountService + 'static,
    {
        let limiter = TokenBucketLimiter::new(store.clone(), config.rate_limit())?;
        let idempotency = IdempotencyGuard::new(store, config.idempotency());
        let breaker = CircuitBreaker::new(ACCOUNTS_BREAKER, config.breaker())?;
        let accounts = Arc::new(GuardedAccountService::new(accounts, breaker.clone()));

        Ok(Self {
            limiter,
            failure_policy: config.rate_limit_failure_policy,
            idempotency,
            accounts,
            breaker,
            request_timeout: config.request_timeout,
        })
    }
}
