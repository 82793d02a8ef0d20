//! Circuit-breaker protection for the downstream account service.

use async_trait::async_trait;
use circuit_breaker::{BreakerError, CircuitBreaker};
use common::Context;
use saga::{AccountError, AccountService};

/// Wraps an [`AccountService`] so calls fail fast while it is unhealthy.
///
/// Only [`AccountError::is_infrastructure`] errors count as breaker
/// failures. Refunds bypass the breaker so rollbacks are always attempted.
pub struct GuardedAccountService<S> {
    inner: S,
    breaker: CircuitBreaker,
}

impl<S: AccountService> GuardedAccountService<S> {
    pub fn new(inner: S, breaker: CircuitBreaker) -> Self {
        Self { inner, breaker }
    }

    pub fn breaker(&self) -> &CircuitBreaker {
        &self.breaker
    }
}

fn unwrap_breaker_error(err: BreakerError<AccountError>) -> AccountError {
    match err {
        BreakerError::Open { name } => AccountError::CircuitOpen { breaker: name },
        BreakerError::Call(err) => err,
    }
}

#[async_trait]
impl<S: AccountService> AccountService for GuardedAccountService<S> {
    async fn debit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.breaker
            .call_classified(
                || self.inner.debit(ctx, account, amount),
                AccountError::is_infrastructure,
            )
            .await
            .map_err(unwrap_breaker_error)
    }

    async fn credit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.breaker
            .call_classified(
                || self.inner.credit(ctx, account, amount),
                AccountError::is_infrastructure,
            )
            .await
            .map_err(unwrap_breaker_error)
    }

    async fn refund(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.inner.refund(ctx, account, amount).await
    }

    async fn balance(&self, ctx: &Context, account: &str) -> Result<u64, AccountError> {
        self.breaker
            .call_classified(
                || self.inner.balance(ctx, account),
                AccountError::is_infrastructure,
            )
            .await
            .map_err(unwrap_breaker_error)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use circuit_breaker::{BreakerConfig, BreakerState};
    use saga::InMemoryAccountService;

    use super::*;

    fn guarded() -> (GuardedAccountService<InMemoryAccountService>, InMemoryAccountService) {
        let inner = InMemoryAccountService::new();
        inner.open_account("alice", 100);
        let breaker = CircuitBreaker::new(
            "accounts",
            BreakerConfig::default()
                .with_failure_threshold(2)
                .with_reset_timeout(Duration::from_secs(60)),
        )
        .unwrap();
        (GuardedAccountService::new(inner.clone(), breaker), inner)
    }

    #[tokio::test]
    async fn test_infrastructure_failures_open_breaker() {
        let (service, inner) = guarded();
        let ctx = Context::background();
        inner.set_fail_on_credit(true);

        for _ in 0..2 {
            let err = service.credit(&ctx, "alice", 1).await.unwrap_err();
            assert!(matches!(err, AccountError::Unavailable(_)));
        }
        assert_eq!(service.breaker().state(), BreakerState::Open);

        let err = service.credit(&ctx, "alice", 1).await.unwrap_err();
        assert_eq!(
            err,
            AccountError::CircuitOpen {
                breaker: "accounts".to_string()
            }
        );
        assert_eq!(inner.credit_count(), 2);
    }

    #[tokio::test]
    async fn test_business_errors_do_not_trip_breaker() {
        let (service, _) = guarded();
        let ctx = Context::background();

        for _ in 0..5 {
            let err = service.debit(&ctx, "alice", 1_000).await.unwrap_err();
            assert!(matches!(err, AccountError::InsufficientFunds { .. }));
        }
        assert_eq!(service.breaker().state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_refund_bypasses_open_breaker() {
        let (service, inner) = guarded();
        let ctx = Context::background();
        inner.set_fail_on_debit(true);
        for _ in 0..2 {
            let _ = service.debit(&ctx, "alice", 1).await;
        }
        assert_eq!(service.breaker().state(), BreakerState::Open);

        service.refund(&ctx, "alice", 10).await.unwrap();
        assert_eq!(inner.balance_of("alice"), Some(110));
    }
}
