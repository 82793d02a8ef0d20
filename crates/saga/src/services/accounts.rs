//! Account service trait and in-memory implementation.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, PoisonError, RwLock, RwLockWriteGuard};

use async_trait::async_trait;
use common::{Context, ContextError};
use thiserror::Error;

/// Errors returned by an [`AccountService`].
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum AccountError {
    #[error("Account not found: {0}")]
    NotFound(String),

    #[error("Insufficient funds in account '{account}': balance {balance}, requested {requested}")]
    InsufficientFunds {
        account: String,
        balance: u64,
        requested: u64,
    },

    #[error("Amount must be greater than zero")]
    InvalidAmount,

    /// The service could not be reached or failed internally.
    #[error("Account service unavailable: {0}")]
    Unavailable(String),

    /// A circuit breaker in front of the service refused the call.
    #[error("Account service circuit '{breaker}' is open")]
    CircuitOpen { breaker: String },

    #[error("Account call abandoned: {0}")]
    Cancelled(#[from] ContextError),
}

impl AccountError {
    /// Returns true if the error reflects the service's health rather than
    /// the request itself.
    pub fn is_infrastructure(&self) -> bool {
        matches!(self, AccountError::Unavailable(_))
    }
}

/// Balance operations on accounts. Amounts are in minor units (cents).
#[async_trait]
pub trait AccountService: Send + Sync {
    /// Withdraws `amount`. Fails with `InsufficientFunds` rather than overdrawing.
    async fn debit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError>;

    /// Deposits `amount`.
    async fn credit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError>;

    /// Returns a previously debited `amount` to `account`.
    async fn refund(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError>;

    /// Returns the current balance.
    async fn balance(&self, ctx: &Context, account: &str) -> Result<u64, AccountError>;
}

#[async_trait]
impl<T: AccountService + ?Sized> AccountService for Arc<T> {
    async fn debit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        (**self).debit(ctx, account, amount).await
    }

    async fn credit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        (**self).credit(ctx, account, amount).await
    }

    async fn refund(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        (**self).refund(ctx, account, amount).await
    }

    async fn balance(&self, ctx: &Context, account: &str) -> Result<u64, AccountError> {
        (**self).balance(ctx, account).await
    }
}

#[derive(Debug, Default)]
struct InMemoryAccountState {
    balances: HashMap<String, u64>,
    fail_on_debit: bool,
    fail_on_credit: bool,
    fail_on_refund: bool,
}

#[derive(Debug, Default)]
struct CallCounts {
    debits: AtomicUsize,
    credits: AtomicUsize,
    refunds: AtomicUsize,
}

/// In-memory account service for testing.
///
/// Counters record every attempted call, including injected failures.
#[derive(Debug, Clone, Default)]
pub struct InMemoryAccountService {
    state: Arc<RwLock<InMemoryAccountState>>,
    calls: Arc<CallCounts>,
}

impl InMemoryAccountService {
    /// Creates a new in-memory account service with no accounts.
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates or overwrites an account with the given balance.
    pub fn open_account(&self, account: impl Into<String>, balance: u64) {
        self.write().balances.insert(account.into(), balance);
    }

    /// Configures the service to fail every debit.
    pub fn set_fail_on_debit(&self, fail: bool) {
        self.write().fail_on_debit = fail;
    }

    /// Configures the service to fail every credit. Refunds are unaffected.
    pub fn set_fail_on_credit(&self, fail: bool) {
        self.write().fail_on_credit = fail;
    }

    /// Configures the service to fail every refund.
    pub fn set_fail_on_refund(&self, fail: bool) {
        self.write().fail_on_refund = fail;
    }

    /// Returns the balance of `account`, if it exists.
    pub fn balance_of(&self, account: &str) -> Option<u64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .balances
            .get(account)
            .copied()
    }

    pub fn debit_count(&self) -> usize {
        self.calls.debits.load(Ordering::SeqCst)
    }

    pub fn credit_count(&self) -> usize {
        self.calls.credits.load(Ordering::SeqCst)
    }

    pub fn refund_count(&self) -> usize {
        self.calls.refunds.load(Ordering::SeqCst)
    }

    fn write(&self) -> RwLockWriteGuard<'_, InMemoryAccountState> {
        self.state.write().unwrap_or_else(PoisonError::into_inner)
    }

    fn deposit(&self, account: &str, amount: u64) -> Result<(), AccountError> {
        let mut state = self.write();
        let balance = state
            .balances
            .get_mut(account)
            .ok_or_else(|| AccountError::NotFound(account.to_string()))?;
        *balance = balance.saturating_add(amount);
        Ok(())
    }
}

#[async_trait]
impl AccountService for InMemoryAccountService {
    async fn debit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.calls.debits.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        if amount == 0 {
            return Err(AccountError::InvalidAmount);
        }

        let mut state = self.write();
        if state.fail_on_debit {
            return Err(AccountError::Unavailable("debit rejected".to_string()));
        }
        let balance = state
            .balances
            .get_mut(account)
            .ok_or_else(|| AccountError::NotFound(account.to_string()))?;
        if *balance < amount {
            return Err(AccountError::InsufficientFunds {
                account: account.to_string(),
                balance: *balance,
                requested: amount,
            });
        }
        *balance -= amount;
        Ok(())
    }

    async fn credit(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.calls.credits.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        if amount == 0 {
            return Err(AccountError::InvalidAmount);
        }
        if self.write().fail_on_credit {
            return Err(AccountError::Unavailable("credit rejected".to_string()));
        }
        self.deposit(account, amount)
    }

    async fn refund(&self, ctx: &Context, account: &str, amount: u64) -> Result<(), AccountError> {
        self.calls.refunds.fetch_add(1, Ordering::SeqCst);
        ctx.check()?;
        if self.write().fail_on_refund {
            return Err(AccountError::Unavailable("refund rejected".to_string()));
        }
        self.deposit(account, amount)
    }

    async fn balance(&self, ctx: &Context, account: &str) -> Result<u64, AccountError> {
        ctx.check()?;
        self.balance_of(account)
            .ok_or_else(|| AccountError::NotFound(account.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service() -> InMemoryAccountService {
        let service = InMemoryAccountService::new();
        service.open_account("alice", 500);
        service.open_account("bob", 0);
        service
    }

    #[tokio::test]
    async fn test_debit_and_credit() {
        let service = service();
        let ctx = Context::background();

        service.debit(&ctx, "alice", 200).await.unwrap();
        service.credit(&ctx, "bob", 200).await.unwrap();

        assert_eq!(service.balance(&ctx, "alice").await.unwrap(), 300);
        assert_eq!(service.balance(&ctx, "bob").await.unwrap(), 200);
        assert_eq!(service.debit_count(), 1);
        assert_eq!(service.credit_count(), 1);
    }

    #[tokio::test]
    async fn test_debit_rejects_insufficient_funds() {
        let service = service();
        let result = service.debit(&Context::background(), "bob", 1).await;

        assert_eq!(
            result,
            Err(AccountError::InsufficientFunds {
                account: "bob".to_string(),
                balance: 0,
                requested: 1,
            })
        );
        assert_eq!(service.balance_of("bob"), Some(0));
    }

    #[tokio::test]
    async fn test_unknown_account() {
        let service = service();
        let result = service.credit(&Context::background(), "carol", 10).await;
        assert_eq!(result, Err(AccountError::NotFound("carol".to_string())));
    }

    #[tokio::test]
    async fn test_zero_amount_rejected() {
        let service = service();
        let result = service.debit(&Context::background(), "alice", 0).await;
        assert_eq!(result, Err(AccountError::InvalidAmount));
    }

    #[tokio::test]
    async fn test_fail_on_credit_leaves_refund_working() {
        let service = service();
        let ctx = Context::background();
        service.set_fail_on_credit(true);

        let credit = service.credit(&ctx, "alice", 10).await;
        assert!(matches!(credit, Err(AccountError::Unavailable(_))));
        assert!(credit.unwrap_err().is_infrastructure());

        service.refund(&ctx, "alice", 10).await.unwrap();
        assert_eq!(service.balance_of("alice"), Some(510));
        assert_eq!(service.credit_count(), 1);
        assert_eq!(service.refund_count(), 1);
    }

    #[tokio::test]
    async fn test_fail_on_debit() {
        let service = service();
        service.set_fail_on_debit(true);

        let result = service.debit(&Context::background(), "alice", 10).await;
        assert!(matches!(result, Err(AccountError::Unavailable(_))));
        assert_eq!(service.balance_of("alice"), Some(500));
    }

    #[tokio::test]
    async fn test_cancelled_context() {
        let service = service();
        let ctx = Context::background();
        ctx.cancel();

        let result = service.debit(&ctx, "alice", 10).await;
        assert_eq!(result, Err(AccountError::Cancelled(ContextError::Cancelled)));
        assert_eq!(service.balance_of("alice"), Some(500));
    }

    #[tokio::test]
    async fn test_shared_through_arc() {
        let service = service();
        let shared: Arc<dyn AccountService> = Arc::new(service.clone());
        shared.credit(&Context::background(), "bob", 5).await.unwrap();
        assert_eq!(service.balance_of("bob"), Some(5));
    }
}
