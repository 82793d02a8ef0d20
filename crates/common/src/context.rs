//! Cancellation and deadline propagation.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Why a [`Context`] stopped accepting work.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Error)]
pub enum ContextError {
    /// The context (or one of its ancestors) was cancelled explicitly.
    #[error("Context cancelled")]
    Cancelled,

    /// The context deadline passed.
    #[error("Context deadline exceeded")]
    DeadlineExceeded,
}

/// A cancellation/deadline carrier.
///
/// Cloning is cheap and clones share the same cancellation state. Derived
/// contexts ([`child`](Self::child), [`with_timeout`](Self::with_timeout))
/// are cancelled when their parent is, but cancelling a child never affects
/// the parent.
#[derive(Debug, Clone)]
pub struct Context {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl Context {
    /// Creates a root context that is never cancelled on its own and has no deadline.
    pub fn background() -> Self {
        Self {
            token: CancellationToken::new(),
            deadline: None,
        }
    }

    /// Creates a child context that inherits cancellation and deadline.
    pub fn child(&self) -> Self {
        Self {
            token: self.token.child_token(),
            deadline: self.deadline,
        }
    }

    /// Creates a child context whose deadline is `timeout` from now, or the
    /// parent's deadline if that is earlier.
    pub fn with_timeout(&self, timeout: Duration) -> Self {
        self.with_deadline(Instant::now() + timeout)
    }

    /// Creates a child context with the given deadline, or the parent's
    /// deadline if that is earlier.
    pub fn with_deadline(&self, deadline: Instant) -> Self {
        let deadline = match self.deadline {
            Some(current) if current < deadline => current,
            _ => deadline,
        };
        Self {
            token: self.token.child_token(),
            deadline: Some(deadline),
        }
    }

    /// Returns a fresh root context unaffected by this context's cancellation
    /// or deadline.
    ///
    /// Used for cleanup work (lock release, compensation) that must still run
    /// after the caller gave up.
    pub fn detach(&self) -> Self {
        Self::background()
    }

    /// Cancels this context and every context derived from it.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns an error if the context has been cancelled or its deadline has passed.
    pub fn check(&self) -> Result<(), ContextError> {
        if self.token.is_cancelled() {
            return Err(ContextError::Cancelled);
        }
        match self.deadline {
            Some(deadline) if Instant::now() >= deadline => Err(ContextError::DeadlineExceeded),
            _ => Ok(()),
        }
    }

    /// Returns true if the context can no longer be used for new work.
    pub fn is_done(&self) -> bool {
        self.check().is_err()
    }

    /// Resolves once the context is cancelled or its deadline passes.
    pub async fn done(&self) -> ContextError {
        match self.deadline {
            Some(deadline) => tokio::select! {
                () = self.token.cancelled() => ContextError::Cancelled,
                () = tokio::time::sleep_until(deadline) => ContextError::DeadlineExceeded,
            },
            None => {
                self.token.cancelled().await;
                ContextError::Cancelled
            }
        }
    }

    /// Drives `fut` to completion unless the context finishes first.
    ///
    /// The future is dropped (and its pending I/O abandoned) when the context
    /// wins the race.
    pub async fn run<F>(&self, fut: F) -> Result<F::Output, ContextError>
    where
        F: Future,
    {
        self.check()?;
        tokio::select! {
            biased;
            err = self.done() => Err(err),
            out = fut => Ok(out),
        }
    }
}

impl Default for Context {
    fn default() -> Self {
        Self::background()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_background_is_not_done() {
        let ctx = Context::background();
        assert!(!ctx.is_done());
        assert_eq!(ctx.check(), Ok(()));
        assert!(ctx.deadline().is_none());
    }

    #[test]
    fn test_cancel_propagates_to_children_only() {
        let parent = Context::background();
        let child = parent.child();
        let grandchild = child.child();

        child.cancel();
        assert_eq!(child.check(), Err(ContextError::Cancelled));
        assert_eq!(grandchild.check(), Err(ContextError::Cancelled));
        assert!(!parent.is_done());

        let other = parent.child();
        parent.cancel();
        assert_eq!(other.check(), Err(ContextError::Cancelled));
    }

    #[test]
    fn test_detach_ignores_parent_cancellation() {
        let ctx = Context::background();
        ctx.cancel();
        let detached = ctx.detach();
        assert!(!detached.is_done());
    }

    #[tokio::test(start_paused = true)]
    async fn test_deadline_expires() {
        let ctx = Context::background().with_timeout(Duration::from_millis(50));
        assert!(!ctx.is_done());

        tokio::time::advance(Duration::from_millis(51)).await;
        assert_eq!(ctx.check(), Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test(start_paused = true)]
    async fn test_child_keeps_earlier_parent_deadline() {
        let parent = Context::background().with_timeout(Duration::from_millis(10));
        let child = parent.with_timeout(Duration::from_secs(60));
        assert_eq!(child.deadline(), parent.deadline());
    }

    #[tokio::test]
    async fn test_run_returns_output_when_not_cancelled() {
        let ctx = Context::background();
        let out = ctx.run(async { 42 }).await;
        assert_eq!(out, Ok(42));
    }

    #[tokio::test]
    async fn test_run_fails_fast_on_cancelled_context() {
        let ctx = Context::background();
        ctx.cancel();
        let out = ctx.run(async { 42 }).await;
        assert_eq!(out, Err(ContextError::Cancelled));
    }

    #[tokio::test(start_paused = true)]
    async fn test_run_stops_waiting_at_deadline() {
        let ctx = Context::background().with_timeout(Duration::from_millis(100));
        let out = ctx
            .run(async {
                tokio::time::sleep(Duration::from_secs(10)).await;
                "late"
            })
            .await;
        assert_eq!(out, Err(ContextError::DeadlineExceeded));
    }

    #[tokio::test]
    async fn test_run_stops_waiting_on_cancel() {
        let ctx = Context::background();
        let canceller = ctx.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(10)).await;
            canceller.cancel();
        });

        let out = ctx.run(std::future::pending::<()>()).await;
        assert_eq!(out, Err(ContextError::Cancelled));
    }
}
