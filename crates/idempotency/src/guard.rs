use std::future::Future;

use chrono::{DateTime, Utc};
use common::{Context, SharedClock, SystemClock};
use coordination_store::{CoordinationStore, CoordinationStoreExt, StoreError};
use metrics::counter;
use uuid::Uuid;

use crate::{CompletionRecord, IdempotencyConfig, IdempotencyError};

/// Result of a guarded execution that did not fail.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdempotencyOutcome<T> {
    /// The operation ran in this call and succeeded.
    Executed(T),
    /// An earlier call already completed the operation; it was not run again.
    AlreadyCompleted { completed_at: DateTime<Utc> },
}

impl<T> IdempotencyOutcome<T> {
    /// Returns true if the operation ran in this call.
    pub fn was_executed(&self) -> bool {
        matches!(self, IdempotencyOutcome::Executed(_))
    }
}

/// Guards operations so each idempotency key completes at most once.
///
/// The guard holds no state of its own: locks and completion records live in
/// the store, so every instance sharing a store sees the same keys.
#[derive(Debug, Clone)]
pub struct IdempotencyGuard<S> {
    store: S,
    config: IdempotencyConfig,
    clock: SharedClock,
}

impl<S: CoordinationStore> IdempotencyGuard<S> {
    /// Creates a guard over `store` on the system clock.
    pub fn new(store: S, config: IdempotencyConfig) -> Self {
        Self::with_clock(store, config, SystemClock::shared())
    }

    /// Creates a guard stamping completion records with `clock`.
    pub fn with_clock(store: S, config: IdempotencyConfig, clock: SharedClock) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Returns the guard configuration.
    pub fn config(&self) -> &IdempotencyConfig {
        &self.config
    }

    /// Returns the underlying coordination store.
    pub fn store(&self) -> &S {
        &self.store
    }

    /// Runs `op` unless the operation for `key` already completed or is in progress.
    ///
    /// `op` receives a child of `ctx`. The completion record and lock release
    /// run under a detached context bounded by `release_timeout`, so they
    /// still happen when `ctx` is cancelled after `op` returned.
    #[tracing::instrument(skip(self, ctx, op))]
    pub async fn execute<F, Fut, T, E>(
        &self,
        ctx: &Context,
        key: &str,
        op: F,
    ) -> Result<IdempotencyOutcome<T>, IdempotencyError<E>>
    where
        F: FnOnce(Context) -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        if key.trim().is_empty() {
            return Err(IdempotencyError::InvalidKey);
        }

        if let Some(record) = self.completion(ctx, key).await? {
            tracing::debug!("Operation already completed");
            counter!("idempotency_requests_total", "outcome" => "duplicate").increment(1);
            return Ok(IdempotencyOutcome::AlreadyCompleted {
                completed_at: record.completed_at,
            });
        }

        let lock_key = self.config.lock_key(key);
        let token = Uuid::new_v4().to_string();
        let acquired = self
            .store
            .set_if_absent(ctx, &lock_key, &token, self.config.lock_ttl)
            .await?;
        if !acquired {
            tracing::debug!("Operation already in progress");
            counter!("idempotency_requests_total", "outcome" => "in_progress").increment(1);
            return Err(IdempotencyError::InProgress {
                key: key.to_string(),
            });
        }

        // A previous holder may have recorded completion between the first
        // check and our acquisition.
        match self.completion(ctx, key).await {
            Ok(Some(record)) => {
                self.release(&lock_key, &token).await;
                counter!("idempotency_requests_total", "outcome" => "duplicate").increment(1);
                return Ok(IdempotencyOutcome::AlreadyCompleted {
                    completed_at: record.completed_at,
                });
            }
            Ok(None) => {}
            Err(err) => {
                self.release(&lock_key, &token).await;
                return Err(err.into());
            }
        }

        match op(ctx.child()).await {
            Ok(value) => {
                let record = CompletionRecord {
                    completed_at: self.clock.now(),
                };
                let cleanup = ctx.detach().with_timeout(self.config.release_timeout);
                let written = self
                    .store
                    .set_json(
                        &cleanup,
                        &self.config.completion_key(key),
                        &record,
                        Some(self.config.completion_ttl),
                    )
                    .await;

                if let Err(err) = written {
                    // Keep the lock so retries stay blocked until lock_ttl.
                    tracing::error!(error = %err, "Failed to record completion");
                    counter!("idempotency_requests_total", "outcome" => "unrecorded").increment(1);
                    return Err(IdempotencyError::CompletionNotRecorded {
                        key: key.to_string(),
                        source: err,
                    });
                }

                self.release(&lock_key, &token).await;
                counter!("idempotency_requests_total", "outcome" => "executed").increment(1);
                Ok(IdempotencyOutcome::Executed(value))
            }
            Err(err) => {
                self.release(&lock_key, &token).await;
                counter!("idempotency_requests_total", "outcome" => "failed").increment(1);
                Err(IdempotencyError::Operation(err))
            }
        }
    }

    /// Returns true if a completion record exists for `key`.
    pub async fn is_completed(&self, ctx: &Context, key: &str) -> Result<bool, StoreError> {
        Ok(self.completion(ctx, key).await?.is_some())
    }

    /// Removes the completion record for `key` so the operation may run again.
    pub async fn forget(&self, ctx: &Context, key: &str) -> Result<bool, StoreError> {
        self.store
            .delete(ctx, &self.config.completion_key(key))
            .await
    }

    async fn completion(
        &self,
        ctx: &Context,
        key: &str,
    ) -> Result<Option<CompletionRecord>, StoreError> {
        self.store
            .get_json(ctx, &self.config.completion_key(key))
            .await
    }

    async fn release(&self, lock_key: &str, token: &str) {
        let cleanup = Context::background().with_timeout(self.config.release_timeout);
        match self.store.delete_if_equals(&cleanup, lock_key, token).await {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!(lock_key, "Idempotency lock expired before release");
            }
            Err(err) => {
                tracing::warn!(lock_key, error = %err, "Failed to release idempotency lock; it will expire");
            }
        }
    }
}
