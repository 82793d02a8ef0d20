//! Circuit breaker implementation.

use std::future::Future;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use chrono::{DateTime, Utc};
use common::{SharedClock, SystemClock};
use serde::Serialize;

use crate::config::BreakerConfig;
use crate::error::{BreakerError, ConfigError};
use crate::state::BreakerState;

#[derive(Debug, Default)]
struct Inner {
    state: BreakerState,
    failure_count: u32,
    success_count: u32,
    half_open_calls: u32,
    opened_at: Option<DateTime<Utc>>,
    // Bumped on every transition; outcomes of calls admitted under an older
    // generation are ignored.
    generation: u64,
}

/// Point-in-time view of a breaker, for diagnostics.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct BreakerSnapshot {
    pub name: String,
    pub state: BreakerState,
    pub failure_count: u32,
    pub success_count: u32,
    pub opened_at: Option<DateTime<Utc>>,
}

/// Guards calls to one dependency.
///
/// Cheap to clone; clones share state. The state is protected by a mutex
/// that is never held across an `.await`.
#[derive(Clone)]
pub struct CircuitBreaker {
    name: Arc<str>,
    config: BreakerConfig,
    inner: Arc<Mutex<Inner>>,
    clock: SharedClock,
}

impl CircuitBreaker {
    /// Creates a breaker on the system clock.
    pub fn new(name: impl Into<String>, config: BreakerConfig) -> Result<Self, ConfigError> {
        Self::with_clock(name, config, SystemClock::shared())
    }

    /// Creates a breaker reading time from `clock`.
    pub fn with_clock(
        name: impl Into<String>,
        config: BreakerConfig,
        clock: SharedClock,
    ) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self {
            name: Arc::from(name.into()),
            config,
            inner: Arc::new(Mutex::new(Inner::default())),
            clock,
        })
    }

    /// Returns the breaker's name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns the breaker's configuration.
    pub fn config(&self) -> &BreakerConfig {
        &self.config
    }

    /// Returns the current state.
    ///
    /// An Open breaker whose reset timeout has elapsed still reports Open
    /// until the next call moves it to HalfOpen.
    pub fn state(&self) -> BreakerState {
        self.lock().state
    }

    /// Returns a diagnostic snapshot.
    pub fn snapshot(&self) -> BreakerSnapshot {
        let inner = self.lock();
        BreakerSnapshot {
            name: self.name.to_string(),
            state: inner.state,
            failure_count: inner.failure_count,
            success_count: inner.success_count,
            opened_at: inner.opened_at,
        }
    }

    /// Forces the breaker back to Closed.
    pub fn reset(&self) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.state != BreakerState::Closed {
            self.transition(&mut inner, BreakerState::Closed, now);
        } else {
            inner.failure_count = 0;
        }
    }

    /// Runs `f` if the breaker admits calls. Every `Err` counts as a failure.
    pub async fn call<F, Fut, T, E>(&self, f: F) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
    {
        self.call_classified(f, |_| true).await
    }

    /// Runs `f` if the breaker admits calls, counting only errors for which
    /// `is_failure` returns true.
    ///
    /// Errors that say nothing about the dependency's health (validation
    /// failures, business rule rejections) should not trip the breaker.
    pub async fn call_classified<F, Fut, T, E, C>(
        &self,
        f: F,
        is_failure: C,
    ) -> Result<T, BreakerError<E>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T, E>>,
        C: FnOnce(&E) -> bool,
    {
        let mut permit = match self.try_acquire() {
            Some(permit) => permit,
            None => {
                metrics::counter!(
                    "circuit_breaker_rejections_total",
                    "breaker" => self.name.to_string()
                )
                .increment(1);
                tracing::debug!(breaker = %self.name, "call rejected, breaker open");
                return Err(BreakerError::Open {
                    name: self.name.to_string(),
                });
            }
        };

        match f().await {
            Ok(value) => {
                permit.complete(true);
                Ok(value)
            }
            Err(err) => {
                permit.complete(!is_failure(&err));
                Err(BreakerError::Call(err))
            }
        }
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn try_acquire(&self) -> Option<Permit<'_>> {
        let now = self.clock.now();
        let mut inner = self.lock();

        match inner.state {
            BreakerState::Closed => {}
            BreakerState::Open => {
                let elapsed = inner
                    .opened_at
                    .and_then(|opened_at| (now - opened_at).to_std().ok());
                match elapsed {
                    Some(elapsed) if elapsed >= self.config.reset_timeout => {
                        self.transition(&mut inner, BreakerState::HalfOpen, now);
                        inner.half_open_calls = 1;
                    }
                    _ => return None,
                }
            }
            BreakerState::HalfOpen => {
                if inner.half_open_calls >= self.config.half_open_max_calls {
                    return None;
                }
                inner.half_open_calls += 1;
            }
        }

        Some(Permit {
            breaker: self,
            generation: inner.generation,
            probe: inner.state == BreakerState::HalfOpen,
            completed: false,
        })
    }

    fn on_success(&self, generation: u64) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            BreakerState::Closed => inner.failure_count = 0,
            BreakerState::HalfOpen => {
                inner.success_count += 1;
                if inner.success_count >= self.config.success_threshold {
                    self.transition(&mut inner, BreakerState::Closed, now);
                }
            }
            BreakerState::Open => {}
        }
    }

    fn on_failure(&self, generation: u64) {
        let now = self.clock.now();
        let mut inner = self.lock();
        if inner.generation != generation {
            return;
        }

        match inner.state {
            BreakerState::Closed => {
                inner.failure_count += 1;
                if inner.failure_count >= self.config.failure_threshold {
                    self.transition(&mut inner, BreakerState::Open, now);
                }
            }
            BreakerState::HalfOpen => self.transition(&mut inner, BreakerState::Open, now),
            BreakerState::Open => {}
        }
    }

    fn on_abandoned_probe(&self, generation: u64) {
        let mut inner = self.lock();
        if inner.generation == generation && inner.state == BreakerState::HalfOpen {
            inner.half_open_calls = inner.half_open_calls.saturating_sub(1);
        }
    }

    fn transition(&self, inner: &mut Inner, to: BreakerState, now: DateTime<Utc>) {
        let from = inner.state;
        inner.state = to;
        inner.failure_count = 0;
        inner.success_count = 0;
        inner.half_open_calls = 0;
        inner.generation += 1;
        inner.opened_at = (to == BreakerState::Open).then_some(now);

        metrics::counter!(
            "circuit_breaker_transitions_total",
            "breaker" => self.name.to_string(),
            "to" => to.as_str()
        )
        .increment(1);

        match to {
            BreakerState::Open => {
                tracing::warn!(breaker = %self.name, %from, %to, "circuit breaker opened")
            }
            _ => tracing::info!(breaker = %self.name, %from, %to, "circuit breaker transition"),
        }
    }
}

impl std::fmt::Debug for CircuitBreaker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CircuitBreaker")
            .field("name", &self.name)
            .field("config", &self.config)
            .field("state", &self.state())
            .finish()
    }
}

/// Admission to run one call. Dropping it without completing (the caller's
/// future was cancelled) gives a half-open probe slot back.
struct Permit<'a> {
    breaker: &'a CircuitBreaker,
    generation: u64,
    probe: bool,
    completed: bool,
}

impl Permit<'_> {
    fn complete(&mut self, success: bool) {
        self.completed = true;
        if success {
            self.breaker.on_success(self.generation);
        } else {
            self.breaker.on_failure(self.generation);
        }
    }
}

impl Drop for Permit<'_> {
    fn drop(&mut self) {
        if !self.completed && self.probe {
            self.breaker.on_abandoned_probe(self.generation);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::ManualClock;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    #[derive(Debug, PartialEq)]
    struct Boom;

    impl std::fmt::Display for Boom {
        fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
            write!(f, "boom")
        }
    }

    impl std::error::Error for Boom {}

    fn breaker(config: BreakerConfig) -> (CircuitBreaker, ManualClock) {
        let clock = ManualClock::starting_now();
        let breaker = CircuitBreaker::with_clock("test", config, Arc::new(clock.clone())).unwrap();
        (breaker, clock)
    }

    fn config() -> BreakerConfig {
        BreakerConfig::default()
            .with_failure_threshold(3)
            .with_reset_timeout(Duration::from_secs(10))
    }

    async fn fail(breaker: &CircuitBreaker) -> BreakerError<Boom> {
        breaker
            .call(|| async { Err::<(), _>(Boom) })
            .await
            .unwrap_err()
    }

    async fn succeed(breaker: &CircuitBreaker) -> Result<u32, BreakerError<Boom>> {
        breaker.call(|| async { Ok::<_, Boom>(7) }).await
    }

    #[tokio::test]
    async fn test_closed_passes_calls_through() {
        let (breaker, _) = breaker(config());
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
        assert!(matches!(fail(&breaker).await, BreakerError::Call(Boom)));
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_opens_after_threshold_consecutive_failures() {
        let (breaker, _) = breaker(config());

        fail(&breaker).await;
        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 2);

        fail(&breaker).await;
        assert_eq!(breaker.state(), BreakerState::Open);
        assert!(breaker.snapshot().opened_at.is_some());
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn test_success_resets_failure_count() {
        let (breaker, _) = breaker(config());

        fail(&breaker).await;
        fail(&breaker).await;
        succeed(&breaker).await.unwrap();
        fail(&breaker).await;
        fail(&breaker).await;

        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_open_rejects_without_invoking() {
        let (breaker, clock) = breaker(config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        clock.advance(Duration::from_secs(9));
        let invoked = AtomicUsize::new(0);
        let counter = &invoked;
        let err = breaker
            .call(|| async move {
                counter.fetch_add(1, Ordering::SeqCst);
                Ok::<_, Boom>(())
            })
            .await
            .unwrap_err();

        assert!(err.is_open());
        assert_eq!(invoked.load(Ordering::SeqCst), 0);
        assert_eq!(breaker.state(), BreakerState::Open);
    }

    #[tokio::test]
    async fn test_half_open_closes_after_two_successes() {
        let (breaker, clock) = breaker(config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        clock.advance(Duration::from_secs(10));
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
        let snapshot = breaker.snapshot();
        assert_eq!(snapshot.failure_count, 0);
        assert_eq!(snapshot.success_count, 0);
    }

    #[tokio::test]
    async fn test_half_open_failure_reopens_immediately() {
        let (breaker, clock) = breaker(config());
        for _ in 0..3 {
            fail(&breaker).await;
        }

        clock.advance(Duration::from_secs(10));
        succeed(&breaker).await.unwrap();
        assert!(matches!(fail(&breaker).await, BreakerError::Call(Boom)));
        assert_eq!(breaker.state(), BreakerState::Open);

        // The open period restarts from the re-open time.
        clock.advance(Duration::from_secs(5));
        assert!(succeed(&breaker).await.unwrap_err().is_open());

        clock.advance(Duration::from_secs(5));
        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::HalfOpen);
    }

    #[tokio::test]
    async fn test_half_open_limits_concurrent_probes() {
        let config = config()
            .with_success_threshold(1)
            .with_half_open_max_calls(1);
        let (breaker, clock) = breaker(config);
        for _ in 0..3 {
            fail(&breaker).await;
        }
        clock.advance(Duration::from_secs(10));

        let (release, wait) = tokio::sync::oneshot::channel::<()>();
        let probe_breaker = breaker.clone();
        let probe = tokio::spawn(async move {
            probe_breaker
                .call(move || async move {
                    wait.await.ok();
                    Ok::<_, Boom>(())
                })
                .await
        });

        while breaker.state() != BreakerState::HalfOpen {
            tokio::task::yield_now().await;
        }

        assert!(succeed(&breaker).await.unwrap_err().is_open());

        release.send(()).unwrap();
        probe.await.unwrap().unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_abandoned_probe_frees_its_slot() {
        let config = config()
            .with_success_threshold(1)
            .with_half_open_max_calls(1);
        let (breaker, clock) = breaker(config);
        for _ in 0..3 {
            fail(&breaker).await;
        }
        clock.advance(Duration::from_secs(10));

        let abandoned = tokio::time::timeout(
            Duration::from_millis(10),
            breaker.call(|| std::future::pending::<Result<(), Boom>>()),
        )
        .await;
        assert!(abandoned.is_err());
        assert_eq!(breaker.state(), BreakerState::HalfOpen);

        succeed(&breaker).await.unwrap();
        assert_eq!(breaker.state(), BreakerState::Closed);
    }

    #[tokio::test]
    async fn test_classified_errors_do_not_trip() {
        let (breaker, _) = breaker(config());

        for _ in 0..5 {
            let err = breaker
                .call_classified(|| async { Err::<(), _>(Boom) }, |_| false)
                .await
                .unwrap_err();
            assert!(!err.is_open());
        }

        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(breaker.snapshot().failure_count, 0);
    }

    #[tokio::test]
    async fn test_reset_closes_open_breaker() {
        let (breaker, _) = breaker(config());
        for _ in 0..3 {
            fail(&breaker).await;
        }
        assert_eq!(breaker.state(), BreakerState::Open);

        breaker.reset();
        assert_eq!(breaker.state(), BreakerState::Closed);
        assert_eq!(succeed(&breaker).await.unwrap(), 7);
    }

    #[tokio::test]
    async fn test_invalid_config_rejected() {
        let result = CircuitBreaker::new("bad", BreakerConfig::default().with_failure_threshold(0));
        assert!(result.is_err());
    }

    #[test]
    fn test_open_error_is_distinguishable() {
        let open: BreakerError<Boom> = BreakerError::Open {
            name: "ledger".to_string(),
        };
        assert!(open.is_open());
        assert_eq!(open.to_string(), "Circuit breaker 'ledger' is open");
        assert!(open.into_inner().is_none());

        let call: BreakerError<Boom> = BreakerError::Call(Boom);
        assert!(!call.is_open());
        assert_eq!(call.into_inner(), Some(Boom));
    }

    #[test]
    fn test_snapshot_serializes() {
        let breaker = CircuitBreaker::new("ledger", BreakerConfig::default()).unwrap();
        let json = serde_json::to_value(breaker.snapshot()).unwrap();
        assert_eq!(json["name"], "ledger");
        assert_eq!(json["state"], "Closed");
    }
}
