use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::{Context, SharedClock, SystemClock};
use tokio::sync::Mutex;

use crate::store::{CoordinationStore, expires_at};
use crate::{BucketDecision, BucketSpec, BucketState, Result, StoreError};

#[derive(Debug, Clone)]
struct Entry {
    value: String,
    expires_at: Option<DateTime<Utc>>,
}

impl Entry {
    fn is_live(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_none_or(|at| at > now)
    }
}

#[derive(Debug, Default)]
struct State {
    entries: HashMap<String, Entry>,
    buckets: HashMap<String, (BucketState, Option<DateTime<Utc>>)>,
}

impl State {
    fn purge(&mut self, now: DateTime<Utc>) -> u64 {
        let before = self.entries.len() + self.buckets.len();
        self.entries.retain(|_, entry| entry.is_live(now));
        self.buckets
            .retain(|_, (_, expiry)| expiry.is_none_or(|at| at > now));
        (before - self.entries.len() - self.buckets.len()) as u64
    }

    fn live_entry(&mut self, key: &str, now: DateTime<Utc>) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|e| !e.is_live(now)) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }
}

/// In-memory coordination store.
///
/// One mutex serializes every operation, which makes each primitive atomic
/// with respect to all others. Time is read from an injectable clock so TTL
/// expiry can be driven by tests. Supports failure and latency injection.
#[derive(Clone)]
pub struct InMemoryCoordinationStore {
    state: Arc<Mutex<State>>,
    clock: SharedClock,
    unavailable: Arc<AtomicBool>,
    latency_ms: Arc<AtomicU64>,
}

impl InMemoryCoordinationStore {
    /// Creates a new empty store on the system clock.
    pub fn new() -> Self {
        Self::with_clock(SystemClock::shared())
    }

    /// Creates a new empty store reading time from `clock`.
    pub fn with_clock(clock: SharedClock) -> Self {
        Self {
            state: Arc::new(Mutex::new(State::default())),
            clock,
            unavailable: Arc::new(AtomicBool::new(false)),
            latency_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Makes every subsequent call fail with [`StoreError::Unavailable`].
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Delays every subsequent call by `latency` before it touches state.
    pub fn set_latency(&self, latency: Duration) {
        let millis = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(millis, Ordering::SeqCst);
    }

    /// Returns the number of live key-value entries.
    pub async fn len(&self) -> usize {
        let now = self.clock.now();
        let state = self.state.lock().await;
        state.entries.values().filter(|e| e.is_live(now)).count()
    }

    /// Returns true if no live key-value entries exist.
    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Returns the number of token buckets with state.
    pub async fn bucket_count(&self) -> usize {
        self.state.lock().await.buckets.len()
    }

    /// Deletes expired entries and buckets. Returns the number removed.
    ///
    /// Expired state is already invisible to every operation; this only
    /// reclaims memory for keys that are never touched again.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64> {
        let now = self.clock.now();
        let purged = self.state.lock().await.purge(now);
        tracing::debug!(purged, "purged expired coordination state");
        metrics::counter!("coordination_store_purged_rows_total", "backend" => "memory")
            .increment(purged);
        Ok(purged)
    }

    /// Clears all entries and buckets.
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.entries.clear();
        state.buckets.clear();
    }

    async fn with_state<T, F>(&self, ctx: &Context, f: F) -> Result<T>
    where
        F: FnOnce(&mut State, DateTime<Utc>) -> T + Send,
        T: Send,
    {
        let op = async {
            let latency = self.latency_ms.load(Ordering::SeqCst);
            if latency > 0 {
                tokio::time::sleep(Duration::from_millis(latency)).await;
            }
            if self.unavailable.load(Ordering::SeqCst) {
                return Err(StoreError::Unavailable(
                    "in-memory store marked unavailable".to_string(),
                ));
            }
            let mut state = self.state.lock().await;
            let now = self.clock.now();
            Ok(f(&mut state, now))
        };
        ctx.run(op).await?
    }
}

impl Default for InMemoryCoordinationStore {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for InMemoryCoordinationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryCoordinationStore")
            .field("clock", &self.clock)
            .field("unavailable", &self.unavailable.load(Ordering::SeqCst))
            .finish_non_exhaustive()
    }
}

#[async_trait]
impl CoordinationStore for InMemoryCoordinationStore {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        self.with_state(ctx, |state, now| {
            if state.live_entry(key, now).is_some() {
                return false;
            }
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: expires_at(now, ttl),
                },
            );
            true
        })
        .await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>> {
        self.with_state(ctx, |state, now| {
            state.live_entry(key, now).map(|e| e.value.clone())
        })
        .await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        self.with_state(ctx, |state, now| {
            state.entries.insert(
                key.to_string(),
                Entry {
                    value: value.to_string(),
                    expires_at: ttl.and_then(|ttl| expires_at(now, ttl)),
                },
            );
        })
        .await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<bool> {
        self.with_state(ctx, |state, now| {
            state.entries.remove(key).is_some_and(|e| e.is_live(now))
        })
        .await
    }

    async fn delete_if_equals(&self, ctx: &Context, key: &str, expected: &str) -> Result<bool> {
        self.with_state(ctx, |state, now| {
            let matches = state
                .live_entry(key, now)
                .is_some_and(|e| e.value == expected);
            if matches {
                state.entries.remove(key);
            }
            matches
        })
        .await
    }

    async fn take_token(
        &self,
        ctx: &Context,
        key: &str,
        spec: &BucketSpec,
        ttl: Duration,
    ) -> Result<BucketDecision> {
        self.with_state(ctx, |state, now| {
            let current = match state.buckets.get(key) {
                Some((bucket, expiry)) if expiry.is_none_or(|at| at > now) => *bucket,
                _ => BucketState::full(spec, now),
            };
            let (next, decision) = current.take(spec, now);
            state
                .buckets
                .insert(key.to_string(), (next, expires_at(now, ttl)));
            decision
        })
        .await
    }
}
