use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Context;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::{BucketDecision, BucketSpec, Result};

/// Core trait for coordination store implementations.
///
/// Every call takes the caller's [`Context`]; implementations stop waiting
/// and return [`StoreError::Context`](crate::StoreError::Context) once it is
/// cancelled or past its deadline. Expired entries are invisible to every
/// operation. All implementations must be thread-safe (Send + Sync).
#[async_trait]
pub trait CoordinationStore: Send + Sync {
    /// Stores `value` under `key` only if no live entry exists.
    ///
    /// Returns true if this call created the entry.
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool>;

    /// Reads the live value stored under `key`.
    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>>;

    /// Unconditionally stores `value` under `key`. `None` means no expiry.
    async fn set(&self, ctx: &Context, key: &str, value: &str, ttl: Option<Duration>)
    -> Result<()>;

    /// Removes `key`. Returns true if a live entry was removed.
    async fn delete(&self, ctx: &Context, key: &str) -> Result<bool>;

    /// Removes `key` only if its live value equals `expected`.
    ///
    /// Returns true if the entry was removed.
    async fn delete_if_equals(&self, ctx: &Context, key: &str, expected: &str) -> Result<bool>;

    /// Atomically refills the bucket stored under `key` and tries to take one token.
    ///
    /// A missing or expired bucket starts full. The bucket state expires
    /// after `ttl` of inactivity.
    async fn take_token(
        &self,
        ctx: &Context,
        key: &str,
        spec: &BucketSpec,
        ttl: Duration,
    ) -> Result<BucketDecision>;
}

/// Extension trait providing convenience methods for coordination stores.
#[async_trait]
pub trait CoordinationStoreExt: CoordinationStore {
    /// Checks whether a live entry exists for `key`.
    async fn exists(&self, ctx: &Context, key: &str) -> Result<bool> {
        Ok(self.get(ctx, key).await?.is_some())
    }

    /// Reads and decodes a JSON value.
    async fn get_json<T>(&self, ctx: &Context, key: &str) -> Result<Option<T>>
    where
        T: DeserializeOwned + Send,
    {
        match self.get(ctx, key).await? {
            Some(raw) => Ok(Some(serde_json::from_str(&raw)?)),
            None => Ok(None),
        }
    }

    /// Encodes and stores a JSON value.
    async fn set_json<T>(
        &self,
        ctx: &Context,
        key: &str,
        value: &T,
        ttl: Option<Duration>,
    ) -> Result<()>
    where
        T: Serialize + Sync,
    {
        let raw = serde_json::to_string(value)?;
        self.set(ctx, key, &raw, ttl).await
    }
}

// Blanket implementation for all CoordinationStore implementations
impl<T: CoordinationStore + ?Sized> CoordinationStoreExt for T {}

// Lets one backend be shared as `Arc<dyn CoordinationStore>`.
#[async_trait]
impl<T: CoordinationStore + ?Sized> CoordinationStore for Arc<T> {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        (**self).set_if_absent(ctx, key, value, ttl).await
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>> {
        (**self).get(ctx, key).await
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        (**self).set(ctx, key, value, ttl).await
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<bool> {
        (**self).delete(ctx, key).await
    }

    async fn delete_if_equals(&self, ctx: &Context, key: &str, expected: &str) -> Result<bool> {
        (**self).delete_if_equals(ctx, key, expected).await
    }

    async fn take_token(
        &self,
        ctx: &Context,
        key: &str,
        spec: &BucketSpec,
        ttl: Duration,
    ) -> Result<BucketDecision> {
        (**self).take_token(ctx, key, spec, ttl).await
    }
}

/// Absolute expiry for an entry written at `now` with `ttl`.
///
/// A TTL too large to represent is treated as no expiry.
pub(crate) fn expires_at(now: DateTime<Utc>, ttl: Duration) -> Option<DateTime<Utc>> {
    chrono::Duration::from_std(ttl)
        .ok()
        .and_then(|ttl| now.checked_add_signed(ttl))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expires_at_adds_ttl() {
        let now = DateTime::from_timestamp(1_000, 0).unwrap();
        assert_eq!(
            expires_at(now, Duration::from_secs(30)),
            DateTime::from_timestamp(1_030, 0)
        );
    }

    #[test]
    fn test_expires_at_overflow_means_no_expiry() {
        let now = Utc::now();
        assert_eq!(expires_at(now, Duration::MAX), None);
    }
}
