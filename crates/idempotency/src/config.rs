use std::time::Duration;

/// Tuning for an [`IdempotencyGuard`](crate::IdempotencyGuard).
///
/// The two TTLs are independent: `lock_ttl` bounds how long a crashed
/// executor can block retries, `completion_ttl` is how long duplicates are
/// suppressed after success.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdempotencyConfig {
    /// Lifetime of the in-progress lock.
    pub lock_ttl: Duration,
    /// Lifetime of the completion record.
    pub completion_ttl: Duration,
    /// Budget for writing the completion record and releasing the lock.
    /// This work runs even when the caller's context has been cancelled.
    pub release_timeout: Duration,
    /// Prefix prepended to every key in the store.
    pub key_prefix: String,
}

impl IdempotencyConfig {
    /// Sets the lock TTL.
    pub fn with_lock_ttl(mut self, ttl: Duration) -> Self {
        self.lock_ttl = ttl;
        self
    }

    /// Sets the completion record TTL.
    pub fn with_completion_ttl(mut self, ttl: Duration) -> Self {
        self.completion_ttl = ttl;
        self
    }

    /// Sets the cleanup budget.
    pub fn with_release_timeout(mut self, timeout: Duration) -> Self {
        self.release_timeout = timeout;
        self
    }

    /// Sets the key prefix.
    pub fn with_key_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.key_prefix = prefix.into();
        self
    }

    pub(crate) fn lock_key(&self, key: &str) -> String {
        format!("{}{}:lock", self.key_prefix, key)
    }

    pub(crate) fn completion_key(&self, key: &str) -> String {
        format!("{}{}:done", self.key_prefix, key)
    }
}

impl Default for IdempotencyConfig {
    fn default() -> Self {
        Self {
            lock_ttl: Duration::from_secs(30),
            completion_ttl: Duration::from_secs(24 * 60 * 60),
            release_timeout: Duration::from_secs(5),
            key_prefix: "idempotency:".to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = IdempotencyConfig::default();
        assert_eq!(config.lock_ttl, Duration::from_secs(30));
        assert_eq!(config.completion_ttl, Duration::from_secs(86_400));
    }

    #[test]
    fn test_ttls_tuned_independently() {
        let config = IdempotencyConfig::default()
            .with_lock_ttl(Duration::from_secs(5))
            .with_completion_ttl(Duration::from_secs(3600));
        assert_eq!(config.lock_ttl, Duration::from_secs(5));
        assert_eq!(config.completion_ttl, Duration::from_secs(3600));
    }

    #[test]
    fn test_key_layout() {
        let config = IdempotencyConfig::default().with_key_prefix("idem:");
        assert_eq!(config.lock_key("abc"), "idem:abc:lock");
        assert_eq!(config.completion_key("abc"), "idem:abc:done");
    }
}
