//! Application configuration loaded from environment variables.

use std::str::FromStr;
use std::time::Duration;

use circuit_breaker::BreakerConfig;
use idempotency::IdempotencyConfig;
use rate_limit::{FailurePolicy, RateLimitConfig};

/// Log output format.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LogFormat {
    Text,
    Json,
}

/// Server configuration with sensible defaults.
///
/// Reads from environment variables:
/// - `HOST`: bind address (default: `"0.0.0.0"`)
/// - `PORT`: listen port (default: `3000`)
/// - `RUST_LOG`: tracing filter directive (default: `"info"`)
/// - `LOG_FORMAT`: `text` or `json` (default: `text`)
/// - `DATABASE_URL`: Postgres coordination store; in-memory when unset
/// - `REQUEST_TIMEOUT_MS`: per-request deadline (default: `10000`)
/// - `RATE_LIMIT_CAPACITY`: bucket size per client (default: `100`)
/// - `RATE_LIMIT_REFILL_PER_SEC`: tokens per second (default: `10`)
/// - `RATE_LIMIT_FAILURE_POLICY`: `open` or `closed` (default: `closed`)
/// - `IDEMPOTENCY_LOCK_TTL_SECS`: in-progress lock lifetime (default: `30`)
/// - `IDEMPOTENCY_COMPLETION_TTL_SECS`: duplicate suppression window (default: `86400`)
/// - `BREAKER_FAILURE_THRESHOLD`: failures before opening (default: `5`)
/// - `BREAKER_SUCCESS_THRESHOLD`: half-open successes before closing (default: `2`)
/// - `BREAKER_RESET_TIMEOUT_MS`: open duration before probing (default: `30000`)
///
/// Unparsable values fall back to the default.
#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub log_level: String,
    pub log_format: LogFormat,
    pub database_url: Option<String>,
    pub request_timeout: Duration,
    pub rate_limit_capacity: u32,
    pub rate_limit_refill_per_sec: f64,
    pub rate_limit_failure_policy: FailurePolicy,
    pub idempotency_lock_ttl: Duration,
    pub idempotency_completion_ttl: Duration,
    pub breaker_failure_threshold: u32,
    pub breaker_success_threshold: u32,
    pub breaker_reset_timeout: Duration,
}

impl Config {
    /// Loads configuration from environment variables, falling back to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Loads configuration from `lookup`, falling back to defaults.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let defaults = Self::default();

        Self {
            host: lookup("HOST").unwrap_or(defaults.host),
            port: parse(&lookup, "PORT").unwrap_or(defaults.port),
            log_level: lookup("RUST_LOG").unwrap_or(defaults.log_level),
            log_format: match lookup("LOG_FORMAT").as_deref() {
                Some(format) if format.eq_ignore_ascii_case("json") => LogFormat::Json,
                _ => defaults.log_format,
            },
            database_url: lookup("DATABASE_URL").filter(|url| !url.is_empty()),
            request_timeout: parse(&lookup, "REQUEST_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
            rate_limit_capacity: parse(&lookup, "RATE_LIMIT_CAPACITY")
                .unwrap_or(defaults.rate_limit_capacity),
            rate_limit_refill_per_sec: parse(&lookup, "RATE_LIMIT_REFILL_PER_SEC")
                .unwrap_or(defaults.rate_limit_refill_per_sec),
            rate_limit_failure_policy: parse(&lookup, "RATE_LIMIT_FAILURE_POLICY")
                .unwrap_or(defaults.rate_limit_failure_policy),
            idempotency_lock_ttl: parse(&lookup, "IDEMPOTENCY_LOCK_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_lock_ttl),
            idempotency_completion_ttl: parse(&lookup, "IDEMPOTENCY_COMPLETION_TTL_SECS")
                .map(Duration::from_secs)
                .unwrap_or(defaults.idempotency_completion_ttl),
            breaker_failure_threshold: parse(&lookup, "BREAKER_FAILURE_THRESHOLD")
                .unwrap_or(defaults.breaker_failure_threshold),
            breaker_success_threshold: parse(&lookup, "BREAKER_SUCCESS_THRESHOLD")
                .unwrap_or(defaults.breaker_success_threshold),
            breaker_reset_timeout: parse(&lookup, "BREAKER_RESET_TIMEOUT_MS")
                .map(Duration::from_millis)
                .unwrap_or(defaults.breaker_reset_timeout),
        }
    }

    /// Returns the `"host:port"` bind address string.
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub fn rate_limit(&self) -> RateLimitConfig {
        RateLimitConfig::new(self.rate_limit_capacity, self.rate_limit_refill_per_sec)
    }

    pub fn idempotency(&self) -> IdempotencyConfig {
        IdempotencyConfig::default()
            .with_lock_ttl(self.idempotency_lock_ttl)
            .with_completion_ttl(self.idempotency_completion_ttl)
    }

    pub fn breaker(&self) -> BreakerConfig {
        BreakerConfig::default()
            .with_failure_threshold(self.breaker_failure_threshold)
            .with_success_threshold(self.breaker_success_threshold)
            .with_reset_timeout(self.breaker_reset_timeout)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: 3000,
            log_level: "info".to_string(),
            log_format: LogFormat::Text,
            database_url: None,
            request_timeout: Duration::from_secs(10),
            rate_limit_capacity: 100,
            rate_limit_refill_per_sec: 10.0,
            rate_limit_failure_policy: FailurePolicy::FailClosed,
            idempotency_lock_ttl: Duration::from_secs(30),
            idempotency_completion_ttl: Duration::from_secs(24 * 60 * 60),
            breaker_failure_threshold: 5,
            breaker_success_threshold: 2,
            breaker_reset_timeout: Duration::from_secs(30),
        }
    }
}

fn parse<T: FromStr>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Option<T> {
    lookup(key).and_then(|value| value.trim().parse().ok())
}
