use std::time::{Duration, Instant};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use common::Context;
use sqlx::{PgPool, Row};

use crate::store::CoordinationStore;
use crate::{BucketDecision, BucketSpec, BucketState, Result};

/// Longest TTL written to the database; larger values are clamped so the
/// expiry stays within the range of `timestamptz`.
const MAX_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

fn interval_secs(ttl: Duration) -> f64 {
    ttl.min(MAX_TTL).as_secs_f64()
}

/// PostgreSQL-backed coordination store.
///
/// Time is taken from the database (`clock_timestamp()`), so every service
/// instance sharing the database agrees on expiry and refill time.
/// Lock acquisition is a conditional upsert and token-bucket updates run in
/// a transaction holding the bucket's row lock.
#[derive(Clone)]
pub struct PostgresCoordinationStore {
    pool: PgPool,
}

impl PostgresCoordinationStore {
    /// Creates a new PostgreSQL coordination store.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Gets a reference to the underlying connection pool.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Runs the database migrations.
    pub async fn run_migrations(&self) -> std::result::Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("../../migrations").run(&self.pool).await
    }

    /// Deletes expired entries and buckets. Returns the number of rows removed.
    ///
    /// Expired rows are already invisible to every operation; this only
    /// reclaims space.
    #[tracing::instrument(skip(self))]
    pub async fn purge_expired(&self) -> Result<u64> {
        let entries = sqlx::query(
            "DELETE FROM coordination_entries WHERE expires_at IS NOT NULL AND expires_at <= clock_timestamp()",
        )
        .execute(&self.pool)
        .await?
        .rows_affected();

        let buckets =
            sqlx::query("DELETE FROM token_buckets WHERE expires_at <= clock_timestamp()")
                .execute(&self.pool)
                .await?
                .rows_affected();

        tracing::debug!(entries, buckets, "purged expired coordination rows");
        metrics::counter!("coordination_store_purged_rows_total", "backend" => "postgres")
            .increment(entries + buckets);
        Ok(entries + buckets)
    }

    async fn take_token_tx(
        &self,
        key: &str,
        spec: &BucketSpec,
        ttl: Duration,
    ) -> Result<BucketDecision> {
        let mut tx = self.pool.begin().await?;

        sqlx::query(
            r#"
            INSERT INTO token_buckets (key, tokens, last_refill, expires_at)
            VALUES ($1, $2, clock_timestamp(), clock_timestamp() + make_interval(secs => $3::double precision))
            ON CONFLICT (key) DO NOTHING
            "#,
        )
        .bind(key)
        .bind(spec.capacity)
        .bind(interval_secs(ttl))
        .execute(&mut *tx)
        .await?;

        let row = sqlx::query(
            "SELECT tokens, last_refill, expires_at FROM token_buckets WHERE key = $1 FOR UPDATE",
        )
        .bind(key)
        .fetch_one(&mut *tx)
        .await?;

        // Read after the row lock is held so a waiter sees the latest refill time.
        let now: DateTime<Utc> = sqlx::query_scalar("SELECT clock_timestamp()")
            .fetch_one(&mut *tx)
            .await?;

        let expiry: DateTime<Utc> = row.try_get("expires_at")?;
        let current = if expiry <= now {
            BucketState::full(spec, now)
        } else {
            BucketState {
                tokens: row.try_get("tokens")?,
                last_refill: row.try_get("last_refill")?,
            }
        };

        let (next, decision) = current.take(spec, now);

        sqlx::query(
            r#"
            UPDATE token_buckets
            SET tokens = $2, last_refill = $3,
                expires_at = $3 + make_interval(secs => $4::double precision)
            WHERE key = $1
            "#,
        )
        .bind(key)
        .bind(next.tokens)
        .bind(next.last_refill)
        .bind(interval_secs(ttl))
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;
        Ok(decision)
    }
}

#[async_trait]
impl CoordinationStore for PostgresCoordinationStore {
    async fn set_if_absent(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Duration,
    ) -> Result<bool> {
        let query = sqlx::query(
            r#"
            INSERT INTO coordination_entries (key, value, expires_at)
            VALUES ($1, $2, clock_timestamp() + make_interval(secs => $3::double precision))
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
                WHERE coordination_entries.expires_at IS NOT NULL
                  AND coordination_entries.expires_at <= clock_timestamp()
            RETURNING key
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(interval_secs(ttl))
        .fetch_optional(&self.pool);

        let acquired = ctx.run(query).await??.is_some();
        metrics::counter!(
            "coordination_store_set_if_absent_total",
            "backend" => "postgres",
            "acquired" => if acquired { "true" } else { "false" }
        )
        .increment(1);
        Ok(acquired)
    }

    async fn get(&self, ctx: &Context, key: &str) -> Result<Option<String>> {
        let query = sqlx::query_scalar::<_, String>(
            r#"
            SELECT value FROM coordination_entries
            WHERE key = $1 AND (expires_at IS NULL OR expires_at > clock_timestamp())
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool);

        Ok(ctx.run(query).await??)
    }

    async fn set(
        &self,
        ctx: &Context,
        key: &str,
        value: &str,
        ttl: Option<Duration>,
    ) -> Result<()> {
        // A NULL interval yields a NULL expiry, i.e. no expiry.
        let query = sqlx::query(
            r#"
            INSERT INTO coordination_entries (key, value, expires_at)
            VALUES ($1, $2, clock_timestamp() + make_interval(secs => $3::double precision))
            ON CONFLICT (key) DO UPDATE
                SET value = EXCLUDED.value, expires_at = EXCLUDED.expires_at
            "#,
        )
        .bind(key)
        .bind(value)
        .bind(ttl.map(interval_secs))
        .execute(&self.pool);

        ctx.run(query).await??;
        Ok(())
    }

    async fn delete(&self, ctx: &Context, key: &str) -> Result<bool> {
        let query = sqlx::query(
            r#"
            DELETE FROM coordination_entries WHERE key = $1
            RETURNING (expires_at IS NULL OR expires_at > clock_timestamp()) AS live
            "#,
        )
        .bind(key)
        .fetch_optional(&self.pool);

        match ctx.run(query).await?? {
            Some(row) => Ok(row.try_get::<bool, _>("live")?),
            None => Ok(false),
        }
    }

    async fn delete_if_equals(&self, ctx: &Context, key: &str, expected: &str) -> Result<bool> {
        let query = sqlx::query(
            r#"
            DELETE FROM coordination_entries
            WHERE key = $1 AND value = $2
              AND (expires_at IS NULL OR expires_at > clock_timestamp())
            "#,
        )
        .bind(key)
        .bind(expected)
        .execute(&self.pool);

        Ok(ctx.run(query).await??.rows_affected() > 0)
    }

    #[tracing::instrument(skip(self, ctx, spec))]
    async fn take_token(
        &self,
        ctx: &Context,
        key: &str,
        spec: &BucketSpec,
        ttl: Duration,
    ) -> Result<BucketDecision> {
        let started = Instant::now();
        // Dropping the future mid-transaction rolls the transaction back.
        let decision = ctx.run(self.take_token_tx(key, spec, ttl)).await?;
        metrics::histogram!("coordination_store_take_token_seconds", "backend" => "postgres")
            .record(started.elapsed().as_secs_f64());
        decision
    }
}
