//! Postgres-backed expiring store.
//!
//! Entries carry an `expires_at` column; expiry is enforced in every query
//! and lapsed rows are overwritten in place, so no sweeper is needed.
//! Counter increments and consume operations are single statements, which
//! keeps them atomic under concurrent login attempts.

use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::{PgPool, Row};
use std::time::Duration;
use tracing::Instrument;

use super::ExpiringKeyValueStore;

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn ttl_seconds(ttl: Duration) -> i64 {
    i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX)
}

#[async_trait]
impl ExpiringKeyValueStore for PgStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let query = r"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, $2, NOW() + ($3 * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE
            SET value = EXCLUDED.value,
                expires_at = EXCLUDED.expires_at
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .bind(value)
            .bind(ttl_seconds(ttl))
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to set kv entry")?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let query = "SELECT value FROM kv_entries WHERE key = $1 AND expires_at > NOW()";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to get kv entry")?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn get_and_refresh(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let query = r"
            UPDATE kv_entries
            SET expires_at = NOW() + ($2 * INTERVAL '1 second')
            WHERE key = $1 AND expires_at > NOW()
            RETURNING value
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(ttl_seconds(ttl))
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to refresh kv entry")?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        // A lapsed counter restarts at 1 with a fresh window; a live counter
        // keeps its window untouched.
        let query = r"
            INSERT INTO kv_entries (key, value, expires_at)
            VALUES ($1, '1', NOW() + ($2 * INTERVAL '1 second'))
            ON CONFLICT (key) DO UPDATE
            SET value = CASE
                    WHEN kv_entries.expires_at <= NOW() THEN '1'
                    ELSE (kv_entries.value::bigint + 1)::text
                END,
                expires_at = CASE
                    WHEN kv_entries.expires_at <= NOW()
                        THEN NOW() + ($2 * INTERVAL '1 second')
                    ELSE kv_entries.expires_at
                END
            RETURNING value
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .bind(ttl_seconds(ttl))
            .fetch_one(&self.pool)
            .instrument(span)
            .await
            .context("failed to increment kv counter")?;
        let value: String = row.get("value");
        value
            .parse()
            .with_context(|| format!("key {key} does not hold a counter"))
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let query = r"
            DELETE FROM kv_entries
            WHERE key = $1 AND expires_at > NOW()
            RETURNING value
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to take kv entry")?;
        Ok(row.map(|row| row.get("value")))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let query = "DELETE FROM kv_entries WHERE key = $1";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "DELETE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(key)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to delete kv entry")?;
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let query = r"
            SELECT CEIL(EXTRACT(EPOCH FROM (expires_at - NOW())))::bigint AS seconds
            FROM kv_entries
            WHERE key = $1 AND expires_at > NOW()
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(key)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to read kv ttl")?;
        Ok(row.map(|row| {
            let seconds: i64 = row.get("seconds");
            Duration::from_secs(u64::try_from(seconds).unwrap_or(0))
        }))
    }
}
