//! Expiring key-value store abstraction.
//!
//! All shared authentication state (rate-limit counters, sessions, pending
//! 2FA challenges) lives behind this trait. Every operation is individually
//! atomic at the store, so concurrent attempts against the same identity
//! serialize without application-level locking.

use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

pub mod memory;
pub mod postgres;

pub use memory::MemoryStore;
pub use postgres::PgStore;

#[async_trait]
pub trait ExpiringKeyValueStore: Send + Sync {
    /// Set `key` to `value`, replacing any previous entry and its TTL.
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()>;

    /// Fetch the value if present and not expired.
    async fn get(&self, key: &str) -> Result<Option<String>>;

    /// Atomic get-and-refresh: fetch a live entry and reset its TTL to `ttl`
    /// in the same store operation. Returns `None` when the entry is missing
    /// or expired, leaving nothing behind.
    async fn get_and_refresh(&self, key: &str, ttl: Duration) -> Result<Option<String>>;

    /// Atomically increment a counter, creating it with `ttl` on first touch.
    /// Increments on an existing live counter do NOT refresh its TTL.
    /// Returns the new count.
    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64>;

    /// Atomic get-and-delete. Returns the value if it was present and live.
    async fn take(&self, key: &str) -> Result<Option<String>>;

    /// Unconditional delete; idempotent.
    async fn delete(&self, key: &str) -> Result<()>;

    /// Remaining TTL of a live entry, if any.
    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>>;
}
