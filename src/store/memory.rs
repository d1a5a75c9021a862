//! In-memory expiring store for tests and single-process deployments.

use anyhow::{Context, Result};
use async_trait::async_trait;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;

use super::ExpiringKeyValueStore;

struct Entry {
    value: String,
    expires_at: Instant,
}

impl Entry {
    fn live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// Mutex-serialized map with lazy expiry. The single lock makes every
/// operation atomic with respect to concurrent callers.
#[derive(Default)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Entry>>,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl ExpiringKeyValueStore for MemoryStore {
    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        entries.retain(|_, entry| entry.live(now));
        entries.insert(
            key.to_string(),
            Entry {
                value: value.to_string(),
                expires_at: now + ttl,
            },
        );
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value.clone()))
    }

    async fn get_and_refresh(&self, key: &str, ttl: Duration) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get_mut(key)
            .filter(|entry| entry.live(now))
            .map(|entry| {
                entry.expires_at = now + ttl;
                entry.value.clone()
            }))
    }

    async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> Result<i64> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        match entries.get_mut(key).filter(|entry| entry.live(now)) {
            Some(entry) => {
                let count: i64 = entry
                    .value
                    .parse()
                    .with_context(|| format!("key {key} does not hold a counter"))?;
                let count = count + 1;
                // Window stays fixed from the first attempt.
                entry.value = count.to_string();
                Ok(count)
            }
            None => {
                entries.insert(
                    key.to_string(),
                    Entry {
                        value: "1".to_string(),
                        expires_at: now + ttl,
                    },
                );
                Ok(1)
            }
        }
    }

    async fn take(&self, key: &str) -> Result<Option<String>> {
        let mut entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .remove(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.value))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut entries = self.entries.lock().await;
        entries.remove(key);
        Ok(())
    }

    async fn ttl_remaining(&self, key: &str) -> Result<Option<Duration>> {
        let entries = self.entries.lock().await;
        let now = Instant::now();
        Ok(entries
            .get(key)
            .filter(|entry| entry.live(now))
            .map(|entry| entry.expires_at - now))
    }
}
