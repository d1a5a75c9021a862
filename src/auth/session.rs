//! Server-side sessions with sliding expiration.
//!
//! Session tokens are 32 random bytes, base64url-encoded, and returned to the
//! caller exactly once; the store is keyed by a hash of the token so raw
//! values never land in shared infrastructure. Each successful `touch` resets
//! the TTL to the full window; there is no absolute lifetime cap (deliberate
//! policy for a small trusted-operator population).

use anyhow::{Context, Result};
use base64ct::{Base64UrlUnpadded, Encoding};
use rand::{rngs::OsRng, RngCore};
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::store::ExpiringKeyValueStore;

use super::error::AuthError;

const SESSION_KEY_PREFIX: &str = "session:";

/// Create a new opaque session token. The raw value is only handed to the
/// caller; the store sees a hash.
fn generate_session_token() -> Result<String> {
    let mut bytes = [0u8; 32];
    OsRng
        .try_fill_bytes(&mut bytes)
        .context("failed to generate session token")?;
    Ok(Base64UrlUnpadded::encode_string(&bytes))
}

fn session_key(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    let hash = hasher.finalize();
    format!(
        "{SESSION_KEY_PREFIX}{}",
        Base64UrlUnpadded::encode_string(&hash)
    )
}

#[derive(Clone)]
pub struct SessionStore {
    store: Arc<dyn ExpiringKeyValueStore>,
    ttl: Duration,
}

impl SessionStore {
    #[must_use]
    pub fn new(store: Arc<dyn ExpiringKeyValueStore>, ttl: Duration) -> Self {
        Self { store, ttl }
    }

    /// Issue a fresh session bound to `email` with the full initial TTL.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` if the store is unavailable.
    pub async fn create(&self, email: &str) -> Result<String, AuthError> {
        let token = generate_session_token().map_err(AuthError::Infrastructure)?;
        self.store
            .set(&session_key(&token), email, self.ttl)
            .await?;
        Ok(token)
    }

    /// Look up a session and slide its expiry out to the full window.
    ///
    /// # Errors
    ///
    /// `AuthError::SessionExpired` when the token is unknown or lapsed;
    /// `AuthError::Infrastructure` if the store is unavailable.
    pub async fn touch(&self, token: &str) -> Result<String, AuthError> {
        let key = session_key(token);
        // Single store operation: the lookup and the TTL reset commit
        // together, so a session that lapses concurrently never touches Ok.
        // Idempotent, so retry once on an infrastructure fault.
        let email = match self.store.get_and_refresh(&key, self.ttl).await {
            Ok(value) => value,
            Err(err) => {
                debug!("retrying session refresh: {err}");
                self.store.get_and_refresh(&key, self.ttl).await?
            }
        };
        email.ok_or(AuthError::SessionExpired)
    }

    /// Drop a session. Idempotent: revoking an unknown token is fine.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` if the store is unavailable.
    pub async fn revoke(&self, token: &str) -> Result<(), AuthError> {
        self.store.delete(&session_key(token)).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{generate_session_token, session_key, SessionStore};
    use crate::auth::error::AuthError;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[test]
    fn tokens_are_unique_and_url_safe() {
        let first = generate_session_token().unwrap();
        let second = generate_session_token().unwrap();
        assert_ne!(first, second);
        assert!(!first.contains('+') && !first.contains('/'));
    }

    #[test]
    fn store_key_is_a_hash_of_the_token() {
        let key = session_key("token");
        assert!(key.starts_with("session:"));
        assert!(!key.contains("token"));
    }

    #[tokio::test]
    async fn touch_after_create_returns_the_identity() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(900));
        let token = sessions.create("admin@site.com").await.unwrap();
        assert_eq!(sessions.touch(&token).await.unwrap(), "admin@site.com");
    }

    #[tokio::test]
    async fn sliding_expiration_keeps_a_session_alive() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_millis(80));
        let token = sessions.create("admin@site.com").await.unwrap();

        // Touch at intervals shorter than the TTL; the session outlives
        // several multiples of the original window.
        for _ in 0..4 {
            tokio::time::sleep(Duration::from_millis(40)).await;
            assert!(sessions.touch(&token).await.is_ok());
        }

        tokio::time::sleep(Duration::from_millis(120)).await;
        let err = sessions.touch(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::SessionExpired));
    }

    #[tokio::test]
    async fn revoke_is_idempotent() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(900));
        let token = sessions.create("admin@site.com").await.unwrap();
        sessions.revoke(&token).await.unwrap();
        sessions.revoke(&token).await.unwrap();
        assert!(matches!(
            sessions.touch(&token).await.unwrap_err(),
            AuthError::SessionExpired
        ));
    }

    /// Store whose plain `get` keeps answering a stale value after the entry
    /// is gone. A touch built on separate get/expire calls would report Ok
    /// for a session that lapsed in between.
    struct StaleReadStore {
        inner: MemoryStore,
    }

    #[async_trait::async_trait]
    impl crate::store::ExpiringKeyValueStore for StaleReadStore {
        async fn set(&self, key: &str, value: &str, ttl: Duration) -> anyhow::Result<()> {
            self.inner.set(key, value, ttl).await
        }

        async fn get(&self, _key: &str) -> anyhow::Result<Option<String>> {
            Ok(Some("stale@site.com".to_string()))
        }

        async fn get_and_refresh(
            &self,
            key: &str,
            ttl: Duration,
        ) -> anyhow::Result<Option<String>> {
            self.inner.get_and_refresh(key, ttl).await
        }

        async fn incr_with_ttl(&self, key: &str, ttl: Duration) -> anyhow::Result<i64> {
            self.inner.incr_with_ttl(key, ttl).await
        }

        async fn take(&self, key: &str) -> anyhow::Result<Option<String>> {
            self.inner.take(key).await
        }

        async fn delete(&self, key: &str) -> anyhow::Result<()> {
            self.inner.delete(key).await
        }

        async fn ttl_remaining(&self, key: &str) -> anyhow::Result<Option<Duration>> {
            self.inner.ttl_remaining(key).await
        }
    }

    #[tokio::test]
    async fn touch_of_a_lapsed_session_never_reports_ok() {
        let sessions = SessionStore::new(
            Arc::new(StaleReadStore {
                inner: MemoryStore::new(),
            }),
            Duration::from_secs(900),
        );
        let token = sessions.create("admin@site.com").await.unwrap();
        sessions.revoke(&token).await.unwrap();

        // The refresh and the lookup are one store operation, so the stale
        // read path is never consulted.
        assert!(matches!(
            sessions.touch(&token).await.unwrap_err(),
            AuthError::SessionExpired
        ));
    }

    #[tokio::test]
    async fn unknown_token_is_session_expired() {
        let sessions = SessionStore::new(Arc::new(MemoryStore::new()), Duration::from_secs(900));
        assert!(matches!(
            sessions.touch("no-such-token").await.unwrap_err(),
            AuthError::SessionExpired
        ));
    }
}
