//! Fixed-window rate limiting over the shared expiring store.
//!
//! Counters are keyed per identity/action pair; the window TTL is set on the
//! first attempt and never refreshed by later increments, so a denial lapses
//! exactly when the window does. The increment is a single atomic store
//! operation (no read-modify-write), so concurrent attempts against the same
//! scope key cannot lose updates.

use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::store::ExpiringKeyValueStore;

use super::error::AuthError;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RateLimitDecision {
    pub allowed: bool,
    pub remaining: u32,
    pub retry_after: Option<Duration>,
}

#[derive(Clone)]
pub struct RateLimiter {
    store: Arc<dyn ExpiringKeyValueStore>,
}

impl RateLimiter {
    #[must_use]
    pub fn new(store: Arc<dyn ExpiringKeyValueStore>) -> Self {
        Self { store }
    }

    /// Scope key for login-attempt throttling.
    #[must_use]
    pub fn login_key(email: &str) -> String {
        format!("rate_limit:login:{email}")
    }

    /// Scope key for token-issuance throttling. Deliberately distinct from
    /// the login scope; the two must not share counters.
    #[must_use]
    pub fn token_key(email: &str) -> String {
        format!("rate_limit:{email}")
    }

    /// Count an attempt against `scope_key` and decide whether it may
    /// proceed.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` if the store is unavailable.
    pub async fn check_and_increment(
        &self,
        scope_key: &str,
        max_attempts: u32,
        window: Duration,
    ) -> Result<RateLimitDecision, AuthError> {
        let count = self.store.incr_with_ttl(scope_key, window).await?;

        if count > i64::from(max_attempts) {
            // The TTL read is idempotent; retry it once before giving up.
            let retry_after = match self.store.ttl_remaining(scope_key).await {
                Ok(ttl) => ttl,
                Err(err) => {
                    debug!("retrying ttl read for {scope_key}: {err}");
                    self.store.ttl_remaining(scope_key).await?
                }
            };
            return Ok(RateLimitDecision {
                allowed: false,
                remaining: 0,
                retry_after: Some(retry_after.unwrap_or(window)),
            });
        }

        let remaining = u32::try_from(i64::from(max_attempts) - count).unwrap_or(0);
        Ok(RateLimitDecision {
            allowed: true,
            remaining,
            retry_after: None,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::RateLimiter;
    use crate::store::MemoryStore;
    use std::sync::Arc;
    use std::time::Duration;

    #[tokio::test]
    async fn sixth_attempt_in_window_is_denied() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let key = RateLimiter::login_key("admin@site.com");

        for attempt in 0..5 {
            let decision = limiter
                .check_and_increment(&key, 5, Duration::from_secs(300))
                .await
                .unwrap();
            assert!(decision.allowed, "attempt {attempt} should be allowed");
        }

        let decision = limiter
            .check_and_increment(&key, 5, Duration::from_secs(300))
            .await
            .unwrap();
        assert!(!decision.allowed);
        assert_eq!(decision.remaining, 0);
        assert!(decision.retry_after.is_some_and(|d| d > Duration::ZERO));
    }

    #[tokio::test]
    async fn denial_persists_until_window_lapses() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let key = RateLimiter::login_key("admin@site.com");
        let window = Duration::from_millis(120);

        for _ in 0..3 {
            limiter.check_and_increment(&key, 2, window).await.unwrap();
        }
        // Still inside the window: denied, even when checked again sooner.
        let decision = limiter.check_and_increment(&key, 2, window).await.unwrap();
        assert!(!decision.allowed);

        tokio::time::sleep(Duration::from_millis(160)).await;
        let decision = limiter.check_and_increment(&key, 2, window).await.unwrap();
        assert!(decision.allowed);
    }

    #[tokio::test]
    async fn token_and_login_scopes_do_not_share_counters() {
        let limiter = RateLimiter::new(Arc::new(MemoryStore::new()));
        let window = Duration::from_secs(300);

        for _ in 0..3 {
            limiter
                .check_and_increment(&RateLimiter::token_key("admin@site.com"), 3, window)
                .await
                .unwrap();
        }
        let denied = limiter
            .check_and_increment(&RateLimiter::token_key("admin@site.com"), 3, window)
            .await
            .unwrap();
        assert!(!denied.allowed);

        let login = limiter
            .check_and_increment(&RateLimiter::login_key("admin@site.com"), 3, window)
            .await
            .unwrap();
        assert!(login.allowed);
        assert_eq!(login.remaining, 2);
    }
}
