//! Account lock lifecycle.
//!
//! Locking is a one-way trip: once an identity is locked, no credential or
//! second-factor path clears it. Recovery goes through a time-boxed unlock
//! token delivered out of band, or through an explicit administrative
//! request. Lock notification is best-effort; the lock itself never depends
//! on email delivery.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::identity::{Identity, IdentityRepository};
use crate::notify::Notifier;

use super::audit::{AuditAction, AuditLog, AuditRecord};
use super::error::AuthError;
use super::token::{TokenCodec, TokenPurpose};

/// Lock disposition of an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AccountLockState {
    Active,
    Locked,
}

impl AccountLockState {
    #[must_use]
    pub fn of(identity: &Identity) -> Self {
        if identity.locked {
            Self::Locked
        } else {
            Self::Active
        }
    }
}

/// Why an account transitioned to locked.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LockReason {
    WrongPassword,
    FingerprintMismatch,
    AdminRequest,
}

impl LockReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::WrongPassword => "wrong_password",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::AdminRequest => "admin_request",
        }
    }
}

/// How a locked account was reopened.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum UnlockMethod {
    EmailToken,
    AdminRequest,
}

impl UnlockMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::EmailToken => "email_token",
            Self::AdminRequest => "admin_request",
        }
    }
}

#[derive(Clone)]
pub struct AccountLock {
    repository: Arc<dyn IdentityRepository>,
    codec: Arc<TokenCodec>,
    notifier: Arc<dyn Notifier>,
    audit: AuditLog,
    unlock_token_ttl: Duration,
}

impl AccountLock {
    #[must_use]
    pub fn new(
        repository: Arc<dyn IdentityRepository>,
        codec: Arc<TokenCodec>,
        notifier: Arc<dyn Notifier>,
        audit: AuditLog,
        unlock_token_ttl: Duration,
    ) -> Self {
        Self {
            repository,
            codec,
            notifier,
            audit,
            unlock_token_ttl,
        }
    }

    /// Lock `identity` and notify the owner with an unlock token. Already
    /// locked accounts stay locked without a second audit record.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` when the record store rejects the update.
    pub async fn lock(&self, identity: &Identity, reason: LockReason) -> Result<(), AuthError> {
        if identity.locked {
            return Ok(());
        }

        self.repository.set_locked(&identity.email, true).await?;
        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &identity.email,
                AuditAction::AccountLocked,
                json!({ "reason": reason.as_str() }),
            ))
            .await;

        let unlock_token =
            self.codec
                .issue(&identity.email, TokenPurpose::UnlockAccount, Utc::now());
        let body = format!(
            "Your admin account has been locked due to a failed login attempt. \
             Use the token below to unlock it within {} minutes:\n\n{unlock_token}",
            self.unlock_token_ttl.as_secs() / 60
        );
        if let Err(err) = self
            .notifier
            .send(&identity.email, "Admin Account Locked", &body)
            .await
        {
            // The lock already holds; delivery is advisory.
            warn!(email = %identity.email, "failed to deliver lock notification: {err}");
        }

        Ok(())
    }

    /// Unlock via a token from the lock notification.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenInvalid` when the token is expired, tampered with, or
    /// scoped to another purpose; `AuthError::NotFound` when the subject no
    /// longer resolves to an identity.
    pub async fn unlock_with_token(&self, token: &str) -> Result<String, AuthError> {
        let email = match self.codec.verify(
            token,
            TokenPurpose::UnlockAccount,
            self.unlock_token_ttl,
            Utc::now(),
        ) {
            Ok(email) => email,
            Err(err) => {
                self.audit
                    .record(AuditRecord::new(
                        None,
                        "",
                        AuditAction::AccountUnlockFailed,
                        json!({ "reason": "token invalid or expired" }),
                    ))
                    .await;
                return Err(err);
            }
        };

        let Some(identity) = self.repository.lookup(&email).await? else {
            self.audit
                .record(AuditRecord::new(
                    None,
                    &email,
                    AuditAction::AccountUnlockFailed,
                    json!({ "reason": "unknown identity" }),
                ))
                .await;
            return Err(AuthError::NotFound);
        };

        self.apply_unlock(&identity, UnlockMethod::EmailToken).await?;
        Ok(email)
    }

    /// Administrative unlock, bypassing the token path.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` when the email is unknown.
    pub async fn unlock_by_admin(&self, email: &str) -> Result<(), AuthError> {
        let Some(identity) = self.repository.lookup(email).await? else {
            return Err(AuthError::NotFound);
        };
        self.apply_unlock(&identity, UnlockMethod::AdminRequest).await
    }

    /// Administrative lock, e.g. while investigating an incident.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` when the email is unknown.
    pub async fn lock_by_admin(&self, email: &str) -> Result<(), AuthError> {
        let Some(identity) = self.repository.lookup(email).await? else {
            return Err(AuthError::NotFound);
        };
        self.lock(&identity, LockReason::AdminRequest).await
    }

    async fn apply_unlock(
        &self,
        identity: &Identity,
        method: UnlockMethod,
    ) -> Result<(), AuthError> {
        self.repository.set_locked(&identity.email, false).await?;
        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &identity.email,
                AuditAction::AccountUnlocked,
                json!({ "method": method.as_str() }),
            ))
            .await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{AccountLock, AccountLockState, LockReason};
    use crate::auth::audit::{AuditAction, AuditLog, MemoryAuditSink};
    use crate::auth::error::AuthError;
    use crate::auth::token::{TokenCodec, TokenPurpose};
    use crate::identity::{
        Identity, IdentityRepository, MemoryIdentityRepository, TwoFactorMethod,
    };
    use crate::notify::LogNotifier;
    use chrono::Utc;
    use secrecy::SecretString;
    use std::sync::Arc;
    use std::time::Duration;
    use uuid::Uuid;

    fn identity(email: &str) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: email.to_string(),
            password_hash: "$argon2id$stub".to_string(),
            two_factor: TwoFactorMethod::None,
            locked: false,
            fingerprint: None,
            last_login_at: None,
        }
    }

    fn lock_manager(
        repository: Arc<MemoryIdentityRepository>,
        sink: Arc<MemoryAuditSink>,
        codec: Arc<TokenCodec>,
    ) -> AccountLock {
        AccountLock::new(
            repository,
            codec,
            Arc::new(LogNotifier),
            AuditLog::new(sink),
            Duration::from_secs(300),
        )
    }

    #[tokio::test]
    async fn lock_then_token_unlock_round_trip() {
        let repository = Arc::new(MemoryIdentityRepository::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        let admin = identity("admin@site.com");
        repository.insert(admin.clone()).await;
        let manager = lock_manager(repository.clone(), sink.clone(), codec.clone());

        manager.lock(&admin, LockReason::WrongPassword).await.unwrap();
        let stored = repository.lookup("admin@site.com").await.unwrap().unwrap();
        assert_eq!(AccountLockState::of(&stored), AccountLockState::Locked);
        assert_eq!(sink.count(AuditAction::AccountLocked).await, 1);

        let token = codec.issue("admin@site.com", TokenPurpose::UnlockAccount, Utc::now());
        let email = manager.unlock_with_token(&token).await.unwrap();
        assert_eq!(email, "admin@site.com");

        let stored = repository.lookup("admin@site.com").await.unwrap().unwrap();
        assert_eq!(AccountLockState::of(&stored), AccountLockState::Active);
        assert_eq!(sink.count(AuditAction::AccountUnlocked).await, 1);
    }

    #[tokio::test]
    async fn locking_a_locked_account_is_idempotent() {
        let repository = Arc::new(MemoryIdentityRepository::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        let admin = identity("admin@site.com");
        repository.insert(admin.clone()).await;
        let manager = lock_manager(repository.clone(), sink.clone(), codec);

        manager.lock(&admin, LockReason::WrongPassword).await.unwrap();
        let locked = repository.lookup("admin@site.com").await.unwrap().unwrap();
        manager
            .lock(&locked, LockReason::FingerprintMismatch)
            .await
            .unwrap();

        assert_eq!(sink.count(AuditAction::AccountLocked).await, 1);
    }

    #[tokio::test]
    async fn wrong_purpose_token_cannot_unlock() {
        let repository = Arc::new(MemoryIdentityRepository::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        repository.insert(identity("admin@site.com")).await;
        let manager = lock_manager(repository, sink.clone(), codec.clone());

        let token = codec.issue("admin@site.com", TokenPurpose::PasswordReset, Utc::now());
        let err = manager.unlock_with_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::TokenInvalid));
        assert_eq!(sink.count(AuditAction::AccountUnlockFailed).await, 1);
    }

    #[tokio::test]
    async fn unlock_token_for_unknown_identity_is_not_found() {
        let repository = Arc::new(MemoryIdentityRepository::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        let manager = lock_manager(repository, sink.clone(), codec.clone());

        let token = codec.issue("ghost@site.com", TokenPurpose::UnlockAccount, Utc::now());
        let err = manager.unlock_with_token(&token).await.unwrap_err();
        assert!(matches!(err, AuthError::NotFound));
    }

    #[tokio::test]
    async fn admin_lock_and_unlock_cycle() {
        let repository = Arc::new(MemoryIdentityRepository::new());
        let sink = Arc::new(MemoryAuditSink::new());
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        repository.insert(identity("admin@site.com")).await;
        let manager = lock_manager(repository.clone(), sink.clone(), codec);

        manager.lock_by_admin("admin@site.com").await.unwrap();
        assert!(repository
            .lookup("admin@site.com")
            .await
            .unwrap()
            .unwrap()
            .locked);

        manager.unlock_by_admin("admin@site.com").await.unwrap();
        assert!(!repository
            .lookup("admin@site.com")
            .await
            .unwrap()
            .unwrap()
            .locked);

        assert!(matches!(
            manager.unlock_by_admin("ghost@site.com").await,
            Err(AuthError::NotFound)
        ));
    }
}
