//! End-to-end authentication flows.
//!
//! The orchestrator wires the repository, the expiring store, and the
//! notifier into the login state machine: rate-limit gate, lock pre-check,
//! password check, lock re-check, second-factor branch, session issuance.
//! Denials carry an internal reason for the audit trail; the boundary maps
//! all of them to one generic message.

use chrono::Utc;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use tracing::warn;

use crate::identity::{normalize_email, Identity, IdentityRepository};
use crate::notify::Notifier;
use crate::store::ExpiringKeyValueStore;

use super::audit::{AuditAction, AuditLog, AuditRecord};
use super::error::AuthError;
use super::lock::{AccountLock, LockReason};
use super::password::{hash_password, verify_password};
use super::rate_limit::RateLimiter;
use super::session::SessionStore;
use super::token::{TokenCodec, TokenPurpose};
use super::two_factor::{TwoFactorChallenge, TwoFactorOutcome};

const DEFAULT_SESSION_TTL: Duration = Duration::from_secs(900);
const DEFAULT_TOKEN_TTL: Duration = Duration::from_secs(300);
const DEFAULT_CODE_TTL: Duration = Duration::from_secs(300);
const DEFAULT_LOGIN_MAX_ATTEMPTS: u32 = 5;
const DEFAULT_LOGIN_WINDOW: Duration = Duration::from_secs(300);
const DEFAULT_MIN_PASSWORD_LEN: usize = 6;

/// Tunables for the authentication flows.
#[derive(Clone, Copy, Debug)]
pub struct AuthConfig {
    pub session_ttl: Duration,
    pub token_ttl: Duration,
    pub code_ttl: Duration,
    pub login_max_attempts: u32,
    pub login_window: Duration,
    pub min_password_len: usize,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            session_ttl: DEFAULT_SESSION_TTL,
            token_ttl: DEFAULT_TOKEN_TTL,
            code_ttl: DEFAULT_CODE_TTL,
            login_max_attempts: DEFAULT_LOGIN_MAX_ATTEMPTS,
            login_window: DEFAULT_LOGIN_WINDOW,
            min_password_len: DEFAULT_MIN_PASSWORD_LEN,
        }
    }
}

impl AuthConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub const fn with_session_ttl(mut self, ttl: Duration) -> Self {
        self.session_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_token_ttl(mut self, ttl: Duration) -> Self {
        self.token_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_code_ttl(mut self, ttl: Duration) -> Self {
        self.code_ttl = ttl;
        self
    }

    #[must_use]
    pub const fn with_login_limits(mut self, max_attempts: u32, window: Duration) -> Self {
        self.login_max_attempts = max_attempts;
        self.login_window = window;
        self
    }

    #[must_use]
    pub const fn with_min_password_len(mut self, min_len: usize) -> Self {
        self.min_password_len = min_len;
        self
    }
}

/// Internal denial reason; never exposed verbatim at the boundary.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum DenyReason {
    UnknownIdentity,
    AccountLocked,
    WrongPassword,
    FingerprintMismatch,
    TwoFactorInvalid,
    TwoFactorExpired,
}

impl DenyReason {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::UnknownIdentity => "unknown_identity",
            Self::AccountLocked => "account_locked",
            Self::WrongPassword => "wrong_password",
            Self::FingerprintMismatch => "fingerprint_mismatch",
            Self::TwoFactorInvalid => "two_factor_invalid",
            Self::TwoFactorExpired => "two_factor_expired",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoginOutcome {
    /// Fully authenticated; the bearer token is returned exactly once.
    Success { session_token: String },
    /// Credentials accepted, second factor outstanding.
    TwoFactorPending { binding_token: String },
    Denied(DenyReason),
}

/// Normalize a submitted fingerprint; whitespace-only means "not provided".
#[must_use]
pub fn normalize_fingerprint(fingerprint: Option<&str>) -> Option<String> {
    fingerprint
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToString::to_string)
}

#[derive(Clone)]
pub struct Authenticator {
    repository: Arc<dyn IdentityRepository>,
    codec: Arc<TokenCodec>,
    notifier: Arc<dyn Notifier>,
    audit: AuditLog,
    sessions: SessionStore,
    limiter: RateLimiter,
    two_factor: TwoFactorChallenge,
    lock: AccountLock,
    config: AuthConfig,
}

impl Authenticator {
    #[must_use]
    pub fn new(
        repository: Arc<dyn IdentityRepository>,
        store: Arc<dyn ExpiringKeyValueStore>,
        codec: Arc<TokenCodec>,
        notifier: Arc<dyn Notifier>,
        audit: AuditLog,
        config: AuthConfig,
    ) -> Self {
        let sessions = SessionStore::new(store.clone(), config.session_ttl);
        let limiter = RateLimiter::new(store.clone());
        let two_factor = TwoFactorChallenge::new(
            store,
            codec.clone(),
            notifier.clone(),
            audit.clone(),
            config.code_ttl,
        );
        let lock = AccountLock::new(
            repository.clone(),
            codec.clone(),
            notifier.clone(),
            audit.clone(),
            config.token_ttl,
        );
        Self {
            repository,
            codec,
            notifier,
            audit,
            sessions,
            limiter,
            two_factor,
            lock,
            config,
        }
    }

    /// Authenticate with email + password and an optional device
    /// fingerprint.
    ///
    /// # Errors
    ///
    /// `AuthError::RateLimited` when the attempt window is exhausted;
    /// `AuthError::Infrastructure` on store/record faults. Credential
    /// failures are returned in-band as [`LoginOutcome::Denied`].
    pub async fn login(
        &self,
        email: &str,
        password: &str,
        fingerprint: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let fingerprint = normalize_fingerprint(fingerprint);

        // Every attempt counts against the window, successful or not, so a
        // denied caller cannot guess faster than an allowed one.
        let decision = self
            .limiter
            .check_and_increment(
                &RateLimiter::login_key(&email),
                self.config.login_max_attempts,
                self.config.login_window,
            )
            .await?;
        if !decision.allowed {
            self.deny_audit(None, &email, "rate_limited").await;
            return Err(AuthError::RateLimited {
                retry_after: decision.retry_after.unwrap_or(self.config.login_window),
            });
        }

        let Some(identity) = self.repository.lookup(&email).await? else {
            // Unknown identities burn the same rate-limit budget and read as
            // the same generic denial.
            self.deny_audit(None, &email, DenyReason::UnknownIdentity.as_str())
                .await;
            return Ok(LoginOutcome::Denied(DenyReason::UnknownIdentity));
        };

        if identity.locked {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &email,
                    AuditAction::AccountLockedAttempt,
                    json!({ "operation": "login" }),
                ))
                .await;
            return Ok(LoginOutcome::Denied(DenyReason::AccountLocked));
        }

        if !verify_password(password, &identity.password_hash) {
            // Zero-retry policy: one wrong password locks the account.
            self.lock.lock(&identity, LockReason::WrongPassword).await?;
            self.deny_audit(
                Some(&identity),
                &email,
                DenyReason::WrongPassword.as_str(),
            )
            .await;
            return Ok(LoginOutcome::Denied(DenyReason::WrongPassword));
        }

        // Re-read lock state: an admin lock may have landed while the
        // password hash was being verified.
        let identity = match self.repository.lookup(&email).await? {
            Some(refreshed) if refreshed.locked => {
                self.audit
                    .record(AuditRecord::new(
                        Some(refreshed.id),
                        &email,
                        AuditAction::AccountLockedAttempt,
                        json!({ "operation": "login" }),
                    ))
                    .await;
                return Ok(LoginOutcome::Denied(DenyReason::AccountLocked));
            }
            Some(refreshed) => refreshed,
            None => {
                self.deny_audit(None, &email, DenyReason::UnknownIdentity.as_str())
                    .await;
                return Ok(LoginOutcome::Denied(DenyReason::UnknownIdentity));
            }
        };

        match identity.two_factor {
            crate::identity::TwoFactorMethod::None => {
                self.establish_session(&identity, fingerprint.as_deref())
                    .await
            }
            crate::identity::TwoFactorMethod::EmailOtp => {
                let binding_token = self.two_factor.send(&identity).await?;
                Ok(LoginOutcome::TwoFactorPending { binding_token })
            }
            crate::identity::TwoFactorMethod::FingerprintMatch => {
                match (&identity.fingerprint, fingerprint.as_deref()) {
                    // First login establishes the baseline.
                    (None, observed) => self.establish_session(&identity, observed).await,
                    (Some(expected), Some(observed)) if expected == observed => {
                        self.establish_session(&identity, Some(observed)).await
                    }
                    _ => {
                        self.lock
                            .lock(&identity, LockReason::FingerprintMismatch)
                            .await?;
                        self.deny_audit(
                            Some(&identity),
                            &email,
                            DenyReason::FingerprintMismatch.as_str(),
                        )
                        .await;
                        Ok(LoginOutcome::Denied(DenyReason::FingerprintMismatch))
                    }
                }
            }
        }
    }

    /// Complete an email-OTP login.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` for an unknown identity;
    /// `AuthError::Infrastructure` on store faults. Code failures are
    /// returned in-band as [`LoginOutcome::Denied`].
    pub async fn verify_two_factor(
        &self,
        email: &str,
        code: &str,
        binding_token: &str,
    ) -> Result<LoginOutcome, AuthError> {
        let email = normalize_email(email);
        let Some(identity) = self.repository.lookup(&email).await? else {
            return Err(AuthError::NotFound);
        };

        match self
            .two_factor
            .verify(&identity, code, binding_token)
            .await?
        {
            TwoFactorOutcome::Verified => self.establish_session(&identity, None).await,
            TwoFactorOutcome::Invalid => Ok(LoginOutcome::Denied(DenyReason::TwoFactorInvalid)),
            TwoFactorOutcome::Expired => Ok(LoginOutcome::Denied(DenyReason::TwoFactorExpired)),
            TwoFactorOutcome::AccountLocked => {
                Ok(LoginOutcome::Denied(DenyReason::AccountLocked))
            }
        }
    }

    /// Re-issue a 2FA challenge for an existing identity.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` for an unknown identity;
    /// `AuthError::AccountLocked` when it is locked;
    /// `AuthError::NotifierFailed` when delivery fails.
    pub async fn send_two_factor(&self, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let Some(identity) = self.repository.lookup(&email).await? else {
            return Err(AuthError::NotFound);
        };
        if identity.locked {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &email,
                    AuditAction::AccountLockedAttempt,
                    json!({ "operation": "2fa-send" }),
                ))
                .await;
            return Err(AuthError::AccountLocked);
        }
        self.two_factor.send(&identity).await
    }

    /// Issue an email-confirmation token, throttled per email.
    ///
    /// Tokens are minted without an existence check: answering "unknown
    /// account" here would reveal which emails are registered.
    ///
    /// # Errors
    ///
    /// `AuthError::RateLimited` past the issuance window.
    pub async fn issue_confirmation_token(&self, email: &str) -> Result<String, AuthError> {
        let email = normalize_email(email);
        let decision = self
            .limiter
            .check_and_increment(
                &RateLimiter::token_key(&email),
                self.config.login_max_attempts,
                self.config.login_window,
            )
            .await?;
        if !decision.allowed {
            return Err(AuthError::RateLimited {
                retry_after: decision.retry_after.unwrap_or(self.config.login_window),
            });
        }
        Ok(self
            .codec
            .issue(&email, TokenPurpose::EmailConfirm, Utc::now()))
    }

    /// Confirm an email-confirmation token and return its subject.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenInvalid` for an expired or foreign token.
    pub fn confirm_token(&self, token: &str) -> Result<String, AuthError> {
        self.codec.verify(
            token,
            TokenPurpose::EmailConfirm,
            self.config.token_ttl,
            Utc::now(),
        )
    }

    /// Start a password reset. Always accepted, whether or not the email
    /// resolves, so the endpoint cannot be used to enumerate accounts.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` on record-store faults only.
    pub async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        let email = normalize_email(email);
        let Some(identity) = self.repository.lookup(&email).await? else {
            return Ok(());
        };

        let token = self
            .codec
            .issue(&email, TokenPurpose::PasswordReset, Utc::now());
        let body = format!(
            "A password reset was requested for your admin account. Use the \
             token below within {} minutes:\n\n{token}",
            self.config.token_ttl.as_secs() / 60
        );
        if let Err(err) = self
            .notifier
            .send(&email, "Admin Password Reset", &body)
            .await
        {
            // Still a uniform "accepted" to the caller.
            warn!(email = %email, "failed to deliver reset email: {err}");
        }
        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &email,
                AuditAction::PasswordResetRequested,
                json!({}),
            ))
            .await;
        Ok(())
    }

    /// Complete a password reset with a purpose-scoped token.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenInvalid` for a bad token;
    /// `AuthError::PasswordPolicy` when the replacement is too short;
    /// `AuthError::NotFound` when the subject no longer exists.
    pub async fn reset_password(
        &self,
        token: &str,
        new_password: &str,
    ) -> Result<String, AuthError> {
        let email = self.codec.verify(
            token,
            TokenPurpose::PasswordReset,
            self.config.token_ttl,
            Utc::now(),
        )?;
        if new_password.len() < self.config.min_password_len {
            return Err(AuthError::PasswordPolicy {
                min_len: self.config.min_password_len,
            });
        }
        let Some(identity) = self.repository.lookup(&email).await? else {
            return Err(AuthError::NotFound);
        };

        let password_hash = hash_password(new_password)?;
        self.repository
            .set_password_hash(&email, &password_hash)
            .await?;
        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &email,
                AuditAction::PasswordReset,
                json!({}),
            ))
            .await;
        Ok(email)
    }

    /// Administrative lock.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` when the email is unknown.
    pub async fn lock_account(&self, email: &str) -> Result<(), AuthError> {
        self.lock.lock_by_admin(&normalize_email(email)).await
    }

    /// Token-based unlock; returns the unlocked email.
    ///
    /// # Errors
    ///
    /// `AuthError::TokenInvalid` or `AuthError::NotFound` per the lock
    /// manager.
    pub async fn unlock_account(&self, token: &str) -> Result<String, AuthError> {
        self.lock.unlock_with_token(token).await
    }

    /// Administrative unlock.
    ///
    /// # Errors
    ///
    /// `AuthError::NotFound` when the email is unknown.
    pub async fn unlock_account_by_admin(&self, email: &str) -> Result<(), AuthError> {
        self.lock.unlock_by_admin(&normalize_email(email)).await
    }

    /// Validate a bearer session and slide its expiry; returns the bound
    /// email.
    ///
    /// # Errors
    ///
    /// `AuthError::SessionExpired` for an unknown or lapsed token.
    pub async fn touch_session(&self, session_token: &str) -> Result<String, AuthError> {
        self.sessions.touch(session_token).await
    }

    /// Revoke a session. Idempotent.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` if the store is unavailable.
    pub async fn logout(&self, session_token: &str) -> Result<(), AuthError> {
        self.sessions.revoke(session_token).await
    }

    async fn establish_session(
        &self,
        identity: &Identity,
        fingerprint: Option<&str>,
    ) -> Result<LoginOutcome, AuthError> {
        let session_token = self.sessions.create(&identity.email).await?;
        self.repository
            .record_login(&identity.email, fingerprint, Utc::now())
            .await?;
        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &identity.email,
                AuditAction::LoginSucceeded,
                json!({ "two_factor": identity.two_factor.as_str() }),
            ))
            .await;
        Ok(LoginOutcome::Success { session_token })
    }

    async fn deny_audit(&self, identity: Option<&Identity>, email: &str, reason: &str) {
        self.audit
            .record(AuditRecord::new(
                identity.map(|identity| identity.id),
                email,
                AuditAction::LoginDenied,
                json!({ "reason": reason }),
            ))
            .await;
    }
}
