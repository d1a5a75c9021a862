//! Email-OTP two-factor challenge.
//!
//! `send` issues a 6-digit code, stores the challenge under a hash of a
//! freshly minted binding token (purpose `2fa-session`), and hands the code
//! to the notifier for out-of-band delivery. The code is never part of the
//! send response and never lands in audit details. `verify` consumes the
//! challenge atomically before comparing, so every issued code gets at most
//! one verification outcome; replays against a consumed challenge read as
//! `Expired`.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::Utc;
use rand::Rng;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::{Digest, Sha256};
use std::sync::Arc;
use std::time::Duration;
use subtle::ConstantTimeEq;
use tracing::warn;

use crate::identity::Identity;
use crate::notify::Notifier;
use crate::store::ExpiringKeyValueStore;

use super::audit::{AuditAction, AuditLog, AuditRecord};
use super::error::AuthError;
use super::token::{TokenCodec, TokenPurpose};

const CHALLENGE_KEY_PREFIX: &str = "2fa:";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TwoFactorOutcome {
    Verified,
    Invalid,
    Expired,
    AccountLocked,
}

#[derive(Serialize, Deserialize)]
struct ChallengeRecord {
    email: String,
    expected_code: String,
}

fn challenge_key(binding_token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(binding_token.as_bytes());
    let hash = hasher.finalize();
    format!(
        "{CHALLENGE_KEY_PREFIX}{}",
        Base64UrlUnpadded::encode_string(&hash)
    )
}

/// Uniform 6-digit code.
fn generate_code() -> String {
    rand::thread_rng().gen_range(100_000..=999_999).to_string()
}

/// Constant-time comparison; differing lengths compare unequal without
/// revealing anything beyond the (public) expected length.
fn codes_match(submitted: &str, expected: &str) -> bool {
    submitted.len() == expected.len()
        && bool::from(submitted.as_bytes().ct_eq(expected.as_bytes()))
}

#[derive(Clone)]
pub struct TwoFactorChallenge {
    store: Arc<dyn ExpiringKeyValueStore>,
    codec: Arc<TokenCodec>,
    notifier: Arc<dyn Notifier>,
    audit: AuditLog,
    code_ttl: Duration,
}

impl TwoFactorChallenge {
    #[must_use]
    pub fn new(
        store: Arc<dyn ExpiringKeyValueStore>,
        codec: Arc<TokenCodec>,
        notifier: Arc<dyn Notifier>,
        audit: AuditLog,
        code_ttl: Duration,
    ) -> Self {
        Self {
            store,
            codec,
            notifier,
            audit,
            code_ttl,
        }
    }

    /// Issue a challenge for `identity` and return the binding token. The
    /// plaintext code travels only through the notifier.
    ///
    /// # Errors
    ///
    /// `AuthError::NotifierFailed` when delivery fails (the notification IS
    /// the 2FA channel); `AuthError::Infrastructure` on store faults.
    pub async fn send(&self, identity: &Identity) -> Result<String, AuthError> {
        let code = generate_code();
        let binding_token =
            self.codec
                .issue(&identity.email, TokenPurpose::TwoFactorSession, Utc::now());

        let record = ChallengeRecord {
            email: identity.email.clone(),
            expected_code: code.clone(),
        };
        let payload = serde_json::to_string(&record)
            .map_err(|err| AuthError::Infrastructure(err.into()))?;
        let key = challenge_key(&binding_token);
        self.store.set(&key, &payload, self.code_ttl).await?;

        let body = format!(
            "Your 2FA code is {code}. Please enter it to complete the login process."
        );
        if let Err(err) = self
            .notifier
            .send(&identity.email, "Your 2FA Code", &body)
            .await
        {
            // Without delivery the challenge is unfulfillable; drop it.
            if let Err(cleanup) = self.store.delete(&key).await {
                warn!("failed to discard undeliverable 2FA challenge: {cleanup}");
            }
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::TwoFactorSendFailed,
                    json!({ "error": err.to_string() }),
                ))
                .await;
            return Err(AuthError::NotifierFailed(err.to_string()));
        }

        self.audit
            .record(AuditRecord::new(
                Some(identity.id),
                &identity.email,
                AuditAction::TwoFactorCodeSent,
                json!({ "method": "email-otp" }),
            ))
            .await;

        Ok(binding_token)
    }

    /// Verify a submitted code against the challenge bound to
    /// `binding_token`. Exactly one audit record is emitted per outcome.
    ///
    /// # Errors
    ///
    /// `AuthError::Infrastructure` on store faults; all security outcomes are
    /// returned in-band as [`TwoFactorOutcome`].
    pub async fn verify(
        &self,
        identity: &Identity,
        submitted_code: &str,
        binding_token: &str,
    ) -> Result<TwoFactorOutcome, AuthError> {
        // Lock state is checked before any code work so "locked" and "wrong
        // code" are not distinguishable by timing.
        if identity.locked {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::AccountLockedAttempt,
                    json!({ "operation": "2fa-verify" }),
                ))
                .await;
            return Ok(TwoFactorOutcome::AccountLocked);
        }

        let subject = self.codec.verify(
            binding_token,
            TokenPurpose::TwoFactorSession,
            self.code_ttl,
            Utc::now(),
        );
        let bound_to_identity = subject
            .as_deref()
            .is_ok_and(|subject| subject == identity.email);
        if !bound_to_identity {
            // A stale, forged, or cross-account binding token all read the
            // same to avoid an oracle.
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::TwoFactorFailed,
                    json!({ "reason": "binding token invalid or expired" }),
                ))
                .await;
            return Ok(TwoFactorOutcome::Expired);
        }

        // Atomic consume: whatever happens next, this challenge is spent.
        let Some(payload) = self.store.take(&challenge_key(binding_token)).await? else {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::TwoFactorFailed,
                    json!({ "reason": "challenge expired or already consumed" }),
                ))
                .await;
            return Ok(TwoFactorOutcome::Expired);
        };

        let record: ChallengeRecord = serde_json::from_str(&payload)
            .map_err(|err| AuthError::Infrastructure(err.into()))?;

        if codes_match(submitted_code, &record.expected_code) {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::TwoFactorVerified,
                    json!({ "method": "email-otp" }),
                ))
                .await;
            Ok(TwoFactorOutcome::Verified)
        } else {
            self.audit
                .record(AuditRecord::new(
                    Some(identity.id),
                    &identity.email,
                    AuditAction::TwoFactorFailed,
                    json!({ "reason": "code mismatch" }),
                ))
                .await;
            Ok(TwoFactorOutcome::Invalid)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{challenge_key, codes_match, generate_code, TwoFactorChallenge, TwoFactorOutcome};
    use crate::auth::audit::{AuditAction, AuditLog, MemoryAuditSink};
    use crate::auth::token::TokenCodec;
    use crate::identity::{Identity, TwoFactorMethod};
    use crate::notify::Notifier;
    use crate::store::MemoryStore;
    use anyhow::Result;
    use async_trait::async_trait;
    use secrecy::SecretString;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::sync::Mutex;
    use uuid::Uuid;

    struct RecordingNotifier {
        sent: Mutex<Vec<String>>,
        fail: bool,
    }

    impl RecordingNotifier {
        fn new(fail: bool) -> Self {
            Self {
                sent: Mutex::new(Vec::new()),
                fail,
            }
        }

        async fn last_code(&self) -> Option<String> {
            let sent = self.sent.lock().await;
            let body = sent.last()?;
            body.split_whitespace()
                .find(|word| word.len() >= 6 && word.chars().take(6).all(|c| c.is_ascii_digit()))
                .map(|word| word.chars().take(6).collect())
        }
    }

    #[async_trait]
    impl Notifier for RecordingNotifier {
        async fn send(&self, _to: &str, _subject: &str, body: &str) -> Result<()> {
            if self.fail {
                return Err(anyhow::anyhow!("smtp unreachable"));
            }
            self.sent.lock().await.push(body.to_string());
            Ok(())
        }
    }

    fn identity(locked: bool) -> Identity {
        Identity {
            id: Uuid::new_v4(),
            email: "admin@site.com".to_string(),
            password_hash: "$argon2id$stub".to_string(),
            two_factor: TwoFactorMethod::EmailOtp,
            locked,
            fingerprint: None,
            last_login_at: None,
        }
    }

    fn challenge(
        notifier: Arc<RecordingNotifier>,
        sink: Arc<MemoryAuditSink>,
        store: Arc<MemoryStore>,
    ) -> TwoFactorChallenge {
        let codec = Arc::new(TokenCodec::new(&SecretString::from("secret".to_string())));
        TwoFactorChallenge::new(
            store,
            codec,
            notifier,
            AuditLog::new(sink),
            Duration::from_secs(300),
        )
    }

    #[test]
    fn codes_are_six_digits() {
        for _ in 0..32 {
            let code = generate_code();
            assert_eq!(code.len(), 6);
            let value: u32 = code.parse().unwrap();
            assert!((100_000..=999_999).contains(&value));
        }
    }

    #[test]
    fn code_comparison_handles_length_mismatch() {
        assert!(codes_match("482913", "482913"));
        assert!(!codes_match("482914", "482913"));
        assert!(!codes_match("48291", "482913"));
    }

    #[tokio::test]
    async fn verify_succeeds_once_then_expires() {
        let notifier = Arc::new(RecordingNotifier::new(false));
        let sink = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new());
        let challenge = challenge(notifier.clone(), sink.clone(), store);
        let identity = identity(false);

        let binding = challenge.send(&identity).await.unwrap();
        let code = notifier.last_code().await.unwrap();

        let outcome = challenge.verify(&identity, &code, &binding).await.unwrap();
        assert_eq!(outcome, TwoFactorOutcome::Verified);
        assert_eq!(sink.count(AuditAction::TwoFactorVerified).await, 1);

        // At most one verification outcome per issued code.
        let outcome = challenge.verify(&identity, &code, &binding).await.unwrap();
        assert_eq!(outcome, TwoFactorOutcome::Expired);
    }

    #[tokio::test]
    async fn wrong_code_consumes_the_challenge() {
        let notifier = Arc::new(RecordingNotifier::new(false));
        let sink = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new());
        let challenge = challenge(notifier.clone(), sink.clone(), store);
        let identity = identity(false);

        let binding = challenge.send(&identity).await.unwrap();
        let code = notifier.last_code().await.unwrap();
        let wrong = if code == "999999" { "100000" } else { "999999" };

        let outcome = challenge.verify(&identity, wrong, &binding).await.unwrap();
        assert_eq!(outcome, TwoFactorOutcome::Invalid);

        // Even the correct code is spent now.
        let outcome = challenge.verify(&identity, &code, &binding).await.unwrap();
        assert_eq!(outcome, TwoFactorOutcome::Expired);
        assert_eq!(sink.count(AuditAction::TwoFactorFailed).await, 2);
    }

    #[tokio::test]
    async fn locked_account_is_rejected_before_code_checks() {
        let notifier = Arc::new(RecordingNotifier::new(false));
        let sink = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new());
        let challenge = challenge(notifier.clone(), sink.clone(), store);

        let active = identity(false);
        let binding = challenge.send(&active).await.unwrap();
        let code = notifier.last_code().await.unwrap();

        let locked = identity(true);
        let outcome = challenge.verify(&locked, &code, &binding).await.unwrap();
        assert_eq!(outcome, TwoFactorOutcome::AccountLocked);
        assert_eq!(sink.count(AuditAction::AccountLockedAttempt).await, 1);
    }

    #[tokio::test]
    async fn notifier_failure_fails_the_send_and_discards_the_challenge() {
        let notifier = Arc::new(RecordingNotifier::new(true));
        let sink = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new());
        let challenge = challenge(notifier, sink.clone(), store.clone());
        let identity = identity(false);

        let err = challenge.send(&identity).await.unwrap_err();
        assert!(matches!(
            err,
            crate::auth::error::AuthError::NotifierFailed(_)
        ));
        assert_eq!(sink.count(AuditAction::TwoFactorSendFailed).await, 1);
    }

    #[tokio::test]
    async fn binding_token_for_another_identity_reads_as_expired() {
        let notifier = Arc::new(RecordingNotifier::new(false));
        let sink = Arc::new(MemoryAuditSink::new());
        let store = Arc::new(MemoryStore::new());
        let challenge = challenge(notifier.clone(), sink, store);

        let identity_a = identity(false);
        let binding = challenge.send(&identity_a).await.unwrap();
        let code = notifier.last_code().await.unwrap();

        let mut identity_b = identity(false);
        identity_b.email = "other@site.com".to_string();

        let outcome = challenge
            .verify(&identity_b, &code, &binding)
            .await
            .unwrap();
        assert_eq!(outcome, TwoFactorOutcome::Expired);
    }

    #[test]
    fn challenge_key_hides_the_binding_token() {
        let key = challenge_key("binding-token");
        assert!(key.starts_with("2fa:"));
        assert!(!key.contains("binding-token"));
    }
}
