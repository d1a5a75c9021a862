//! Short-lived, purpose-scoped signed tokens.
//!
//! Tokens are stateless: `subject`, `purpose`, and `issued_at` are bound by an
//! HMAC-SHA256 tag under a process-wide key. Expiry is the only invalidation
//! mechanism; purpose scoping prevents a password-reset token from unlocking
//! an account and vice versa. Single-use semantics belong to the caller, who
//! must re-check application state before acting on a verified token.

use base64ct::{Base64UrlUnpadded, Encoding};
use chrono::{DateTime, Utc};
use hmac::{Hmac, Mac};
use secrecy::{ExposeSecret, SecretString};
use sha2::{Digest, Sha256};
use std::time::Duration;

use super::error::AuthError;

type HmacSha256 = Hmac<Sha256>;

/// The single declared use a token is valid for. The salt string is bound
/// into the MAC, so a token presented under the wrong purpose fails the tag
/// check like any forgery.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TokenPurpose {
    EmailConfirm,
    PasswordReset,
    UnlockAccount,
    TwoFactorSession,
}

impl TokenPurpose {
    #[must_use]
    pub fn as_salt(self) -> &'static str {
        match self {
            Self::EmailConfirm => "email-confirm-salt",
            Self::PasswordReset => "password-reset-salt",
            Self::UnlockAccount => "unlock-account-salt",
            Self::TwoFactorSession => "2fa-session",
        }
    }
}

pub struct TokenCodec {
    key: [u8; 32],
}

impl TokenCodec {
    /// Derive the MAC key from the configured secret.
    #[must_use]
    pub fn new(secret: &SecretString) -> Self {
        let mut hasher = Sha256::new();
        hasher.update(secret.expose_secret().as_bytes());
        Self {
            key: hasher.finalize().into(),
        }
    }

    /// Encode `{subject, purpose, now}` into an opaque token string.
    #[must_use]
    pub fn issue(&self, subject: &str, purpose: TokenPurpose, now: DateTime<Utc>) -> String {
        let issued_at = now.timestamp();
        let tag = self.tag(subject, purpose, issued_at).finalize().into_bytes();
        format!(
            "{}.{}.{}",
            Base64UrlUnpadded::encode_string(subject.as_bytes()),
            issued_at,
            Base64UrlUnpadded::encode_string(&tag),
        )
    }

    /// Verify a token under `purpose` and return its subject.
    ///
    /// # Errors
    ///
    /// Returns `AuthError::TokenInvalid` on a malformed token, a MAC or
    /// purpose mismatch, or when `now - issued_at > ttl`. The MAC comparison
    /// is constant-time.
    pub fn verify(
        &self,
        token: &str,
        purpose: TokenPurpose,
        ttl: Duration,
        now: DateTime<Utc>,
    ) -> Result<String, AuthError> {
        let mut parts = token.splitn(3, '.');
        let (subject_b64, issued_b64, tag_b64) = match (parts.next(), parts.next(), parts.next()) {
            (Some(subject), Some(issued), Some(tag)) => (subject, issued, tag),
            _ => return Err(AuthError::TokenInvalid),
        };

        let subject_bytes =
            Base64UrlUnpadded::decode_vec(subject_b64).map_err(|_| AuthError::TokenInvalid)?;
        let subject = String::from_utf8(subject_bytes).map_err(|_| AuthError::TokenInvalid)?;
        let issued_at: i64 = issued_b64.parse().map_err(|_| AuthError::TokenInvalid)?;
        let tag = Base64UrlUnpadded::decode_vec(tag_b64).map_err(|_| AuthError::TokenInvalid)?;

        // Wrong purpose yields a different tag, so a single constant-time
        // check covers both forgery and cross-purpose replay.
        self.tag(&subject, purpose, issued_at)
            .verify_slice(&tag)
            .map_err(|_| AuthError::TokenInvalid)?;

        let elapsed = now.timestamp() - issued_at;
        let ttl_seconds = i64::try_from(ttl.as_secs()).unwrap_or(i64::MAX);
        if elapsed < 0 || elapsed > ttl_seconds {
            return Err(AuthError::TokenInvalid);
        }

        Ok(subject)
    }

    fn tag(&self, subject: &str, purpose: TokenPurpose, issued_at: i64) -> HmacSha256 {
        let mut mac =
            HmacSha256::new_from_slice(&self.key).expect("hmac accepts keys of any length");
        mac.update(subject.as_bytes());
        mac.update(b"\x00");
        mac.update(purpose.as_salt().as_bytes());
        mac.update(b"\x00");
        mac.update(&issued_at.to_be_bytes());
        mac
    }
}
