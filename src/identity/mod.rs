//! The authenticating principal and the repository seam it is reached through.
//!
//! Identities are owned by the external record store; the core only reads and
//! updates fields through `IdentityRepository`, never through raw driver
//! calls.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

pub mod memory;
pub mod postgres;

pub use memory::MemoryIdentityRepository;
pub use postgres::PgIdentityRepository;

/// Second-factor selector for an identity.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TwoFactorMethod {
    #[serde(rename = "none")]
    None,
    #[serde(rename = "email-otp")]
    EmailOtp,
    #[serde(rename = "fingerprint-match")]
    FingerprintMatch,
}

impl TwoFactorMethod {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::EmailOtp => "email-otp",
            Self::FingerprintMatch => "fingerprint-match",
        }
    }

    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "none" => Some(Self::None),
            "email-otp" => Some(Self::EmailOtp),
            "fingerprint-match" => Some(Self::FingerprintMatch),
            _ => None,
        }
    }
}

#[derive(Clone, Debug)]
pub struct Identity {
    pub id: Uuid,
    /// Case-normalized; see [`normalize_email`].
    pub email: String,
    /// Argon2id PHC string. Never compared in plaintext.
    pub password_hash: String,
    pub two_factor: TwoFactorMethod,
    pub locked: bool,
    /// Last observed device/system fingerprint.
    pub fingerprint: Option<String>,
    pub last_login_at: Option<DateTime<Utc>>,
}

/// Normalize an email for lookup/uniqueness checks.
#[must_use]
pub fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

static EMAIL_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("email pattern compiles")
});

/// Basic email format check on already-normalized input.
#[must_use]
pub fn valid_email(email_normalized: &str) -> bool {
    EMAIL_PATTERN.is_match(email_normalized)
}

/// Abstract record-store capability the core consumes. All call sites go
/// through this fixed method set.
#[async_trait]
pub trait IdentityRepository: Send + Sync {
    async fn lookup(&self, email: &str) -> Result<Option<Identity>>;

    async fn set_locked(&self, email: &str, locked: bool) -> Result<()>;

    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()>;

    /// Record a successful login. `fingerprint = None` keeps the last
    /// observed value.
    async fn record_login(
        &self,
        email: &str,
        fingerprint: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()>;
}

#[cfg(test)]
mod tests {
    use super::{normalize_email, valid_email, TwoFactorMethod};

    #[test]
    fn normalize_email_trims_and_lowercases() {
        assert_eq!(normalize_email(" Admin@Site.COM "), "admin@site.com");
    }

    #[test]
    fn valid_email_accepts_basic_format() {
        assert!(valid_email("a@example.com"));
        assert!(!valid_email("not-an-email"));
        assert!(!valid_email("missing-domain@"));
    }

    #[test]
    fn two_factor_method_round_trips() {
        for method in [
            TwoFactorMethod::None,
            TwoFactorMethod::EmailOtp,
            TwoFactorMethod::FingerprintMatch,
        ] {
            assert_eq!(TwoFactorMethod::parse(method.as_str()), Some(method));
        }
        assert_eq!(TwoFactorMethod::parse("totp"), None);
    }
}
