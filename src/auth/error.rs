//! Security-error taxonomy for the authentication core.
//!
//! Security decisions (`TokenInvalid`, `AccountLocked`, ...) are terminal and
//! returned to the caller; `Infrastructure` covers store/notifier faults and
//! is always surfaced distinctly so an outage never reads as "denied".

use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum AuthError {
    /// Malformed, wrong-purpose, or expired token. The reasons are not
    /// distinguished to callers.
    #[error("Invalid or expired token")]
    TokenInvalid,

    #[error("Too many requests, try again later")]
    RateLimited { retry_after: Duration },

    #[error("Session expired or invalid")]
    SessionExpired,

    #[error("Account is locked")]
    AccountLocked,

    #[error("Account not found")]
    NotFound,

    #[error("Password must be at least {min_len} characters long")]
    PasswordPolicy { min_len: usize },

    #[error("Failed to deliver notification: {0}")]
    NotifierFailed(String),

    #[error(transparent)]
    Infrastructure(#[from] anyhow::Error),
}

impl AuthError {
    /// True for outcomes that represent a security decision rather than a
    /// fault. Used by the boundary to pick generic denial bodies.
    #[must_use]
    pub fn is_security_decision(&self) -> bool {
        !matches!(
            self,
            Self::Infrastructure(_) | Self::NotifierFailed(_) | Self::PasswordPolicy { .. }
        )
    }
}
