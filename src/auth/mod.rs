//! Authentication and session-security core.

pub mod audit;
pub mod error;
pub mod lock;
pub mod orchestrator;
pub mod password;
pub mod rate_limit;
pub mod session;
pub mod token;
pub mod two_factor;

pub use audit::{AuditAction, AuditLog, AuditRecord, AuditSink};
pub use error::AuthError;
pub use lock::{AccountLock, AccountLockState, LockReason, UnlockMethod};
pub use orchestrator::{AuthConfig, Authenticator, DenyReason, LoginOutcome};
pub use rate_limit::{RateLimitDecision, RateLimiter};
pub use session::SessionStore;
pub use token::{TokenCodec, TokenPurpose};
pub use two_factor::{TwoFactorChallenge, TwoFactorOutcome};
