//! Append-only audit trail for security-relevant transitions.
//!
//! Recording never fails the caller's primary operation: sink errors are
//! reported to process diagnostics instead. A sink failure while recording a
//! security-negative event (a lockout, a failed verification) is logged at
//! `error!` as a degraded-audit condition so operators see it.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde_json::Value;
use sqlx::PgPool;
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{error, info, warn, Instrument};
use uuid::Uuid;

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AuditAction {
    TwoFactorCodeSent,
    TwoFactorSendFailed,
    TwoFactorVerified,
    TwoFactorFailed,
    AccountLockedAttempt,
    AccountLocked,
    AccountUnlocked,
    AccountUnlockFailed,
    PasswordReset,
    PasswordResetRequested,
    LoginSucceeded,
    LoginDenied,
}

impl AuditAction {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::TwoFactorCodeSent => "2FA_CODE_SENT",
            Self::TwoFactorSendFailed => "2FA_SEND_FAILED",
            Self::TwoFactorVerified => "2FA_VERIFIED",
            Self::TwoFactorFailed => "2FA_FAILED",
            Self::AccountLockedAttempt => "ACCOUNT_LOCKED_ATTEMPT",
            Self::AccountLocked => "ACCOUNT_LOCKED",
            Self::AccountUnlocked => "ACCOUNT_UNLOCKED",
            Self::AccountUnlockFailed => "ACCOUNT_UNLOCK_FAILED",
            Self::PasswordReset => "PASSWORD_RESET",
            Self::PasswordResetRequested => "PASSWORD_RESET_REQUESTED",
            Self::LoginSucceeded => "LOGIN_SUCCEEDED",
            Self::LoginDenied => "LOGIN_DENIED",
        }
    }

    /// Events that record something going wrong for the account owner. Losing
    /// one of these is worse than losing a success record.
    #[must_use]
    pub fn is_security_negative(self) -> bool {
        matches!(
            self,
            Self::TwoFactorFailed
                | Self::TwoFactorSendFailed
                | Self::AccountLockedAttempt
                | Self::AccountLocked
                | Self::AccountUnlockFailed
                | Self::LoginDenied
        )
    }
}

#[derive(Clone, Debug)]
pub struct AuditRecord {
    pub id: Uuid,
    pub identity_ref: Option<Uuid>,
    pub email: String,
    pub action: AuditAction,
    pub details: Value,
    pub at: DateTime<Utc>,
}

impl AuditRecord {
    #[must_use]
    pub fn new(
        identity_ref: Option<Uuid>,
        email: &str,
        action: AuditAction,
        details: Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            identity_ref,
            email: email.to_string(),
            action,
            details,
            at: Utc::now(),
        }
    }
}

#[async_trait]
pub trait AuditSink: Send + Sync {
    async fn append(&self, record: &AuditRecord) -> Result<()>;
}

/// Local dev sink that emits audit events as structured log lines.
#[derive(Clone, Debug)]
pub struct TracingAuditSink;

#[async_trait]
impl AuditSink for TracingAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        info!(
            audit_id = %record.id,
            email = %record.email,
            action = record.action.as_str(),
            details = %record.details,
            "audit event"
        );
        Ok(())
    }
}

/// Sink that appends to the `audit_events` table. Rows are never mutated or
/// deleted by this crate.
#[derive(Clone)]
pub struct PgAuditSink {
    pool: PgPool,
}

impl PgAuditSink {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AuditSink for PgAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        let query = r"
            INSERT INTO audit_events (id, identity_ref, email, action, details, created_at)
            VALUES ($1, $2, $3, $4, $5::jsonb, $6)
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "INSERT",
            db.statement = query
        );
        let details =
            serde_json::to_string(&record.details).context("failed to serialize audit details")?;
        sqlx::query(query)
            .bind(record.id)
            .bind(record.identity_ref)
            .bind(&record.email)
            .bind(record.action.as_str())
            .bind(details)
            .bind(record.at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to append audit event")?;
        Ok(())
    }
}

/// In-memory sink used by tests to assert on emitted events.
#[derive(Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().await.clone()
    }

    pub async fn count(&self, action: AuditAction) -> usize {
        self.records
            .lock()
            .await
            .iter()
            .filter(|record| record.action == action)
            .count()
    }
}

#[async_trait]
impl AuditSink for MemoryAuditSink {
    async fn append(&self, record: &AuditRecord) -> Result<()> {
        self.records.lock().await.push(record.clone());
        Ok(())
    }
}

/// Front door for recording: swallows sink errors so a logging failure never
/// aborts an otherwise-successful security decision.
#[derive(Clone)]
pub struct AuditLog {
    sink: Arc<dyn AuditSink>,
}

impl AuditLog {
    #[must_use]
    pub fn new(sink: Arc<dyn AuditSink>) -> Self {
        Self { sink }
    }

    pub async fn record(&self, record: AuditRecord) {
        if let Err(err) = self.sink.append(&record).await {
            if record.action.is_security_negative() {
                error!(
                    email = %record.email,
                    action = record.action.as_str(),
                    "degraded audit: failed to record security-negative event: {err}"
                );
            } else {
                warn!(
                    email = %record.email,
                    action = record.action.as_str(),
                    "failed to record audit event: {err}"
                );
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::{AuditAction, AuditLog, AuditRecord, AuditSink, MemoryAuditSink};
    use anyhow::Result;
    use async_trait::async_trait;
    use serde_json::json;
    use std::sync::Arc;

    struct FailingSink;

    #[async_trait]
    impl AuditSink for FailingSink {
        async fn append(&self, _record: &AuditRecord) -> Result<()> {
            Err(anyhow::anyhow!("sink unavailable"))
        }
    }

    #[tokio::test]
    async fn record_swallows_sink_failures() {
        let log = AuditLog::new(Arc::new(FailingSink));
        // Must not panic or propagate.
        log.record(AuditRecord::new(
            None,
            "admin@site.com",
            AuditAction::AccountLocked,
            json!({"reason": "wrong password"}),
        ))
        .await;
    }

    #[tokio::test]
    async fn memory_sink_counts_by_action() {
        let sink = Arc::new(MemoryAuditSink::new());
        let log = AuditLog::new(sink.clone());
        log.record(AuditRecord::new(
            None,
            "admin@site.com",
            AuditAction::TwoFactorVerified,
            json!({}),
        ))
        .await;
        log.record(AuditRecord::new(
            None,
            "admin@site.com",
            AuditAction::TwoFactorFailed,
            json!({}),
        ))
        .await;

        assert_eq!(sink.count(AuditAction::TwoFactorVerified).await, 1);
        assert_eq!(sink.count(AuditAction::TwoFactorFailed).await, 1);
        assert_eq!(sink.records().await.len(), 2);
    }

    #[test]
    fn action_tags_match_the_audit_schema() {
        assert_eq!(AuditAction::TwoFactorVerified.as_str(), "2FA_VERIFIED");
        assert_eq!(AuditAction::AccountLocked.as_str(), "ACCOUNT_LOCKED");
        assert_eq!(
            AuditAction::AccountLockedAttempt.as_str(),
            "ACCOUNT_LOCKED_ATTEMPT"
        );
        assert!(AuditAction::LoginDenied.is_security_negative());
        assert!(!AuditAction::LoginSucceeded.is_security_negative());
    }
}
