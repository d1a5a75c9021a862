//! sqlx-backed identity repository.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::{PgPool, Row};
use tracing::Instrument;

use super::{Identity, IdentityRepository, TwoFactorMethod};

#[derive(Clone)]
pub struct PgIdentityRepository {
    pool: PgPool,
}

impl PgIdentityRepository {
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl IdentityRepository for PgIdentityRepository {
    async fn lookup(&self, email: &str) -> Result<Option<Identity>> {
        let query = r"
            SELECT id, email, password_hash, two_factor, locked, fingerprint, last_login_at
            FROM identities
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "SELECT",
            db.statement = query
        );
        let row = sqlx::query(query)
            .bind(email)
            .fetch_optional(&self.pool)
            .instrument(span)
            .await
            .context("failed to lookup identity")?;

        row.map(|row| {
            let two_factor: String = row.get("two_factor");
            let two_factor = TwoFactorMethod::parse(&two_factor)
                .with_context(|| format!("unknown two_factor method {two_factor}"))?;
            Ok(Identity {
                id: row.get("id"),
                email: row.get("email"),
                password_hash: row.get("password_hash"),
                two_factor,
                locked: row.get("locked"),
                fingerprint: row.get("fingerprint"),
                last_login_at: row.get("last_login_at"),
            })
        })
        .transpose()
    }

    async fn set_locked(&self, email: &str, locked: bool) -> Result<()> {
        let query = r"
            UPDATE identities
            SET locked = $2, updated_at = NOW()
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(locked)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update lock state")?;
        Ok(())
    }

    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()> {
        let query = r"
            UPDATE identities
            SET password_hash = $2, updated_at = NOW()
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(password_hash)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to update password hash")?;
        Ok(())
    }

    async fn record_login(
        &self,
        email: &str,
        fingerprint: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let query = r"
            UPDATE identities
            SET fingerprint = COALESCE($2, fingerprint),
                last_login_at = $3,
                updated_at = NOW()
            WHERE email = $1
        ";
        let span = tracing::info_span!(
            "db.query",
            db.system = "postgresql",
            db.operation = "UPDATE",
            db.statement = query
        );
        sqlx::query(query)
            .bind(email)
            .bind(fingerprint)
            .bind(at)
            .execute(&self.pool)
            .instrument(span)
            .await
            .context("failed to record login")?;
        Ok(())
    }
}
