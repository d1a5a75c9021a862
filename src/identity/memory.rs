//! In-memory repository for tests and local development.

use anyhow::Result;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use std::collections::HashMap;
use tokio::sync::Mutex;

use super::{Identity, IdentityRepository};

#[derive(Default)]
pub struct MemoryIdentityRepository {
    identities: Mutex<HashMap<String, Identity>>,
}

impl MemoryIdentityRepository {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, identity: Identity) {
        let mut identities = self.identities.lock().await;
        identities.insert(identity.email.clone(), identity);
    }
}

#[async_trait]
impl IdentityRepository for MemoryIdentityRepository {
    async fn lookup(&self, email: &str) -> Result<Option<Identity>> {
        let identities = self.identities.lock().await;
        Ok(identities.get(email).cloned())
    }

    async fn set_locked(&self, email: &str, locked: bool) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if let Some(identity) = identities.get_mut(email) {
            identity.locked = locked;
        }
        Ok(())
    }

    async fn set_password_hash(&self, email: &str, password_hash: &str) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if let Some(identity) = identities.get_mut(email) {
            identity.password_hash = password_hash.to_string();
        }
        Ok(())
    }

    async fn record_login(
        &self,
        email: &str,
        fingerprint: Option<&str>,
        at: DateTime<Utc>,
    ) -> Result<()> {
        let mut identities = self.identities.lock().await;
        if let Some(identity) = identities.get_mut(email) {
            if let Some(fingerprint) = fingerprint {
                identity.fingerprint = Some(fingerprint.to_string());
            }
            identity.last_login_at = Some(at);
        }
        Ok(())
    }
}
