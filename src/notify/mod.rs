//! Outbound notification abstraction.
//!
//! Delivery is best-effort for lock notifications; for the 2FA code the
//! notification IS the delivery channel, so the caller treats a send failure
//! as fatal to the operation. The sender decides how to deliver (SMTP, API,
//! etc.); the default for local dev logs and returns `Ok(())`.

use anyhow::Result;
use async_trait::async_trait;
use tracing::info;

#[async_trait]
pub trait Notifier: Send + Sync {
    /// Deliver a message or return an error.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()>;
}

/// Local dev notifier that logs the payload instead of sending real email.
#[derive(Clone, Debug)]
pub struct LogNotifier;

#[async_trait]
impl Notifier for LogNotifier {
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<()> {
        info!(to_email = %to, subject = %subject, body = %body, "notifier send stub");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::{LogNotifier, Notifier};

    #[tokio::test]
    async fn log_notifier_always_succeeds() {
        let notifier = LogNotifier;
        assert!(notifier
            .send("admin@site.com", "Your 2FA Code", "Your 2FA code is 482913")
            .await
            .is_ok());
    }
}
