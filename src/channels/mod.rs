//! Delivery adapters — one `Notifier` per outbound channel.

pub mod email;
pub mod whatsapp;

use async_trait::async_trait;

use crate::error::DeliveryError;

pub use email::{EmailConfig, EmailNotifier};
pub use whatsapp::{WhatsAppConfig, WhatsAppNotifier};

/// Capability to deliver a single notification over one channel.
#[async_trait]
pub trait Notifier: Send + Sync {
    /// Channel name, used in logs and errors.
    fn name(&self) -> &str;

    /// Send `body` to `to`. Channels without a subject line ignore `subject`.
    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError>;
}

/// Stand-in for a channel whose provider credentials are not configured.
pub struct DisabledNotifier {
    name: String,
}

impl DisabledNotifier {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

#[async_trait]
impl Notifier for DisabledNotifier {
    fn name(&self) -> &str {
        &self.name
    }

    async fn send(&self, to: &str, _subject: &str, _body: &str) -> Result<(), DeliveryError> {
        tracing::warn!(channel = %self.name, to, "Channel not configured; dropping notification");
        Err(DeliveryError::NotConfigured {
            channel: self.name.clone(),
        })
    }
}


#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn disabled_notifier_reports_not_configured() {
        let n = DisabledNotifier::new("whatsapp");
        let err = n.send("+15550001", "", "hi").await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured { .. }));
        assert_eq!(err.channel(), "whatsapp");
    }
}
