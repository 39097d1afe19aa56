//! Channel dispatcher — routes a record to the adapter for its channel.

use std::sync::Arc;

use tracing::{debug, warn};

use crate::channels::{
    DisabledNotifier, EmailConfig, EmailNotifier, Notifier, WhatsAppConfig, WhatsAppNotifier,
};
use crate::error::DeliveryError;
use crate::pipeline::types::{ChannelType, NotificationRecord};

/// Subject line used for every email notification.
pub const EMAIL_SUBJECT: &str = "Reorder the quantity";

/// What the dispatcher did with a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchOutcome {
    /// Handed to an adapter, which accepted it.
    Sent,
    /// Channel not recognized; no adapter invoked.
    Skipped,
    /// The adapter reported an error. `dispatch` returns the error itself;
    /// callers that log it and move on keep this in its place.
    Failed,
}

/// Holds one adapter per supported channel, chosen at construction.
pub struct Dispatcher {
    email: Arc<dyn Notifier>,
    whatsapp: Arc<dyn Notifier>,
}

impl Dispatcher {
    pub fn new(email: Arc<dyn Notifier>, whatsapp: Arc<dyn Notifier>) -> Self {
        Self { email, whatsapp }
    }

    /// Build real adapters for configured channels; the rest are disabled.
    pub fn from_configs(email: Option<EmailConfig>, whatsapp: Option<WhatsAppConfig>) -> Self {
        let email: Arc<dyn Notifier> = match email {
            Some(cfg) => Arc::new(EmailNotifier::new(cfg)),
            None => {
                warn!("SMTP not configured; email notifications will not be sent");
                Arc::new(DisabledNotifier::new("email"))
            }
        };
        let whatsapp: Arc<dyn Notifier> = match whatsapp {
            Some(cfg) => Arc::new(WhatsAppNotifier::new(cfg)),
            None => {
                warn!("WhatsApp provider not configured; whatsapp notifications will not be sent");
                Arc::new(DisabledNotifier::new("whatsapp"))
            }
        };
        Self::new(email, whatsapp)
    }

    /// Send the record through the adapter matching its channel.
    ///
    /// Unknown channels are logged and skipped without error.
    pub async fn dispatch(
        &self,
        record: &NotificationRecord,
    ) -> Result<DispatchOutcome, DeliveryError> {
        let (notifier, subject) = match &record.channel {
            ChannelType::Email => (&self.email, EMAIL_SUBJECT),
            ChannelType::WhatsApp => (&self.whatsapp, ""),
            ChannelType::Other(kind) => {
                warn!(
                    id = %record.notification_id,
                    channel = %kind,
                    "Unsupported notification type"
                );
                return Ok(DispatchOutcome::Skipped);
            }
        };

        debug!(
            id = %record.notification_id,
            channel = notifier.name(),
            to = %record.to,
            "Dispatching notification"
        );
        notifier.send(&record.to, subject, &record.message).await?;
        Ok(DispatchOutcome::Sent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::channels::testing::RecordingNotifier;
    use crate::pipeline::decoder::decode;

    fn dispatcher() -> (Dispatcher, Arc<RecordingNotifier>, Arc<RecordingNotifier>) {
        let email = Arc::new(RecordingNotifier::new("email"));
        let whatsapp = Arc::new(RecordingNotifier::new("whatsapp"));
        let d = Dispatcher::new(email.clone(), whatsapp.clone());
        (d, email, whatsapp)
    }

    fn record(channel: &str) -> NotificationRecord {
        decode(
            format!(
                r#"{{"id":"n1","type":"{channel}","to":"a@b.com","message":"hi"}}"#
            )
            .as_bytes(),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn email_goes_to_email_adapter_only() {
        let (d, email, whatsapp) = dispatcher();
        let outcome = d.dispatch(&record("email")).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Sent);
        let sent = email.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].to, "a@b.com");
        assert_eq!(sent[0].subject, "Reorder the quantity");
        assert_eq!(sent[0].body, "hi");
        assert!(whatsapp.sent().is_empty());
    }

    #[tokio::test]
    async fn whatsapp_goes_to_messaging_adapter_only() {
        let (d, email, whatsapp) = dispatcher();
        d.dispatch(&record("whatsapp")).await.unwrap();

        assert!(email.sent().is_empty());
        let sent = whatsapp.sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].subject, "");
        assert_eq!(sent[0].body, "hi");
    }

    #[tokio::test]
    async fn unknown_channel_is_skipped() {
        let (d, email, whatsapp) = dispatcher();
        let outcome = d.dispatch(&record("fax")).await.unwrap();

        assert_eq!(outcome, DispatchOutcome::Skipped);
        assert!(email.sent().is_empty());
        assert!(whatsapp.sent().is_empty());
    }

    #[tokio::test]
    async fn delivery_error_is_returned() {
        let email = Arc::new(RecordingNotifier::failing("email"));
        let d = Dispatcher::new(email.clone(), Arc::new(RecordingNotifier::new("whatsapp")));

        let err = d.dispatch(&record("email")).await.unwrap_err();
        assert_eq!(err.channel(), "email");
        assert_eq!(email.sent().len(), 1);
    }

    #[tokio::test]
    async fn unconfigured_channels_are_disabled() {
        let d = Dispatcher::from_configs(None, None);
        let err = d.dispatch(&record("whatsapp")).await.unwrap_err();
        assert!(matches!(err, DeliveryError::NotConfigured { .. }));
    }
}
