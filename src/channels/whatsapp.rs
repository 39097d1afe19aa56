//! WhatsApp adapter — sends through the Twilio Messages REST API.

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;

use crate::channels::Notifier;
use crate::config::lookup_string;
use crate::error::{ConfigError, DeliveryError};

const CHANNEL: &str = "whatsapp";

const DEFAULT_API_BASE: &str = "https://api.twilio.com";

/// Provider configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct WhatsAppConfig {
    pub account_sid: String,
    pub auth_token: SecretString,
    /// Sender number without the `whatsapp:` prefix.
    pub from_number: String,
    pub api_base: String,
}

impl WhatsAppConfig {
    /// Returns `Ok(None)` if `WHATSAPP_ACCOUNT_SID` is not set (channel disabled).
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(account_sid) = lookup_string(&lookup, "WHATSAPP_ACCOUNT_SID") else {
            return Ok(None);
        };
        let from_number = lookup_string(&lookup, "WHATSAPP_FROM_NUMBER")
            .ok_or_else(|| ConfigError::MissingEnvVar("WHATSAPP_FROM_NUMBER".into()))?;
        let auth_token =
            SecretString::from(lookup_string(&lookup, "WHATSAPP_AUTH_TOKEN").unwrap_or_default());
        let api_base = lookup_string(&lookup, "WHATSAPP_API_BASE")
            .unwrap_or_else(|| DEFAULT_API_BASE.to_string())
            .trim_end_matches('/')
            .to_string();

        Ok(Some(Self {
            account_sid,
            auth_token,
            from_number,
            api_base,
        }))
    }
}

/// Subset of the provider's message resource we care about.
#[derive(Debug, Deserialize)]
struct MessageResource {
    sid: Option<String>,
}

/// Sends notifications as WhatsApp messages.
pub struct WhatsAppNotifier {
    config: WhatsAppConfig,
    client: reqwest::Client,
}

impl WhatsAppNotifier {
    pub fn new(config: WhatsAppConfig) -> Self {
        Self {
            config,
            client: reqwest::Client::new(),
        }
    }

    fn messages_url(&self) -> String {
        format!(
            "{}/2010-04-01/Accounts/{}/Messages.json",
            self.config.api_base, self.config.account_sid
        )
    }
}

#[async_trait]
impl Notifier for WhatsAppNotifier {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send(&self, to: &str, _subject: &str, body: &str) -> Result<(), DeliveryError> {
        let form = [
            ("To", whatsapp_address(to)),
            ("From", whatsapp_address(&self.config.from_number)),
            ("Body", render_body(body)),
        ];

        let resp = self
            .client
            .post(self.messages_url())
            .basic_auth(
                &self.config.account_sid,
                Some(self.config.auth_token.expose_secret()),
            )
            .form(&form[..])
            .send()
            .await
            .map_err(|e| DeliveryError::Connection {
                channel: CHANNEL.into(),
                reason: e.to_string(),
            })?;

        let status = resp.status();
        if !status.is_success() {
            let err = resp.text().await.unwrap_or_default();
            tracing::error!(status = ?status, to, "Error sending WhatsApp message");
            return Err(DeliveryError::Rejected {
                channel: CHANNEL.into(),
                reason: format!("{status}: {err}"),
            });
        }

        let sid = resp
            .json::<MessageResource>()
            .await
            .ok()
            .and_then(|m| m.sid)
            .unwrap_or_default();
        tracing::info!(to, sid = %sid, "WhatsApp message sent");
        Ok(())
    }
}

/// Prefix a phone number with the `whatsapp:` scheme unless already present.
pub fn whatsapp_address(number: &str) -> String {
    if number.starts_with("whatsapp:") {
        number.to_string()
    } else {
        format!("whatsapp:{number}")
    }
}

/// Message template used for every WhatsApp notification.
pub fn render_body(message: &str) -> String {
    format!("Your verification code is: {message}")
}
