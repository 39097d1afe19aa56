//! Email adapter — authenticated SMTP via lettre.

use async_trait::async_trait;
use lettre::message::Mailbox;
use lettre::transport::smtp::authentication::Credentials;
use lettre::{Message, SmtpTransport, Transport};
use secrecy::{ExposeSecret, SecretString};

use crate::channels::Notifier;
use crate::config::{lookup_parsed, lookup_string};
use crate::error::{ConfigError, DeliveryError};

const CHANNEL: &str = "email";

/// Port on which the relay expects implicit TLS rather than STARTTLS.
const SMTPS_PORT: u16 = 465;

// ── Configuration ───────────────────────────────────────────────────

/// SMTP relay configuration, built from environment variables.
#[derive(Debug, Clone)]
pub struct EmailConfig {
    pub smtp_host: String,
    pub smtp_port: u16,
    pub username: String,
    pub password: SecretString,
    pub from_address: String,
}

impl EmailConfig {
    /// Returns `Ok(None)` if `SMTP_HOST` is not set (channel disabled).
    pub fn from_lookup<F>(lookup: F) -> Result<Option<Self>, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let Some(smtp_host) = lookup_string(&lookup, "SMTP_HOST") else {
            return Ok(None);
        };
        let smtp_port = lookup_parsed(&lookup, "SMTP_PORT")?.unwrap_or(587);
        let username = lookup_string(&lookup, "SMTP_USERNAME").unwrap_or_default();
        let password =
            SecretString::from(lookup_string(&lookup, "SMTP_PASSWORD").unwrap_or_default());
        let from_address =
            lookup_string(&lookup, "SMTP_FROM_ADDRESS").unwrap_or_else(|| username.clone());

        Ok(Some(Self {
            smtp_host,
            smtp_port,
            username,
            password,
            from_address,
        }))
    }
}

// ── Notifier ────────────────────────────────────────────────────────

/// Sends plain-text notifications through an SMTP relay.
pub struct EmailNotifier {
    config: EmailConfig,
}

impl EmailNotifier {
    pub fn new(config: EmailConfig) -> Self {
        Self { config }
    }

    fn transport(&self) -> Result<SmtpTransport, DeliveryError> {
        let builder = if uses_implicit_tls(self.config.smtp_port) {
            SmtpTransport::relay(&self.config.smtp_host)
        } else {
            SmtpTransport::starttls_relay(&self.config.smtp_host)
        }
        .map_err(|e| DeliveryError::Connection {
            channel: CHANNEL.into(),
            reason: format!("SMTP relay error: {e}"),
        })?;

        let creds = Credentials::new(
            self.config.username.clone(),
            self.config.password.expose_secret().to_string(),
        );

        Ok(builder
            .port(self.config.smtp_port)
            .credentials(creds)
            .build())
    }
}

#[async_trait]
impl Notifier for EmailNotifier {
    fn name(&self) -> &str {
        CHANNEL
    }

    async fn send(&self, to: &str, subject: &str, body: &str) -> Result<(), DeliveryError> {
        let email = build_message(&self.config.from_address, to, subject, body)?;
        let transport = self.transport()?;

        // lettre's SmtpTransport is blocking
        tokio::task::spawn_blocking(move || transport.send(&email))
            .await
            .map_err(|e| DeliveryError::Connection {
                channel: CHANNEL.into(),
                reason: format!("SMTP task panicked: {e}"),
            })?
            .map_err(classify_smtp_error)?;

        tracing::info!(to, "Email sent");
        Ok(())
    }
}

// ── Helpers (public for testing) ────────────────────────────────────

/// Port 465 speaks TLS from the first byte; every other port upgrades via STARTTLS.
fn uses_implicit_tls(port: u16) -> bool {
    port == SMTPS_PORT
}

/// Build a single plain-text message with From/To/Subject headers.
pub fn build_message(
    from: &str,
    to: &str,
    subject: &str,
    body: &str,
) -> Result<Message, DeliveryError> {
    let from: Mailbox = from.parse().map_err(|e| DeliveryError::InvalidAddress {
        channel: CHANNEL.into(),
        reason: format!("Invalid from address: {e}"),
    })?;
    let to: Mailbox = to.parse().map_err(|e| DeliveryError::InvalidAddress {
        channel: CHANNEL.into(),
        reason: format!("Invalid to address: {e}"),
    })?;

    Message::builder()
        .from(from)
        .to(to)
        .subject(subject)
        .body(body.to_string())
        .map_err(|e| DeliveryError::InvalidAddress {
            channel: CHANNEL.into(),
            reason: format!("Failed to build email: {e}"),
        })
}

/// Relay responses (auth failure, rejected recipient) are rejections;
/// everything else is a connection problem.
fn classify_smtp_error(e: lettre::transport::smtp::Error) -> DeliveryError {
    if e.is_permanent() || e.is_transient() {
        DeliveryError::Rejected {
            channel: CHANNEL.into(),
            reason: format!("SMTP send failed: {e}"),
        }
    } else {
        DeliveryError::Connection {
            channel: CHANNEL.into(),
            reason: format!("SMTP send failed: {e}"),
        }
    }
}
