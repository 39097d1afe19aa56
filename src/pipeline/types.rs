//! Shared types for the notification pipeline.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

// ── Channel ─────────────────────────────────────────────────────────

/// Delivery channel declared on an event.
///
/// Values outside the known set are kept verbatim so they survive
/// persistence unchanged.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum ChannelType {
    Email,
    WhatsApp,
    Other(String),
}

impl ChannelType {
    pub fn as_str(&self) -> &str {
        match self {
            Self::Email => "email",
            Self::WhatsApp => "whatsapp",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for ChannelType {
    fn from(s: String) -> Self {
        match s.as_str() {
            "email" => Self::Email,
            "whatsapp" => Self::WhatsApp,
            _ => Self::Other(s),
        }
    }
}

impl From<ChannelType> for String {
    fn from(c: ChannelType) -> Self {
        match c {
            ChannelType::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

impl fmt::Display for ChannelType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

// ── Priority ────────────────────────────────────────────────────────

/// Notification priority. Carried and stored, never acted on.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum Priority {
    High,
    Medium,
    Low,
    Other(String),
}

impl Priority {
    pub fn as_str(&self) -> &str {
        match self {
            Self::High => "high",
            Self::Medium => "medium",
            Self::Low => "low",
            Self::Other(s) => s,
        }
    }
}

impl From<String> for Priority {
    fn from(s: String) -> Self {
        match s.as_str() {
            "high" => Self::High,
            "medium" => Self::Medium,
            "low" => Self::Low,
            _ => Self::Other(s),
        }
    }
}

impl From<Priority> for String {
    fn from(p: Priority) -> Self {
        match p {
            Priority::Other(s) => s,
            known => known.as_str().to_string(),
        }
    }
}

// ── Delivery status ─────────────────────────────────────────────────

/// Persisted outcome of processing a notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum DeliveryStatus {
    Delivered,
    Failed,
    Skipped,
}

impl DeliveryStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Delivered => "Delivered",
            Self::Failed => "Failed",
            Self::Skipped => "Skipped",
        }
    }
}

impl std::str::FromStr for DeliveryStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "Delivered" => Ok(Self::Delivered),
            "Failed" => Ok(Self::Failed),
            "Skipped" => Ok(Self::Skipped),
            other => Err(format!("unknown delivery status: {other}")),
        }
    }
}

// ── Inbound event ───────────────────────────────────────────────────

/// Wire-level notification event as published upstream.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InboundEvent {
    pub id: String,
    #[serde(default)]
    pub organization_id: String,
    pub to: String,
    #[serde(default)]
    pub from: String,
    #[serde(rename = "type")]
    pub channel: ChannelType,
    #[serde(default)]
    pub priority: Option<Priority>,
    pub message: String,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

// ── Notification record ─────────────────────────────────────────────

/// Durable representation of a processed event.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NotificationRecord {
    pub notification_id: String,
    pub organization_id: String,
    pub to: String,
    pub from: String,
    #[serde(rename = "type")]
    pub channel: ChannelType,
    pub priority: Option<Priority>,
    pub message: String,
    pub status: DeliveryStatus,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: DateTime<Utc>,
}

impl NotificationRecord {
    /// Build a record from a decoded event, stamping `updated_at` now.
    pub fn from_event(event: InboundEvent) -> Self {
        Self {
            notification_id: event.id,
            organization_id: event.organization_id,
            to: event.to,
            from: event.from,
            channel: event.channel,
            priority: event.priority,
            message: event.message,
            status: DeliveryStatus::Delivered,
            created_at: event.created_at,
            updated_at: Utc::now(),
        }
    }
}
