//! Error types for the notification dispatcher.

/// Configuration-related errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid configuration value for {key}: {message}")]
    InvalidValue { key: String, message: String },

    #[error("Unsupported database type: {0}")]
    UnsupportedDatabase(String),
}

/// Database-related errors.
#[derive(Debug, thiserror::Error)]
pub enum DatabaseError {
    #[error("Connection pool error: {0}")]
    Pool(String),

    #[error("Query failed: {0}")]
    Query(String),

    #[error("Migration failed: {0}")]
    Migration(String),
}

/// Failure to hand a notification to an external provider.
#[derive(Debug, thiserror::Error)]
pub enum DeliveryError {
    #[error("Channel {channel} is not configured")]
    NotConfigured { channel: String },

    #[error("Invalid address for channel {channel}: {reason}")]
    InvalidAddress { channel: String, reason: String },

    #[error("Connection to {channel} provider failed: {reason}")]
    Connection { channel: String, reason: String },

    #[error("Provider for {channel} rejected the message: {reason}")]
    Rejected { channel: String, reason: String },
}

impl DeliveryError {
    /// Name of the channel the failure happened on.
    pub fn channel(&self) -> &str {
        match self {
            Self::NotConfigured { channel }
            | Self::InvalidAddress { channel, .. }
            | Self::Connection { channel, .. }
            | Self::Rejected { channel, .. } => channel,
        }
    }
}

/// Payload could not be turned into a notification.
#[derive(Debug, thiserror::Error)]
pub enum DecodeError {
    #[error("Malformed notification payload: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Message has no payload")]
    EmptyPayload,
}

/// Message stream errors.
#[derive(Debug, thiserror::Error)]
pub enum StreamError {
    /// Could not open the stream or attach to the partition. Fatal.
    #[error("Failed to subscribe to {topic}: {reason}")]
    Subscribe { topic: String, reason: String },

    /// Error reported by an established subscription. Non-fatal.
    #[error("Stream receive error: {0}")]
    Receive(String),
}
