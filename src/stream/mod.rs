//! Event sources — where raw notification payloads come from.
//!
//! The consumption loop only sees the [`EventSource`] trait. Production uses
//! [`KafkaSource`]; tests and local runs can feed a [`MemorySource`].

pub mod kafka;
pub mod memory;

use std::pin::Pin;

use async_trait::async_trait;
use futures::Stream;

use crate::error::StreamError;

pub use kafka::{KafkaConfig, KafkaSource, StartOffset};
pub use memory::{MemoryPublisher, MemorySource};

/// One message as delivered by the stream, detached from the client library.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessage {
    /// Message body. Empty when the broker delivered no payload.
    pub payload: Vec<u8>,
    pub key: Option<String>,
    pub partition: i32,
    pub offset: i64,
}

impl RawMessage {
    /// A message at partition 0 with the given body.
    pub fn new(payload: impl Into<Vec<u8>>, offset: i64) -> Self {
        Self {
            payload: payload.into(),
            key: None,
            partition: 0,
            offset,
        }
    }
}

/// Stream of messages (or per-message receive errors) from a subscription.
///
/// Dropping the stream releases the underlying subscription.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<RawMessage, StreamError>> + Send>>;

/// A subscribable message source.
#[async_trait]
pub trait EventSource: Send + Sync {
    /// Human-readable description for logs (e.g. the topic name).
    fn name(&self) -> &str;

    /// Open the subscription. Failure here is fatal for the caller.
    async fn subscribe(&self) -> Result<EventStream, StreamError>;
}
