//! In-process event source backed by an mpsc channel.

use std::sync::Arc;
use std::sync::atomic::{AtomicI64, Ordering};

use async_trait::async_trait;
use futures::stream;
use tokio::sync::{Mutex, mpsc};

use crate::error::StreamError;
use crate::stream::{EventSource, EventStream, RawMessage};

/// Sending half paired with a [`MemorySource`].
#[derive(Clone)]
pub struct MemoryPublisher {
    tx: mpsc::UnboundedSender<Result<RawMessage, StreamError>>,
    next_offset: Arc<AtomicI64>,
}

impl MemoryPublisher {
    /// Publish a payload at the next offset. Returns `false` once the
    /// subscription is gone.
    pub fn publish(&self, payload: impl Into<Vec<u8>>) -> bool {
        let offset = self.next_offset.fetch_add(1, Ordering::Relaxed);
        self.tx.send(Ok(RawMessage::new(payload, offset))).is_ok()
    }

    /// Inject a receive error into the stream.
    pub fn publish_error(&self, reason: impl Into<String>) -> bool {
        self.tx.send(Err(StreamError::Receive(reason.into()))).is_ok()
    }
}

/// Single-subscriber source. The stream ends when every publisher is dropped.
pub struct MemorySource {
    name: String,
    rx: Mutex<Option<mpsc::UnboundedReceiver<Result<RawMessage, StreamError>>>>,
}

impl MemorySource {
    pub fn new(name: impl Into<String>) -> (Self, MemoryPublisher) {
        let (tx, rx) = mpsc::unbounded_channel();
        let source = Self {
            name: name.into(),
            rx: Mutex::new(Some(rx)),
        };
        let publisher = MemoryPublisher {
            tx,
            next_offset: Default::default(),
        };
        (source, publisher)
    }
}

#[async_trait]
impl EventSource for MemorySource {
    fn name(&self) -> &str {
        &self.name
    }

    async fn subscribe(&self) -> Result<EventStream, StreamError> {
        let rx = self
            .rx
            .lock()
            .await
            .take()
            .ok_or_else(|| StreamError::Subscribe {
                topic: self.name.clone(),
                reason: "already subscribed".to_string(),
            })?;

        let stream = stream::unfold(rx, |mut rx| async move {
            rx.recv().await.map(|item| (item, rx))
        });

        Ok(Box::pin(stream))
    }
}

#[cfg(test)]
mod tests {
    use futures::StreamExt;

    use super::*;

    #[tokio::test]
    async fn delivers_in_order_then_ends() {
        let (source, publisher) = MemorySource::new("test");
        let mut stream = source.subscribe().await.unwrap();

        assert!(publisher.publish("a"));
        assert!(publisher.publish_error("broker hiccup"));
        assert!(publisher.publish("b"));
        drop(publisher);

        let first = stream.next().await.unwrap().unwrap();
        assert_eq!(first.payload, b"a");
        assert_eq!(first.offset, 0);
        assert!(matches!(
            stream.next().await.unwrap(),
            Err(StreamError::Receive(_))
        ));
        let second = stream.next().await.unwrap().unwrap();
        assert_eq!(second.offset, 1);
        assert!(stream.next().await.is_none());
    }

    #[tokio::test]
    async fn second_subscribe_fails() {
        let (source, _publisher) = MemorySource::new("test");
        let _stream = source.subscribe().await.unwrap();
        assert!(matches!(
            source.subscribe().await,
            Err(StreamError::Subscribe { .. })
        ));
    }

    #[tokio::test]
    async fn publish_after_drop_reports_closed() {
        let (source, publisher) = MemorySource::new("test");
        let stream = source.subscribe().await.unwrap();
        drop(stream);
        assert!(!publisher.publish("late"));
    }
}
