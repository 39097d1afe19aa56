//! Kafka event source — a single-partition subscription via rdkafka.

use std::time::Duration;

use async_trait::async_trait;
use futures::stream;
use rdkafka::consumer::{Consumer, StreamConsumer};
use rdkafka::{ClientConfig, Message, Offset, TopicPartitionList};
use tracing::{debug, info};

use crate::config::{lookup_parsed, lookup_string, require_string};
use crate::error::{ConfigError, StreamError};
use crate::stream::{EventSource, EventStream, RawMessage};

/// The only partition the service reads.
const PARTITION: i32 = 0;

const DEFAULT_METADATA_TIMEOUT: Duration = Duration::from_secs(10);

/// Where a fresh subscription starts reading.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StartOffset {
    /// Only messages produced after subscribing.
    #[default]
    Newest,
    /// Resume from the group's committed offset (latest if none).
    Stored,
}

impl std::str::FromStr for StartOffset {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "newest" | "latest" | "end" => Ok(Self::Newest),
            "stored" | "committed" => Ok(Self::Stored),
            other => Err(format!("expected `newest` or `stored`, got `{other}`")),
        }
    }
}

impl StartOffset {
    fn offset(self) -> Offset {
        match self {
            Self::Newest => Offset::End,
            Self::Stored => Offset::Stored,
        }
    }
}

#[derive(Debug, Clone)]
pub struct KafkaConfig {
    /// Comma-separated bootstrap servers.
    pub brokers: String,
    pub topic: String,
    pub group_id: String,
    pub start_offset: StartOffset,
    /// How long subscribing waits for the broker to describe the topic.
    pub metadata_timeout: Duration,
}

impl KafkaConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        // KAFKA_PORT is the older name for the broker address.
        let brokers = match lookup_string(lookup, "KAFKA_BROKERS") {
            Some(b) => b,
            None => lookup_string(lookup, "KAFKA_PORT")
                .ok_or_else(|| ConfigError::MissingEnvVar("KAFKA_BROKERS".into()))?,
        };
        let topic = require_string(lookup, "KAFKA_TOPIC")?;
        let group_id = lookup_string(lookup, "KAFKA_GROUP_ID")
            .unwrap_or_else(|| "notification-dispatcher".to_string());
        let start_offset = match lookup_string(lookup, "KAFKA_START_OFFSET") {
            Some(raw) => raw
                .parse()
                .map_err(|message| ConfigError::InvalidValue {
                    key: "KAFKA_START_OFFSET".into(),
                    message,
                })?,
            None => StartOffset::default(),
        };
        let metadata_timeout = lookup_parsed::<u64, _>(lookup, "KAFKA_METADATA_TIMEOUT_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_METADATA_TIMEOUT);

        Ok(Self {
            brokers,
            topic,
            group_id,
            start_offset,
            metadata_timeout,
        })
    }

    fn client_config(&self) -> ClientConfig {
        let mut cfg = ClientConfig::new();
        cfg.set("bootstrap.servers", &self.brokers)
            .set("group.id", &self.group_id)
            .set("enable.auto.commit", "true")
            .set("auto.offset.reset", "latest")
            .set("enable.partition.eof", "false");
        cfg
    }
}

/// Reads partition 0 of one topic.
pub struct KafkaSource {
    config: KafkaConfig,
}

impl KafkaSource {
    pub fn new(config: KafkaConfig) -> Self {
        Self { config }
    }

    fn subscribe_error(&self, reason: impl std::fmt::Display) -> StreamError {
        StreamError::Subscribe {
            topic: self.config.topic.clone(),
            reason: reason.to_string(),
        }
    }
}

#[async_trait]
impl EventSource for KafkaSource {
    fn name(&self) -> &str {
        &self.config.topic
    }

    async fn subscribe(&self) -> Result<EventStream, StreamError> {
        let consumer: StreamConsumer = self
            .config
            .client_config()
            .create()
            .map_err(|e| self.subscribe_error(format!("creating consumer: {e}")))?;

        // Metadata lookups block on the network; keep them off the runtime threads.
        let topic = self.config.topic.clone();
        let timeout = self.config.metadata_timeout;
        let (consumer, checked) = tokio::task::spawn_blocking(move || {
            let checked = check_partition(&consumer, &topic, timeout);
            (consumer, checked)
        })
        .await
        .map_err(|e| self.subscribe_error(format!("metadata task failed: {e}")))?;
        checked.map_err(|reason| self.subscribe_error(reason))?;

        let mut assignment = TopicPartitionList::new();
        assignment
            .add_partition_offset(&self.config.topic, PARTITION, self.config.start_offset.offset())
            .map_err(|e| self.subscribe_error(format!("building assignment: {e}")))?;
        consumer
            .assign(&assignment)
            .map_err(|e| self.subscribe_error(format!("assigning partition: {e}")))?;

        info!(
            brokers = %self.config.brokers,
            topic = %self.config.topic,
            partition = PARTITION,
            start = ?self.config.start_offset,
            "Kafka consumer started"
        );

        // The consumer lives inside the stream state; dropping the stream closes it.
        let stream = stream::unfold(consumer, |consumer| async move {
            let item = match consumer.recv().await {
                Ok(msg) => {
                    debug!(partition = msg.partition(), offset = msg.offset(), "Kafka message");
                    Ok(RawMessage {
                        payload: msg.payload().map(<[u8]>::to_vec).unwrap_or_default(),
                        key: msg.key().map(|k| String::from_utf8_lossy(k).into_owned()),
                        partition: msg.partition(),
                        offset: msg.offset(),
                    })
                }
                Err(e) => Err(StreamError::Receive(e.to_string())),
            };
            Some((item, consumer))
        });

        Ok(Box::pin(stream))
    }
}

/// Confirm the broker knows `topic` and that it has the partition we read.
fn check_partition(
    consumer: &StreamConsumer,
    topic: &str,
    timeout: Duration,
) -> Result<(), String> {
    let metadata = consumer
        .fetch_metadata(Some(topic), timeout)
        .map_err(|e| format!("fetching metadata: {e}"))?;
    let described = metadata
        .topics()
        .iter()
        .find(|t| t.name() == topic)
        .ok_or_else(|| "topic missing from broker metadata".to_string())?;
    if let Some(err) = described.error() {
        return Err(format!("broker reported {err:?}"));
    }
    if !described.partitions().iter().any(|p| p.id() == PARTITION) {
        return Err(format!("partition {PARTITION} does not exist"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::test_lookup;

    #[test]
    fn start_offset_names() {
        assert_eq!("newest".parse::<StartOffset>().unwrap(), StartOffset::Newest);
        assert_eq!("Stored".parse::<StartOffset>().unwrap(), StartOffset::Stored);
        assert!("earliest".parse::<StartOffset>().is_err());
        assert_eq!(StartOffset::Newest.offset(), Offset::End);
    }

    #[test]
    fn legacy_port_variable_is_accepted() {
        let cfg = KafkaConfig::from_lookup(&test_lookup(&[
            ("KAFKA_PORT", "kafka:9092"),
            ("KAFKA_TOPIC", "orders"),
        ]))
        .unwrap();
        assert_eq!(cfg.brokers, "kafka:9092");
    }

    #[test]
    fn bad_start_offset_is_rejected() {
        let err = KafkaConfig::from_lookup(&test_lookup(&[
            ("KAFKA_BROKERS", "kafka:9092"),
            ("KAFKA_TOPIC", "orders"),
            ("KAFKA_START_OFFSET", "beginning"),
        ]))
        .unwrap_err();
        assert!(matches!(err, ConfigError::InvalidValue { ref key, .. } if key == "KAFKA_START_OFFSET"));
    }

    #[test]
    fn client_config_carries_group() {
        let cfg = KafkaConfig::from_lookup(&test_lookup(&[
            ("KAFKA_BROKERS", "a:9092,b:9092"),
            ("KAFKA_TOPIC", "orders"),
            ("KAFKA_GROUP_ID", "dispatch-1"),
        ]))
        .unwrap();
        let client = cfg.client_config();
        assert_eq!(client.get("bootstrap.servers"), Some("a:9092,b:9092"));
        assert_eq!(client.get("group.id"), Some("dispatch-1"));
        assert_eq!(cfg.metadata_timeout, DEFAULT_METADATA_TIMEOUT);
    }

    #[tokio::test]
    async fn unreachable_broker_fails_subscription() {
        let cfg = KafkaConfig::from_lookup(&test_lookup(&[
            ("KAFKA_BROKERS", "127.0.0.1:1"),
            ("KAFKA_TOPIC", "no-such-topic"),
            ("KAFKA_METADATA_TIMEOUT_SECS", "1"),
        ]))
        .unwrap();
        assert_eq!(cfg.metadata_timeout, Duration::from_secs(1));

        let source = KafkaSource::new(cfg);
        let err = match source.subscribe().await {
            Ok(_) => panic!("subscribing without a broker should fail"),
            Err(e) => e,
        };
        assert!(
            matches!(err, StreamError::Subscribe { ref topic, .. } if topic == "no-such-topic"),
            "unexpected error: {err}"
        );
    }
}
