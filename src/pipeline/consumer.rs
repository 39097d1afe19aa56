//! Consumption loop — decode → dispatch → persist, one message at a time.
//!
//! Per-message failures (bad payload, delivery error, store error) are logged
//! and the loop moves on. Only failing to open the subscription is returned
//! to the caller.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::config::{lookup_parsed, lookup_string};
use crate::error::{ConfigError, StreamError};
use crate::pipeline::decoder::decode;
use crate::pipeline::dispatcher::{DispatchOutcome, Dispatcher};
use crate::pipeline::types::DeliveryStatus;
use crate::store::Database;
use crate::stream::{EventSource, RawMessage};

// ── Configuration ───────────────────────────────────────────────────

/// How the persisted status is derived from the dispatch result.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StatusPolicy {
    /// Every processed record is `Delivered`, whatever the adapter reported.
    #[default]
    Processed,
    /// `Delivered`, `Failed` or `Skipped` according to the dispatch result.
    Outcome,
}

impl std::str::FromStr for StatusPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "processed" => Ok(Self::Processed),
            "outcome" => Ok(Self::Outcome),
            other => Err(format!("expected `processed` or `outcome`, got `{other}`")),
        }
    }
}

impl StatusPolicy {
    pub fn resolve(self, dispatch: DispatchOutcome) -> DeliveryStatus {
        match (self, dispatch) {
            (Self::Processed, _) => DeliveryStatus::Delivered,
            (Self::Outcome, DispatchOutcome::Sent) => DeliveryStatus::Delivered,
            (Self::Outcome, DispatchOutcome::Failed) => DeliveryStatus::Failed,
            (Self::Outcome, DispatchOutcome::Skipped) => DeliveryStatus::Skipped,
        }
    }
}

#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub status_policy: StatusPolicy,
    /// How long an in-flight message may run after shutdown is requested.
    pub drain_timeout: Duration,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            status_policy: StatusPolicy::default(),
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl PipelineConfig {
    pub fn from_lookup<F>(lookup: &F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let status_policy = match lookup_string(lookup, "NOTIFICATION_STATUS_POLICY") {
            Some(raw) => raw.parse().map_err(|message| ConfigError::InvalidValue {
                key: "NOTIFICATION_STATUS_POLICY".into(),
                message,
            })?,
            None => defaults.status_policy,
        };
        let drain_timeout = lookup_parsed::<u64, _>(lookup, "SHUTDOWN_DRAIN_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(defaults.drain_timeout);

        Ok(Self {
            status_policy,
            drain_timeout,
        })
    }
}

// ── Outcomes ────────────────────────────────────────────────────────

/// Terminal state of one message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MessageOutcome {
    /// Payload could not be decoded; nothing dispatched or stored.
    DecodeFailed,
    /// Record written (`inserted == false` when the id already existed).
    Stored {
        dispatch: DispatchOutcome,
        status: DeliveryStatus,
        inserted: bool,
    },
    /// Dispatch ran but the record could not be written.
    StoreFailed { dispatch: DispatchOutcome },
}

/// Counters reported when the loop exits.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct LoopStats {
    pub received: u64,
    pub receive_errors: u64,
    pub decode_failures: u64,
    pub delivery_failures: u64,
    pub skipped: u64,
    pub stored: u64,
    pub duplicates: u64,
    pub store_failures: u64,
    /// In-flight messages dropped because the drain window elapsed.
    pub abandoned: u64,
}

impl LoopStats {
    pub fn record(&mut self, outcome: &MessageOutcome) {
        let dispatch = match *outcome {
            MessageOutcome::DecodeFailed => {
                self.decode_failures += 1;
                return;
            }
            MessageOutcome::Stored {
                dispatch, inserted, ..
            } => {
                if inserted {
                    self.stored += 1;
                } else {
                    self.duplicates += 1;
                }
                dispatch
            }
            MessageOutcome::StoreFailed { dispatch } => {
                self.store_failures += 1;
                dispatch
            }
        };
        match dispatch {
            DispatchOutcome::Failed => self.delivery_failures += 1,
            DispatchOutcome::Skipped => self.skipped += 1,
            DispatchOutcome::Sent => {}
        }
    }
}

// ── Loop ────────────────────────────────────────────────────────────

pub struct ConsumptionLoop {
    source: Arc<dyn EventSource>,
    dispatcher: Arc<Dispatcher>,
    db: Arc<dyn Database>,
    config: PipelineConfig,
}

impl ConsumptionLoop {
    pub fn new(
        source: Arc<dyn EventSource>,
        dispatcher: Arc<Dispatcher>,
        db: Arc<dyn Database>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            source,
            dispatcher,
            db,
            config,
        }
    }

    /// Consume until cancelled or the stream ends.
    ///
    /// Cancellation is checked between messages. A message already in flight
    /// gets `drain_timeout` to finish and is abandoned after that.
    pub async fn run(&self, cancel: CancellationToken) -> Result<LoopStats, StreamError> {
        let mut stream = self.source.subscribe().await?;
        info!(source = self.source.name(), "Consumption loop started");

        let mut stats = LoopStats::default();
        loop {
            let next = tokio::select! {
                biased;
                _ = cancel.cancelled() => {
                    info!("Shutdown requested, stopping consumption loop");
                    break;
                }
                next = stream.next() => next,
            };

            let message = match next {
                Some(Ok(message)) => message,
                Some(Err(e)) => {
                    stats.receive_errors += 1;
                    error!(error = %e, "Stream consumer error");
                    continue;
                }
                None => {
                    info!("Event stream ended");
                    break;
                }
            };
            stats.received += 1;

            let work = self.process_message(&message);
            tokio::pin!(work);
            let outcome = tokio::select! {
                outcome = &mut work => outcome,
                _ = cancel.cancelled() => {
                    match tokio::time::timeout(self.config.drain_timeout, &mut work).await {
                        Ok(outcome) => outcome,
                        Err(_) => {
                            warn!(
                                offset = message.offset,
                                drain_secs = self.config.drain_timeout.as_secs_f64(),
                                "Drain window elapsed, abandoning in-flight message"
                            );
                            stats.abandoned += 1;
                            break;
                        }
                    }
                }
            };
            stats.record(&outcome);
        }

        info!(
            received = stats.received,
            stored = stats.stored,
            duplicates = stats.duplicates,
            decode_failures = stats.decode_failures,
            delivery_failures = stats.delivery_failures,
            store_failures = stats.store_failures,
            "Consumption loop stopped"
        );
        Ok(stats)
    }

    /// Run one message through decode, dispatch and persist.
    pub async fn process_message(&self, message: &RawMessage) -> MessageOutcome {
        let mut record = match decode(&message.payload) {
            Ok(record) => record,
            Err(e) => {
                warn!(
                    partition = message.partition,
                    offset = message.offset,
                    error = %e,
                    "Error decoding message"
                );
                return MessageOutcome::DecodeFailed;
            }
        };

        let dispatch = match self.dispatcher.dispatch(&record).await {
            Ok(outcome) => outcome,
            Err(e) => {
                error!(
                    id = %record.notification_id,
                    channel = e.channel(),
                    error = %e,
                    "Error sending notification"
                );
                DispatchOutcome::Failed
            }
        };

        let status = self.config.status_policy.resolve(dispatch);
        record.status = status;

        match self.db.store_notification(&record).await {
            Ok(inserted) => {
                if inserted {
                    info!(
                        id = %record.notification_id,
                        channel = %record.channel,
                        status = status.as_str(),
                        "Notification stored"
                    );
                } else {
                    warn!(
                        id = %record.notification_id,
                        "Duplicate notification id, existing record kept"
                    );
                }
                MessageOutcome::Stored {
                    dispatch,
                    status,
                    inserted,
                }
            }
            Err(e) => {
                error!(
                    id = %record.notification_id,
                    error = %e,
                    "Error storing notification"
                );
                MessageOutcome::StoreFailed { dispatch }
            }
        }
    }
}
