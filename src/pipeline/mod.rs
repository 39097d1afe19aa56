//! Notification pipeline.
//!
//! Every message from the event source flows through:
//! 1. `decoder::decode()`: JSON payload to `NotificationRecord`
//! 2. `Dispatcher::dispatch()`: hand off to the adapter for the channel
//! 3. `Database::store_notification()`: one write per decoded message
//!
//! `ConsumptionLoop` drives the three steps and keeps going past
//! per-message failures.

pub mod consumer;
pub mod decoder;
pub mod dispatcher;
pub mod types;

pub use consumer::{ConsumptionLoop, LoopStats, MessageOutcome, PipelineConfig, StatusPolicy};
pub use dispatcher::{DispatchOutcome, Dispatcher, EMAIL_SUBJECT};
pub use types::{ChannelType, DeliveryStatus, InboundEvent, NotificationRecord, Priority};
