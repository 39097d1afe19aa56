//! Notification dispatcher — consumes notification events from Kafka,
//! delivers them by email or WhatsApp, and records each one.

pub mod api;
pub mod channels;
pub mod config;
pub mod error;
pub mod pipeline;
pub mod store;
pub mod stream;
