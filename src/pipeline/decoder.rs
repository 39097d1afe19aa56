//! Wire model decoder — raw stream payload to `NotificationRecord`.

use tracing::debug;

use crate::error::DecodeError;
use crate::pipeline::types::{InboundEvent, NotificationRecord};

/// Decode a JSON payload into a fresh notification record.
///
/// `created_at` is carried over from the payload; `updated_at` is stamped
/// with the current time. Channel and priority values are not validated.
pub fn decode(payload: &[u8]) -> Result<NotificationRecord, DecodeError> {
    if payload.is_empty() {
        return Err(DecodeError::EmptyPayload);
    }
    let event: InboundEvent = serde_json::from_slice(payload)?;
    debug!(id = %event.id, channel = %event.channel, "Decoded notification event");
    Ok(NotificationRecord::from_event(event))
}
