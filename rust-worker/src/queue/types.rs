//! Queue names and message identity for normalized events.

use serde::Serialize;

use crate::events::{InboundEvent, TrackingEvent};

/// Queue name for normalized tracking events.
pub const TRACKING_QUEUE: &str = "ses_tracking_events";

/// Queue name for normalized inbound events.
pub const INBOUND_QUEUE: &str = "ses_inbound_events";

/// An event that can be published to a queue.
pub trait QueuedEvent: Serialize + Send + Sync {
    /// Destination queue.
    const QUEUE: &'static str;

    /// AMQP message id; unique per record.
    fn queue_message_id(&self) -> String;
}

impl QueuedEvent for TrackingEvent {
    const QUEUE: &'static str = TRACKING_QUEUE;

    fn queue_message_id(&self) -> String {
        // records from one notification share event_id; recipient disambiguates
        format!(
            "{}-{}",
            self.event_id.as_deref().unwrap_or("unknown"),
            self.recipient.as_deref().unwrap_or("unknown")
        )
    }
}

impl QueuedEvent for InboundEvent {
    const QUEUE: &'static str = INBOUND_QUEUE;

    fn queue_message_id(&self) -> String {
        self.event_id.clone().unwrap_or_else(|| "unknown".to_string())
    }
}
