//! Amazon SES event mapping.
//!
//! SES events arrive as the JSON `Message` of an SNS notification. Sending
//! and tracking events go to [`TrackingEventMapper`]; inbound receipts go to
//! [`InboundEventMapper`].
//!
//! ## Processing Flow
//!
//! ```text
//! SNS Notification → Message (JSON) → SesEventMapper → TrackingEvent / InboundEvent
//! ```

pub mod fetch;
pub mod inbound;
pub mod tracking;

use async_trait::async_trait;
use serde_json::Value;

use crate::error::WebhookError;
use crate::sns::NotificationEnvelope;

pub use fetch::ObjectStoreFetcher;
pub use inbound::InboundEventMapper;
pub use tracking::TrackingEventMapper;

/// Discriminator SES uses for inbound receipts.
pub const RECEIVED: &str = "Received";

/// Converts a decoded SES event into normalized records.
#[async_trait]
pub trait SesEventMapper: Send + Sync {
    type Event: Send;

    async fn map_events(
        &self,
        ses_event: &Value,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<Self::Event>, WebhookError>;
}

/// A string field of a JSON object, if present.
pub(crate) fn str_field(value: &Value, key: &str) -> Option<String> {
    value.get(key).and_then(Value::as_str).map(str::to_string)
}

/// An array field of a JSON object; empty when absent or not an array.
pub(crate) fn array_field<'a>(value: &'a Value, key: &str) -> &'a [Value] {
    value
        .get(key)
        .and_then(Value::as_array)
        .map(Vec::as_slice)
        .unwrap_or(&[])
}
