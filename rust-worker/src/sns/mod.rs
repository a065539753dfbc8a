//! Amazon SNS HTTP(S) subscription handling.
//!
//! SNS wraps every message in a JSON envelope and posts it with
//! `x-amz-sns-message-type` / `x-amz-sns-message-id` headers.
//!
//! ## Lifecycle
//!
//! ```text
//! Notification             → payload for the SES mappers
//! SubscriptionConfirmation → SubscriptionConfirmer
//! UnsubscribeConfirmation  → ignored
//! ```

pub mod confirm;
pub mod envelope;
pub mod validate;

pub use confirm::{Arn, SubscriptionConfirmer};
pub use envelope::{parse_envelope, NotificationEnvelope, SnsMessageType, SnsRequest};
pub use validate::{validate_envelope, TransportHeaders, MESSAGE_ID_HEADER, MESSAGE_TYPE_HEADER};
