//! seshook - Amazon SES webhooks over SNS.
//!
//! This library validates SNS deliveries, confirms subscriptions, and turns
//! SES sending, engagement and inbound notifications into normalized events.
//! The `seshook-web` binary serves it over HTTP.
//!
//! ## Architecture
//!
//! ```text
//! SNS → Web Server → SesWebhook (validate → map) → ses_tracking_events / ses_inbound_events
//!                          ↓                ↓
//!               SNS ConfirmSubscription   S3 GetObject
//! ```

pub mod aws;
pub mod config;
pub mod error;
pub mod events;
pub mod message;
pub mod process;
pub mod queue;
pub mod ses;
pub mod sns;
pub mod web;

// Re-export commonly used types
pub use aws::{AwsClients, SdkClients};
pub use config::Config;
pub use error::{ApiError, ServiceError, WebhookError};
pub use events::{EventType, InboundEvent, RejectReason, TrackingEvent};
pub use message::InboundMessage;
pub use process::SesWebhook;
pub use queue::{EventSink, Publisher, INBOUND_QUEUE, TRACKING_QUEUE};
pub use ses::{InboundEventMapper, ObjectStoreFetcher, SesEventMapper, TrackingEventMapper};
pub use sns::{NotificationEnvelope, SnsMessageType, SnsRequest, SubscriptionConfirmer};
pub use web::AppState;
