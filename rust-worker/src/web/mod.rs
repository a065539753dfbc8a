//! Web server module for Amazon SES webhooks.
//!
//! This module provides the HTTP surface that:
//! - Receives SNS deliveries for SES tracking and inbound events
//! - Enforces the optional HTTP Basic auth secret
//! - Runs the validation and mapping pipeline
//! - Publishes normalized events to RabbitMQ

pub mod auth;
pub mod handlers;

pub use auth::{check_basic_auth, AuthOutcome, BASIC_REALM};
pub use handlers::{
    create_router, health, ses_inbound_webhook, ses_tracking_webhook, AppState, HealthResponse,
    WebhookResponse,
};
