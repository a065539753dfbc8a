//! SNS request validation.
//!
//! Blocks random posts that don't carry SNS headers agreeing with the body.
//! The SNS message signature is not verified; header/body agreement is the
//! only authenticity check performed here.

use axum::http::HeaderMap;
use tracing::warn;

use crate::error::WebhookError;
use crate::sns::envelope::{NotificationEnvelope, SnsMessageType};

pub const MESSAGE_TYPE_HEADER: &str = "x-amz-sns-message-type";
pub const MESSAGE_ID_HEADER: &str = "x-amz-sns-message-id";

/// Stand-in for an absent header or body field, so a missing value still
/// compares unequal to a present one.
const MISSING: &str = "<<missing>>";

/// SNS transport headers relevant to validation.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportHeaders {
    pub message_type: Option<String>,
    pub message_id: Option<String>,
}

impl TransportHeaders {
    pub fn new(message_type: impl Into<String>, message_id: impl Into<String>) -> Self {
        Self {
            message_type: Some(message_type.into()),
            message_id: Some(message_id.into()),
        }
    }

    pub fn from_header_map(headers: &HeaderMap) -> Self {
        let get = |name: &str| {
            headers
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(str::to_string)
        };

        Self {
            message_type: get(MESSAGE_TYPE_HEADER),
            message_id: get(MESSAGE_ID_HEADER),
        }
    }
}

/// Cross-check transport headers against the envelope.
///
/// Checks, in order: message type agreement, message type is known, message
/// id agreement.
pub fn validate_envelope(
    headers: &TransportHeaders,
    envelope: &NotificationEnvelope,
) -> Result<(), WebhookError> {
    let header_type = headers.message_type.as_deref().unwrap_or(MISSING);
    let body_type = envelope.message_type.as_deref().unwrap_or(MISSING);
    if header_type != body_type {
        warn!(header_type, body_type, "sns_message_type_mismatch");
        return Err(WebhookError::ValidationFailure(format!(
            "SNS header \"x-amz-sns-message-type: {header_type}\" doesn't match body \"Type\": \"{body_type}\""
        )));
    }

    if SnsMessageType::parse(header_type).is_none() {
        warn!(header_type, "sns_message_type_unknown");
        return Err(WebhookError::Protocol(header_type.to_string()));
    }

    let header_id = headers.message_id.as_deref().unwrap_or(MISSING);
    let body_id = envelope.message_id.as_deref().unwrap_or(MISSING);
    if header_id != body_id {
        warn!(header_id, body_id, "sns_message_id_mismatch");
        return Err(WebhookError::ValidationFailure(format!(
            "SNS header \"x-amz-sns-message-id: {header_id}\" doesn't match body \"MessageId\": \"{body_id}\""
        )));
    }

    Ok(())
}
