//! SNS notification processing pipeline.
//!
//! ## Processing Flow
//!
//! ```text
//! SnsRequest → parse envelope → validate headers → classify
//!   Notification             → decode Message → SesEventMapper → events
//!   SubscriptionConfirmation → SubscriptionConfirmer → no events
//!   UnsubscribeConfirmation  → no events
//! ```

use serde_json::Value;
use tracing::info;

use crate::error::{ApiError, WebhookError};
use crate::ses::SesEventMapper;
use crate::sns::{validate_envelope, SnsMessageType, SnsRequest, SubscriptionConfirmer};

/// SES posts this plain-text Notification once it has verified it can
/// publish to a topic.
const TOPIC_VALIDATED_MESSAGE: &str =
    "Successfully validated SNS topic for Amazon SES event publishing.";

/// An SES webhook endpoint: SNS handling plus an event mapper.
pub struct SesWebhook<M> {
    mapper: M,
    confirmer: SubscriptionConfirmer,
}

impl<M: SesEventMapper> SesWebhook<M> {
    pub fn new(mapper: M, confirmer: SubscriptionConfirmer) -> Self {
        Self { mapper, confirmer }
    }

    /// Validate one SNS request and turn it into normalized events.
    ///
    /// `auth_proof_present` is true when the request carried the webhook
    /// secret; it gates automatic subscription confirmation.
    pub async fn process(
        &self,
        request: &SnsRequest,
        auth_proof_present: bool,
    ) -> Result<Vec<M::Event>, WebhookError> {
        let envelope = request.envelope()?;
        validate_envelope(request.headers(), envelope)?;

        match envelope.kind() {
            Some(SnsMessageType::Notification) => {
                let message = envelope.message.as_deref().unwrap_or_default();
                let ses_event = match serde_json::from_str::<Value>(message) {
                    Ok(event @ Value::Object(_)) => event,
                    _ if message == TOPIC_VALIDATED_MESSAGE => {
                        info!(topic_arn = envelope.topic_arn_display(), "ses_topic_validated");
                        return Ok(Vec::new());
                    }
                    _ => return Err(ApiError::UnparsableMessage(message.to_string()).into()),
                };

                self.mapper.map_events(&ses_event, envelope).await
            }
            Some(SnsMessageType::SubscriptionConfirmation) => {
                self.confirmer.confirm(envelope, auth_proof_present).await?;
                Ok(Vec::new())
            }
            Some(SnsMessageType::UnsubscribeConfirmation) | None => {
                info!(
                    message_type = ?envelope.message_type,
                    topic_arn = envelope.topic_arn_display(),
                    "sns_message_ignored"
                );
                Ok(Vec::new())
            }
        }
    }
}
