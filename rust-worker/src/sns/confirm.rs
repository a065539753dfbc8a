//! Automatic SNS subscription confirmation.
//!
//! A SubscriptionConfirmation is only confirmed when the request proved it was
//! meant for this endpoint (HTTP basic auth with the webhook secret). A valid
//! SNS signature is not enough: anyone can point their own topic at our URL
//! and SNS will sign that confirmation request.

use std::sync::Arc;

use tracing::{info, warn};

use crate::aws::AwsClients;
use crate::error::{ApiError, WebhookError};
use crate::sns::envelope::NotificationEnvelope;

/// The six fields of an ARN: `arn:partition:service:region:account:resource`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Arn<'a> {
    pub partition: &'a str,
    pub service: &'a str,
    pub region: &'a str,
    pub account: &'a str,
    /// May contain further colons.
    pub resource: &'a str,
}

impl<'a> Arn<'a> {
    pub fn parse(arn: &'a str) -> Result<Self, WebhookError> {
        let fields: Vec<&str> = arn.splitn(6, ':').collect();
        match fields.as_slice() {
            [_, partition, service, region, account, resource] => Ok(Arn {
                partition: *partition,
                service: *service,
                region: *region,
                account: *account,
                resource: *resource,
            }),
            _ => Err(WebhookError::InvalidArn(arn.to_string())),
        }
    }
}

/// Completes the SNS subscription handshake.
#[derive(Clone)]
pub struct SubscriptionConfirmer {
    clients: Arc<dyn AwsClients>,
    auto_confirm_enabled: bool,
}

impl SubscriptionConfirmer {
    pub fn new(clients: Arc<dyn AwsClients>, auto_confirm_enabled: bool) -> Self {
        Self {
            clients,
            auto_confirm_enabled,
        }
    }

    /// Confirm the subscription described by a SubscriptionConfirmation envelope.
    ///
    /// `auth_proof_present` is true when the request carried the webhook
    /// secret. Without it, fails with a validation failure that includes the
    /// topic and token so an operator can confirm manually.
    pub async fn confirm(
        &self,
        envelope: &NotificationEnvelope,
        auth_proof_present: bool,
    ) -> Result<(), WebhookError> {
        if !self.auto_confirm_enabled {
            info!(topic_arn = envelope.topic_arn_display(), "sns_auto_confirm_disabled");
            return Ok(());
        }

        let topic_arn = envelope.topic_arn.as_deref().unwrap_or_default();
        let token = envelope.token.as_deref().unwrap_or_default();

        if token.is_empty() {
            warn!(topic_arn, "sns_subscription_confirmation_missing_token");
            return Err(ApiError::MalformedEvent {
                event_type: "SubscriptionConfirmation".to_string(),
                field: "Token",
            }
            .into());
        }

        if !auth_proof_present {
            warn!(topic_arn, "sns_unexpected_subscription_confirmation");
            return Err(WebhookError::ValidationFailure(format!(
                "received an unexpected SubscriptionConfirmation request for Amazon SNS \
                 topic '{topic_arn}'. (Subscriptions can be confirmed automatically if you \
                 set a WEBHOOK_SECRET and use it in your SNS notification url. Or you can \
                 manually confirm this subscription in the SNS dashboard with token '{token}'.)"
            )));
        }

        // Must confirm in the topic's own region, which may differ from the default
        let region = Arn::parse(topic_arn)?.region;

        info!(topic_arn, region, "sns_subscription_confirming");

        let result = {
            let sns = self.clients.notification_service(region);
            sns.confirm_subscription(topic_arn, token).await
            // client released here, on success or failure
        };

        result.map_err(|source| {
            warn!(topic_arn, error = %source, "sns_subscription_confirm_failed");
            ApiError::ConfirmSubscription {
                topic_arn: topic_arn.to_string(),
                source,
            }
        })?;

        info!(topic_arn, region, "sns_subscription_confirmed");
        Ok(())
    }
}
