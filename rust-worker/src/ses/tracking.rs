//! SES sending/tracking event mapping.
//!
//! SES publishes two almost identical formats (event publishing uses
//! `eventType`, feedback notifications use `notificationType`); both are
//! handled here. One [`TrackingEvent`] is produced per affected recipient.

use async_trait::async_trait;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::error::{ApiError, WebhookError};
use crate::events::{parse_timestamp, EventType, RejectReason, TrackingEvent};
use crate::ses::{array_field, str_field, SesEventMapper, RECEIVED};
use crate::sns::NotificationEnvelope;

const TYPE_MISSING: &str = "<<type missing>>";

/// Fields shared by every record produced from one SES event.
#[derive(Debug, Clone)]
struct CommonFields {
    event_type: EventType,
    description: Option<String>,
    reject_reason: Option<RejectReason>,
    mta_response: Option<String>,
    user_agent: Option<String>,
    click_url: Option<String>,
}

impl CommonFields {
    fn new(event_type: EventType) -> Self {
        Self {
            event_type,
            description: None,
            reject_reason: None,
            mta_response: None,
            user_agent: None,
            click_url: None,
        }
    }
}

/// Per-recipient fields.
#[derive(Debug, Clone, PartialEq)]
struct RecipientFields {
    recipient: String,
    mta_response: Option<String>,
}

impl RecipientFields {
    fn address(recipient: String) -> Self {
        Self {
            recipient,
            mta_response: None,
        }
    }
}

/// Result of an event-type handler. `recipients` replaces the default
/// (all destinations) when the event identifies the affected recipients.
struct Mapped {
    common: CommonFields,
    recipients: Option<Vec<RecipientFields>>,
}

type Handler = fn(&Value) -> Result<Mapped, WebhookError>;

/// Discriminator, name of the event-specific sub-object, handler.
const HANDLERS: &[(&str, &str, Handler)] = &[
    ("Bounce", "bounce", map_bounce),
    ("Complaint", "complaint", map_complaint),
    ("Delivery", "delivery", map_delivery),
    ("Send", "send", map_send),
    ("Reject", "reject", map_reject),
    ("Open", "open", map_open),
    ("Click", "click", map_click),
    ("Rendering Failure", "failure", map_rendering_failure),
];

/// Maps SES sending events to tracking events.
#[derive(Debug, Clone, Default)]
pub struct TrackingEventMapper;

impl TrackingEventMapper {
    pub fn new() -> Self {
        Self
    }

    /// Map one decoded SES event.
    pub fn map(
        &self,
        ses_event: &Value,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<TrackingEvent>, WebhookError> {
        let discriminator = ses_event
            .get("eventType")
            .or_else(|| ses_event.get("notificationType"))
            .and_then(Value::as_str)
            .unwrap_or(TYPE_MISSING);

        if discriminator == RECEIVED {
            warn!(topic_arn = envelope.topic_arn_display(), "ses_inbound_event_on_tracking_url");
            return Err(WebhookError::Configuration(format!(
                "You seem to have set an Amazon SES *inbound* receipt rule to publish to an \
                 SNS Topic that posts to the *tracking* webhook URL. (SNS TopicArn {})",
                envelope.topic_arn_display()
            )));
        }

        let mail = ses_event.get("mail").unwrap_or(&Value::Null);
        let (tags, metadata) = custom_headers(mail);

        let mapped = match HANDLERS.iter().find(|(name, _, _)| *name == discriminator) {
            Some((_, payload_key, handler)) => {
                let payload = ses_event.get(*payload_key).unwrap_or(&Value::Null);
                handler(payload)?
            }
            None => {
                warn!(event_type = discriminator, "ses_event_type_unknown");
                let mut common = CommonFields::new(EventType::Unknown);
                common.description = Some(format!("Unknown SES eventType '{discriminator}'"));
                Mapped {
                    common,
                    recipients: None,
                }
            }
        };

        let recipients = mapped.recipients.unwrap_or_else(|| {
            array_field(mail, "destination")
                .iter()
                .filter_map(Value::as_str)
                .map(|addr| RecipientFields::address(addr.to_string()))
                .collect()
        });

        let event_id = envelope.message_id.clone();
        let message_id = str_field(mail, "messageId");
        let timestamp = parse_timestamp(envelope.timestamp.as_deref());
        let common = mapped.common;

        let events: Vec<TrackingEvent> = recipients
            .into_iter()
            .map(|r| TrackingEvent {
                event_type: common.event_type,
                event_id: event_id.clone(),
                message_id: message_id.clone(),
                recipient: Some(r.recipient),
                tags: tags.clone(),
                metadata: metadata.clone(),
                description: common.description.clone(),
                reject_reason: common.reject_reason,
                mta_response: r.mta_response.or_else(|| common.mta_response.clone()),
                user_agent: common.user_agent.clone(),
                click_url: common.click_url.clone(),
                timestamp,
                esp_event: ses_event.clone(),
            })
            .collect();

        info!(
            event_type = discriminator,
            event_id = ?event_id,
            message_id = ?message_id,
            records = events.len(),
            "ses_tracking_events_mapped"
        );

        Ok(events)
    }
}

#[async_trait]
impl SesEventMapper for TrackingEventMapper {
    type Event = TrackingEvent;

    async fn map_events(
        &self,
        ses_event: &Value,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<TrackingEvent>, WebhookError> {
        self.map(ses_event, envelope)
    }
}

/// Recover tags (`X-Tag`, repeatable) and metadata (`X-Metadata`, JSON object)
/// from the mail object's custom headers.
fn custom_headers(mail: &Value) -> (Vec<String>, Map<String, Value>) {
    let mut tags = Vec::new();
    let mut metadata = Map::new();

    for header in array_field(mail, "headers") {
        let (Some(name), Some(value)) = (
            header.get("name").and_then(Value::as_str),
            header.get("value").and_then(Value::as_str),
        ) else {
            continue;
        };

        if name.eq_ignore_ascii_case("x-tag") {
            tags.push(value.to_string());
        } else if name.eq_ignore_ascii_case("x-metadata") {
            match serde_json::from_str::<Value>(value) {
                Ok(Value::Object(map)) => metadata = map,
                Ok(_) | Err(_) => debug!(value, "ses_metadata_header_ignored"),
            }
        }
    }

    (tags, metadata)
}

fn required_str(payload: &Value, event_type: &str, field: &'static str) -> Result<String, WebhookError> {
    str_field(payload, field).ok_or_else(|| missing(event_type, field))
}

fn required_array<'a>(
    payload: &'a Value,
    event_type: &str,
    field: &'static str,
) -> Result<&'a Vec<Value>, WebhookError> {
    payload
        .get(field)
        .and_then(Value::as_array)
        .ok_or_else(|| missing(event_type, field))
}

fn missing(event_type: &str, field: &'static str) -> WebhookError {
    ApiError::MalformedEvent {
        event_type: event_type.to_string(),
        field,
    }
    .into()
}

fn map_bounce(bounce: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Bounced);
    common.description = Some(format!(
        "{}: {}",
        required_str(bounce, "Bounce", "bounceType")?,
        required_str(bounce, "Bounce", "bounceSubType")?
    ));
    common.reject_reason = Some(RejectReason::Bounced);

    let recipients = required_array(bounce, "Bounce", "bouncedRecipients")?
        .iter()
        .map(|r| {
            Ok(RecipientFields {
                recipient: required_str(r, "Bounce", "emailAddress")?,
                mta_response: str_field(r, "diagnosticCode"),
            })
        })
        .collect::<Result<Vec<_>, WebhookError>>()?;

    Ok(Mapped {
        common,
        recipients: Some(recipients),
    })
}

fn map_complaint(complaint: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Complained);
    common.description = str_field(complaint, "complaintFeedbackType");
    common.reject_reason = Some(RejectReason::Spam);
    common.user_agent = str_field(complaint, "userAgent");

    let recipients = required_array(complaint, "Complaint", "complainedRecipients")?
        .iter()
        .map(|r| required_str(r, "Complaint", "emailAddress").map(RecipientFields::address))
        .collect::<Result<Vec<_>, WebhookError>>()?;

    Ok(Mapped {
        common,
        recipients: Some(recipients),
    })
}

fn map_delivery(delivery: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Delivered);
    common.mta_response = str_field(delivery, "smtpResponse");

    let recipients = required_array(delivery, "Delivery", "recipients")?
        .iter()
        .filter_map(Value::as_str)
        .map(|addr| RecipientFields::address(addr.to_string()))
        .collect();

    Ok(Mapped {
        common,
        recipients: Some(recipients),
    })
}

fn map_send(_send: &Value) -> Result<Mapped, WebhookError> {
    Ok(Mapped {
        common: CommonFields::new(EventType::Sent),
        recipients: None,
    })
}

fn map_reject(reject: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Rejected);
    common.description = Some(required_str(reject, "Reject", "reason")?);
    common.reject_reason = Some(RejectReason::Blocked);

    Ok(Mapped {
        common,
        recipients: None,
    })
}

// SES doesn't report which recipient opened or clicked, so opens and clicks
// are reported for every destination.

fn map_open(open: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Opened);
    common.user_agent = str_field(open, "userAgent");

    Ok(Mapped {
        common,
        recipients: None,
    })
}

fn map_click(click: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Clicked);
    common.user_agent = str_field(click, "userAgent");
    common.click_url = str_field(click, "link");

    Ok(Mapped {
        common,
        recipients: None,
    })
}

fn map_rendering_failure(failure: &Value) -> Result<Mapped, WebhookError> {
    let mut common = CommonFields::new(EventType::Failed);
    common.description = Some(required_str(failure, "Rendering Failure", "errorMessage")?);

    Ok(Mapped {
        common,
        recipients: None,
    })
}
