//! SES inbound receipt mapping.
//!
//! Only the `SNS` receipt action (message inline, possibly base64) and the
//! `S3` action (message stored in a bucket) carry the message content.

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64, Engine as _};
use serde_json::Value;
use tracing::{info, warn};

use crate::error::{ApiError, WebhookError};
use crate::events::{parse_timestamp, EventType, InboundEvent};
use crate::message::InboundMessage;
use crate::ses::{array_field, str_field, ObjectStoreFetcher, SesEventMapper, RECEIVED};
use crate::sns::NotificationEnvelope;

/// Where the message content comes from, per the receipt rule action.
#[derive(Debug, PartialEq)]
enum ReceiptAction<'a> {
    Sns { base64: bool },
    S3 { bucket: Option<&'a str>, key: Option<&'a str> },
    Other(Option<&'a str>),
}

impl<'a> ReceiptAction<'a> {
    fn from_receipt(receipt: &'a Value) -> Self {
        let action = receipt.get("action").unwrap_or(&Value::Null);
        let field = |key: &str| action.get(key).and_then(Value::as_str);

        match field("type") {
            Some("SNS") => ReceiptAction::Sns {
                base64: field("encoding") == Some("BASE64"),
            },
            Some("S3") => ReceiptAction::S3 {
                bucket: field("bucketName"),
                key: field("objectKey"),
            },
            other => ReceiptAction::Other(other),
        }
    }
}

/// Maps SES inbound receipts to inbound events.
#[derive(Clone)]
pub struct InboundEventMapper {
    fetcher: ObjectStoreFetcher,
}

impl InboundEventMapper {
    pub fn new(fetcher: ObjectStoreFetcher) -> Self {
        Self { fetcher }
    }

    /// Map one decoded SES receipt. Always yields exactly one event.
    pub async fn map(
        &self,
        ses_event: &Value,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<InboundEvent>, WebhookError> {
        let event_type = ses_event.get("notificationType").and_then(Value::as_str);
        if event_type != Some(RECEIVED) {
            warn!(
                event_type = ?event_type,
                topic_arn = envelope.topic_arn_display(),
                "ses_sending_event_on_inbound_url"
            );
            return Err(WebhookError::Configuration(format!(
                "You seem to have set an Amazon SES *sending* event or notification to publish \
                 to an SNS Topic that posts to the *inbound* webhook URL. (SNS TopicArn {})",
                envelope.topic_arn_display()
            )));
        }

        let receipt = ses_event.get("receipt").unwrap_or(&Value::Null);
        let mail = ses_event.get("mail").unwrap_or(&Value::Null);

        let mut message = match ReceiptAction::from_receipt(receipt) {
            ReceiptAction::Sns { base64 } => {
                let content = ses_event
                    .get("content")
                    .and_then(Value::as_str)
                    .ok_or_else(|| missing("content"))?;
                if base64 {
                    // SES may line-wrap the encoded content
                    let compact: String = content.split_ascii_whitespace().collect();
                    let raw = BASE64
                        .decode(compact)
                        .map_err(|e| ApiError::MimeParse(format!("invalid base64 content: {e}")))?;
                    InboundMessage::parse_raw_mime_bytes(&raw)?
                } else {
                    InboundMessage::parse_raw_mime(content)?
                }
            }
            ReceiptAction::S3 { bucket, key } => {
                let bucket = bucket.ok_or_else(|| missing("receipt.action.bucketName"))?;
                let key = key.ok_or_else(|| missing("receipt.action.objectKey"))?;
                let stream = self.fetcher.fetch(bucket, key).await?;
                // the stream is consumed and dropped whatever the parse outcome
                InboundMessage::parse_raw_mime_reader(stream)?
            }
            ReceiptAction::Other(action_type) => {
                let action_type = action_type.unwrap_or("<<missing>>");
                warn!(
                    action_type,
                    topic_arn = envelope.topic_arn_display(),
                    "ses_receipt_action_unsupported"
                );
                return Err(WebhookError::Configuration(format!(
                    "The Amazon SES inbound webhook works only with 'SNS' or 'S3' receipt rule \
                     actions, not SNS notifications for {action_type} actions. (SNS TopicArn {})",
                    envelope.topic_arn_display()
                )));
            }
        };

        message.envelope_sender = str_field(mail, "source");
        message.envelope_recipient = array_field(receipt, "recipients")
            .first()
            .and_then(Value::as_str)
            .map(str::to_string);
        message.spam_detected = spam_verdict(receipt);

        let event_id = str_field(mail, "messageId");
        let timestamp = parse_timestamp(mail.get("timestamp").and_then(Value::as_str));

        info!(
            event_id = ?event_id,
            envelope_sender = ?message.envelope_sender,
            envelope_recipient = ?message.envelope_recipient,
            spam_detected = ?message.spam_detected,
            "ses_inbound_event_mapped"
        );

        Ok(vec![InboundEvent {
            event_type: EventType::Inbound,
            event_id,
            message,
            timestamp,
            esp_event: ses_event.clone(),
        }])
    }
}

#[async_trait]
impl SesEventMapper for InboundEventMapper {
    type Event = InboundEvent;

    async fn map_events(
        &self,
        ses_event: &Value,
        envelope: &NotificationEnvelope,
    ) -> Result<Vec<InboundEvent>, WebhookError> {
        self.map(ses_event, envelope).await
    }
}

/// true when SES flagged spam, false when it passed, None otherwise.
fn spam_verdict(receipt: &Value) -> Option<bool> {
    let status = receipt
        .get("spamVerdict")
        .and_then(|v| v.get("status"))
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_ascii_uppercase();

    match status.as_str() {
        "FAIL" => Some(true),
        "PASS" => Some(false),
        _ => None,
    }
}

fn missing(field: &'static str) -> WebhookError {
    ApiError::MalformedEvent {
        event_type: RECEIVED.to_string(),
        field,
    }
    .into()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aws::fakes::FakeAws;
    use serde_json::json;
    use std::sync::atomic::Ordering;
    use std::sync::Arc;
    use std::time::Duration;

    const RAW_MIME: &str = "Message-ID: <inbound-1@example.org>\r\n\
                            From: Someone <someone@example.org>\r\n\
                            To: support@example.com\r\n\
                            Subject: Help please\r\n\
                            \r\n\
                            My widget is broken.\r\n";

    fn envelope() -> NotificationEnvelope {
        NotificationEnvelope {
            message_type: Some("Notification".to_string()),
            message_id: Some("sns-inbound-1".to_string()),
            topic_arn: Some("arn:aws:sns:us-west-2:111122223333:ses-inbound".to_string()),
            timestamp: Some("2024-03-01T12:00:05.000Z".to_string()),
            ..Default::default()
        }
    }

    fn receipt_event(action: Value, content: Option<&str>) -> Value {
        let mut event = json!({
            "notificationType": "Received",
            "mail": {
                "timestamp": "2024-03-01T12:00:00.000Z",
                "source": "bounces@example.org",
                "messageId": "ses-inbound-msg-1",
                "destination": ["support@example.com"]
            },
            "receipt": {
                "recipients": ["support@example.com", "help@example.com"],
                "spamVerdict": {"status": "PASS"},
                "virusVerdict": {"status": "PASS"},
                "action": action
            }
        });
        if let Some(content) = content {
            event["content"] = json!(content);
        }
        event
    }

    fn mapper(aws: Arc<FakeAws>) -> InboundEventMapper {
        InboundEventMapper::new(ObjectStoreFetcher::new(aws, Duration::from_secs(5)))
    }

    #[tokio::test]
    async fn test_sns_action_inline_content() {
        let event = receipt_event(json!({"type": "SNS", "encoding": "UTF8"}), Some(RAW_MIME));

        let events = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap();

        assert_eq!(events.len(), 1);
        let inbound = &events[0];
        assert_eq!(inbound.event_type, EventType::Inbound);
        assert_eq!(inbound.event_id.as_deref(), Some("ses-inbound-msg-1"));
        assert!(inbound.timestamp.is_some());
        assert_eq!(inbound.esp_event, event);

        let message = &inbound.message;
        assert_eq!(message.subject.as_deref(), Some("Help please"));
        assert_eq!(message.envelope_sender.as_deref(), Some("bounces@example.org"));
        assert_eq!(message.envelope_recipient.as_deref(), Some("support@example.com"));
        assert_eq!(message.spam_detected, Some(false));
    }

    #[tokio::test]
    async fn test_sns_action_base64_content() {
        let encoded = BASE64.encode(RAW_MIME);
        let event = receipt_event(json!({"type": "SNS", "encoding": "BASE64"}), Some(&encoded));

        let events = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap();

        assert_eq!(
            events[0].message.message_id.as_deref(),
            Some("inbound-1@example.org")
        );
        assert!(events[0].message.text.as_deref().unwrap().contains("widget is broken"));
    }

    #[tokio::test]
    async fn test_sns_action_wrapped_base64_content() {
        let encoded = BASE64.encode(RAW_MIME);
        let wrapped = encoded
            .as_bytes()
            .chunks(76)
            .map(|line| std::str::from_utf8(line).unwrap())
            .collect::<Vec<_>>()
            .join("\r\n");
        assert!(wrapped.contains("\r\n"));
        let event = receipt_event(json!({"type": "SNS", "encoding": "BASE64"}), Some(&wrapped));

        let events = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap();

        assert_eq!(events[0].message.subject.as_deref(), Some("Help please"));
    }

    #[tokio::test]
    async fn test_s3_action_downloads_message() {
        let aws = FakeAws::with_object("ses-inbox", "incoming/abc123", RAW_MIME.as_bytes());
        let event = receipt_event(
            json!({"type": "S3", "bucketName": "ses-inbox", "objectKey": "incoming/abc123"}),
            None,
        );

        let events = mapper(aws.clone()).map(&event, &envelope()).await.unwrap();

        assert_eq!(events[0].message.subject.as_deref(), Some("Help please"));
        assert_eq!(aws.storage_released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_s3_action_download_failure() {
        let aws = FakeAws::new();
        let event = receipt_event(
            json!({"type": "S3", "bucketName": "ses-inbox", "objectKey": "gone"}),
            None,
        );

        let err = mapper(aws.clone()).map(&event, &envelope()).await.unwrap_err();

        assert!(matches!(err, WebhookError::Api(ApiError::ObjectDownload { .. })));
        assert!(err.to_string().contains("ses-inbox:gone"));
        assert_eq!(aws.storage_released.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_unsupported_action_is_configuration_error() {
        let event = receipt_event(json!({"type": "Lambda", "functionArn": "arn:..."}), None);

        let err = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap_err();

        assert!(matches!(err, WebhookError::Configuration(_)));
        let message = err.to_string();
        assert!(message.contains("Lambda"));
        assert!(message.contains("arn:aws:sns:us-west-2:111122223333:ses-inbound"));
    }

    #[tokio::test]
    async fn test_sending_event_on_inbound_is_configuration_error() {
        let event = json!({"eventType": "Send", "mail": {"messageId": "x"}});

        let err = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap_err();

        assert!(matches!(err, WebhookError::Configuration(_)));
        assert!(err.to_string().contains("ses-inbound"));
    }

    #[tokio::test]
    async fn test_missing_recipients_and_spam_verdict() {
        let mut event = receipt_event(json!({"type": "SNS"}), Some(RAW_MIME));
        event["receipt"] = json!({"action": {"type": "SNS"}, "spamVerdict": {"status": "gray"}});
        event["mail"]["timestamp"] = json!("sometime");

        let events = mapper(FakeAws::new()).map(&event, &envelope()).await.unwrap();

        assert!(events[0].message.envelope_recipient.is_none());
        assert!(events[0].message.spam_detected.is_none());
        assert!(events[0].timestamp.is_none());
    }

    #[test]
    fn test_spam_verdict() {
        assert_eq!(spam_verdict(&json!({"spamVerdict": {"status": "fail"}})), Some(true));
        assert_eq!(spam_verdict(&json!({"spamVerdict": {"status": "PASS"}})), Some(false));
        assert_eq!(spam_verdict(&json!({"spamVerdict": {"status": "PROCESSING_FAILED"}})), None);
        assert_eq!(spam_verdict(&json!({})), None);
    }

    #[test]
    fn test_receipt_action_parse() {
        let receipt = json!({"action": {"type": "S3", "bucketName": "b"}});
        assert_eq!(
            ReceiptAction::from_receipt(&receipt),
            ReceiptAction::S3 {
                bucket: Some("b"),
                key: None
            }
        );
        assert_eq!(ReceiptAction::from_receipt(&json!({})), ReceiptAction::Other(None));
    }
}
