//! SNS notification envelope parsing.
//!
//! The request body is decoded and parsed once per request; later calls hand
//! back the cached envelope.

use std::sync::OnceLock;

use axum::http::{header::CONTENT_TYPE, HeaderMap};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{ApiError, WebhookError};
use crate::sns::validate::TransportHeaders;

/// SNS message lifecycle types.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnsMessageType {
    Notification,
    SubscriptionConfirmation,
    UnsubscribeConfirmation,
}

impl SnsMessageType {
    /// Parse the exact string SNS uses for a type. Unknown types return None.
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "Notification" => Some(SnsMessageType::Notification),
            "SubscriptionConfirmation" => Some(SnsMessageType::SubscriptionConfirmation),
            "UnsubscribeConfirmation" => Some(SnsMessageType::UnsubscribeConfirmation),
            _ => None,
        }
    }
}

/// The JSON wrapper SNS posts to HTTP subscribers.
///
/// Every field is optional at parse time: a missing `Type` or `MessageId` is
/// reported by validation as a header mismatch, not as a parse error.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct NotificationEnvelope {
    #[serde(rename = "Type", default)]
    pub message_type: Option<String>,
    #[serde(rename = "MessageId", default)]
    pub message_id: Option<String>,
    #[serde(rename = "TopicArn", default)]
    pub topic_arn: Option<String>,
    #[serde(rename = "Subject", default, skip_serializing_if = "Option::is_none")]
    pub subject: Option<String>,
    /// Opaque payload; JSON-encoded SES event for `Notification`
    #[serde(rename = "Message", default)]
    pub message: Option<String>,
    #[serde(rename = "Timestamp", default)]
    pub timestamp: Option<String>,
    #[serde(rename = "Token", default, skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
    #[serde(rename = "SubscribeURL", default, skip_serializing_if = "Option::is_none")]
    pub subscribe_url: Option<String>,
    #[serde(rename = "UnsubscribeURL", default, skip_serializing_if = "Option::is_none")]
    pub unsubscribe_url: Option<String>,
}

impl NotificationEnvelope {
    /// The lifecycle type, if it is one SNS defines.
    pub fn kind(&self) -> Option<SnsMessageType> {
        self.message_type.as_deref().and_then(SnsMessageType::parse)
    }

    /// TopicArn for operator-facing messages.
    pub fn topic_arn_display(&self) -> &str {
        self.topic_arn.as_deref().unwrap_or("<<missing>>")
    }
}

/// Parse a raw SNS body into an envelope.
///
/// `charset` is the declared body encoding; UTF-8 when absent.
pub fn parse_envelope(body: &[u8], charset: Option<&str>) -> Result<NotificationEnvelope, WebhookError> {
    let text = decode_body(body, charset).map_err(|reason| malformed(body, &reason))?;

    serde_json::from_str(&text).map_err(|e| malformed(body, &e.to_string()))
}

fn malformed(body: &[u8], reason: &str) -> WebhookError {
    let preview = String::from_utf8_lossy(&body[..body.len().min(200)]).into_owned();
    warn!(
        reason = %reason,
        body_length = body.len(),
        body_preview = %preview,
        "sns_body_malformed"
    );
    ApiError::MalformedPayload(format!("{preview:?} ({reason})")).into()
}

fn decode_body(body: &[u8], charset: Option<&str>) -> Result<String, String> {
    let charset = charset.map(|c| c.trim().to_ascii_lowercase());

    match charset.as_deref().unwrap_or("utf-8") {
        "utf-8" | "utf8" => String::from_utf8(body.to_vec()).map_err(|e| e.to_string()),
        "us-ascii" | "ascii" => {
            if body.is_ascii() {
                Ok(body.iter().map(|&b| b as char).collect())
            } else {
                Err("body is not valid us-ascii".to_string())
            }
        }
        // Latin-1 maps every byte directly onto the first 256 code points
        "iso-8859-1" | "latin1" | "latin-1" => Ok(body.iter().map(|&b| b as char).collect()),
        other => Err(format!("unsupported charset '{other}'")),
    }
}

/// Extract the `charset` parameter from a Content-Type value.
pub fn charset_from_content_type(content_type: &str) -> Option<String> {
    content_type.split(';').skip(1).find_map(|param| {
        let (name, value) = param.split_once('=')?;
        if name.trim().eq_ignore_ascii_case("charset") {
            Some(value.trim().trim_matches('"').to_string())
        } else {
            None
        }
    })
}

/// One inbound SNS HTTP request.
///
/// Owns the raw body and caches the parsed envelope for the lifetime of the
/// request.
#[derive(Debug)]
pub struct SnsRequest {
    headers: TransportHeaders,
    body: Bytes,
    charset: Option<String>,
    envelope: OnceLock<NotificationEnvelope>,
}

impl SnsRequest {
    pub fn new(headers: TransportHeaders, body: impl Into<Bytes>) -> Self {
        Self {
            headers,
            body: body.into(),
            charset: None,
            envelope: OnceLock::new(),
        }
    }

    /// Build from HTTP request parts, reading SNS headers and the body charset.
    pub fn from_http(headers: &HeaderMap, body: Bytes) -> Self {
        let charset = headers
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .and_then(charset_from_content_type);

        Self {
            headers: TransportHeaders::from_header_map(headers),
            body,
            charset,
            envelope: OnceLock::new(),
        }
    }

    /// Override the body charset, e.g. when the transport carried it elsewhere.
    pub fn with_charset(mut self, charset: impl Into<String>) -> Self {
        self.charset = Some(charset.into());
        self
    }

    pub fn headers(&self) -> &TransportHeaders {
        &self.headers
    }

    /// The parsed envelope. Parsed on first call, cached afterwards.
    pub fn envelope(&self) -> Result<&NotificationEnvelope, WebhookError> {
        if let Some(envelope) = self.envelope.get() {
            return Ok(envelope);
        }

        let parsed = parse_envelope(&self.body, self.charset.as_deref())?;
        debug!(
            message_type = ?parsed.message_type,
            message_id = ?parsed.message_id,
            "sns_envelope_parsed"
        );

        Ok(self.envelope.get_or_init(|| parsed))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const NOTIFICATION: &str = r#"{
        "Type": "Notification",
        "MessageId": "8f5a1f7e-0000-4d2b-9c1e-1234567890ab",
        "TopicArn": "arn:aws:sns:us-east-1:111122223333:ses-events",
        "Message": "{\"eventType\":\"Send\"}",
        "Timestamp": "2024-03-01T12:00:00.000Z"
    }"#;

    #[test]
    fn test_parse_envelope_fields() {
        let envelope = parse_envelope(NOTIFICATION.as_bytes(), None).unwrap();

        assert_eq!(envelope.kind(), Some(SnsMessageType::Notification));
        assert_eq!(
            envelope.message_id.as_deref(),
            Some("8f5a1f7e-0000-4d2b-9c1e-1234567890ab")
        );
        assert_eq!(envelope.message.as_deref(), Some(r#"{"eventType":"Send"}"#));
        assert!(envelope.token.is_none());
    }

    #[test]
    fn test_parse_envelope_missing_fields_is_not_an_error() {
        let envelope = parse_envelope(b"{}", None).unwrap();
        assert!(envelope.message_type.is_none());
        assert_eq!(envelope.kind(), None);
        assert_eq!(envelope.topic_arn_display(), "<<missing>>");
    }

    #[test]
    fn test_parse_envelope_invalid_json() {
        let err = parse_envelope(b"not json", None).unwrap_err();
        assert!(matches!(err, WebhookError::Api(ApiError::MalformedPayload(_))));
    }

    #[test]
    fn test_parse_envelope_invalid_utf8() {
        let err = parse_envelope(&[0x7b, 0xff, 0xfe, 0x7d], None).unwrap_err();
        assert!(matches!(err, WebhookError::Api(ApiError::MalformedPayload(_))));
    }

    #[test]
    fn test_parse_envelope_latin1() {
        let body = b"{\"Type\":\"Notification\",\"Subject\":\"caf\xe9\"}";
        let envelope = parse_envelope(body, Some("ISO-8859-1")).unwrap();
        assert_eq!(envelope.subject.as_deref(), Some("café"));
    }

    #[test]
    fn test_parse_envelope_unsupported_charset() {
        let err = parse_envelope(b"{}", Some("koi8-r")).unwrap_err();
        assert!(err.to_string().contains("unsupported charset"));
    }

    #[test]
    fn test_charset_from_content_type() {
        assert_eq!(
            charset_from_content_type("text/plain; charset=UTF-8"),
            Some("UTF-8".to_string())
        );
        assert_eq!(
            charset_from_content_type("application/json;charset=\"iso-8859-1\""),
            Some("iso-8859-1".to_string())
        );
        assert_eq!(charset_from_content_type("text/plain"), None);
    }

    #[test]
    fn test_request_envelope_is_cached() {
        let request = SnsRequest::new(TransportHeaders::default(), NOTIFICATION);

        let first = request.envelope().unwrap();
        let second = request.envelope().unwrap();

        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_request_with_charset_latin1_is_cached() {
        let request = SnsRequest::new(
            TransportHeaders::default(),
            Bytes::from_static(b"{\"Type\":\"Notification\",\"Subject\":\"r\xe9sum\xe9\"}"),
        )
        .with_charset("latin1");

        let first = request.envelope().unwrap();
        let second = request.envelope().unwrap();

        assert_eq!(first.subject.as_deref(), Some("résumé"));
        assert!(std::ptr::eq(first, second));
    }

    #[test]
    fn test_request_from_http_reads_charset() {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, "text/plain; charset=latin1".parse().unwrap());
        headers.insert("x-amz-sns-message-type", "Notification".parse().unwrap());

        let request = SnsRequest::from_http(&headers, Bytes::from_static(b"{\"Subject\":\"\xe9\"}"));

        assert_eq!(request.headers().message_type.as_deref(), Some("Notification"));
        assert_eq!(request.envelope().unwrap().subject.as_deref(), Some("é"));
    }
}
