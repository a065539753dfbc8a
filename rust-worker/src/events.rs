//! Provider-agnostic event records.
//!
//! Every record keeps the decoded SES event that produced it in `esp_event`,
//! so consumers can always get back to the provider's own data.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::message::InboundMessage;

/// Normalized event types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventType {
    Sent,
    Rejected,
    Failed,
    Bounced,
    Delivered,
    Opened,
    Clicked,
    Complained,
    Unknown,
    Inbound,
}

/// Why a message was not delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RejectReason {
    Bounced,
    Spam,
    Blocked,
}

/// A sending/tracking event for one recipient.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TrackingEvent {
    pub event_type: EventType,
    /// SNS MessageId; shared by every record from one notification
    pub event_id: Option<String>,
    /// SES messageId of the sent mail
    pub message_id: Option<String>,
    pub recipient: Option<String>,
    pub tags: Vec<String>,
    pub metadata: Map<String, Value>,
    pub description: Option<String>,
    pub reject_reason: Option<RejectReason>,
    pub mta_response: Option<String>,
    pub user_agent: Option<String>,
    pub click_url: Option<String>,
    pub timestamp: Option<DateTime<Utc>>,
    pub esp_event: Value,
}

/// A received message.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InboundEvent {
    pub event_type: EventType,
    pub event_id: Option<String>,
    pub message: InboundMessage,
    pub timestamp: Option<DateTime<Utc>>,
    pub esp_event: Value,
}

/// Timestamps without an offset are read as UTC.
const NAIVE_FORMATS: &[&str] = &["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"];

/// Best-effort ISO 8601 timestamp parse; None on anything unparsable.
pub fn parse_timestamp(value: Option<&str>) -> Option<DateTime<Utc>> {
    let value = value?.trim();

    if let Ok(dt) = DateTime::parse_from_rfc3339(value) {
        return Some(dt.with_timezone(&Utc));
    }
    if let Ok(dt) = DateTime::parse_from_str(value, "%Y-%m-%d %H:%M:%S%.f%:z") {
        return Some(dt.with_timezone(&Utc));
    }

    NAIVE_FORMATS
        .iter()
        .find_map(|format| NaiveDateTime::parse_from_str(value, format).ok())
        .map(|naive| naive.and_utc())
}
