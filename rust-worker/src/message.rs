//! RFC 5322 inbound message parsing using mailparse.
//!
//! Turns raw MIME (inline from SNS or downloaded from S3) into an
//! [`InboundMessage`]. The envelope fields are filled in afterwards from the
//! SES receipt, not from the message itself.

use std::io::Read;

use mailparse::{parse_mail, DispositionType, MailHeaderMap, ParsedMail};
use serde::Serialize;
use tracing::{info, warn};

use crate::error::ApiError;

/// A parsed inbound email.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct InboundMessage {
    /// Message-Id header value (without angle brackets)
    pub message_id: Option<String>,
    pub subject: Option<String>,
    pub from: Option<String>,
    pub to: Option<String>,
    pub date: Option<String>,
    /// Plain text body
    pub text: Option<String>,
    /// HTML body
    pub html: Option<String>,
    /// All top-level headers, in order
    pub headers: Vec<(String, String)>,

    /// SMTP MAIL FROM address
    pub envelope_sender: Option<String>,
    /// First recipient matched by the receipt rule
    pub envelope_recipient: Option<String>,
    /// Some(true) spam, Some(false) not spam, None when unknown
    pub spam_detected: Option<bool>,
}

impl InboundMessage {
    /// Parse raw MIME bytes.
    pub fn parse_raw_mime_bytes(raw: &[u8]) -> Result<Self, ApiError> {
        info!(raw_length = raw.len(), "message_parse_start");

        let mail = parse_mail(raw).map_err(|e| ApiError::MimeParse(e.to_string()))?;

        let header = |name: &str| mail.headers.get_first_value(name);

        let message = InboundMessage {
            message_id: header("Message-ID")
                .map(|id| id.trim().trim_matches(|c| c == '<' || c == '>').to_string()),
            subject: header("Subject"),
            from: header("From"),
            to: header("To"),
            date: header("Date"),
            text: find_body(&mail, "text/plain"),
            html: find_body(&mail, "text/html"),
            headers: mail
                .headers
                .iter()
                .map(|h| (h.get_key(), h.get_value()))
                .collect(),
            ..Default::default()
        };

        info!(
            message_id = ?message.message_id,
            has_text = message.text.is_some(),
            has_html = message.html.is_some(),
            header_count = message.headers.len(),
            "message_parse_complete"
        );

        Ok(message)
    }

    /// Parse raw MIME text.
    pub fn parse_raw_mime(raw: &str) -> Result<Self, ApiError> {
        Self::parse_raw_mime_bytes(raw.as_bytes())
    }

    /// Read a MIME stream to the end and parse it.
    pub fn parse_raw_mime_reader<R: Read>(mut reader: R) -> Result<Self, ApiError> {
        let mut raw = Vec::new();
        reader
            .read_to_end(&mut raw)
            .map_err(|e| ApiError::MimeParse(e.to_string()))?;
        Self::parse_raw_mime_bytes(&raw)
    }
}

/// Find the body of the given type, skipping attachments.
///
/// Handles single-part messages and nested multipart structures; several
/// matching parts are joined with a newline.
fn find_body(mail: &ParsedMail, mimetype: &str) -> Option<String> {
    let mut parts = Vec::new();
    collect_parts(mail, mimetype, &mut parts);

    match parts.len() {
        0 => None,
        1 => parts.pop(),
        n => {
            info!(mimetype, parts_count = n, "message_multiple_body_parts");
            Some(parts.join("\n"))
        }
    }
}

fn collect_parts(mail: &ParsedMail, mimetype: &str, out: &mut Vec<String>) {
    let part_type = mail.ctype.mimetype.as_str();

    if part_type.starts_with("multipart/") {
        for part in &mail.subparts {
            collect_parts(part, mimetype, out);
        }
        return;
    }

    if part_type != mimetype
        || mail.get_content_disposition().disposition == DispositionType::Attachment
    {
        return;
    }

    match mail.get_body() {
        Ok(body) if !body.trim().is_empty() => out.push(body),
        Ok(_) => {}
        Err(e) => warn!(error = %e, mimetype, "message_body_extraction_failed"),
    }
}
