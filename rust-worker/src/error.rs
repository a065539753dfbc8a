//! Error types for the SES webhook pipeline.
//!
//! `WebhookError` separates failures the caller must treat differently:
//! authenticity problems (reject, don't process), misrouted notifications
//! (authentic, but sent to the wrong endpoint), and API-level failures
//! (bad payloads or dependent AWS services).

use std::fmt;

use axum::http::StatusCode;
use thiserror::Error;

/// Top-level error returned by every stage of notification handling.
#[derive(Debug, Error)]
pub enum WebhookError {
    /// Authenticity check failed; the request must be rejected.
    #[error("webhook validation failure: {0}")]
    ValidationFailure(String),

    /// Syntactically an SNS message, but not a type we know.
    #[error("Unknown SNS message type '{0}'")]
    Protocol(String),

    /// Authentic notification delivered to the wrong webhook URL, or using an
    /// unsupported receipt action.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// TopicArn could not be split into its six fields.
    #[error("Invalid ARN format '{0}'")]
    InvalidArn(String),

    #[error(transparent)]
    Api(#[from] ApiError),
}

impl WebhookError {
    /// HTTP status the web layer should answer with.
    ///
    /// Only a download timeout is reported as retryable (503); SNS redelivers
    /// on any non-2xx, but 503 tells operators the failure was transient.
    pub fn status_code(&self) -> StatusCode {
        match self {
            WebhookError::ValidationFailure(_) | WebhookError::Protocol(_) => {
                StatusCode::BAD_REQUEST
            }
            WebhookError::Api(ApiError::ObjectDownloadTimeout { .. }) => {
                StatusCode::SERVICE_UNAVAILABLE
            }
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Short machine-readable label, used in logs and error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            WebhookError::ValidationFailure(_) => "validation_failure",
            WebhookError::Protocol(_) => "protocol_error",
            WebhookError::Configuration(_) => "configuration_error",
            WebhookError::InvalidArn(_) => "invalid_arn",
            WebhookError::Api(_) => "api_error",
        }
    }
}

/// API-level errors: payloads we could not decode and failures of the AWS
/// services we depend on.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Malformed SNS message body: {0}")]
    MalformedPayload(String),

    #[error("Unparsable SNS Message {0:?}")]
    UnparsableMessage(String),

    /// A field the SES event shape requires was absent.
    #[error("SES {event_type} event is missing '{field}'")]
    MalformedEvent {
        event_type: String,
        field: &'static str,
    },

    #[error("Failed to parse inbound message: {0}")]
    MimeParse(String),

    #[error("couldn't download S3 object '{bucket}:{key}'")]
    ObjectDownload {
        bucket: String,
        key: String,
        #[source]
        source: ServiceError,
    },

    #[error("timed out downloading S3 object '{bucket}:{key}'")]
    ObjectDownloadTimeout { bucket: String, key: String },

    #[error("SNS ConfirmSubscription failed for topic '{topic_arn}'")]
    ConfirmSubscription {
        topic_arn: String,
        #[source]
        source: ServiceError,
    },
}

/// Failure reported by an AWS service call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceError {
    /// API operation, e.g. `GetObject`
    pub operation: &'static str,
    /// Provider error code, e.g. `NoSuchKey`
    pub code: Option<String>,
    pub message: String,
}

impl ServiceError {
    pub fn new(operation: &'static str, code: Option<String>, message: impl Into<String>) -> Self {
        Self {
            operation,
            code,
            message: message.into(),
        }
    }
}

impl fmt::Display for ServiceError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.code {
            Some(code) => write!(f, "{} failed ({}): {}", self.operation, code, self.message),
            None => write!(f, "{} failed: {}", self.operation, self.message),
        }
    }
}

impl std::error::Error for ServiceError {}

pub type Result<T, E = WebhookError> = std::result::Result<T, E>;
