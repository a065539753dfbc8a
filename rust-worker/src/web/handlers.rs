//! Webhook endpoint handlers.
//!
//! Each SES endpoint:
//! 1. Checks HTTP Basic auth against the webhook secret
//! 2. Runs the SNS request through its `SesWebhook` pipeline
//! 3. Publishes the normalized events to RabbitMQ
//!
//! Any non-2xx answer makes SNS redeliver the notification later.

use std::sync::Arc;
use std::time::Duration;

use axum::{
    body::Bytes,
    extract::State,
    http::{header, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use serde::Serialize;
use tower_http::trace::TraceLayer;
use tracing::{error, info, warn};

use crate::aws::AwsClients;
use crate::process::SesWebhook;
use crate::queue::{dispatch_events, EventSink, QueuedEvent};
use crate::ses::{InboundEventMapper, ObjectStoreFetcher, SesEventMapper, TrackingEventMapper};
use crate::sns::{SnsRequest, SubscriptionConfirmer};
use crate::web::auth::{check_basic_auth, AuthOutcome, BASIC_REALM};
use crate::Config;

/// Shared application state.
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub tracking: Arc<SesWebhook<TrackingEventMapper>>,
    pub inbound: Arc<SesWebhook<InboundEventMapper>>,
    pub sink: Arc<dyn EventSink>,
}

impl AppState {
    pub fn new(config: Config, clients: Arc<dyn AwsClients>, sink: Arc<dyn EventSink>) -> Self {
        let confirmer =
            SubscriptionConfirmer::new(clients.clone(), config.auto_confirm_sns_subscriptions);
        let fetcher = ObjectStoreFetcher::new(
            clients,
            Duration::from_millis(config.s3_fetch_timeout_ms),
        );

        Self {
            tracking: Arc::new(SesWebhook::new(TrackingEventMapper::new(), confirmer.clone())),
            inbound: Arc::new(SesWebhook::new(InboundEventMapper::new(fetcher), confirmer)),
            config: Arc::new(config),
            sink,
        }
    }
}

/// Build the router with all webhook routes.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/amazon_ses/tracking", post(ses_tracking_webhook))
        .route("/webhooks/amazon_ses/inbound", post(ses_inbound_webhook))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

// =============================================================================
// Health Check
// =============================================================================

/// Health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
}

/// Health check endpoint.
pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

// =============================================================================
// Amazon SES Webhooks
// =============================================================================

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    pub status: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub events: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl WebhookResponse {
    fn ok(events: usize) -> Self {
        Self {
            status: "ok",
            events: Some(events),
            error: None,
            message: None,
        }
    }

    fn error(kind: &'static str, message: impl Into<String>) -> Self {
        Self {
            status: "error",
            events: None,
            error: Some(kind),
            message: Some(message.into()),
        }
    }
}

/// Amazon SES tracking webhook (sending and engagement events).
pub async fn ses_tracking_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_sns_request(&state, state.tracking.as_ref(), "tracking", &headers, body).await
}

/// Amazon SES inbound webhook (receipt notifications).
pub async fn ses_inbound_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    handle_sns_request(&state, state.inbound.as_ref(), "inbound", &headers, body).await
}

async fn handle_sns_request<M>(
    state: &AppState,
    webhook: &SesWebhook<M>,
    endpoint: &'static str,
    headers: &HeaderMap,
    body: Bytes,
) -> Response
where
    M: SesEventMapper,
    M::Event: QueuedEvent,
{
    info!(endpoint, body_length = body.len(), "ses_webhook_received");

    let authorization = headers
        .get(header::AUTHORIZATION)
        .and_then(|v| v.to_str().ok());

    let auth = check_basic_auth(state.config.webhook_secret.as_deref(), authorization);
    match auth {
        AuthOutcome::Challenge => {
            info!(endpoint, "ses_webhook_auth_challenge");
            return (
                StatusCode::UNAUTHORIZED,
                [(
                    header::WWW_AUTHENTICATE,
                    format!("Basic realm=\"{BASIC_REALM}\""),
                )],
                Json(WebhookResponse::error("unauthorized", "Missing basic auth")),
            )
                .into_response();
        }
        AuthOutcome::Invalid => {
            warn!(endpoint, "ses_webhook_auth_invalid");
            return (
                StatusCode::BAD_REQUEST,
                Json(WebhookResponse::error(
                    "validation_failure",
                    "Missing or invalid basic auth",
                )),
            )
                .into_response();
        }
        AuthOutcome::NotConfigured | AuthOutcome::Verified => {}
    }

    let request = SnsRequest::from_http(headers, body);

    let events = match webhook.process(&request, auth.proof_present()).await {
        Ok(events) => events,
        Err(e) => {
            let status = e.status_code();
            if status.is_server_error() {
                error!(endpoint, kind = e.kind(), error = %e, "ses_webhook_failed");
            } else {
                warn!(endpoint, kind = e.kind(), error = %e, "ses_webhook_rejected");
            }
            return (status, Json(WebhookResponse::error(e.kind(), e.to_string()))).into_response();
        }
    };

    if let Err(e) = dispatch_events(state.sink.as_ref(), &events).await {
        error!(endpoint, error = %e, "ses_event_dispatch_failed");
        return (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(WebhookResponse::error("dispatch_error", format!("{e:#}"))),
        )
            .into_response();
    }

    info!(endpoint, events = events.len(), "ses_webhook_handled");

    (StatusCode::OK, Json(WebhookResponse::ok(events.len()))).into_response()
}
