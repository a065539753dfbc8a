//! seshook web server - Amazon SES webhook receiver.
//!
//! This binary serves the SES tracking and inbound webhooks:
//! - Validates SNS deliveries and confirms subscriptions
//! - Normalizes SES events (fetching S3-stored messages when needed)
//! - Publishes the events to RabbitMQ
//!
//! SNS redelivers anything that is not answered with a 2xx.

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::{net::TcpListener, signal};
use tracing::info;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use seshook::web::{create_router, AppState};
use seshook::{Config, Publisher, SdkClients};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize structured JSON logging
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().json().flatten_event(true))
        .init();

    info!("web_server_starting");

    // Load configuration
    let config = Config::from_env();
    info!(
        port = config.port,
        webhook_secret_configured = config.has_webhook_secret(),
        auto_confirm_sns_subscriptions = config.auto_confirm_sns_subscriptions,
        aws_region = ?config.aws_region,
        s3_fetch_timeout_ms = config.s3_fetch_timeout_ms,
        "config_loaded"
    );

    if config.auto_confirm_sns_subscriptions && !config.has_webhook_secret() {
        tracing::warn!("auto_confirm_requires_webhook_secret");
    }

    let clients = SdkClients::load(&config).await;

    // Create RabbitMQ publisher
    let publisher = Publisher::new(config.cloudamqp_url.clone());
    info!("rabbitmq_publisher_created");

    let addr = SocketAddr::from(([0, 0, 0, 0], config.port));

    // Create application state
    let state = AppState::new(config, Arc::new(clients), Arc::new(publisher.clone()));
    let app = create_router(state);

    // Bind to address
    let listener = TcpListener::bind(addr)
        .await
        .context("Failed to bind to address")?;

    info!(address = %addr, "web_server_listening");

    // Run server with graceful shutdown
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("Server error")?;

    // Close publisher connection
    publisher.close().await;

    info!("web_server_shutdown_complete");

    Ok(())
}

/// Create a future that completes when a shutdown signal is received.
async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received SIGINT"),
        _ = terminate => info!("Received SIGTERM"),
    }

    info!("web_server_shutting_down");
}
