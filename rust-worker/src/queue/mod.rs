//! Queue module for RabbitMQ dispatch of normalized events.
//!
//! This module provides:
//! - The [`EventSink`] seam the web handlers dispatch through
//! - Queue names and per-event message identity
//! - Async publisher implementing the sink
//!
//! ## Architecture
//!
//! ```text
//! Web Server → ses_tracking_events / ses_inbound_events queues → consumers
//! ```

pub mod publisher;
pub mod types;

use anyhow::{Context, Result};
use async_trait::async_trait;
use tracing::info;

pub use publisher::Publisher;
pub use types::{QueuedEvent, INBOUND_QUEUE, TRACKING_QUEUE};

/// Destination for normalized events.
#[async_trait]
pub trait EventSink: Send + Sync {
    /// Publish one serialized event.
    async fn publish(&self, queue: &'static str, message_id: String, body: Vec<u8>) -> Result<()>;
}

/// Serialize and publish events in order, stopping at the first failure.
pub async fn dispatch_events<E: QueuedEvent>(sink: &dyn EventSink, events: &[E]) -> Result<()> {
    for event in events {
        let body = serde_json::to_vec(event).context("Failed to serialize event")?;
        sink.publish(E::QUEUE, event.queue_message_id(), body).await?;
    }

    info!(queue = E::QUEUE, count = events.len(), "events_dispatched");
    Ok(())
}
