//! Download of inbound messages SES stored in S3.

use std::io::Cursor;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use tracing::{error, info};

use crate::aws::AwsClients;
use crate::error::{ApiError, WebhookError};

/// Fetches offloaded message bodies from S3.
#[derive(Clone)]
pub struct ObjectStoreFetcher {
    clients: Arc<dyn AwsClients>,
    timeout: Duration,
}

impl ObjectStoreFetcher {
    pub fn new(clients: Arc<dyn AwsClients>, timeout: Duration) -> Self {
        Self { clients, timeout }
    }

    /// Download `bucket`/`key` into memory and return a reader positioned at
    /// the start.
    ///
    /// The download is bounded by the configured timeout, since SNS abandons
    /// the HTTP request after 15 seconds and redelivers.
    pub async fn fetch(&self, bucket: &str, key: &str) -> Result<Cursor<Bytes>, WebhookError> {
        info!(bucket, key, timeout_ms = self.timeout.as_millis() as u64, "s3_fetch_start");

        let result = {
            let storage = self.clients.object_storage();
            tokio::time::timeout(self.timeout, storage.download(bucket, key)).await
            // storage client released here
        };

        match result {
            Ok(Ok(data)) => {
                info!(bucket, key, size = data.len(), "s3_fetch_complete");
                Ok(Cursor::new(data))
            }
            Ok(Err(source)) => {
                error!(bucket, key, error = %source, "s3_fetch_failed");
                Err(ApiError::ObjectDownload {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                    source,
                }
                .into())
            }
            Err(_) => {
                error!(bucket, key, "s3_fetch_timeout");
                Err(ApiError::ObjectDownloadTimeout {
                    bucket: bucket.to_string(),
                    key: key.to_string(),
                }
                .into())
            }
        }
    }
}
