//! AWS service clients used by the webhooks.
//!
//! Clients are acquired per call from an [`AwsClients`] factory and released
//! when dropped, so every exit path (including errors) gives them back.

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region, SdkConfig};
use aws_sdk_s3::error::{DisplayErrorContext, ProvideErrorMetadata};
use bytes::Bytes;
use tracing::{debug, info};

use crate::error::ServiceError;
use crate::Config;

/// Object storage operations needed for offloaded inbound messages.
#[async_trait]
pub trait ObjectStorage: Send + Sync {
    /// Download an entire object into memory.
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, ServiceError>;
}

/// SNS operations needed for subscription handshakes.
#[async_trait]
pub trait NotificationService: Send + Sync {
    /// Confirm a subscription, requiring authentication for unsubscribes.
    async fn confirm_subscription(&self, topic_arn: &str, token: &str) -> Result<(), ServiceError>;
}

/// Hands out short-lived service clients.
pub trait AwsClients: Send + Sync {
    /// Storage client in the default region.
    fn object_storage(&self) -> Box<dyn ObjectStorage>;

    /// SNS client in a specific region.
    fn notification_service(&self, region: &str) -> Box<dyn NotificationService>;
}

/// [`AwsClients`] backed by the AWS SDK.
#[derive(Debug, Clone)]
pub struct SdkClients {
    sdk_config: SdkConfig,
}

impl SdkClients {
    /// Load shared AWS configuration (credentials, default region, endpoint).
    pub async fn load(config: &Config) -> Self {
        let mut loader = aws_config::defaults(BehaviorVersion::latest());
        if let Some(region) = &config.aws_region {
            loader = loader.region(Region::new(region.clone()));
        }
        if let Some(endpoint) = &config.aws_endpoint_url {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;
        info!(
            region = ?sdk_config.region().map(|r| r.as_ref().to_string()),
            endpoint_override = config.aws_endpoint_url.is_some(),
            "aws_config_loaded"
        );

        Self { sdk_config }
    }
}

impl AwsClients for SdkClients {
    fn object_storage(&self) -> Box<dyn ObjectStorage> {
        Box::new(S3Storage {
            client: aws_sdk_s3::Client::new(&self.sdk_config),
        })
    }

    fn notification_service(&self, region: &str) -> Box<dyn NotificationService> {
        let sns_config = aws_sdk_sns::config::Builder::from(&self.sdk_config)
            .region(Region::new(region.to_string()))
            .build();

        Box::new(SnsService {
            client: aws_sdk_sns::Client::from_conf(sns_config),
        })
    }
}

struct S3Storage {
    client: aws_sdk_s3::Client,
}

#[async_trait]
impl ObjectStorage for S3Storage {
    async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, ServiceError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                ServiceError::new(
                    "GetObject",
                    e.code().map(str::to_string),
                    DisplayErrorContext(&e).to_string(),
                )
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| ServiceError::new("GetObject", None, e.to_string()))?
            .into_bytes();

        debug!(bucket, key, size = data.len(), "s3_object_downloaded");
        Ok(data)
    }
}

struct SnsService {
    client: aws_sdk_sns::Client,
}

#[async_trait]
impl NotificationService for SnsService {
    async fn confirm_subscription(&self, topic_arn: &str, token: &str) -> Result<(), ServiceError> {
        let output = self
            .client
            .confirm_subscription()
            .topic_arn(topic_arn)
            .token(token)
            .authenticate_on_unsubscribe("true")
            .send()
            .await
            .map_err(|e| {
                ServiceError::new(
                    "ConfirmSubscription",
                    e.code().map(str::to_string),
                    aws_sdk_sns::error::DisplayErrorContext(&e).to_string(),
                )
            })?;

        debug!(
            topic_arn,
            subscription_arn = ?output.subscription_arn(),
            "sns_subscription_confirmed"
        );
        Ok(())
    }
}

#[cfg(test)]
pub(crate) mod fakes {
    //! In-memory AWS clients that record calls and count client releases.

    use super::*;
    use std::collections::HashMap;
    use std::ops::Deref;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    #[derive(Default)]
    pub(crate) struct FakeState {
        /// (region, topic_arn, token) per ConfirmSubscription call
        pub sns_calls: Mutex<Vec<(String, String, String)>>,
        pub sns_acquired: AtomicUsize,
        pub sns_released: AtomicUsize,
        pub sns_fail: bool,
        pub objects: Mutex<HashMap<(String, String), Bytes>>,
        pub storage_acquired: AtomicUsize,
        pub storage_released: AtomicUsize,
        pub storage_delay: Option<Duration>,
    }

    pub(crate) struct FakeAws {
        state: Arc<FakeState>,
    }

    impl Deref for FakeAws {
        type Target = FakeState;

        fn deref(&self) -> &FakeState {
            &self.state
        }
    }

    impl FakeAws {
        fn from_state(state: FakeState) -> Arc<Self> {
            Arc::new(Self {
                state: Arc::new(state),
            })
        }

        pub fn new() -> Arc<Self> {
            Self::from_state(FakeState::default())
        }

        pub fn failing_sns() -> Arc<Self> {
            Self::from_state(FakeState {
                sns_fail: true,
                ..Default::default()
            })
        }

        pub fn with_object(bucket: &str, key: &str, data: &'static [u8]) -> Arc<Self> {
            let state = FakeState::default();
            state
                .objects
                .lock()
                .unwrap()
                .insert((bucket.to_string(), key.to_string()), Bytes::from_static(data));
            Self::from_state(state)
        }

        pub fn slow_storage(delay: Duration) -> Arc<Self> {
            Self::from_state(FakeState {
                storage_delay: Some(delay),
                ..Default::default()
            })
        }
    }

    impl AwsClients for FakeAws {
        fn object_storage(&self) -> Box<dyn ObjectStorage> {
            self.storage_acquired.fetch_add(1, Ordering::SeqCst);
            Box::new(FakeStorage(self.state.clone()))
        }

        fn notification_service(&self, region: &str) -> Box<dyn NotificationService> {
            self.sns_acquired.fetch_add(1, Ordering::SeqCst);
            Box::new(FakeSns {
                state: self.state.clone(),
                region: region.to_string(),
            })
        }
    }

    struct FakeStorage(Arc<FakeState>);

    #[async_trait]
    impl ObjectStorage for FakeStorage {
        async fn download(&self, bucket: &str, key: &str) -> Result<Bytes, ServiceError> {
            if let Some(delay) = self.0.storage_delay {
                tokio::time::sleep(delay).await;
            }
            let found = self
                .0
                .objects
                .lock()
                .unwrap()
                .get(&(bucket.to_string(), key.to_string()))
                .cloned();
            found.ok_or_else(|| {
                ServiceError::new(
                    "GetObject",
                    Some("NoSuchKey".to_string()),
                    "The specified key does not exist.",
                )
            })
        }
    }

    impl Drop for FakeStorage {
        fn drop(&mut self) {
            self.0.storage_released.fetch_add(1, Ordering::SeqCst);
        }
    }

    struct FakeSns {
        state: Arc<FakeState>,
        region: String,
    }

    #[async_trait]
    impl NotificationService for FakeSns {
        async fn confirm_subscription(&self, topic_arn: &str, token: &str) -> Result<(), ServiceError> {
            self.state.sns_calls.lock().unwrap().push((
                self.region.clone(),
                topic_arn.to_string(),
                token.to_string(),
            ));
            if self.state.sns_fail {
                Err(ServiceError::new(
                    "ConfirmSubscription",
                    Some("InvalidParameter".to_string()),
                    "Invalid token",
                ))
            } else {
                Ok(())
            }
        }
    }

    impl Drop for FakeSns {
        fn drop(&mut self) {
            self.state.sns_released.fetch_add(1, Ordering::SeqCst);
        }
    }
}
