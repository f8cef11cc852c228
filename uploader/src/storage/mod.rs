//! Object storage bound to a temporary credential
mod error;

use std::sync::Arc;
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use aws_config::{retry::RetryConfig, timeout::TimeoutConfig, BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::{primitives::ByteStream, Client as S3Client};
use tracing::instrument;

use crate::credentials::TemporaryCredential;

pub use error::{StoreError, StoreResult};

const MAX_RETRIES: u32 = 3;
const OPERATION_TIMEOUT: Duration = Duration::from_secs(60);
const CREDENTIAL_PROVIDER_NAME: &str = "console-sts-token";

/// Object store authenticated by exactly one credential
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Stores `body` under `key`
    ///
    /// # Errors
    ///
    /// Returns `StoreError::Unauthorized` when the bound credential is rejected
    /// Returns `StoreError::ServiceError` for any other failure
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StoreResult<()>;
}

/// Builds object stores bound to a given credential
pub trait StoreConnector: Send + Sync {
    /// Binds a new store to `credential`
    fn connect(&self, credential: &TemporaryCredential) -> Arc<dyn ObjectStore>;

    /// Public URL under which an object stored at `key` is served
    fn public_url(&self, key: &str) -> String;
}

/// Static description of the target bucket
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorageTarget {
    /// Bucket name
    pub bucket: String,
    /// Region identifier
    pub region: String,
    /// Endpoint override for S3-compatible services and `LocalStack`
    pub endpoint_url: Option<String>,
    /// Use path-style addressing instead of virtual-hosted buckets
    pub force_path_style: bool,
    /// Prefix of public object URLs, without trailing slash
    pub public_base_url: String,
}

/// Connects S3-compatible stores for a [`StorageTarget`]
#[derive(Debug, Clone)]
pub struct S3Connector {
    target: StorageTarget,
}

impl S3Connector {
    #[must_use]
    pub const fn new(target: StorageTarget) -> Self {
        Self { target }
    }

    /// S3 client configuration authenticated by `credential`
    #[must_use]
    pub fn client_config(&self, credential: &TemporaryCredential) -> aws_sdk_s3::Config {
        let credentials = Credentials::new(
            credential.access_key_id.clone(),
            credential.access_key_secret.clone(),
            Some(credential.security_token.clone()),
            Some(SystemTime::from(credential.expires_at)),
            CREDENTIAL_PROVIDER_NAME,
        );

        let retry_config = RetryConfig::standard()
            .with_max_attempts(MAX_RETRIES)
            .with_initial_backoff(Duration::from_millis(50));

        let timeout_config = TimeoutConfig::builder()
            .operation_timeout(OPERATION_TIMEOUT)
            .build();

        let mut builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .region(Region::new(self.target.region.clone()))
            .credentials_provider(credentials)
            .retry_config(retry_config)
            .timeout_config(timeout_config)
            .force_path_style(self.target.force_path_style);

        if let Some(endpoint_url) = &self.target.endpoint_url {
            builder = builder.endpoint_url(endpoint_url);
        }

        builder.build()
    }
}

impl StoreConnector for S3Connector {
    fn connect(&self, credential: &TemporaryCredential) -> Arc<dyn ObjectStore> {
        tracing::debug!(
            "Binding bucket {} to credential {}",
            self.target.bucket,
            credential.access_key_id
        );

        Arc::new(S3ObjectStore {
            client: S3Client::from_conf(self.client_config(credential)),
            bucket: self.target.bucket.clone(),
        })
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{key}", self.target.public_base_url.trim_end_matches('/'))
    }
}

/// S3 client bound to one credential
struct S3ObjectStore {
    client: S3Client,
    bucket: String,
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self, body), fields(bucket = %self.bucket, size = body.len()))]
    async fn put_object(&self, key: &str, body: Vec<u8>, content_type: &str) -> StoreResult<()> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(body))
            .send()
            .await?;

        Ok(())
    }
}
