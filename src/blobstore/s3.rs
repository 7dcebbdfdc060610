//! S3-backed blob store.

use super::{BlobStore, BlobStoreError};
use crate::config::S3Config;
use async_trait::async_trait;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;

/// Blob store persisting objects to a single S3 bucket.
#[derive(Clone)]
pub struct S3BlobStore {
    client: Client,
    bucket: String,
}

impl S3BlobStore {
    /// Create a store around an existing SDK client.
    pub fn new(client: Client, bucket: impl Into<String>) -> Self {
        Self {
            client,
            bucket: bucket.into(),
        }
    }

    /// Build a store from configuration.
    ///
    /// Static credentials and an endpoint override are honored when present
    /// (MinIO, LocalStack); otherwise the ambient AWS credential chain is
    /// used.
    pub async fn from_config(config: &S3Config) -> Self {
        let mut loader = aws_config::defaults(aws_config::BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()));

        if let (Some(access_key), Some(secret_key)) = (&config.access_key, &config.secret_key) {
            loader = loader.credentials_provider(aws_credential_types::Credentials::new(
                access_key.clone(),
                secret_key.clone(),
                None,
                None,
                "rakkan-config",
            ));
        }

        if let Some(endpoint) = &config.endpoint {
            loader = loader.endpoint_url(endpoint);
        }

        let sdk_config = loader.load().await;

        Self {
            client: Client::new(&sdk_config),
            bucket: config.bucket.clone(),
        }
    }

    /// Bucket this store writes to.
    pub fn bucket(&self) -> &str {
        &self.bucket
    }
}

#[async_trait]
impl BlobStore for S3BlobStore {
    async fn put(&self, key: &str, data: Bytes, content_type: &str) -> Result<(), BlobStoreError> {
        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .body(ByteStream::from(data))
            .send()
            .await
            .map_err(|e| BlobStoreError::Backend(format!("S3 put failed: {e}")))?;

        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Bytes, BlobStoreError> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(key)
            .send()
            .await
            .map_err(|e| {
                let service_err = e.into_service_error();
                if service_err.is_no_such_key() {
                    BlobStoreError::NotFound(key.to_string())
                } else {
                    BlobStoreError::Backend(format!("S3 get failed: {service_err}"))
                }
            })?;

        let body = response
            .body
            .collect()
            .await
            .map_err(|e| BlobStoreError::Backend(format!("Failed to read S3 body: {e}")))?;

        Ok(body.into_bytes())
    }
}
