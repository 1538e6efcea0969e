//! Object storage access for frame blobs.

use crate::config::StorageConfig;
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::config::Builder as S3ConfigBuilder;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::types::{BucketLocationConstraint, CreateBucketConfiguration};
use aws_sdk_s3::Client as S3Client;
use thiserror::Error;
use tracing::{debug, info, instrument};

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("Failed to retrieve {bucket}/{object}: {message}")]
    Retrieve {
        bucket: String,
        object: String,
        message: String,
    },

    #[error("Failed to store {bucket}/{object}: {message}")]
    Store {
        bucket: String,
        object: String,
        message: String,
    },

    #[error("Failed to prepare bucket {bucket}: {message}")]
    Bucket { bucket: String, message: String },
}

/// Blob store addressed by bucket and object name.
#[async_trait]
pub trait ObjectStore: Send + Sync {
    async fn retrieve(&self, bucket: &str, object_name: &str) -> Result<Vec<u8>, StorageError>;

    async fn store(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError>;
}

/// S3-backed object store. Also talks to MinIO or LocalStack through the
/// custom endpoint and path-style settings.
pub struct S3ObjectStore {
    client: S3Client,
    config: StorageConfig,
}

impl S3ObjectStore {
    pub async fn new(config: &StorageConfig) -> Self {
        let aws_config = aws_config::defaults(BehaviorVersion::latest())
            .region(aws_config::Region::new(config.region.clone()))
            .load()
            .await;

        let mut s3_config_builder = S3ConfigBuilder::from(&aws_config);

        if let Some(ref endpoint_url) = config.endpoint_url {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint_url);
        }

        if config.force_path_style {
            s3_config_builder = s3_config_builder.force_path_style(true);
        }

        let client = S3Client::from_conf(s3_config_builder.build());

        info!(region = %config.region, "S3 object store initialized");

        Self {
            client,
            config: config.clone(),
        }
    }

    /// Create the bucket unless it already exists.
    async fn ensure_bucket(&self, bucket: &str) -> Result<(), StorageError> {
        if self
            .client
            .head_bucket()
            .bucket(bucket)
            .send()
            .await
            .is_ok()
        {
            debug!(bucket, "Bucket already exists");
            return Ok(());
        }

        let mut request = self.client.create_bucket().bucket(bucket);

        // us-east-1 rejects an explicit location constraint.
        if self.config.region != "us-east-1" {
            let constraint = BucketLocationConstraint::from(self.config.region.as_str());
            request = request.create_bucket_configuration(
                CreateBucketConfiguration::builder()
                    .location_constraint(constraint)
                    .build(),
            );
        }

        request
            .send()
            .await
            .map_err(|e| StorageError::Bucket {
                bucket: bucket.to_string(),
                message: e.to_string(),
            })?;

        info!(bucket, "Created bucket");
        Ok(())
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    #[instrument(skip(self))]
    async fn retrieve(&self, bucket: &str, object_name: &str) -> Result<Vec<u8>, StorageError> {
        let output = self
            .client
            .get_object()
            .bucket(bucket)
            .key(object_name)
            .send()
            .await
            .map_err(|e| StorageError::Retrieve {
                bucket: bucket.to_string(),
                object: object_name.to_string(),
                message: e.to_string(),
            })?;

        let data = output
            .body
            .collect()
            .await
            .map_err(|e| StorageError::Retrieve {
                bucket: bucket.to_string(),
                object: object_name.to_string(),
                message: e.to_string(),
            })?;

        let bytes = data.into_bytes().to_vec();
        debug!(bucket, object_name, size_bytes = bytes.len(), "Retrieved object");
        Ok(bytes)
    }

    #[instrument(skip(self, bytes), fields(size_bytes = bytes.len()))]
    async fn store(
        &self,
        bucket: &str,
        object_name: &str,
        bytes: &[u8],
        content_type: &str,
    ) -> Result<(), StorageError> {
        if self.config.create_bucket_if_missing {
            self.ensure_bucket(bucket).await?;
        }

        self.client
            .put_object()
            .bucket(bucket)
            .key(object_name)
            .body(ByteStream::from(bytes.to_vec()))
            .content_type(content_type)
            .send()
            .await
            .map_err(|e| StorageError::Store {
                bucket: bucket.to_string(),
                object: object_name.to_string(),
                message: e.to_string(),
            })?;

        debug!(bucket, object_name, "Stored object");
        Ok(())
    }
}
