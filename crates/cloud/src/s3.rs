//! S3-compatible object store (Cloudflare R2).

use std::path::Path;

use async_trait::async_trait;
use aws_config::{BehaviorVersion, Region};
use aws_credential_types::Credentials;
use aws_sdk_s3::primitives::ByteStream;

use crate::config::R2Config;
use crate::store::{public_url, ObjectStore, StorageError};

/// R2 ignores the region but the SDK requires one.
const R2_REGION: &str = "auto";

const ZIP_CONTENT_TYPE: &str = "application/zip";

pub struct S3ObjectStore {
    client: aws_sdk_s3::Client,
    bucket: String,
    public_domain: String,
}

impl S3ObjectStore {
    /// Build a client for the configured endpoint with static credentials.
    pub async fn connect(config: &R2Config) -> Self {
        let credentials = Credentials::new(
            config.access_key_id.clone(),
            config.secret_access_key.clone(),
            None,
            None,
            "mixbuster-r2",
        );
        let shared = aws_config::defaults(BehaviorVersion::latest())
            .region(Region::new(R2_REGION))
            .endpoint_url(&config.endpoint_url)
            .credentials_provider(credentials)
            .load()
            .await;
        let s3_config = aws_sdk_s3::config::Builder::from(&shared)
            .force_path_style(true)
            .build();

        tracing::info!(
            endpoint = %config.endpoint_url,
            bucket = %config.bucket,
            "S3 object store configured"
        );

        Self {
            client: aws_sdk_s3::Client::from_conf(s3_config),
            bucket: config.bucket.clone(),
            public_domain: config.public_domain.clone(),
        }
    }
}

#[async_trait]
impl ObjectStore for S3ObjectStore {
    fn name(&self) -> &'static str {
        "s3"
    }

    async fn put(&self, key: &str, path: &Path) -> Result<String, StorageError> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| StorageError::Read {
                path: path.display().to_string(),
                source: std::io::Error::other(e),
            })?;

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(ZIP_CONTENT_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| StorageError::Upload {
                key: key.to_string(),
                message: aws_sdk_s3::error::DisplayErrorContext(&e).to_string(),
            })?;

        let url = public_url(&self.public_domain, key);
        tracing::info!(bucket = %self.bucket, key, url = %url, "Object uploaded");
        Ok(url)
    }
}
