//! S3-compatible durable storage for extracted frames

use anyhow::{Context, Result};
use async_trait::async_trait;
use aws_sdk_s3::{
    config::{BehaviorVersion, Credentials, Region},
    primitives::ByteStream,
    Client,
};
use sha2::{Digest, Sha256};
use tracing::{debug, info, instrument};

use crate::ingest::ObjectStore;

pub mod config;

#[derive(Clone)]
pub struct Storage {
    client: Client,
    bucket: String,
    base_url: String,
}

impl Storage {
    pub async fn new(config: config::StorageConfig) -> Result<Self> {
        debug!("Initializing storage for bucket {}", config.bucket);

        let credentials = Credentials::new(
            &config.access_key,
            &config.secret_key,
            None,
            None,
            "framewise-storage",
        );

        let mut s3_config_builder = aws_sdk_s3::Config::builder()
            .behavior_version(BehaviorVersion::latest())
            .credentials_provider(credentials)
            .region(Region::new(config.region.clone()))
            .force_path_style(config.path_style);

        if let Some(endpoint) = &config.endpoint {
            s3_config_builder = s3_config_builder.endpoint_url(endpoint);
        }

        let client = Client::from_conf(s3_config_builder.build());
        let base_url = config.object_base_url();

        info!(bucket = %config.bucket, base_url = %base_url, "Storage client initialized");

        Ok(Self {
            client,
            bucket: config.bucket,
            base_url,
        })
    }

    /// Write one object, tagging it with the SHA-256 of its bytes.
    ///
    /// Keys are deterministic, so a repeated write replaces the object.
    #[instrument(skip(self, data), fields(bucket = %self.bucket))]
    pub async fn put_object(
        &self,
        key: &str,
        data: Vec<u8>,
        content_type: &str,
    ) -> Result<StoredObject> {
        let checksum = calculate_sha256(&data);
        let size = data.len();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(key)
            .content_type(content_type)
            .metadata("sha256", &checksum)
            .body(ByteStream::from(data))
            .send()
            .await
            .with_context(|| format!("Failed to write s3://{}/{}", self.bucket, key))?;

        Ok(StoredObject {
            url: self.public_url(key),
            checksum,
            size,
        })
    }

    pub fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key.trim_start_matches('/'))
    }
}

#[async_trait]
impl ObjectStore for Storage {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        let stored = self.put_object(key, data, content_type).await?;
        debug!(key, size = stored.size, checksum = %stored.checksum, "Frame stored");
        Ok(stored.url)
    }
}

/// Where a written object can be read back
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub url: String,
    pub checksum: String,
    pub size: usize,
}

fn calculate_sha256(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}
