use framewise_common::env;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub endpoint: Option<String>,
    pub region: String,
    pub bucket: String,
    pub access_key: String,
    pub secret_key: String,
    pub path_style: bool,
    /// Prefix for durable frame URLs, e.g. a CDN in front of the bucket
    pub public_base_url: Option<String>,
}

impl StorageConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            endpoint: env::string("S3_ENDPOINT"),
            region: env::string("S3_REGION").unwrap_or_else(|| "us-east-1".to_string()),
            bucket: env::string("S3_BUCKET").unwrap_or_else(|| "framewise-frames".to_string()),
            access_key: env::string("S3_ACCESS_KEY")
                .or_else(|| env::string("AWS_ACCESS_KEY_ID"))
                .unwrap_or_else(|| "minioadmin".to_string()),
            secret_key: env::string("S3_SECRET_KEY")
                .or_else(|| env::string("AWS_SECRET_ACCESS_KEY"))
                .unwrap_or_else(|| "minioadmin".to_string()),
            path_style: env::parse_or("S3_PATH_STYLE", false)?,
            public_base_url: env::string("S3_PUBLIC_BASE_URL"),
        })
    }

    pub fn for_minio(endpoint: impl Into<String>, bucket: impl Into<String>) -> Self {
        Self {
            endpoint: Some(endpoint.into()),
            region: "us-east-1".to_string(),
            bucket: bucket.into(),
            access_key: "minioadmin".to_string(),
            secret_key: "minioadmin".to_string(),
            path_style: true,
            public_base_url: None,
        }
    }

    /// Base URL durable objects are served from.
    pub fn object_base_url(&self) -> String {
        if let Some(base) = &self.public_base_url {
            return base.trim_end_matches('/').to_string();
        }
        match &self.endpoint {
            Some(endpoint) if self.path_style => {
                format!("{}/{}", endpoint.trim_end_matches('/'), self.bucket)
            },
            Some(endpoint) => {
                let endpoint = endpoint.trim_end_matches('/');
                match endpoint.split_once("://") {
                    Some((scheme, host)) => format!("{}://{}.{}", scheme, self.bucket, host),
                    None => format!("{}/{}", endpoint, self.bucket),
                }
            },
            None => format!("https://{}.s3.{}.amazonaws.com", self.bucket, self.region),
        }
    }
}
