//! Copies ephemeral provider frames into durable storage
//!
//! Frames are processed in waves of `batch_size`. Inside a wave up to
//! `concurrency` fetches run at once, and each wave settles completely before
//! the next one starts. A frame that cannot be fetched or stored is dropped
//! from the result; it never aborts its wave.

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use reqwest::Client;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Fetches ephemeral provider assets
#[async_trait]
pub trait AssetFetcher: Send + Sync {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset>;
}

/// Durable keyed object storage
#[async_trait]
pub trait ObjectStore: Send + Sync {
    /// Write `data` under `key`, replacing any previous object, and return
    /// its durable URL.
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String>;
}

#[derive(Debug, Clone)]
pub struct FetchedAsset {
    pub data: Vec<u8>,
    /// Content type reported by the provider, if any
    pub content_type: Option<String>,
}

/// A frame that reached durable storage
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PersistedFrame {
    /// 1-based position in the sampled sequence
    pub index: usize,
    pub key: String,
    pub url: String,
}

/// `reqwest` based fetcher
#[derive(Clone)]
pub struct HttpAssetFetcher {
    client: Client,
}

impl HttpAssetFetcher {
    pub fn new(timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .user_agent(concat!("framewise-server/", env!("CARGO_PKG_VERSION")))
            .build()
            .context("Failed to build asset HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl AssetFetcher for HttpAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("Failed to fetch {}", url))?;

        if !response.status().is_success() {
            bail!("HTTP error {} fetching {}", response.status(), url);
        }

        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(str::to_string);
        let data = response
            .bytes()
            .await
            .with_context(|| format!("Failed to read body of {}", url))?;

        Ok(FetchedAsset {
            data: data.to_vec(),
            content_type,
        })
    }
}

/// Moves sampled frames into the object store
#[derive(Clone)]
pub struct FramePersistor {
    fetcher: Arc<dyn AssetFetcher>,
    store: Arc<dyn ObjectStore>,
    batch_size: usize,
    concurrency: usize,
    default_content_type: String,
}

impl FramePersistor {
    pub fn new(
        fetcher: Arc<dyn AssetFetcher>,
        store: Arc<dyn ObjectStore>,
        batch_size: usize,
        concurrency: usize,
        default_content_type: impl Into<String>,
    ) -> Self {
        Self {
            fetcher,
            store,
            batch_size: batch_size.max(1),
            concurrency: concurrency.max(1),
            default_content_type: default_content_type.into(),
        }
    }

    /// Persist every URL, returning the frames that made it in index order.
    pub async fn persist_all(&self, record_id: &str, urls: &[String]) -> Vec<PersistedFrame> {
        let mut persisted = Vec::with_capacity(urls.len());

        for (wave, batch) in urls.chunks(self.batch_size).enumerate() {
            let offset = wave * self.batch_size;
            // collected eagerly so the stream holds no borrowing closure
            let pending: Vec<_> = batch
                .iter()
                .enumerate()
                .map(|(i, url)| self.persist_one(record_id, offset + i + 1, url))
                .collect();
            let results: Vec<Option<PersistedFrame>> = stream::iter(pending)
                .buffer_unordered(self.concurrency)
                .collect()
                .await;

            let stored = results.iter().flatten().count();
            debug!(record_id, wave, stored, attempted = batch.len(), "Frame wave settled");
            persisted.extend(results.into_iter().flatten());
        }

        persisted.sort_by_key(|frame| frame.index);

        info!(
            record_id,
            persisted = persisted.len(),
            requested = urls.len(),
            "Frame persistence finished"
        );
        persisted
    }

    /// Fetch one frame and write it to its deterministic key.
    pub async fn persist_one(
        &self,
        record_id: &str,
        index: usize,
        url: &str,
    ) -> Option<PersistedFrame> {
        let asset = match self.fetcher.fetch(url).await {
            Ok(asset) => asset,
            Err(e) => {
                warn!(record_id, index, error = %format!("{:#}", e), "Frame fetch failed");
                return None;
            },
        };

        let content_type = resolve_content_type(
            asset.content_type.as_deref(),
            &asset.data,
            &self.default_content_type,
        );
        let key = frame_key(record_id, index, extension_for(&content_type));

        match self.store.put(&key, asset.data, &content_type).await {
            Ok(url) => Some(PersistedFrame { index, key, url }),
            Err(e) => {
                warn!(record_id, index, key = %key, error = %format!("{:#}", e), "Frame write failed");
                None
            },
        }
    }
}

/// `{record_id}/frame-00001.jpg`; repeated runs overwrite the same keys.
pub fn frame_key(record_id: &str, index: usize, extension: &str) -> String {
    format!("{}/frame-{:05}.{}", record_id, index, extension)
}

/// Header value without parameters, else magic bytes, else the default.
fn resolve_content_type(header: Option<&str>, data: &[u8], default: &str) -> String {
    header
        .and_then(|h| h.split(';').next())
        .map(|h| h.trim().to_ascii_lowercase())
        .filter(|h| !h.is_empty() && h != "application/octet-stream")
        .or_else(|| sniff(data).map(str::to_string))
        .unwrap_or_else(|| default.to_string())
}

fn sniff(data: &[u8]) -> Option<&'static str> {
    match data {
        [0xFF, 0xD8, 0xFF, ..] => Some("image/jpeg"),
        [0x89, b'P', b'N', b'G', ..] => Some("image/png"),
        [b'G', b'I', b'F', b'8', ..] => Some("image/gif"),
        [b'R', b'I', b'F', b'F', _, _, _, _, b'W', b'E', b'B', b'P', ..] => Some("image/webp"),
        _ => None,
    }
}

fn extension_for(content_type: &str) -> &'static str {
    match content_type {
        "image/jpeg" | "image/jpg" => "jpg",
        "image/png" => "png",
        "image/webp" => "webp",
        "image/gif" => "gif",
        _ => "bin",
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::memory::{MemoryAssetFetcher, MemoryObjectStore};

    const JPEG: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00];
    const PNG: &[u8] = &[0x89, b'P', b'N', b'G', 0x0D, 0x0A];

    #[test]
    fn test_frame_key_is_zero_padded() {
        assert_eq!(frame_key("rec-1", 7, "jpg"), "rec-1/frame-00007.jpg");
        assert_eq!(frame_key("rec-1", 12345, "png"), "rec-1/frame-12345.png");
    }

    #[test]
    fn test_content_type_resolution() {
        assert_eq!(
            resolve_content_type(Some("image/PNG; charset=binary"), JPEG, "image/jpeg"),
            "image/png"
        );
        assert_eq!(
            resolve_content_type(Some("application/octet-stream"), PNG, "image/jpeg"),
            "image/png"
        );
        assert_eq!(resolve_content_type(None, JPEG, "image/webp"), "image/jpeg");
        assert_eq!(resolve_content_type(None, b"????", "image/jpeg"), "image/jpeg");
    }

    #[tokio::test]
    async fn test_persist_all_keeps_order_and_skips_failures() {
        let fetcher = MemoryAssetFetcher::new();
        let urls: Vec<String> = (0..7).map(|i| format!("https://provider/f{}.jpg", i)).collect();
        for (i, url) in urls.iter().enumerate() {
            if i != 3 {
                fetcher.insert(url, JPEG.to_vec(), None).await;
            }
        }
        let store = Arc::new(MemoryObjectStore::new("https://durable.test"));
        let persistor = FramePersistor::new(Arc::new(fetcher), store.clone(), 3, 2, "image/jpeg");

        let frames = persistor.persist_all("rec-9", &urls).await;

        let indexes: Vec<usize> = frames.iter().map(|f| f.index).collect();
        assert_eq!(indexes, vec![1, 2, 3, 5, 6, 7]);
        assert_eq!(frames[0].url, "https://durable.test/rec-9/frame-00001.jpg");
        assert_eq!(store.len().await, 6);
    }

    #[tokio::test]
    async fn test_rerun_overwrites_same_keys() {
        let fetcher = MemoryAssetFetcher::new();
        let urls = vec!["https://provider/a".to_string(), "https://provider/b".to_string()];
        for url in &urls {
            fetcher.insert(url, PNG.to_vec(), Some("image/png")).await;
        }
        let store = Arc::new(MemoryObjectStore::new("https://durable.test"));
        let persistor = FramePersistor::new(Arc::new(fetcher), store.clone(), 50, 10, "image/jpeg");

        let first = persistor.persist_all("rec", &urls).await;
        let second = persistor.persist_all("rec", &urls).await;

        assert_eq!(first, second);
        assert_eq!(store.len().await, 2);
        assert_eq!(second[1].key, "rec/frame-00002.png");
    }

    #[tokio::test]
    async fn test_store_failure_yields_none() {
        let fetcher = MemoryAssetFetcher::new();
        fetcher.insert("https://provider/a", JPEG.to_vec(), None).await;
        let store = Arc::new(MemoryObjectStore::new("https://durable.test"));
        store.set_failing(true);
        let persistor = FramePersistor::new(Arc::new(fetcher), store, 50, 10, "image/jpeg");

        assert!(persistor.persist_one("rec", 1, "https://provider/a").await.is_none());
    }
}
