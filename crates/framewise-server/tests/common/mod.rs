//! Shared fixtures for server integration tests

#![allow(dead_code, clippy::unwrap_used, clippy::expect_used)]

use framewise_server::config::IngestionConfig;
use framewise_server::ingest::memory::{
    MemoryAssetFetcher, MemoryObjectStore, MemoryRecordStore, MemoryViolationLog,
    MemoryWorkQueue, RecordingEscalator,
};
use framewise_server::ingest::{
    Collaborators, Escalator, IngestionWebhookHandler, NudgeSender, ProcessingRecord, RecordKey,
    RecordTable,
};
use serde_json::json;
use std::io::Write;
use std::sync::{Arc, Mutex};

pub const COURSE_ID: &str = "course-1";
pub const RECORD_ID: &str = "rec-1";

pub fn key() -> RecordKey {
    RecordKey::new(RecordTable::CourseProcessing, RECORD_ID)
}

/// Ingestion config with a short transcript poll.
pub fn fast_config() -> IngestionConfig {
    IngestionConfig {
        transcript_poll_attempts: 2,
        transcript_poll_interval_ms: 5,
        ..IngestionConfig::default()
    }
}

pub struct Harness {
    pub records: Arc<MemoryRecordStore>,
    pub queue: Arc<MemoryWorkQueue>,
    pub violations: Arc<MemoryViolationLog>,
    pub fetcher: Arc<MemoryAssetFetcher>,
    pub objects: Arc<MemoryObjectStore>,
    pub escalator: Option<Arc<RecordingEscalator>>,
    pub handler: IngestionWebhookHandler,
}

impl Harness {
    pub fn new() -> Self {
        Self::build(Some(RecordingEscalator::new()), fast_config(), NudgeSender::disabled())
    }

    pub fn build(
        escalator: Option<RecordingEscalator>,
        config: IngestionConfig,
        nudges: NudgeSender,
    ) -> Self {
        let records = Arc::new(MemoryRecordStore::new());
        let queue = Arc::new(MemoryWorkQueue::new());
        let violations = Arc::new(MemoryViolationLog::new());
        let fetcher = Arc::new(MemoryAssetFetcher::new());
        let objects = Arc::new(MemoryObjectStore::new("https://durable.test/frames"));
        let escalator = escalator.map(Arc::new);

        let collaborators = Collaborators {
            records: records.clone(),
            queue: queue.clone(),
            violations: violations.clone(),
            escalator: escalator
                .clone()
                .map(|e| e as Arc<dyn Escalator>),
            fetcher: fetcher.clone(),
            objects: objects.clone(),
        };

        Self {
            records,
            queue,
            violations,
            fetcher,
            objects,
            escalator,
            handler: IngestionWebhookHandler::new(collaborators, nudges, config),
        }
    }

    /// Insert the record under test.
    pub async fn seed(&self, record: ProcessingRecord) {
        self.records.insert(key(), record).await;
    }

    pub async fn record(&self) -> ProcessingRecord {
        self.records.get(&key()).await.expect("record exists")
    }

    /// Make the provider serve every URL as a small JPEG tagged with its
    /// position.
    pub async fn serve(&self, urls: &[String]) {
        for (i, url) in urls.iter().enumerate() {
            self.fetcher.insert(url, jpeg(i), None).await;
        }
    }
}

/// JPEG magic followed by the decimal index.
pub fn jpeg(index: usize) -> Vec<u8> {
    let mut data = vec![0xFF, 0xD8, 0xFF];
    data.extend_from_slice(index.to_string().as_bytes());
    data
}

pub fn provider_urls(count: usize) -> Vec<String> {
    (0..count)
        .map(|i| format!("https://provider.test/out/frame-{:05}.jpg", i))
        .collect()
}

pub fn ready_record() -> ProcessingRecord {
    ProcessingRecord {
        transcript: Some("Welcome to the course".to_string()),
        ..ProcessingRecord::awaiting_webhook()
    }
}

fn metadata() -> serde_json::Value {
    json!({
        "courseId": COURSE_ID,
        "recordId": RECORD_ID,
        "tableName": "course_processing",
        "step": "extract_frames"
    })
}

pub fn succeeded(urls: &[String]) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "pred-ok",
        "status": "succeeded",
        "output": urls,
        "input": { "webhook_metadata": metadata() }
    }))
    .unwrap()
}

pub fn failed(status: &str, error: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "pred-bad",
        "status": status,
        "error": error,
        "input": { "webhook_metadata": metadata() }
    }))
    .unwrap()
}

pub fn progress(status: &str) -> Vec<u8> {
    serde_json::to_vec(&json!({
        "id": "pred-run",
        "status": status,
        "input": { "webhook_metadata": metadata() }
    }))
    .unwrap()
}

/// In-memory log sink for asserting on emitted events.
#[derive(Clone, Default)]
pub struct LogCapture(Arc<Mutex<Vec<u8>>>);

impl LogCapture {
    pub fn contents(&self) -> String {
        String::from_utf8_lossy(&self.0.lock().unwrap()).into_owned()
    }

    /// Install as the thread's default subscriber until the guard drops.
    pub fn install(&self) -> tracing::subscriber::DefaultGuard {
        let sink = self.clone();
        let subscriber = tracing_subscriber::fmt()
            .with_ansi(false)
            .with_max_level(tracing::Level::DEBUG)
            .with_writer(move || sink.clone())
            .finish();
        tracing::subscriber::set_default(subscriber)
    }
}

impl Write for LogCapture {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        self.0.lock().unwrap().extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> std::io::Result<()> {
        Ok(())
    }
}
