//! In-process collaborators for tests and local runs
//!
//! Each type honours the same conditional-update contract as its Postgres,
//! S3 or HTTP counterpart and adds a few hooks for injecting failures.

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;
use chrono::Utc;
use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use tokio::sync::Mutex;
use uuid::Uuid;

use super::escalation::{EscalationRequest, Escalator};
use super::persistor::{AssetFetcher, FetchedAsset, ObjectStore};
use super::queue::{NewJob, QueueStatus, WorkQueue};
use super::records::RecordStore;
use super::types::{FrameUpdate, PipelineStep, ProcessingRecord, RecordKey, RecordStatus};
use super::violations::{Violation, ViolationLog};

// ============================================================================
// Records
// ============================================================================

#[derive(Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<RecordKey, ProcessingRecord>>,
    frame_writes: AtomicUsize,
    failing_writes: AtomicUsize,
    watchdog: Mutex<Option<(RecordKey, RecordStatus)>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, key: RecordKey, record: ProcessingRecord) {
        self.records.lock().await.insert(key, record);
    }

    pub async fn get(&self, key: &RecordKey) -> Option<ProcessingRecord> {
        self.records.lock().await.get(key).cloned()
    }

    pub async fn set_transcript(&self, key: &RecordKey, transcript: &str) {
        if let Some(record) = self.records.lock().await.get_mut(key) {
            record.transcript = Some(transcript.to_string());
        }
    }

    /// Frame writes (full or minimal) that changed a record.
    pub fn frame_write_count(&self) -> usize {
        self.frame_writes.load(Ordering::SeqCst)
    }

    /// Make the next `n` frame writes return an error.
    pub fn fail_next_frame_writes(&self, n: usize) {
        self.failing_writes.store(n, Ordering::SeqCst);
    }

    /// Set `status` on `key` right before the next frame write, the way a
    /// watchdog racing the webhook would.
    pub async fn schedule_watchdog(&self, key: RecordKey, status: RecordStatus) {
        *self.watchdog.lock().await = Some((key, status));
    }

    async fn fire_watchdog(&self, records: &mut HashMap<RecordKey, ProcessingRecord>) {
        if let Some((key, status)) = self.watchdog.lock().await.take() {
            if let Some(record) = records.get_mut(&key) {
                record.status = status;
            }
        }
    }

    fn take_injected_failure(&self) -> bool {
        self.failing_writes
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn load(&self, key: &RecordKey) -> Result<Option<ProcessingRecord>> {
        Ok(self.get(key).await)
    }

    async fn write_frames(
        &self,
        key: &RecordKey,
        update: &FrameUpdate,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let mut records = self.records.lock().await;
        self.fire_watchdog(&mut records).await;
        if self.take_injected_failure() {
            bail!("injected write failure for {}", key);
        }

        let Some(record) = records.get_mut(key) else {
            return Ok(0);
        };
        if !expected.contains(&record.status) || record.frame_urls.len() > update.frame_urls.len() {
            return Ok(0);
        }

        record.frame_urls = update.frame_urls.clone();
        record.total_frames = update.total_frames;
        record.progress = update.progress;
        record.progress_step = Some(update.progress_step.clone());
        record.status = update.status;
        record.constraint_status = Some(update.constraint_status);
        self.frame_writes.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn write_frames_minimal(
        &self,
        key: &RecordKey,
        frame_urls: &[String],
        status: RecordStatus,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let mut records = self.records.lock().await;
        if self.take_injected_failure() {
            bail!("injected minimal write failure for {}", key);
        }

        let Some(record) = records.get_mut(key) else {
            return Ok(0);
        };
        if !expected.contains(&record.status) || record.frame_urls.len() > frame_urls.len() {
            return Ok(0);
        }

        record.frame_urls = frame_urls.to_vec();
        record.total_frames = frame_urls.len() as i32;
        record.status = status;
        self.frame_writes.fetch_add(1, Ordering::SeqCst);
        Ok(1)
    }

    async fn transition(
        &self,
        key: &RecordKey,
        expected: &[RecordStatus],
        to: RecordStatus,
    ) -> Result<u64> {
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(record) if expected.contains(&record.status) => {
                record.status = to;
                Ok(1)
            },
            _ => Ok(0),
        }
    }

    async fn touch_heartbeat(
        &self,
        key: &RecordKey,
        progress_step: &str,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let mut records = self.records.lock().await;
        match records.get_mut(key) {
            Some(record) if expected.contains(&record.status) => {
                record.last_heartbeat_at = Some(Utc::now());
                record.progress_step = Some(progress_step.to_string());
                Ok(1)
            },
            _ => Ok(0),
        }
    }
}

// ============================================================================
// Work queue
// ============================================================================

#[derive(Debug, Clone, PartialEq)]
pub struct QueueJob {
    pub id: Uuid,
    pub entity_id: String,
    pub key: RecordKey,
    pub step: PipelineStep,
    pub status: QueueStatus,
    pub attempts: u32,
    pub payload: serde_json::Value,
    pub error: Option<String>,
}

#[derive(Default)]
pub struct MemoryWorkQueue {
    jobs: Mutex<Vec<QueueJob>>,
}

impl MemoryWorkQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a row directly, e.g. the in-flight extraction job.
    pub async fn seed(
        &self,
        entity_id: &str,
        key: RecordKey,
        step: PipelineStep,
        status: QueueStatus,
        attempts: u32,
    ) -> Uuid {
        let id = Uuid::new_v4();
        self.jobs.lock().await.push(QueueJob {
            id,
            entity_id: entity_id.to_string(),
            key,
            step,
            status,
            attempts,
            payload: serde_json::Value::Null,
            error: None,
        });
        id
    }

    pub async fn jobs(&self) -> Vec<QueueJob> {
        self.jobs.lock().await.clone()
    }

    async fn set_in_flight(
        &self,
        key: &RecordKey,
        step: PipelineStep,
        status: QueueStatus,
        error: Option<&str>,
    ) -> u64 {
        let mut jobs = self.jobs.lock().await;
        let mut changed = 0;
        for job in jobs.iter_mut().filter(|j| {
            j.key == *key && j.step == step && QueueStatus::IN_FLIGHT.contains(&j.status)
        }) {
            job.status = status;
            job.error = error.map(str::to_string);
            changed += 1;
        }
        changed
    }
}

#[async_trait]
impl WorkQueue for MemoryWorkQueue {
    async fn complete(&self, key: &RecordKey, step: PipelineStep) -> Result<u64> {
        Ok(self.set_in_flight(key, step, QueueStatus::Completed, None).await)
    }

    async fn fail(&self, key: &RecordKey, step: PipelineStep, error: &str) -> Result<u64> {
        Ok(self
            .set_in_flight(key, step, QueueStatus::Failed, Some(error))
            .await)
    }

    async fn enqueue(&self, job: &NewJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        self.jobs.lock().await.push(QueueJob {
            id,
            entity_id: job.entity_id.clone(),
            key: job.key.clone(),
            step: job.step,
            status: QueueStatus::Pending,
            attempts: 0,
            payload: job.payload.clone(),
            error: None,
        });
        Ok(id)
    }

    async fn attempt_count(&self, key: &RecordKey, step: PipelineStep) -> Result<u32> {
        Ok(self
            .jobs
            .lock()
            .await
            .iter()
            .rev()
            .find(|j| j.key == *key && j.step == step)
            .map_or(0, |j| j.attempts))
    }
}

// ============================================================================
// Violations
// ============================================================================

#[derive(Default)]
pub struct MemoryViolationLog {
    entries: Mutex<Vec<Violation>>,
}

impl MemoryViolationLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn entries(&self) -> Vec<Violation> {
        self.entries.lock().await.clone()
    }
}

#[async_trait]
impl ViolationLog for MemoryViolationLog {
    async fn record(&self, violation: &Violation) -> Result<()> {
        self.entries.lock().await.push(violation.clone());
        Ok(())
    }
}

// ============================================================================
// Assets and objects
// ============================================================================

/// Serves preloaded assets; unknown URLs fail like an expired link.
#[derive(Default)]
pub struct MemoryAssetFetcher {
    assets: Mutex<HashMap<String, FetchedAsset>>,
}

impl MemoryAssetFetcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, url: &str, data: Vec<u8>, content_type: Option<&str>) {
        self.assets.lock().await.insert(
            url.to_string(),
            FetchedAsset {
                data,
                content_type: content_type.map(str::to_string),
            },
        );
    }
}

#[async_trait]
impl AssetFetcher for MemoryAssetFetcher {
    async fn fetch(&self, url: &str) -> Result<FetchedAsset> {
        self.assets
            .lock()
            .await
            .get(url)
            .cloned()
            .ok_or_else(|| anyhow!("asset {} expired", url))
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoredObject {
    pub data: Vec<u8>,
    pub content_type: String,
}

pub struct MemoryObjectStore {
    base_url: String,
    objects: Mutex<BTreeMap<String, StoredObject>>,
    failing: AtomicBool,
}

impl MemoryObjectStore {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            objects: Mutex::new(BTreeMap::new()),
            failing: AtomicBool::new(false),
        }
    }

    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::SeqCst);
    }

    pub async fn len(&self) -> usize {
        self.objects.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.objects.lock().await.is_empty()
    }

    pub async fn get(&self, key: &str) -> Option<StoredObject> {
        self.objects.lock().await.get(key).cloned()
    }
}

#[async_trait]
impl ObjectStore for MemoryObjectStore {
    async fn put(&self, key: &str, data: Vec<u8>, content_type: &str) -> Result<String> {
        if self.failing.load(Ordering::SeqCst) {
            bail!("object store unavailable");
        }
        self.objects.lock().await.insert(
            key.to_string(),
            StoredObject {
                data,
                content_type: content_type.to_string(),
            },
        );
        Ok(format!("{}/{}", self.base_url.trim_end_matches('/'), key))
    }
}

// ============================================================================
// Escalation
// ============================================================================

#[derive(Default)]
pub struct RecordingEscalator {
    requests: Mutex<Vec<EscalationRequest>>,
    failing: AtomicBool,
}

impl RecordingEscalator {
    pub fn new() -> Self {
        Self::default()
    }

    /// An escalator whose every call errors after being recorded.
    pub fn failing() -> Self {
        Self {
            requests: Mutex::new(Vec::new()),
            failing: AtomicBool::new(true),
        }
    }

    pub async fn requests(&self) -> Vec<EscalationRequest> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Escalator for RecordingEscalator {
    async fn escalate(&self, request: &EscalationRequest) -> Result<()> {
        self.requests.lock().await.push(request.clone());
        if self.failing.load(Ordering::SeqCst) {
            bail!("escalation service unavailable");
        }
        Ok(())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::types::{ConstraintStatus, RecordTable};

    fn key() -> RecordKey {
        RecordKey::new(RecordTable::CourseProcessing, "rec-1")
    }

    fn update(urls: usize) -> FrameUpdate {
        FrameUpdate {
            frame_urls: (0..urls).map(|i| format!("u{}", i)).collect(),
            total_frames: urls as i32,
            progress: 40,
            progress_step: "extract_frames".to_string(),
            status: RecordStatus::Completed,
            constraint_status: ConstraintStatus::Satisfied,
        }
    }

    #[tokio::test]
    async fn test_write_respects_expected_status() {
        let store = MemoryRecordStore::new();
        let mut record = ProcessingRecord::awaiting_webhook();
        record.status = RecordStatus::Failed;
        store.insert(key(), record).await;

        let rows = store
            .write_frames(&key(), &update(3), &RecordStatus::WRITABLE)
            .await
            .unwrap();
        assert_eq!(rows, 0);
        assert_eq!(store.frame_write_count(), 0);
    }

    #[tokio::test]
    async fn test_write_never_shrinks_frames() {
        let store = MemoryRecordStore::new();
        store.insert(key(), ProcessingRecord::awaiting_webhook()).await;
        let expected = [RecordStatus::AwaitingWebhook, RecordStatus::Completed];

        assert_eq!(store.write_frames(&key(), &update(5), &expected).await.unwrap(), 1);
        assert_eq!(store.write_frames(&key(), &update(4), &expected).await.unwrap(), 0);
        assert_eq!(store.get(&key()).await.unwrap().frame_urls.len(), 5);
    }

    #[tokio::test]
    async fn test_injected_failures_are_consumed() {
        let store = MemoryRecordStore::new();
        store.insert(key(), ProcessingRecord::awaiting_webhook()).await;
        store.fail_next_frame_writes(1);

        assert!(store
            .write_frames(&key(), &update(2), &RecordStatus::WRITABLE)
            .await
            .is_err());
        assert_eq!(
            store
                .write_frames(&key(), &update(2), &RecordStatus::WRITABLE)
                .await
                .unwrap(),
            1
        );
    }

    #[tokio::test]
    async fn test_queue_only_touches_in_flight_rows() {
        let queue = MemoryWorkQueue::new();
        queue
            .seed("course", key(), PipelineStep::ExtractFrames, QueueStatus::Failed, 1)
            .await;

        assert_eq!(queue.complete(&key(), PipelineStep::ExtractFrames).await.unwrap(), 0);

        queue
            .seed("course", key(), PipelineStep::ExtractFrames, QueueStatus::Processing, 2)
            .await;
        assert_eq!(queue.complete(&key(), PipelineStep::ExtractFrames).await.unwrap(), 1);
        assert_eq!(queue.attempt_count(&key(), PipelineStep::ExtractFrames).await.unwrap(), 2);
    }
}
