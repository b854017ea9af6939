//! Chunked upload state machine
//!
//! The caller owns the loop: each [`UploadEngine::process_next_chunk`] call
//! resolves at most one attempt at the lowest unfinished chunk, so a chunk is
//! never attempted while a lower-numbered one is unresolved. Suspension
//! points are the simulated transfer delay and the backoff before a retry.
//!
//! ```text
//! idle -> uploading <-> retrying
//!            |  ^          |
//!            v  |          v
//!          paused        failed
//!            |
//!            v
//!        completed
//! ```

use crate::chunks::{ChunkManager, ChunkState};
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::events::{EventCallback, UploadEvent, UploadEventKind};
use crate::faults::{FailureConfig, FailureScenarioEngine, Fault, ManualFault};
use crate::session::{CheckpointStatus, CheckpointStore, PersistedCheckpoint, SessionPersistence};
use chrono::{DateTime, Utc};
use framewise_common::time::now_millis;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Session-level status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Idle,
    Uploading,
    Retrying,
    Paused,
    Completed,
    Failed,
}

impl SessionStatus {
    /// Transition table for upload sessions.
    pub fn can_transition_to(self, next: SessionStatus) -> bool {
        use SessionStatus::*;
        matches!(
            (self, next),
            (Idle, Uploading)
                | (Uploading, Retrying)
                | (Uploading, Paused)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Retrying, Uploading)
                | (Retrying, Paused)
                | (Retrying, Failed)
                | (Paused, Uploading)
        )
    }

    /// Whether `process_next_chunk` may advance the session
    pub fn is_active(self) -> bool {
        matches!(self, SessionStatus::Uploading | SessionStatus::Retrying)
    }

    pub fn as_str(&self) -> &str {
        match self {
            SessionStatus::Idle => "idle",
            SessionStatus::Uploading => "uploading",
            SessionStatus::Retrying => "retrying",
            SessionStatus::Paused => "paused",
            SessionStatus::Completed => "completed",
            SessionStatus::Failed => "failed",
        }
    }
}

/// In-memory view of the running upload
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadSession {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    pub status: SessionStatus,
    pub started_at: DateTime<Utc>,
    pub can_resume: bool,
    pub bytes_uploaded: u64,
    pub current_retry_attempt: u32,
    pub total_retries: u32,
}

impl UploadSession {
    fn transition(&mut self, next: SessionStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(UploadError::transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    pub fn progress_percent(&self) -> f64 {
        if self.total_chunks == 0 {
            return 100.0;
        }
        f64::from(self.uploaded_chunks) / f64::from(self.total_chunks) * 100.0
    }
}

/// File selected for upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileDescriptor {
    pub name: String,
    pub size: u64,
}

impl FileDescriptor {
    pub fn new(name: impl Into<String>, size: u64) -> Self {
        Self {
            name: name.into(),
            size,
        }
    }

    /// Describe a regular file on disk.
    pub fn from_path(path: &Path) -> Result<Self> {
        let display = path.display().to_string();
        let metadata = std::fs::metadata(path)
            .map_err(|e| UploadError::InvalidFile(display.clone(), e.to_string()))?;
        if !metadata.is_file() {
            return Err(UploadError::InvalidFile(
                display,
                "not a regular file".to_string(),
            ));
        }
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or(display);
        Ok(Self::new(name, metadata.len()))
    }
}

/// Result of one `process_next_chunk` call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// Nothing to do: no session, or the session is not active
    Idle,
    /// Chunk acknowledged
    Sent(u32),
    /// Chunk failed and will be retried on a later call
    Retrying(u32),
    /// Outage at this chunk; waiting for `restore_network`
    NetworkLost(u32),
    /// Chunk exhausted its retries; the session is failed but resumable
    Failed(u32),
    /// Simulated refresh; in-memory state is gone
    Refreshed,
    /// Every chunk is acknowledged
    Completed,
}

/// Chunked upload engine over a checkpoint store
pub struct UploadEngine<S> {
    config: UploadConfig,
    chunk_manager: ChunkManager,
    faults: FailureScenarioEngine,
    persistence: SessionPersistence<S>,
    session: Option<UploadSession>,
    chunks: Vec<ChunkState>,
    network_paused: bool,
    rng: StdRng,
    on_event: EventCallback,
}

impl<S: CheckpointStore> UploadEngine<S> {
    pub fn new(
        config: UploadConfig,
        failure_config: FailureConfig,
        store: S,
        on_event: EventCallback,
    ) -> Result<Self> {
        config.validate()?;

        let chunk_manager = ChunkManager::new(
            config.chunk_size,
            config.max_retries,
            config.base_backoff(),
            config.max_backoff(),
        );
        let faults = FailureScenarioEngine::new(failure_config, config.latency_spike_chance);
        let persistence = SessionPersistence::new(store, config.checkpoint_slot.clone());
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };

        Ok(Self {
            config,
            chunk_manager,
            faults,
            persistence,
            session: None,
            chunks: Vec::new(),
            network_paused: false,
            rng,
            on_event,
        })
    }

    pub fn session(&self) -> Option<&UploadSession> {
        self.session.as_ref()
    }

    pub fn chunks(&self) -> &[ChunkState] {
        &self.chunks
    }

    pub fn config(&self) -> &UploadConfig {
        &self.config
    }

    pub fn is_network_down(&self) -> bool {
        self.faults.is_network_down()
    }

    /// The live checkpoint, if any.
    pub fn persisted_session(&self) -> Option<PersistedCheckpoint> {
        match self.persistence.load() {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(error = %e, "Failed to read checkpoint");
                None
            }
        }
    }

    fn emit(&self, kind: UploadEventKind) {
        debug!(event = kind.name(), "Upload event");
        (self.on_event)(UploadEvent::now(kind));
    }

    fn completed_set(&self) -> BTreeSet<u32> {
        self.chunks
            .iter()
            .filter(|c| c.is_completed())
            .map(|c| c.chunk_number)
            .collect()
    }

    fn set_status(&mut self, next: SessionStatus) {
        if let Some(session) = self.session.as_mut() {
            if let Err(e) = session.transition(next) {
                warn!(error = %e, "Ignoring session transition");
            }
        }
    }

    fn mark_checkpoint(&self, status: CheckpointStatus) {
        if let Err(e) = self.persistence.mark_status(status) {
            warn!(error = %e, status = status.as_str(), "Failed to update checkpoint status");
        }
    }

    /// Begin a new upload, replacing any existing checkpoint.
    pub fn start_upload(&mut self, file: FileDescriptor) -> Option<&UploadSession> {
        self.faults.reset();
        self.network_paused = false;
        self.chunks = self.chunk_manager.chunks_for(file.size);

        let session = UploadSession {
            session_id: Uuid::new_v4().to_string(),
            file_name: file.name,
            file_size: file.size,
            total_chunks: self.chunks.len() as u32,
            uploaded_chunks: 0,
            status: SessionStatus::Uploading,
            started_at: Utc::now(),
            can_resume: true,
            bytes_uploaded: 0,
            current_retry_attempt: 0,
            total_retries: 0,
        };

        let checkpoint = PersistedCheckpoint {
            session_id: session.session_id.clone(),
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            total_chunks: session.total_chunks,
            uploaded_chunks: 0,
            checkpoint_at: now_millis(),
            status: CheckpointStatus::Uploading,
            completed_chunks: BTreeSet::new(),
        };
        if let Err(e) = self.persistence.save(&checkpoint) {
            warn!(error = %e, "Failed to write initial checkpoint");
        }

        info!(
            session_id = %session.session_id,
            file = %session.file_name,
            size = session.file_size,
            chunks = session.total_chunks,
            "Upload started"
        );
        self.emit(UploadEventKind::UploadStarted {
            session_id: session.session_id.clone(),
            file_name: session.file_name.clone(),
            file_size: session.file_size,
            total_chunks: session.total_chunks,
        });

        self.session = Some(session);
        self.session.as_ref()
    }

    /// Rebuild the session from the last valid checkpoint.
    ///
    /// Returns `false` when there is nothing to resume. A checkpoint that
    /// does not match its own file layout is discarded.
    pub fn resume_upload(&mut self) -> bool {
        let Some(checkpoint) = self.persisted_session() else {
            return false;
        };

        let chunks = match self.chunk_manager.restore_from_checkpoint(
            checkpoint.total_chunks,
            &checkpoint.completed_chunks,
            checkpoint.file_size,
        ) {
            Ok(chunks) => chunks,
            Err(e) => {
                warn!(session_id = %checkpoint.session_id, error = %e, "Discarding checkpoint");
                if let Err(e) = self.persistence.clear() {
                    warn!(error = %e, "Failed to clear checkpoint");
                }
                self.emit(UploadEventKind::CheckpointDiscarded {
                    reason: e.to_string(),
                });
                return false;
            }
        };

        let completed: Vec<&ChunkState> = chunks.iter().filter(|c| c.is_completed()).collect();
        let uploaded_chunks = completed.len() as u32;
        let bytes_uploaded = completed.iter().map(|c| c.size).sum();

        let session = UploadSession {
            session_id: checkpoint.session_id.clone(),
            file_name: checkpoint.file_name.clone(),
            file_size: checkpoint.file_size,
            total_chunks: checkpoint.total_chunks,
            uploaded_chunks,
            status: SessionStatus::Uploading,
            started_at: Utc::now(),
            can_resume: true,
            bytes_uploaded,
            current_retry_attempt: 0,
            total_retries: 0,
        };

        self.chunks = chunks;
        self.network_paused = false;
        self.session = Some(session);
        self.mark_checkpoint(CheckpointStatus::Uploading);

        info!(
            session_id = %checkpoint.session_id,
            uploaded = uploaded_chunks,
            total = checkpoint.total_chunks,
            "Upload resumed from checkpoint"
        );
        self.emit(UploadEventKind::UploadResumed {
            session_id: checkpoint.session_id,
            uploaded_chunks,
            total_chunks: checkpoint.total_chunks,
        });
        true
    }

    /// Resolve at most one attempt at the next unfinished chunk.
    pub async fn process_next_chunk(&mut self) -> StepOutcome {
        let Some(session) = self.session.as_ref() else {
            return StepOutcome::Idle;
        };
        if !session.status.is_active() {
            return StepOutcome::Idle;
        }
        let total_chunks = session.total_chunks;

        let Some(index) = self.chunks.iter().position(|c| !c.is_completed()) else {
            return self.finish();
        };
        if !self.chunks[index].status.is_awaiting_attempt() {
            warn!(
                chunk = self.chunks[index].chunk_number,
                status = self.chunks[index].status.as_str(),
                "Chunk is not ready for an attempt"
            );
            return StepOutcome::Idle;
        }
        let chunk_number = self.chunks[index].chunk_number;

        let decision = self.faults.evaluate(chunk_number, total_chunks, &mut self.rng);

        match decision.fault {
            Some(Fault::NetworkDrop) => self.network_lost(chunk_number),
            Some(Fault::BrowserRefresh) => self.browser_refresh(),
            Some(Fault::ChunkFailure(error)) => {
                if !self.begin_attempt(index) {
                    return StepOutcome::Idle;
                }
                self.apply_spike(chunk_number, decision.latency_spike).await;
                self.chunk_failed(index, error).await
            }
            None => {
                if !self.begin_attempt(index) {
                    return StepOutcome::Idle;
                }
                self.apply_spike(chunk_number, decision.latency_spike).await;
                tokio::time::sleep(self.transfer_time()).await;
                self.chunk_sent(index)
            }
        }
    }

    fn begin_attempt(&mut self, index: usize) -> bool {
        if self.session.as_ref().map(|s| s.status) == Some(SessionStatus::Retrying) {
            self.set_status(SessionStatus::Uploading);
        }
        match self.chunks[index].begin() {
            Ok(()) => true,
            Err(e) => {
                warn!(error = %e, "Cannot start chunk attempt");
                false
            }
        }
    }

    /// `base_chunk_time ± 50%`
    fn transfer_time(&mut self) -> Duration {
        let factor = self.rng.random_range(0.5..=1.5);
        Duration::from_millis(self.config.base_chunk_time_ms).mul_f64(factor)
    }

    async fn apply_spike(&self, chunk_number: u32, spike: Duration) {
        if spike.is_zero() {
            return;
        }
        self.emit(UploadEventKind::LatencySpike {
            chunk_number,
            delay_ms: spike.as_millis() as u64,
        });
        tokio::time::sleep(spike).await;
    }

    fn network_lost(&mut self, chunk_number: u32) -> StepOutcome {
        self.set_status(SessionStatus::Paused);
        self.network_paused = true;
        self.mark_checkpoint(CheckpointStatus::Paused);
        warn!(chunk = chunk_number, "Network lost");
        self.emit(UploadEventKind::NetworkLost { chunk_number });
        StepOutcome::NetworkLost(chunk_number)
    }

    fn browser_refresh(&mut self) -> StepOutcome {
        let session_id = self
            .session
            .take()
            .map(|s| s.session_id)
            .unwrap_or_default();
        self.chunks.clear();
        self.network_paused = false;
        self.mark_checkpoint(CheckpointStatus::Paused);
        info!(session_id = %session_id, "Simulated browser refresh, in-memory state dropped");
        self.emit(UploadEventKind::BrowserRefresh { session_id });
        StepOutcome::Refreshed
    }

    async fn chunk_failed(&mut self, index: usize, error: String) -> StepOutcome {
        let chunk_number = self.chunks[index].chunk_number;
        if let Err(e) = self.chunks[index].fail(error.clone()) {
            warn!(error = %e, "Cannot mark chunk failed");
            return StepOutcome::Idle;
        }
        let retry_count = self.chunks[index].retry_count;
        warn!(chunk = chunk_number, retry_count, error = %error, "Chunk failed");
        self.emit(UploadEventKind::ChunkFailed {
            chunk_number,
            retry_count,
            error: error.clone(),
        });

        if !self.chunk_manager.should_retry(&self.chunks[index]) {
            self.set_status(SessionStatus::Failed);
            if let Some(session) = self.session.as_mut() {
                session.can_resume = true;
            }
            self.mark_checkpoint(CheckpointStatus::Paused);
            warn!(chunk = chunk_number, "Retries exhausted, upload failed");
            self.emit(UploadEventKind::UploadFailed {
                chunk_number,
                error,
                can_resume: true,
            });
            return StepOutcome::Failed(chunk_number);
        }

        let delay = self.chunk_manager.backoff(retry_count);
        self.emit(UploadEventKind::RetryScheduled {
            chunk_number,
            attempt: retry_count + 1,
            delay_ms: delay.as_millis() as u64,
        });
        self.set_status(SessionStatus::Retrying);

        tokio::time::sleep(delay).await;

        if let Err(e) = self.chunks[index].schedule_retry() {
            warn!(error = %e, "Cannot schedule retry");
            return StepOutcome::Idle;
        }
        let attempt = self.chunks[index].retry_count;
        self.emit(UploadEventKind::RetryAttempted {
            chunk_number,
            attempt,
        });
        if let Some(session) = self.session.as_mut() {
            session.current_retry_attempt = attempt;
            session.total_retries += 1;
        }
        StepOutcome::Retrying(chunk_number)
    }

    fn chunk_sent(&mut self, index: usize) -> StepOutcome {
        if let Err(e) = self.chunks[index].complete() {
            warn!(error = %e, "Cannot mark chunk completed");
            return StepOutcome::Idle;
        }
        let chunk_number = self.chunks[index].chunk_number;
        let size = self.chunks[index].size;
        let completed = self.completed_set();

        let Some(session) = self.session.as_mut() else {
            return StepOutcome::Idle;
        };
        session.uploaded_chunks = completed.len() as u32;
        session.bytes_uploaded += size;
        session.current_retry_attempt = 0;
        let uploaded_chunks = session.uploaded_chunks;
        let total_chunks = session.total_chunks;
        let bytes_uploaded = session.bytes_uploaded;

        if let Err(e) = self.persistence.update_checkpoint(uploaded_chunks, &completed) {
            warn!(chunk = chunk_number, error = %e, "Checkpoint write failed");
        }

        debug!(chunk = chunk_number, uploaded = uploaded_chunks, total = total_chunks, "Chunk sent");
        self.emit(UploadEventKind::ChunkSent {
            chunk_number,
            size,
            uploaded_chunks,
            total_chunks,
            bytes_uploaded,
        });
        StepOutcome::Sent(chunk_number)
    }

    fn finish(&mut self) -> StepOutcome {
        self.set_status(SessionStatus::Completed);
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "Failed to clear checkpoint after completion");
        }
        let Some(session) = self.session.as_ref() else {
            return StepOutcome::Idle;
        };
        info!(
            session_id = %session.session_id,
            chunks = session.total_chunks,
            retries = session.total_retries,
            "Upload completed"
        );
        self.emit(UploadEventKind::UploadCompleted {
            session_id: session.session_id.clone(),
            total_chunks: session.total_chunks,
            total_retries: session.total_retries,
        });
        StepOutcome::Completed
    }

    /// Stop advancing. The checkpoint stays resumable.
    pub fn pause_upload(&mut self) -> bool {
        let Some(session) = self.session.as_ref() else {
            return false;
        };
        if !session.status.is_active() {
            return false;
        }
        self.set_status(SessionStatus::Paused);
        self.network_paused = false;
        self.mark_checkpoint(CheckpointStatus::Paused);

        let (uploaded_chunks, total_chunks) = self
            .session
            .as_ref()
            .map(|s| (s.uploaded_chunks, s.total_chunks))
            .unwrap_or_default();
        info!(uploaded = uploaded_chunks, total = total_chunks, "Upload paused");
        self.emit(UploadEventKind::UploadPaused {
            uploaded_chunks,
            total_chunks,
        });
        true
    }

    /// Abort and discard the checkpoint.
    pub fn cancel_upload(&mut self) -> bool {
        if let Err(e) = self.persistence.clear() {
            warn!(error = %e, "Failed to clear checkpoint on cancel");
        }
        self.chunks.clear();
        self.network_paused = false;
        let Some(session) = self.session.take() else {
            return false;
        };
        info!(session_id = %session.session_id, "Upload cancelled");
        self.emit(UploadEventKind::UploadCancelled {
            session_id: session.session_id,
        });
        true
    }

    /// Clear an outage and continue from the chunk where it began.
    pub fn restore_network(&mut self) {
        self.faults.restore_network();
        info!("Network restored");
        self.emit(UploadEventKind::NetworkRestored);

        if self.network_paused {
            self.network_paused = false;
            self.set_status(SessionStatus::Uploading);
            self.mark_checkpoint(CheckpointStatus::Uploading);
        }
    }

    pub fn update_failure_config(&mut self, config: FailureConfig) {
        self.faults.update_config(config);
    }

    pub fn trigger_manual_failure(&mut self, fault: ManualFault) {
        debug!(?fault, "Manual fault queued");
        self.faults.trigger(fault);
    }
}
