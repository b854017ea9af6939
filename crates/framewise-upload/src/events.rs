//! Typed upload events
//!
//! The engine reports every runtime outcome through these events; no error
//! crosses the engine boundary during an upload.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Callback receiving every event emitted by an engine
pub type EventCallback = Arc<dyn Fn(UploadEvent) + Send + Sync>;

/// An event with its emission time
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct UploadEvent {
    pub timestamp: DateTime<Utc>,
    #[serde(flatten)]
    pub kind: UploadEventKind,
}

impl UploadEvent {
    pub fn now(kind: UploadEventKind) -> Self {
        Self {
            timestamp: Utc::now(),
            kind,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "type",
    content = "data",
    rename_all = "SCREAMING_SNAKE_CASE",
    rename_all_fields = "camelCase"
)]
pub enum UploadEventKind {
    UploadStarted {
        session_id: String,
        file_name: String,
        file_size: u64,
        total_chunks: u32,
    },
    ChunkSent {
        chunk_number: u32,
        size: u64,
        uploaded_chunks: u32,
        total_chunks: u32,
        bytes_uploaded: u64,
    },
    ChunkFailed {
        chunk_number: u32,
        retry_count: u32,
        error: String,
    },
    RetryScheduled {
        chunk_number: u32,
        attempt: u32,
        delay_ms: u64,
    },
    RetryAttempted {
        chunk_number: u32,
        attempt: u32,
    },
    LatencySpike {
        chunk_number: u32,
        delay_ms: u64,
    },
    NetworkLost {
        chunk_number: u32,
    },
    NetworkRestored,
    UploadPaused {
        uploaded_chunks: u32,
        total_chunks: u32,
    },
    UploadResumed {
        session_id: String,
        uploaded_chunks: u32,
        total_chunks: u32,
    },
    UploadCancelled {
        session_id: String,
    },
    UploadCompleted {
        session_id: String,
        total_chunks: u32,
        total_retries: u32,
    },
    UploadFailed {
        chunk_number: u32,
        error: String,
        can_resume: bool,
    },
    BrowserRefresh {
        session_id: String,
    },
    CheckpointDiscarded {
        reason: String,
    },
}

impl UploadEventKind {
    /// Wire name of the event type
    pub fn name(&self) -> &'static str {
        match self {
            UploadEventKind::UploadStarted { .. } => "UPLOAD_STARTED",
            UploadEventKind::ChunkSent { .. } => "CHUNK_SENT",
            UploadEventKind::ChunkFailed { .. } => "CHUNK_FAILED",
            UploadEventKind::RetryScheduled { .. } => "RETRY_SCHEDULED",
            UploadEventKind::RetryAttempted { .. } => "RETRY_ATTEMPTED",
            UploadEventKind::LatencySpike { .. } => "LATENCY_SPIKE",
            UploadEventKind::NetworkLost { .. } => "NETWORK_LOST",
            UploadEventKind::NetworkRestored => "NETWORK_RESTORED",
            UploadEventKind::UploadPaused { .. } => "UPLOAD_PAUSED",
            UploadEventKind::UploadResumed { .. } => "UPLOAD_RESUMED",
            UploadEventKind::UploadCancelled { .. } => "UPLOAD_CANCELLED",
            UploadEventKind::UploadCompleted { .. } => "UPLOAD_COMPLETED",
            UploadEventKind::UploadFailed { .. } => "UPLOAD_FAILED",
            UploadEventKind::BrowserRefresh { .. } => "BROWSER_REFRESH",
            UploadEventKind::CheckpointDiscarded { .. } => "CHECKPOINT_DISCARDED",
        }
    }
}
