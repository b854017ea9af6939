//! Chunk partitioning, per-chunk state and retry backoff
//!
//! A file is split into 1-based, contiguous chunks. Each chunk walks the
//! transition graph
//!
//! ```text
//! pending -> uploading -> completed
//!                      -> failed -> retrying -> uploading -> ...
//! ```
//!
//! and a completed chunk never changes again.

use crate::error::{Result, UploadError};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::time::Duration;

/// Per-chunk status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkStatus {
    Pending,
    Uploading,
    Completed,
    Failed,
    Retrying,
}

impl ChunkStatus {
    /// Transition table for chunk states.
    pub fn can_transition_to(self, next: ChunkStatus) -> bool {
        use ChunkStatus::*;
        matches!(
            (self, next),
            (Pending, Uploading)
                | (Uploading, Completed)
                | (Uploading, Failed)
                | (Failed, Retrying)
                | (Retrying, Uploading)
        )
    }

    /// Chunks in these states are still waiting for an attempt.
    pub fn is_awaiting_attempt(self) -> bool {
        matches!(self, ChunkStatus::Pending | ChunkStatus::Retrying)
    }

    pub fn as_str(&self) -> &str {
        match self {
            ChunkStatus::Pending => "pending",
            ChunkStatus::Uploading => "uploading",
            ChunkStatus::Completed => "completed",
            ChunkStatus::Failed => "failed",
            ChunkStatus::Retrying => "retrying",
        }
    }
}

/// State of one chunk of the file being uploaded
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChunkState {
    /// 1-based chunk number
    pub chunk_number: u32,
    pub size: u64,
    pub status: ChunkStatus,
    pub retry_count: u32,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl ChunkState {
    pub fn new(chunk_number: u32, size: u64) -> Self {
        Self {
            chunk_number,
            size,
            status: ChunkStatus::Pending,
            retry_count: 0,
            started_at: None,
            completed_at: None,
            error: None,
        }
    }

    fn transition(&mut self, next: ChunkStatus) -> Result<()> {
        if !self.status.can_transition_to(next) {
            return Err(UploadError::transition(self.status, next));
        }
        self.status = next;
        Ok(())
    }

    /// `pending | retrying -> uploading`
    pub fn begin(&mut self) -> Result<()> {
        self.transition(ChunkStatus::Uploading)?;
        self.started_at = Some(Utc::now());
        Ok(())
    }

    /// `uploading -> completed`
    pub fn complete(&mut self) -> Result<()> {
        self.transition(ChunkStatus::Completed)?;
        self.completed_at = Some(Utc::now());
        self.error = None;
        Ok(())
    }

    /// `uploading -> failed`
    pub fn fail(&mut self, error: impl Into<String>) -> Result<()> {
        self.transition(ChunkStatus::Failed)?;
        self.error = Some(error.into());
        Ok(())
    }

    /// `failed -> retrying`, consuming one retry.
    pub fn schedule_retry(&mut self) -> Result<()> {
        self.transition(ChunkStatus::Retrying)?;
        self.retry_count += 1;
        Ok(())
    }

    pub fn is_completed(&self) -> bool {
        self.status == ChunkStatus::Completed
    }
}

/// Partitions files and computes retry policy for chunks
#[derive(Debug, Clone)]
pub struct ChunkManager {
    chunk_size: u64,
    max_retries: u32,
    base_backoff: Duration,
    max_backoff: Duration,
}

impl ChunkManager {
    pub fn new(
        chunk_size: u64,
        max_retries: u32,
        base_backoff: Duration,
        max_backoff: Duration,
    ) -> Self {
        Self {
            chunk_size: chunk_size.max(1),
            max_retries,
            base_backoff,
            max_backoff,
        }
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    pub fn max_retries(&self) -> u32 {
        self.max_retries
    }

    /// Split `file_size` bytes into ordered chunks.
    ///
    /// The last chunk holds `file_size % chunk_size` bytes, or a full chunk
    /// when the size divides evenly. An empty file has no chunks.
    pub fn partition(file_size: u64, chunk_size: u64) -> Vec<ChunkState> {
        let chunk_size = chunk_size.max(1);
        let total = file_size.div_ceil(chunk_size);

        (1..=total)
            .map(|n| {
                let size = if n == total && file_size % chunk_size != 0 {
                    file_size % chunk_size
                } else {
                    chunk_size
                };
                ChunkState::new(n as u32, size)
            })
            .collect()
    }

    /// Partition with this manager's chunk size.
    pub fn chunks_for(&self, file_size: u64) -> Vec<ChunkState> {
        Self::partition(file_size, self.chunk_size)
    }

    /// `min(base * 2^retry_count, max_backoff)`, saturating on overflow.
    pub fn backoff(&self, retry_count: u32) -> Duration {
        let multiplier = 1u32.checked_shl(retry_count).unwrap_or(u32::MAX);
        self.base_backoff
            .checked_mul(multiplier)
            .unwrap_or(self.max_backoff)
            .min(self.max_backoff)
    }

    pub fn should_retry(&self, chunk: &ChunkState) -> bool {
        chunk.retry_count < self.max_retries
    }

    /// Rebuild the chunk list for a checkpointed upload.
    ///
    /// Exactly the chunk numbers in `completed` come back `completed` (with a
    /// fresh `completed_at`); every other chunk is `pending`.
    pub fn restore_from_checkpoint(
        &self,
        total_chunks: u32,
        completed: &BTreeSet<u32>,
        file_size: u64,
    ) -> Result<Vec<ChunkState>> {
        let mut chunks = self.chunks_for(file_size);

        if chunks.len() as u64 != u64::from(total_chunks) {
            return Err(UploadError::mismatch(format!(
                "{} bytes in {}-byte chunks gives {} chunks, checkpoint records {}",
                file_size,
                self.chunk_size,
                chunks.len(),
                total_chunks
            )));
        }

        if let Some(out_of_range) = completed.iter().find(|n| **n == 0 || **n > total_chunks) {
            return Err(UploadError::mismatch(format!(
                "completed chunk {} is outside 1..={}",
                out_of_range, total_chunks
            )));
        }

        let now = Utc::now();
        for chunk in chunks.iter_mut().filter(|c| completed.contains(&c.chunk_number)) {
            chunk.status = ChunkStatus::Completed;
            chunk.completed_at = Some(now);
        }

        Ok(chunks)
    }
}
