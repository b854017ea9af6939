//! Durable single-slot checkpoint storage
//!
//! One resumable upload per slot. The checkpoint records which chunks have
//! been acknowledged and is written only after a chunk completes, so a crash
//! mid-transfer never claims bytes that were not sent.

use crate::error::Result;
use framewise_common::time::{age_millis, now_millis, DAY_MS};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use tracing::{debug, info, warn};

/// Status stored alongside a checkpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CheckpointStatus {
    Paused,
    Uploading,
}

impl CheckpointStatus {
    pub fn as_str(&self) -> &str {
        match self {
            CheckpointStatus::Paused => "paused",
            CheckpointStatus::Uploading => "uploading",
        }
    }
}

/// Checkpoint record as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PersistedCheckpoint {
    pub session_id: String,
    pub file_name: String,
    pub file_size: u64,
    pub total_chunks: u32,
    pub uploaded_chunks: u32,
    /// Epoch milliseconds of the last write
    pub checkpoint_at: i64,
    pub status: CheckpointStatus,
    pub completed_chunks: BTreeSet<u32>,
}

/// Raw storage behind [`SessionPersistence`]
pub trait CheckpointStore {
    fn read(&self, slot: &str) -> Result<Option<String>>;
    fn write(&self, slot: &str, contents: &str) -> Result<()>;
    fn remove(&self, slot: &str) -> Result<()>;
}

/// One JSON file per slot
#[derive(Debug, Clone)]
pub struct FileCheckpointStore {
    dir: PathBuf,
}

impl FileCheckpointStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn path(&self, slot: &str) -> PathBuf {
        self.dir.join(format!("{}.json", slot))
    }
}

impl CheckpointStore for FileCheckpointStore {
    fn read(&self, slot: &str) -> Result<Option<String>> {
        match std::fs::read_to_string(self.path(slot)) {
            Ok(contents) => Ok(Some(contents)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write(&self, slot: &str, contents: &str) -> Result<()> {
        std::fs::create_dir_all(&self.dir)?;
        let path = self.path(slot);
        let tmp = path.with_extension("json.tmp");
        std::fs::write(&tmp, contents)?;
        std::fs::rename(&tmp, &path)?;
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        match std::fs::remove_file(self.path(slot)) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}

/// In-process store; clones share the same slots
#[derive(Debug, Clone, Default)]
pub struct MemoryCheckpointStore {
    slots: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryCheckpointStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn slots(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.slots.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl CheckpointStore for MemoryCheckpointStore {
    fn read(&self, slot: &str) -> Result<Option<String>> {
        Ok(self.slots().get(slot).cloned())
    }

    fn write(&self, slot: &str, contents: &str) -> Result<()> {
        self.slots().insert(slot.to_string(), contents.to_string());
        Ok(())
    }

    fn remove(&self, slot: &str) -> Result<()> {
        self.slots().remove(slot);
        Ok(())
    }
}

/// Checkpoint slot with a time-to-live
#[derive(Debug, Clone)]
pub struct SessionPersistence<S> {
    store: S,
    slot: String,
    ttl_ms: i64,
}

impl<S: CheckpointStore> SessionPersistence<S> {
    /// Slot with the default 24 hour TTL.
    pub fn new(store: S, slot: impl Into<String>) -> Self {
        Self {
            store,
            slot: slot.into(),
            ttl_ms: DAY_MS,
        }
    }

    pub fn with_ttl_ms(mut self, ttl_ms: i64) -> Self {
        self.ttl_ms = ttl_ms;
        self
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn save(&self, checkpoint: &PersistedCheckpoint) -> Result<()> {
        let json = serde_json::to_string_pretty(checkpoint)?;
        self.store.write(&self.slot, &json)?;
        debug!(
            session_id = %checkpoint.session_id,
            uploaded = checkpoint.uploaded_chunks,
            total = checkpoint.total_chunks,
            "Checkpoint saved"
        );
        Ok(())
    }

    /// Load the live checkpoint.
    ///
    /// Expired or undecodable entries are purged and reported as absent.
    pub fn load(&self) -> Result<Option<PersistedCheckpoint>> {
        let Some(raw) = self.store.read(&self.slot)? else {
            return Ok(None);
        };

        let checkpoint: PersistedCheckpoint = match serde_json::from_str(&raw) {
            Ok(checkpoint) => checkpoint,
            Err(e) => {
                warn!(slot = %self.slot, error = %e, "Discarding unreadable checkpoint");
                self.store.remove(&self.slot)?;
                return Ok(None);
            }
        };

        let age = age_millis(checkpoint.checkpoint_at, now_millis());
        if age >= self.ttl_ms {
            info!(
                session_id = %checkpoint.session_id,
                age_ms = age,
                "Discarding expired checkpoint"
            );
            self.store.remove(&self.slot)?;
            return Ok(None);
        }

        Ok(Some(checkpoint))
    }

    pub fn clear(&self) -> Result<()> {
        self.store.remove(&self.slot)
    }

    /// Record newly completed chunks. Returns `false` when there is no live checkpoint.
    pub fn update_checkpoint(
        &self,
        uploaded_chunks: u32,
        completed_chunks: &BTreeSet<u32>,
    ) -> Result<bool> {
        let Some(mut checkpoint) = self.load()? else {
            return Ok(false);
        };
        checkpoint.uploaded_chunks = uploaded_chunks;
        checkpoint.completed_chunks = completed_chunks.clone();
        checkpoint.checkpoint_at = now_millis();
        self.save(&checkpoint)?;
        Ok(true)
    }

    /// Change the stored status. Returns `false` when there is no live checkpoint.
    pub fn mark_status(&self, status: CheckpointStatus) -> Result<bool> {
        let Some(mut checkpoint) = self.load()? else {
            return Ok(false);
        };
        checkpoint.status = status;
        checkpoint.checkpoint_at = now_millis();
        self.save(&checkpoint)?;
        Ok(true)
    }
}
