//! Configuration management for the upload client
//!
//! Chunking, retry and simulation settings. Values come from defaults,
//! then `FRAMEWISE_UPLOAD_*` environment variables, then CLI flags.

use crate::error::{Result, UploadError};
use framewise_common::env;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

// ============================================================================
// Upload Configuration Constants
// ============================================================================

/// Default chunk size: 5 MiB.
pub const DEFAULT_CHUNK_SIZE: u64 = 5 * 1024 * 1024;

/// Default number of retries per chunk (not counting the first attempt).
pub const DEFAULT_MAX_RETRIES: u32 = 3;

/// Default base delay for exponential backoff.
pub const DEFAULT_BASE_BACKOFF_MS: u64 = 1_000;

/// Default cap on the backoff delay.
pub const DEFAULT_MAX_BACKOFF_MS: u64 = 16_000;

/// Default simulated transfer time per chunk, jittered by ±50%.
pub const DEFAULT_BASE_CHUNK_TIME_MS: u64 = 500;

/// Default probability that a latency spike is added to an attempt.
pub const DEFAULT_LATENCY_SPIKE_CHANCE: f64 = 0.3;

/// Default checkpoint slot name.
pub const DEFAULT_CHECKPOINT_SLOT: &str = "upload-session";

/// Upload client configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadConfig {
    /// Size of every chunk except possibly the last
    pub chunk_size: u64,

    pub max_retries: u32,

    pub base_backoff_ms: u64,

    pub max_backoff_ms: u64,

    pub base_chunk_time_ms: u64,

    /// Probability in `[0, 1]` that an attempt carries a latency spike
    pub latency_spike_chance: f64,

    /// Directory holding checkpoint files
    pub checkpoint_dir: PathBuf,

    /// Name of the checkpoint slot inside `checkpoint_dir`
    pub checkpoint_slot: String,

    /// Seed for simulation randomness; `None` draws from OS entropy
    #[serde(default)]
    pub seed: Option<u64>,
}

impl UploadConfig {
    /// Create a config with default values
    pub fn new() -> Result<Self> {
        let checkpoint_dir = dirs::cache_dir()
            .ok_or_else(|| UploadError::config("Could not determine cache directory"))?
            .join("framewise");

        Ok(Self {
            checkpoint_dir,
            ..Self::with_checkpoint_dir(PathBuf::new())
        })
    }

    /// Defaults with an explicit checkpoint directory
    pub fn with_checkpoint_dir(dir: impl Into<PathBuf>) -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            max_retries: DEFAULT_MAX_RETRIES,
            base_backoff_ms: DEFAULT_BASE_BACKOFF_MS,
            max_backoff_ms: DEFAULT_MAX_BACKOFF_MS,
            base_chunk_time_ms: DEFAULT_BASE_CHUNK_TIME_MS,
            latency_spike_chance: DEFAULT_LATENCY_SPIKE_CHANCE,
            checkpoint_dir: dir.into(),
            checkpoint_slot: DEFAULT_CHECKPOINT_SLOT.to_string(),
            seed: None,
        }
    }

    /// Load config from environment variables
    ///
    /// - `FRAMEWISE_UPLOAD_CHUNK_SIZE`
    /// - `FRAMEWISE_UPLOAD_MAX_RETRIES`
    /// - `FRAMEWISE_UPLOAD_BASE_BACKOFF_MS`
    /// - `FRAMEWISE_UPLOAD_MAX_BACKOFF_MS`
    /// - `FRAMEWISE_UPLOAD_CHUNK_TIME_MS`
    /// - `FRAMEWISE_UPLOAD_CHECKPOINT_DIR`
    /// - `FRAMEWISE_UPLOAD_CHECKPOINT_SLOT`
    /// - `FRAMEWISE_UPLOAD_SEED`
    pub fn from_env() -> Result<Self> {
        let mut config = Self::new()?;

        config.chunk_size = env::parse_or("FRAMEWISE_UPLOAD_CHUNK_SIZE", config.chunk_size)?;
        config.max_retries = env::parse_or("FRAMEWISE_UPLOAD_MAX_RETRIES", config.max_retries)?;
        config.base_backoff_ms =
            env::parse_or("FRAMEWISE_UPLOAD_BASE_BACKOFF_MS", config.base_backoff_ms)?;
        config.max_backoff_ms =
            env::parse_or("FRAMEWISE_UPLOAD_MAX_BACKOFF_MS", config.max_backoff_ms)?;
        config.base_chunk_time_ms =
            env::parse_or("FRAMEWISE_UPLOAD_CHUNK_TIME_MS", config.base_chunk_time_ms)?;

        if let Some(dir) = env::string("FRAMEWISE_UPLOAD_CHECKPOINT_DIR") {
            config.checkpoint_dir = PathBuf::from(dir);
        }
        if let Some(slot) = env::string("FRAMEWISE_UPLOAD_CHECKPOINT_SLOT") {
            config.checkpoint_slot = slot;
        }
        config.seed = env::parse("FRAMEWISE_UPLOAD_SEED")?;

        config.validate()?;
        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(UploadError::config("chunk_size must be greater than 0"));
        }
        if self.base_backoff_ms > self.max_backoff_ms {
            return Err(UploadError::config(format!(
                "base_backoff_ms ({}) cannot exceed max_backoff_ms ({})",
                self.base_backoff_ms, self.max_backoff_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.latency_spike_chance) {
            return Err(UploadError::config(format!(
                "latency_spike_chance must be within [0, 1], got {}",
                self.latency_spike_chance
            )));
        }
        if self.checkpoint_slot.trim().is_empty()
            || self.checkpoint_slot.contains(['/', '\\'])
        {
            return Err(UploadError::config(format!(
                "checkpoint_slot '{}' must be a plain file name",
                self.checkpoint_slot
            )));
        }
        Ok(())
    }

    pub fn base_backoff(&self) -> Duration {
        Duration::from_millis(self.base_backoff_ms)
    }

    pub fn max_backoff(&self) -> Duration {
        Duration::from_millis(self.max_backoff_ms)
    }
}
