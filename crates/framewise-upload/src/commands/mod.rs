//! CLI command implementations
//!
//! Each subcommand has its own module with a `run` function.

pub mod cancel;
pub mod status;
pub mod upload;

use crate::config::UploadConfig;
use crate::error::Result;
use crate::session::{FileCheckpointStore, SessionPersistence};

/// Checkpoint slot named by the environment config.
pub(crate) fn persistence(config: &UploadConfig) -> SessionPersistence<FileCheckpointStore> {
    SessionPersistence::new(
        FileCheckpointStore::new(&config.checkpoint_dir),
        config.checkpoint_slot.clone(),
    )
}

pub(crate) fn load_config() -> Result<UploadConfig> {
    UploadConfig::from_env()
}
