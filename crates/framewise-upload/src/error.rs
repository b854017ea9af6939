//! Error types for the upload client
//!
//! Runtime faults during an upload never surface here: the engine reports
//! them as [`UploadEvent`](crate::events::UploadEvent)s. These errors cover
//! configuration, checkpoint I/O and rejected state transitions.

use thiserror::Error;

/// Result type alias for upload client operations
pub type Result<T> = std::result::Result<T, UploadError>;

#[derive(Error, Debug)]
pub enum UploadError {
    /// Configuration is missing or invalid
    #[error("Configuration error: {0}. Check the FRAMEWISE_UPLOAD_* environment variables and CLI flags.")]
    Config(String),

    /// Checkpoint file could not be read or written
    #[error("Checkpoint I/O failed: {0}. Check permissions on the checkpoint directory.")]
    Io(#[from] std::io::Error),

    /// Checkpoint content could not be encoded or decoded
    #[error("Checkpoint encoding failed: {0}")]
    Json(#[from] serde_json::Error),

    /// Stored checkpoint does not describe the file it claims to
    #[error("Checkpoint does not match file layout: {0}")]
    CheckpointMismatch(String),

    /// A chunk or session status change outside the transition table
    #[error("Invalid transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    /// The selected file cannot be uploaded
    #[error("Invalid file '{0}': {1}")]
    InvalidFile(String, String),

    /// The upload stopped without completing
    #[error("Upload did not complete: {0}")]
    Incomplete(String),

    #[error(transparent)]
    Common(#[from] framewise_common::FramewiseError),
}

impl UploadError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }

    /// Create a checkpoint mismatch error
    pub fn mismatch(msg: impl Into<String>) -> Self {
        Self::CheckpointMismatch(msg.into())
    }

    pub(crate) fn transition(from: impl std::fmt::Debug, to: impl std::fmt::Debug) -> Self {
        Self::InvalidTransition {
            from: format!("{:?}", from),
            to: format!("{:?}", to),
        }
    }
}
