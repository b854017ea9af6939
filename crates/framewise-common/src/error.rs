//! Error types shared across Framewise crates

use thiserror::Error;

/// Result type alias for shared Framewise helpers
pub type Result<T> = std::result::Result<T, FramewiseError>;

/// Main error type for the shared helpers
#[derive(Error, Debug)]
pub enum FramewiseError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid value for {key}: '{value}' ({reason})")]
    InvalidEnv {
        key: String,
        value: String,
        reason: String,
    },

    #[error("Configuration error: {0}")]
    Config(String),
}

impl FramewiseError {
    /// Create a configuration error
    pub fn config(msg: impl Into<String>) -> Self {
        Self::Config(msg.into())
    }
}
