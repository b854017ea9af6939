//! Framewise Common Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! Shared error handling, environment configuration helpers and logging
//! setup for the Framewise workspace.
//!
//! # Overview
//!
//! - **Error Handling**: [`FramewiseError`] and the [`Result`] alias
//! - **Environment**: typed lookups of `FRAMEWISE_*` variables with defaults
//! - **Logging**: `tracing-subscriber` initialisation shared by every binary
//! - **Time**: epoch-millisecond helpers used by checkpoints and heartbeats
//!
//! # Example
//!
//! ```no_run
//! use framewise_common::env;
//!
//! fn chunk_size() -> framewise_common::Result<u64> {
//!     env::parse_or("FRAMEWISE_UPLOAD_CHUNK_SIZE", 5 * 1024 * 1024)
//! }
//! ```

pub mod env;
pub mod error;
pub mod logging;
pub mod time;

// Re-export commonly used types
pub use error::{FramewiseError, Result};
