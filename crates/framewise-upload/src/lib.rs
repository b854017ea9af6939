//! Framewise Upload Client
//!
//! Resilient chunked uploads with fault injection and checkpoint/resume.
//!
//! # Overview
//!
//! - **Chunking**: [`chunks::ChunkManager`] partitions files and computes backoff
//! - **Fault Injection**: [`faults::FailureScenarioEngine`] simulates outages,
//!   failing chunks, latency spikes and browser refreshes
//! - **Checkpoints**: [`session::SessionPersistence`] keeps one resumable
//!   upload per slot with a 24 hour TTL
//! - **Engine**: [`engine::UploadEngine`] composes the above into a
//!   caller-driven state machine that reports through typed events
//!
//! # Example
//!
//! ```no_run
//! use framewise_upload::engine::{FileDescriptor, StepOutcome, UploadEngine};
//! use framewise_upload::events::UploadEvent;
//! use framewise_upload::faults::FailureConfig;
//! use framewise_upload::session::MemoryCheckpointStore;
//! use framewise_upload::UploadConfig;
//! use std::sync::Arc;
//!
//! # async fn run() -> framewise_upload::Result<()> {
//! let config = UploadConfig::with_checkpoint_dir("/tmp/framewise");
//! let mut engine = UploadEngine::new(
//!     config,
//!     FailureConfig::default(),
//!     MemoryCheckpointStore::new(),
//!     Arc::new(|event: UploadEvent| println!("{:?}", event)),
//! )?;
//!
//! engine.start_upload(FileDescriptor::new("training.mp4", 50 * 1024 * 1024));
//! while let StepOutcome::Sent(_) | StepOutcome::Retrying(_) = engine.process_next_chunk().await {}
//! # Ok(())
//! # }
//! ```

#![deny(clippy::unwrap_used, clippy::expect_used)]

pub mod chunks;
pub mod commands;
pub mod config;
pub mod engine;
pub mod error;
pub mod events;
pub mod faults;
pub mod progress;
pub mod session;

// Re-export commonly used types
pub use config::UploadConfig;
pub use engine::{FileDescriptor, StepOutcome, UploadEngine};
pub use error::{Result, UploadError};

use clap::{Args, Parser, Subcommand};
use faults::FailureConfig;
use std::path::PathBuf;

/// Framewise - resilient chunked video uploads
#[derive(Parser, Debug)]
#[command(name = "framewise-upload")]
#[command(author, version, about, long_about = None)]
#[command(arg_required_else_help = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Upload a file in chunks
    Upload(UploadArgs),

    /// Resume the checkpointed upload
    Resume(ResumeArgs),

    /// Show the checkpointed upload, if any
    Status,

    /// Discard the checkpointed upload
    Cancel,
}

/// Flags for `framewise-upload upload`
#[derive(Args, Debug, Clone)]
pub struct UploadArgs {
    /// File to upload
    pub file: PathBuf,

    /// Chunk size in bytes
    #[arg(long)]
    pub chunk_size: Option<u64>,

    /// Retries per chunk before the upload fails
    #[arg(long)]
    pub max_retries: Option<u32>,

    #[command(flatten)]
    pub faults: FaultArgs,

    /// Restore the network this long after an outage (otherwise stop)
    #[arg(long, env = "FRAMEWISE_UPLOAD_RESTORE_AFTER_MS")]
    pub restore_after_ms: Option<u64>,
}

/// Flags for `framewise-upload resume`
#[derive(Args, Debug, Clone)]
pub struct ResumeArgs {
    #[command(flatten)]
    pub faults: FaultArgs,

    /// Restore the network this long after an outage (otherwise stop)
    #[arg(long, env = "FRAMEWISE_UPLOAD_RESTORE_AFTER_MS")]
    pub restore_after_ms: Option<u64>,
}

/// Simulated failures, shared by `upload` and `resume`
#[derive(Args, Debug, Clone, Default)]
pub struct FaultArgs {
    /// Drop the network once progress reaches this percentage
    #[arg(long, value_parser = clap::value_parser!(f64))]
    pub drop_at_percent: Option<f64>,

    /// Fail every Nth chunk on every attempt
    #[arg(long)]
    pub fail_every: Option<u32>,

    /// Maximum random latency spike in milliseconds
    #[arg(long)]
    pub latency_spike_ms: Option<u64>,

    /// Simulate a browser refresh halfway through
    #[arg(long)]
    pub simulate_refresh: bool,

    /// Seed for simulated randomness
    #[arg(long)]
    pub seed: Option<u64>,
}

impl FaultArgs {
    pub fn failure_config(&self) -> FailureConfig {
        FailureConfig {
            network_drop_at_percent: self.drop_at_percent,
            chunk_failure_every_n: self.fail_every,
            latency_spike_ms: self.latency_spike_ms,
            simulate_browser_refresh: self.simulate_refresh,
        }
    }
}
