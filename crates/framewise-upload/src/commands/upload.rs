//! `framewise-upload upload` and `framewise-upload resume`
//!
//! Drives the engine loop. Ctrl+C pauses the upload and keeps the checkpoint.

use crate::engine::{FileDescriptor, StepOutcome, UploadEngine};
use crate::error::{Result, UploadError};
use crate::progress::{create_upload_progress, event_renderer, format_bytes};
use crate::session::{CheckpointStore, FileCheckpointStore};
use crate::{ResumeArgs, UploadArgs};
use colored::Colorize;
use indicatif::ProgressBar;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

/// Start a new upload
pub async fn run(args: UploadArgs) -> Result<()> {
    let mut config = super::load_config()?;
    if let Some(chunk_size) = args.chunk_size {
        config.chunk_size = chunk_size;
    }
    if let Some(max_retries) = args.max_retries {
        config.max_retries = max_retries;
    }
    if args.faults.seed.is_some() {
        config.seed = args.faults.seed;
    }
    config.validate()?;

    let failures = args.faults.failure_config();

    let file = FileDescriptor::from_path(&args.file)?;
    println!(
        "{} {} ({})",
        "Uploading".cyan().bold(),
        file.name,
        format_bytes(file.size)
    );

    let pb = create_upload_progress(file.size, &file.name);
    let store = FileCheckpointStore::new(&config.checkpoint_dir);
    let mut engine = UploadEngine::new(config, failures, store, event_renderer(pb.clone()))?;

    engine.start_upload(file);
    drive(&mut engine, &pb, args.restore_after_ms.map(Duration::from_millis)).await
}

/// Resume the checkpointed upload, optionally under a new fault scenario
pub async fn resume(args: ResumeArgs) -> Result<()> {
    let mut config = super::load_config()?;
    if args.faults.seed.is_some() {
        config.seed = args.faults.seed;
    }
    let pb = create_upload_progress(0, "Resuming");
    let store = FileCheckpointStore::new(&config.checkpoint_dir);
    let mut engine = UploadEngine::new(
        config,
        args.faults.failure_config(),
        store,
        event_renderer(pb.clone()),
    )?;

    if !engine.resume_upload() {
        pb.finish_and_clear();
        println!("No resumable upload found.");
        return Ok(());
    }

    if let Some(session) = engine.session() {
        pb.set_length(session.file_size);
        pb.set_position(session.bytes_uploaded);
    }

    drive(&mut engine, &pb, args.restore_after_ms.map(Duration::from_millis)).await
}

/// Run the engine until it completes, fails, or is interrupted.
async fn drive<S: CheckpointStore>(
    engine: &mut UploadEngine<S>,
    pb: &ProgressBar,
    restore_after: Option<Duration>,
) -> Result<()> {
    let interrupted = Arc::new(AtomicBool::new(false));
    let flag = interrupted.clone();
    let signal = tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            flag.store(true, Ordering::SeqCst);
        }
    });

    let result = loop {
        if interrupted.load(Ordering::SeqCst) {
            engine.pause_upload();
            pb.abandon_with_message("Paused");
            println!("Upload paused. Run 'framewise-upload resume' to continue.");
            break Ok(());
        }

        match engine.process_next_chunk().await {
            StepOutcome::Sent(_) | StepOutcome::Retrying(_) => continue,
            StepOutcome::NetworkLost(chunk) => match restore_after {
                Some(delay) => {
                    info!(chunk, delay_ms = delay.as_millis() as u64, "Waiting before restoring network");
                    tokio::time::sleep(delay).await;
                    engine.restore_network();
                }
                None => {
                    pb.abandon_with_message(format!("Network lost at chunk {}", chunk));
                    println!("Upload paused. Run 'framewise-upload resume' once the network is back.");
                    break Ok(());
                }
            },
            StepOutcome::Refreshed => {
                if !engine.resume_upload() {
                    break Err(UploadError::Incomplete(
                        "checkpoint unavailable after refresh".to_string(),
                    ));
                }
            }
            StepOutcome::Failed(chunk) => {
                println!("Run 'framewise-upload resume' to try again from the last checkpoint.");
                break Err(UploadError::Incomplete(format!(
                    "chunk {} exhausted its retries",
                    chunk
                )));
            }
            StepOutcome::Completed => {
                println!("{} Upload complete", "✓".green());
                break Ok(());
            }
            StepOutcome::Idle => break Ok(()),
        }
    };

    signal.abort();
    result
}
