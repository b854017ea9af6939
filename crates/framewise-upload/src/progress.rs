//! Progress rendering for CLI uploads
//!
//! Turns engine events into an `indicatif` progress bar.

use crate::events::{EventCallback, UploadEvent, UploadEventKind};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use std::sync::Arc;

/// Byte-based progress bar for a chunked upload
pub fn create_upload_progress(size: u64, message: &str) -> ProgressBar {
    let pb = ProgressBar::new(size);
    let style = ProgressStyle::default_bar()
        .template("{msg}\n{spinner:.green} [{elapsed_precise}] [{wide_bar:.cyan/blue}] {bytes}/{total_bytes} ({eta})")
        .map(|s| s.progress_chars("#>-"))
        .unwrap_or_else(|_| ProgressStyle::default_bar());
    pb.set_style(style);
    pb.set_message(message.to_string());
    pb
}

/// Event callback that drives `pb`.
pub fn event_renderer(pb: ProgressBar) -> EventCallback {
    Arc::new(move |event: UploadEvent| render(&pb, &event))
}

fn render(pb: &ProgressBar, event: &UploadEvent) {
    match &event.kind {
        UploadEventKind::UploadStarted {
            file_name,
            file_size,
            total_chunks,
            ..
        } => {
            pb.set_length(*file_size);
            pb.set_message(format!("Uploading {} ({} chunks)", file_name, total_chunks));
        }
        UploadEventKind::UploadResumed {
            uploaded_chunks,
            total_chunks,
            ..
        } => {
            pb.set_message(format!(
                "Resumed at chunk {} of {}",
                uploaded_chunks + 1,
                total_chunks
            ));
        }
        UploadEventKind::ChunkSent {
            chunk_number,
            total_chunks,
            bytes_uploaded,
            ..
        } => {
            pb.set_position(*bytes_uploaded);
            pb.set_message(format!("Chunk {}/{} sent", chunk_number, total_chunks));
        }
        UploadEventKind::ChunkFailed {
            chunk_number,
            error,
            ..
        } => {
            pb.println(format!("{} Chunk {} failed: {}", "!".yellow(), chunk_number, error));
        }
        UploadEventKind::RetryScheduled {
            chunk_number,
            attempt,
            delay_ms,
        } => {
            pb.set_message(
                format!(
                    "Retrying chunk {} (attempt {}) in {}",
                    chunk_number,
                    attempt,
                    format_millis(*delay_ms)
                )
                .yellow()
                .to_string(),
            );
        }
        UploadEventKind::LatencySpike { delay_ms, .. } => {
            pb.set_message(format!("Latency spike: +{}", format_millis(*delay_ms)));
        }
        UploadEventKind::NetworkLost { chunk_number } => {
            pb.println(format!(
                "{} Network lost at chunk {}",
                "x".red(),
                chunk_number
            ));
        }
        UploadEventKind::NetworkRestored => {
            pb.println(format!("{} Network restored", "✓".green()));
        }
        UploadEventKind::BrowserRefresh { .. } => {
            pb.println(format!("{} Simulated refresh, reloading from checkpoint", "↻".cyan()));
        }
        UploadEventKind::CheckpointDiscarded { reason } => {
            pb.println(format!("{} Checkpoint discarded: {}", "!".yellow(), reason));
        }
        UploadEventKind::UploadFailed { chunk_number, .. } => {
            pb.abandon_with_message(format!("Chunk {} exhausted its retries", chunk_number).red().to_string());
        }
        UploadEventKind::UploadCompleted { total_retries, .. } => {
            pb.finish_with_message(format!("Upload complete ({} retries)", total_retries));
        }
        UploadEventKind::RetryAttempted { .. }
        | UploadEventKind::UploadPaused { .. }
        | UploadEventKind::UploadCancelled { .. } => {}
    }
}

/// Format bytes into human-readable string
pub fn format_bytes(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_idx = 0;

    while size >= 1024.0 && unit_idx < UNITS.len() - 1 {
        size /= 1024.0;
        unit_idx += 1;
    }

    if unit_idx == 0 {
        format!("{} {}", size as u64, UNITS[unit_idx])
    } else {
        format!("{:.2} {}", size, UNITS[unit_idx])
    }
}

fn format_millis(ms: u64) -> String {
    if ms < 1_000 {
        format!("{}ms", ms)
    } else {
        format!("{:.1}s", ms as f64 / 1_000.0)
    }
}
