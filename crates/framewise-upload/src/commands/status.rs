//! `framewise-upload status` command implementation
//!
//! Shows the checkpointed upload.

use crate::error::Result;
use crate::progress::format_bytes;
use crate::session::PersistedCheckpoint;
use colored::Colorize;
use framewise_common::time::from_millis;

/// Show the checkpointed upload
pub async fn run() -> Result<()> {
    let config = super::load_config()?;
    let persistence = super::persistence(&config);

    match persistence.load()? {
        Some(checkpoint) => print_checkpoint(&checkpoint),
        None => {
            println!("No resumable upload found.");
        }
    }

    Ok(())
}

fn print_checkpoint(checkpoint: &PersistedCheckpoint) {
    let percent = if checkpoint.total_chunks == 0 {
        100.0
    } else {
        f64::from(checkpoint.uploaded_chunks) / f64::from(checkpoint.total_chunks) * 100.0
    };

    println!("{}", "Checkpointed Upload:".cyan().bold());
    println!();
    println!("{}", checkpoint.file_name.green());
    println!("  Session:    {}", checkpoint.session_id);
    println!("  Size:       {}", format_bytes(checkpoint.file_size));
    println!(
        "  Chunks:     {}/{} ({:.0}%)",
        checkpoint.uploaded_chunks, checkpoint.total_chunks, percent
    );
    println!("  Status:     {}", checkpoint.status.as_str());
    println!("  Checkpoint: {}", from_millis(checkpoint.checkpoint_at).to_rfc3339());
}
