//! `framewise-upload cancel` command implementation

use crate::error::Result;
use colored::Colorize;

/// Discard the checkpointed upload
pub async fn run() -> Result<()> {
    let config = super::load_config()?;
    let persistence = super::persistence(&config);

    match persistence.load()? {
        Some(checkpoint) => {
            persistence.clear()?;
            println!(
                "{} Cancelled upload of {} ({}/{} chunks sent)",
                "✓".green(),
                checkpoint.file_name,
                checkpoint.uploaded_chunks,
                checkpoint.total_chunks
            );
        }
        None => println!("No resumable upload found."),
    }

    Ok(())
}
