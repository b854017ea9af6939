//! Framewise upload client - Main entry point

use clap::Parser;
use framewise_common::logging::{init_logging, LogConfig, LogLevel, LogOutput};
use framewise_upload::{Cli, Commands};
use std::process;
use tracing::error;

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Verbose: debug to console. Otherwise only warnings, so the progress bar stays readable.
    let log_config = LogConfig::builder()
        .level(if cli.verbose {
            LogLevel::Debug
        } else {
            LogLevel::Warn
        })
        .output(LogOutput::Console)
        .log_file_prefix("framewise-upload")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    // The CLI works without logging
    let _guard = init_logging(&log_config).ok();

    if let Err(e) = execute_command(&cli).await {
        error!(error = %e, "Command failed");
        eprintln!("Error: {}", e);
        process::exit(1);
    }
}

async fn execute_command(cli: &Cli) -> framewise_upload::Result<()> {
    match &cli.command {
        Commands::Upload(args) => framewise_upload::commands::upload::run(args.clone()).await,
        Commands::Resume(args) => framewise_upload::commands::upload::resume(args.clone()).await,
        Commands::Status => framewise_upload::commands::status::run().await,
        Commands::Cancel => framewise_upload::commands::cancel::run().await,
    }
}
