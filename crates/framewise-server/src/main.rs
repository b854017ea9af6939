//! Framewise Server - Main entry point

use anyhow::{Context, Result};
use framewise_common::logging::{init_logging, LogConfig};
use std::{net::SocketAddr, sync::Arc, time::Duration};
use tokio::signal;
use tracing::info;

use framewise_server::{
    api,
    config::Config,
    db,
    features::FeatureState,
    ingest::{
        nudge, Collaborators, Escalator, HttpAssetFetcher, HttpEscalator,
        IngestionWebhookHandler, NudgeSender, PgRecordStore, PgViolationLog, PgWorkQueue,
        RecordStore,
    },
    storage::{config::StorageConfig, Storage},
};

/// Timeout for fetching one provider frame.
const ASSET_FETCH_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for escalation and worker calls.
const OUTBOUND_TIMEOUT: Duration = Duration::from_secs(10);

#[tokio::main]
async fn main() -> Result<()> {
    let log_config = LogConfig::builder()
        .log_file_prefix("framewise-server")
        .filter_directives("framewise_server=debug,tower_http=debug,sqlx=warn")
        .build();

    // Environment variables take precedence
    let log_config = log_config.clone().merge_env().unwrap_or(log_config);

    let _guard = init_logging(&log_config)?;

    info!("Starting Framewise Server");

    let config = Config::load()?;
    info!(
        "Configuration loaded - server will bind to {}:{}",
        config.server.host, config.server.port
    );

    let db_pool = db::create_pool(&config.database).await?;
    db::run_migrations(&db_pool).await?;

    let storage = Storage::new(StorageConfig::from_env()?).await?;

    let escalator: Option<Arc<dyn Escalator>> = match &config.ingestion.escalation_url {
        Some(url) => Some(Arc::new(HttpEscalator::new(url.clone(), OUTBOUND_TIMEOUT)?)),
        None => {
            info!("No escalation URL configured, provider failures go straight to needs_review");
            None
        },
    };

    let records: Arc<dyn RecordStore> = Arc::new(PgRecordStore::new(db_pool.clone()));
    let collaborators = Collaborators {
        records: records.clone(),
        queue: Arc::new(PgWorkQueue::new(db_pool.clone())),
        violations: Arc::new(PgViolationLog::new(db_pool.clone())),
        escalator,
        fetcher: Arc::new(HttpAssetFetcher::new(ASSET_FETCH_TIMEOUT)?),
        objects: Arc::new(storage),
    };

    let (nudges, nudge_rx) = NudgeSender::channel(config.ingestion.nudge_capacity);
    let worker_client = reqwest::Client::builder()
        .timeout(OUTBOUND_TIMEOUT)
        .build()
        .context("Failed to build worker HTTP client")?;
    let dispatcher =
        nudge::spawn_dispatcher(nudge_rx, worker_client, config.ingestion.worker_url.clone());

    let handler = IngestionWebhookHandler::new(collaborators, nudges, config.ingestion.clone());
    let state = FeatureState {
        handler: Arc::new(handler),
        records,
    };

    let app = api::create_router(state, &config.cors);

    let addr: SocketAddr = format!("{}:{}", config.server.host, config.server.port).parse()?;
    info!("Server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(config.server.shutdown_timeout_secs))
        .await?;

    // The router owned the last nudge sender; the dispatcher drains and stops.
    if tokio::time::timeout(Duration::from_secs(5), dispatcher).await.is_err() {
        tracing::warn!("Nudge dispatcher did not stop in time");
    }

    info!("Server shut down gracefully");

    Ok(())
}

/// Graceful shutdown signal handler
async fn shutdown_signal(timeout_secs: u64) {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!("Failed to install Ctrl+C handler: {}", e);
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            },
            Err(e) => {
                tracing::error!("Failed to install SIGTERM handler: {}", e);
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {
            info!("Received Ctrl+C, starting graceful shutdown");
        },
        _ = terminate => {
            info!("Received terminate signal, starting graceful shutdown");
        },
    }

    info!("Waiting up to {} seconds for connections to close", timeout_secs);
    tokio::time::sleep(Duration::from_secs(timeout_secs.min(5))).await;
}
