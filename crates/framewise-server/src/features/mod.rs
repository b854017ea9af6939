//! Feature modules implementing the Framewise API
//!
//! # Features
//!
//! - **webhooks**: frame-extraction provider callbacks
//! - **records**: read-only processing record status
//!
//! Each feature is a vertical slice with its own `routes.rs` and, for reads,
//! a `queries/` directory.

pub mod records;
pub mod webhooks;

use axum::Router;
use std::sync::Arc;

use crate::ingest::{IngestionWebhookHandler, RecordStore};

/// Shared state for all feature routes
#[derive(Clone)]
pub struct FeatureState {
    /// Webhook ingestion pipeline
    pub handler: Arc<IngestionWebhookHandler>,
    /// Record access for status reads
    pub records: Arc<dyn RecordStore>,
}

/// Creates the API router with all feature routes mounted
///
/// - `/webhooks` - provider callbacks
/// - `/records` - processing record status
pub fn router(state: FeatureState) -> Router<()> {
    Router::new()
        .nest("/webhooks", webhooks::webhook_routes().with_state(state.handler.clone()))
        .nest("/records", records::records_routes().with_state(state.records.clone()))
}
