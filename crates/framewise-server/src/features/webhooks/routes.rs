//! Webhook routes

use axum::{body::Bytes, extract::State, routing::post, Router};
use std::sync::Arc;

use crate::api::response::WebhookAck;
use crate::ingest::IngestionWebhookHandler;

/// Create webhook routes
pub fn webhook_routes() -> Router<Arc<IngestionWebhookHandler>> {
    Router::new().route("/frame-extraction", post(frame_extraction))
}

/// Frame-extraction provider callback
///
/// POST /webhooks/frame-extraction
///
/// The raw body is handed to the ingestion handler so that a malformed
/// payload is acknowledged and dropped instead of rejected by an extractor.
async fn frame_extraction(
    State(handler): State<Arc<IngestionWebhookHandler>>,
    body: Bytes,
) -> WebhookAck {
    handler.handle(&body).await
}
