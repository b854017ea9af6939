pub mod response;

use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;
use tower_http::compression::CompressionLayer;

use crate::config::CorsConfig;
use crate::features::{self, FeatureState};
use crate::ingest::RecordStore;
use crate::middleware::{cors_layer, tracing_layer};

/// Build the full application router
///
/// - `GET /health`
/// - `/api/v1/...` feature routes
pub fn create_router(state: FeatureState, cors: &CorsConfig) -> Router {
    let health_routes = Router::new()
        .route("/health", get(health_check))
        .with_state(state.records.clone());

    Router::new()
        .merge(health_routes)
        .nest("/api/v1", features::router(state))
        .layer(CompressionLayer::new())
        .layer(cors_layer(cors))
        .layer(tracing_layer())
}

async fn health_check(State(records): State<Arc<dyn RecordStore>>) -> impl IntoResponse {
    match records.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(json!({
                "status": "healthy",
                "version": env!("CARGO_PKG_VERSION"),
            })),
        ),
        Err(e) => {
            tracing::error!(error = %format!("{:#}", e), "Health check failed");
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(json!({
                    "status": "unhealthy",
                    "version": env!("CARGO_PKG_VERSION"),
                })),
            )
        },
    }
}
