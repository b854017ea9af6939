//! Record routes

use axum::{
    extract::{Path, State},
    routing::get,
    Router,
};
use std::sync::Arc;

use super::queries::{get_record::handle as handle_get_record, GetRecordError, GetRecordQuery, RecordStatusView};
use crate::api::response::ApiResponse;
use crate::error::AppError;
use crate::ingest::RecordStore;

/// Create record routes
pub fn records_routes() -> Router<Arc<dyn RecordStore>> {
    Router::new().route("/:table/:record_id", get(get_record))
}

/// Get the status of a processing record
///
/// GET /records/:table/:record_id
async fn get_record(
    State(records): State<Arc<dyn RecordStore>>,
    Path((table, record_id)): Path<(String, String)>,
) -> Result<ApiResponse<RecordStatusView>, AppError> {
    let query = GetRecordQuery { table, record_id };

    match handle_get_record(records, query).await {
        Ok(view) => Ok(ApiResponse::success(view)),
        Err(GetRecordError::InvalidTable(message)) => Err(AppError::Validation(message)),
        Err(GetRecordError::NotFound) => Err(AppError::NotFound("Record not found".to_string())),
        Err(GetRecordError::Store(e)) => Err(e.into()),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use crate::ingest::memory::MemoryRecordStore;
    use crate::ingest::{ProcessingRecord, RecordKey, RecordTable};
    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
    };
    use tower::ServiceExt;

    async fn app() -> Router {
        let store = Arc::new(MemoryRecordStore::new());
        store
            .insert(
                RecordKey::new(RecordTable::ModuleProcessing, "mod-7"),
                ProcessingRecord::awaiting_webhook(),
            )
            .await;
        let records: Arc<dyn RecordStore> = store;
        records_routes().with_state(records)
    }

    async fn get(uri: &str) -> (StatusCode, serde_json::Value) {
        let response = app()
            .await
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let body = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&body).unwrap())
    }

    #[tokio::test]
    async fn test_get_record() {
        let (status, body) = get("/module_processing/mod-7").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["data"]["status"], "awaiting_webhook");
        assert_eq!(body["data"]["recordId"], "mod-7");
    }

    #[tokio::test]
    async fn test_get_record_not_found() {
        let (status, body) = get("/module_processing/missing").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["error"]["status"], 404);
    }

    #[tokio::test]
    async fn test_get_record_bad_table() {
        let (status, _) = get("/payments/mod-7").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }
}
