//! Get record status query

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::ingest::{RecordKey, RecordStore, RecordTable};

/// Query for one processing record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GetRecordQuery {
    pub table: String,
    pub record_id: String,
}

/// Coarse progress of a processing record
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecordStatusView {
    pub table: String,
    pub record_id: String,
    pub status: String,
    pub progress: i32,
    pub progress_step: Option<String>,
    pub total_frames: i32,
    pub constraint_status: Option<String>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
}

#[derive(Debug, thiserror::Error)]
pub enum GetRecordError {
    #[error("{0}")]
    InvalidTable(String),
    #[error("Record not found")]
    NotFound,
    #[error("Record store error: {0}")]
    Store(#[from] anyhow::Error),
}

pub async fn handle(
    records: Arc<dyn RecordStore>,
    query: GetRecordQuery,
) -> Result<RecordStatusView, GetRecordError> {
    let table = query
        .table
        .parse::<RecordTable>()
        .map_err(|e| GetRecordError::InvalidTable(e.to_string()))?;
    let key = RecordKey::new(table, query.record_id);

    let record = records.load(&key).await?.ok_or(GetRecordError::NotFound)?;

    Ok(RecordStatusView {
        table: table.as_str().to_string(),
        record_id: key.record_id,
        status: record.status.as_str().to_string(),
        progress: record.progress,
        progress_step: record.progress_step,
        total_frames: record.total_frames,
        constraint_status: record.constraint_status.map(|c| c.as_str().to_string()),
        last_heartbeat_at: record.last_heartbeat_at,
    })
}
