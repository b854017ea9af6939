//! Work queue contract: insert pending jobs, conditional status transitions

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;
use uuid::Uuid;

use super::types::{PipelineStep, RecordKey};

/// Queue row statuses
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueStatus {
    Pending,
    AwaitingWebhook,
    Processing,
    Completed,
    Failed,
}

impl QueueStatus {
    /// Rows a webhook may complete or fail.
    pub const IN_FLIGHT: [QueueStatus; 2] = [QueueStatus::AwaitingWebhook, QueueStatus::Processing];

    pub fn as_str(&self) -> &'static str {
        match self {
            QueueStatus::Pending => "pending",
            QueueStatus::AwaitingWebhook => "awaiting_webhook",
            QueueStatus::Processing => "processing",
            QueueStatus::Completed => "completed",
            QueueStatus::Failed => "failed",
        }
    }
}

/// A job to enqueue for the next pipeline step
#[derive(Debug, Clone, PartialEq)]
pub struct NewJob {
    pub entity_id: String,
    pub key: RecordKey,
    pub step: PipelineStep,
    pub payload: serde_json::Value,
}

#[async_trait]
pub trait WorkQueue: Send + Sync {
    /// Mark the in-flight row for `key`/`step` completed.
    async fn complete(&self, key: &RecordKey, step: PipelineStep) -> Result<u64>;

    /// Mark the in-flight row for `key`/`step` failed with `error`.
    async fn fail(&self, key: &RecordKey, step: PipelineStep, error: &str) -> Result<u64>;

    /// Insert a pending job and return its id.
    async fn enqueue(&self, job: &NewJob) -> Result<Uuid>;

    /// Attempts recorded on the most recent row for `key`/`step`.
    async fn attempt_count(&self, key: &RecordKey, step: PipelineStep) -> Result<u32>;
}

fn in_flight_labels() -> Vec<String> {
    QueueStatus::IN_FLIGHT
        .iter()
        .map(|s| s.as_str().to_string())
        .collect()
}

#[derive(Clone)]
pub struct PgWorkQueue {
    pool: PgPool,
}

impl PgWorkQueue {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl WorkQueue for PgWorkQueue {
    async fn complete(&self, key: &RecordKey, step: PipelineStep) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = $4, completed_at = NOW(), updated_at = NOW()
            WHERE record_table = $1 AND record_id = $2 AND step = $3
              AND status = ANY($5)
            "#,
        )
        .bind(key.table.as_str())
        .bind(&key.record_id)
        .bind(step.as_str())
        .bind(QueueStatus::Completed.as_str())
        .bind(in_flight_labels())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to complete {} for {}", step, key))?;

        Ok(result.rows_affected())
    }

    async fn fail(&self, key: &RecordKey, step: PipelineStep, error: &str) -> Result<u64> {
        let result = sqlx::query(
            r#"
            UPDATE job_queue
            SET status = $4, error_message = $5, updated_at = NOW()
            WHERE record_table = $1 AND record_id = $2 AND step = $3
              AND status = ANY($6)
            "#,
        )
        .bind(key.table.as_str())
        .bind(&key.record_id)
        .bind(step.as_str())
        .bind(QueueStatus::Failed.as_str())
        .bind(error)
        .bind(in_flight_labels())
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to fail {} for {}", step, key))?;

        Ok(result.rows_affected())
    }

    async fn enqueue(&self, job: &NewJob) -> Result<Uuid> {
        let id = Uuid::new_v4();
        sqlx::query(
            r#"
            INSERT INTO job_queue (id, entity_id, record_table, record_id, step, status, payload)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(id)
        .bind(&job.entity_id)
        .bind(job.key.table.as_str())
        .bind(&job.key.record_id)
        .bind(job.step.as_str())
        .bind(QueueStatus::Pending.as_str())
        .bind(&job.payload)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to enqueue {} for {}", job.step, job.key))?;

        Ok(id)
    }

    async fn attempt_count(&self, key: &RecordKey, step: PipelineStep) -> Result<u32> {
        let attempts: Option<i32> = sqlx::query_scalar(
            r#"
            SELECT attempts FROM job_queue
            WHERE record_table = $1 AND record_id = $2 AND step = $3
            ORDER BY created_at DESC
            LIMIT 1
            "#,
        )
        .bind(key.table.as_str())
        .bind(&key.record_id)
        .bind(step.as_str())
        .fetch_optional(&self.pool)
        .await
        .with_context(|| format!("Failed to read attempts of {} for {}", step, key))?;

        Ok(attempts.map_or(0, |a| a.max(0) as u32))
    }
}
