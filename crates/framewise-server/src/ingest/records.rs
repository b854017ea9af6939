//! Processing record access
//!
//! Every mutating call is a compare-and-update: it names the statuses the
//! record must currently be in and returns the number of rows it changed.
//! Zero means another writer (usually the watchdog) got there first.

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::PgPool;

use super::types::{
    ConstraintStatus, FrameUpdate, ProcessingRecord, RecordKey, RecordStatus,
};

#[async_trait]
pub trait RecordStore: Send + Sync {
    async fn load(&self, key: &RecordKey) -> Result<Option<ProcessingRecord>>;

    /// Apply a full frame write. Also requires the stored frame list to be
    /// no longer than the new one.
    async fn write_frames(
        &self,
        key: &RecordKey,
        update: &FrameUpdate,
        expected: &[RecordStatus],
    ) -> Result<u64>;

    /// Reduced write of `frame_urls`, `total_frames` and `status` only.
    async fn write_frames_minimal(
        &self,
        key: &RecordKey,
        frame_urls: &[String],
        status: RecordStatus,
        expected: &[RecordStatus],
    ) -> Result<u64>;

    async fn transition(
        &self,
        key: &RecordKey,
        expected: &[RecordStatus],
        to: RecordStatus,
    ) -> Result<u64>;

    /// Refresh `last_heartbeat_at` and `progress_step`.
    async fn touch_heartbeat(
        &self,
        key: &RecordKey,
        progress_step: &str,
        expected: &[RecordStatus],
    ) -> Result<u64>;

    async fn ping(&self) -> Result<()> {
        Ok(())
    }
}

pub(crate) fn status_labels(statuses: &[RecordStatus]) -> Vec<String> {
    statuses.iter().map(|s| s.as_str().to_string()).collect()
}

/// Postgres-backed record store over `course_processing` and
/// `module_processing`
#[derive(Clone)]
pub struct PgRecordStore {
    pool: PgPool,
}

impl PgRecordStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[derive(sqlx::FromRow)]
struct RecordRow {
    status: String,
    frame_urls: Vec<String>,
    total_frames: i32,
    progress: i32,
    progress_step: Option<String>,
    constraint_status: Option<String>,
    last_heartbeat_at: Option<DateTime<Utc>>,
    transcript: Option<String>,
    video_duration_seconds: Option<f64>,
}

impl TryFrom<RecordRow> for ProcessingRecord {
    type Error = anyhow::Error;

    fn try_from(row: RecordRow) -> Result<Self> {
        Ok(ProcessingRecord {
            status: row.status.parse()?,
            frame_urls: row.frame_urls,
            total_frames: row.total_frames,
            progress: row.progress,
            progress_step: row.progress_step,
            constraint_status: row
                .constraint_status
                .as_deref()
                .map(str::parse::<ConstraintStatus>)
                .transpose()?,
            last_heartbeat_at: row.last_heartbeat_at,
            transcript: row.transcript,
            video_duration_seconds: row.video_duration_seconds,
        })
    }
}

#[async_trait]
impl RecordStore for PgRecordStore {
    async fn load(&self, key: &RecordKey) -> Result<Option<ProcessingRecord>> {
        let sql = format!(
            r#"
            SELECT status, frame_urls, total_frames, progress, progress_step,
                   constraint_status, last_heartbeat_at, transcript, video_duration_seconds
            FROM {}
            WHERE id = $1
            "#,
            key.table.as_str()
        );

        let row = sqlx::query_as::<_, RecordRow>(&sql)
            .bind(&key.record_id)
            .fetch_optional(&self.pool)
            .await
            .with_context(|| format!("Failed to load record {}", key))?;

        row.map(ProcessingRecord::try_from).transpose()
    }

    async fn write_frames(
        &self,
        key: &RecordKey,
        update: &FrameUpdate,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let sql = format!(
            r#"
            UPDATE {}
            SET frame_urls = $2,
                total_frames = $3,
                progress = $4,
                progress_step = $5,
                status = $6,
                constraint_status = $7,
                updated_at = NOW()
            WHERE id = $1
              AND status = ANY($8)
              AND COALESCE(array_length(frame_urls, 1), 0) <= $9
            "#,
            key.table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&key.record_id)
            .bind(&update.frame_urls)
            .bind(update.total_frames)
            .bind(update.progress)
            .bind(&update.progress_step)
            .bind(update.status.as_str())
            .bind(update.constraint_status.as_str())
            .bind(status_labels(expected))
            .bind(update.frame_urls.len() as i32)
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to write frames for {}", key))?;

        Ok(result.rows_affected())
    }

    async fn write_frames_minimal(
        &self,
        key: &RecordKey,
        frame_urls: &[String],
        status: RecordStatus,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let sql = format!(
            r#"
            UPDATE {}
            SET frame_urls = $2, total_frames = $3, status = $4
            WHERE id = $1
              AND status = ANY($5)
              AND COALESCE(array_length(frame_urls, 1), 0) <= $3
            "#,
            key.table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&key.record_id)
            .bind(frame_urls)
            .bind(frame_urls.len() as i32)
            .bind(status.as_str())
            .bind(status_labels(expected))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed minimal frame write for {}", key))?;

        Ok(result.rows_affected())
    }

    async fn transition(
        &self,
        key: &RecordKey,
        expected: &[RecordStatus],
        to: RecordStatus,
    ) -> Result<u64> {
        let sql = format!(
            "UPDATE {} SET status = $2, updated_at = NOW() WHERE id = $1 AND status = ANY($3)",
            key.table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&key.record_id)
            .bind(to.as_str())
            .bind(status_labels(expected))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to move {} to {}", key, to.as_str()))?;

        Ok(result.rows_affected())
    }

    async fn touch_heartbeat(
        &self,
        key: &RecordKey,
        progress_step: &str,
        expected: &[RecordStatus],
    ) -> Result<u64> {
        let sql = format!(
            r#"
            UPDATE {}
            SET last_heartbeat_at = NOW(), progress_step = $2
            WHERE id = $1 AND status = ANY($3)
            "#,
            key.table.as_str()
        );

        let result = sqlx::query(&sql)
            .bind(&key.record_id)
            .bind(progress_step)
            .bind(status_labels(expected))
            .execute(&self.pool)
            .await
            .with_context(|| format!("Failed to refresh heartbeat for {}", key))?;

        Ok(result.rows_affected())
    }

    async fn ping(&self) -> Result<()> {
        crate::db::health_check(&self.pool)
            .await
            .context("Record store unreachable")
    }
}
