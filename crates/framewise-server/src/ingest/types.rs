//! Shared ingestion types: record kinds, statuses and pipeline steps

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Unknown enum label read from a payload or a row
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unknown {kind} '{value}'")]
pub struct UnknownVariant {
    pub kind: &'static str,
    pub value: String,
}

impl UnknownVariant {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The two record kinds a frame-extraction job can belong to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordTable {
    CourseProcessing,
    ModuleProcessing,
}

impl RecordTable {
    /// Table name; also safe to splice into SQL.
    pub fn as_str(&self) -> &'static str {
        match self {
            RecordTable::CourseProcessing => "course_processing",
            RecordTable::ModuleProcessing => "module_processing",
        }
    }
}

impl FromStr for RecordTable {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "course_processing" => Ok(RecordTable::CourseProcessing),
            "module_processing" => Ok(RecordTable::ModuleProcessing),
            other => Err(UnknownVariant::new("table", other)),
        }
    }
}

impl fmt::Display for RecordTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Identity of one processing record
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RecordKey {
    pub table: RecordTable,
    pub record_id: String,
}

impl RecordKey {
    pub fn new(table: RecordTable, record_id: impl Into<String>) -> Self {
        Self {
            table,
            record_id: record_id.into(),
        }
    }
}

impl fmt::Display for RecordKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.table, self.record_id)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RecordStatus {
    Pending,
    AwaitingWebhook,
    Processing,
    Completed,
    Failed,
    NeedsReview,
}

impl RecordStatus {
    /// Statuses a frame write from the webhook may land on.
    pub const WRITABLE: [RecordStatus; 2] = [RecordStatus::AwaitingWebhook, RecordStatus::Processing];

    /// Statuses that may still be moved to `needs_review`.
    pub const ESCALATABLE: [RecordStatus; 4] = [
        RecordStatus::Pending,
        RecordStatus::AwaitingWebhook,
        RecordStatus::Processing,
        RecordStatus::Failed,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            RecordStatus::Pending => "pending",
            RecordStatus::AwaitingWebhook => "awaiting_webhook",
            RecordStatus::Processing => "processing",
            RecordStatus::Completed => "completed",
            RecordStatus::Failed => "failed",
            RecordStatus::NeedsReview => "needs_review",
        }
    }
}

impl FromStr for RecordStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RecordStatus::Pending),
            "awaiting_webhook" => Ok(RecordStatus::AwaitingWebhook),
            "processing" => Ok(RecordStatus::Processing),
            "completed" => Ok(RecordStatus::Completed),
            "failed" => Ok(RecordStatus::Failed),
            "needs_review" => Ok(RecordStatus::NeedsReview),
            other => Err(UnknownVariant::new("record status", other)),
        }
    }
}

/// How well the stored frames cover the video
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConstraintStatus {
    Satisfied,
    /// Some sampled frames could not be persisted.
    PartialCoverage,
    /// Nothing was persisted; ephemeral URLs stored and need re-checking.
    PendingCheck,
}

impl ConstraintStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ConstraintStatus::Satisfied => "satisfied",
            ConstraintStatus::PartialCoverage => "partial_coverage",
            ConstraintStatus::PendingCheck => "pending_check",
        }
    }
}

impl FromStr for ConstraintStatus {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "satisfied" => Ok(ConstraintStatus::Satisfied),
            "partial_coverage" => Ok(ConstraintStatus::PartialCoverage),
            "pending_check" => Ok(ConstraintStatus::PendingCheck),
            other => Err(UnknownVariant::new("constraint status", other)),
        }
    }
}

/// Steps of the processing pipeline, in order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStep {
    ExtractFrames,
    AnalyzeContent,
    GenerateDocument,
}

impl PipelineStep {
    pub fn as_str(&self) -> &'static str {
        match self {
            PipelineStep::ExtractFrames => "extract_frames",
            PipelineStep::AnalyzeContent => "analyze_content",
            PipelineStep::GenerateDocument => "generate_document",
        }
    }

    pub fn next(&self) -> Option<PipelineStep> {
        match self {
            PipelineStep::ExtractFrames => Some(PipelineStep::AnalyzeContent),
            PipelineStep::AnalyzeContent => Some(PipelineStep::GenerateDocument),
            PipelineStep::GenerateDocument => None,
        }
    }

    /// Coarse progress once this step has finished.
    pub fn progress(&self) -> i32 {
        match self {
            PipelineStep::ExtractFrames => 40,
            PipelineStep::AnalyzeContent => 70,
            PipelineStep::GenerateDocument => 100,
        }
    }

    /// Whether the step wants the transcript before it runs.
    pub fn requires_transcript(&self) -> bool {
        matches!(self, PipelineStep::AnalyzeContent)
    }
}

impl FromStr for PipelineStep {
    type Err = UnknownVariant;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "extract_frames" => Ok(PipelineStep::ExtractFrames),
            "analyze_content" => Ok(PipelineStep::AnalyzeContent),
            "generate_document" => Ok(PipelineStep::GenerateDocument),
            other => Err(UnknownVariant::new("step", other)),
        }
    }
}

impl fmt::Display for PipelineStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The fields of a processing record the ingestion path reads and writes
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProcessingRecord {
    pub status: RecordStatus,
    /// Durable frame URLs, except after a total persistence failure
    /// (`constraint_status = pending_check`).
    pub frame_urls: Vec<String>,
    pub total_frames: i32,
    pub progress: i32,
    pub progress_step: Option<String>,
    pub constraint_status: Option<ConstraintStatus>,
    pub last_heartbeat_at: Option<DateTime<Utc>>,
    pub transcript: Option<String>,
    pub video_duration_seconds: Option<f64>,
}

impl ProcessingRecord {
    /// A fresh record waiting on the extraction provider.
    pub fn awaiting_webhook() -> Self {
        Self {
            status: RecordStatus::AwaitingWebhook,
            frame_urls: Vec::new(),
            total_frames: 0,
            progress: 0,
            progress_step: None,
            constraint_status: None,
            last_heartbeat_at: None,
            transcript: None,
            video_duration_seconds: None,
        }
    }

    pub fn has_transcript(&self) -> bool {
        self.transcript.as_deref().is_some_and(|t| !t.trim().is_empty())
    }
}

/// Full frame write applied after persistence
#[derive(Debug, Clone, PartialEq)]
pub struct FrameUpdate {
    pub frame_urls: Vec<String>,
    pub total_frames: i32,
    pub progress: i32,
    pub progress_step: String,
    pub status: RecordStatus,
    pub constraint_status: ConstraintStatus,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn test_pipeline_order() {
        let mut step = PipelineStep::ExtractFrames;
        let mut seen = vec![step];
        while let Some(next) = step.next() {
            assert!(next.progress() > step.progress());
            seen.push(next);
            step = next;
        }
        assert_eq!(seen.len(), 3);
        assert_eq!(step.progress(), 100);
    }

    #[test]
    fn test_only_analysis_needs_transcript() {
        assert!(!PipelineStep::ExtractFrames.requires_transcript());
        assert!(PipelineStep::AnalyzeContent.requires_transcript());
        assert!(!PipelineStep::GenerateDocument.requires_transcript());
    }

    #[test]
    fn test_labels_parse_back() {
        for status in [
            RecordStatus::Pending,
            RecordStatus::AwaitingWebhook,
            RecordStatus::Processing,
            RecordStatus::Completed,
            RecordStatus::Failed,
            RecordStatus::NeedsReview,
        ] {
            assert_eq!(status.as_str().parse::<RecordStatus>(), Ok(status));
        }
        assert_eq!(
            "module_processing".parse::<RecordTable>(),
            Ok(RecordTable::ModuleProcessing)
        );
    }

    #[test]
    fn test_unknown_table_rejected() {
        let err = "lesson_processing".parse::<RecordTable>().unwrap_err();
        assert_eq!(err.to_string(), "unknown table 'lesson_processing'");
    }

    #[test]
    fn test_blank_transcript_is_absent() {
        let mut record = ProcessingRecord::awaiting_webhook();
        assert!(!record.has_transcript());
        record.transcript = Some("  ".to_string());
        assert!(!record.has_transcript());
        record.transcript = Some("Welcome to module one".to_string());
        assert!(record.has_transcript());
    }
}
