//! Provider notification decoding
//!
//! The extraction provider posts one JSON document per status change. The
//! document is decoded into a tagged union on `status`, then its
//! `input.webhook_metadata` is validated into a [`Correlation`]. Anything
//! that fails either stage is dropped by the handler, never retried.

use serde::Deserialize;
use thiserror::Error;

use super::types::{PipelineStep, RecordKey, RecordTable};

/// Why a notification was dropped
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PayloadError {
    #[error("malformed payload: {0}")]
    Malformed(String),

    #[error("missing correlation field '{0}'")]
    MissingField(&'static str),

    #[error("invalid correlation field '{field}': {reason}")]
    InvalidField { field: &'static str, reason: String },
}

/// A provider status notification
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "status", rename_all = "lowercase")]
pub enum ProviderNotification {
    Starting(ProgressNotice),
    Processing(ProgressNotice),
    Succeeded(SucceededNotice),
    Failed(FailureNotice),
    Canceled(FailureNotice),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProgressNotice {
    pub id: String,
    pub input: ProviderInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SucceededNotice {
    pub id: String,
    /// Ephemeral asset URLs in frame order
    #[serde(default)]
    pub output: Option<Vec<String>>,
    pub input: ProviderInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct FailureNotice {
    pub id: String,
    #[serde(default)]
    pub error: Option<String>,
    pub input: ProviderInput,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ProviderInput {
    pub webhook_metadata: WebhookMetadata,
}

/// Correlation metadata echoed back by the provider, as sent
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookMetadata {
    #[serde(default)]
    pub course_id: Option<String>,
    #[serde(default)]
    pub module_id: Option<String>,
    #[serde(default)]
    pub record_id: Option<String>,
    #[serde(default)]
    pub table_name: Option<String>,
    #[serde(default)]
    pub step: Option<String>,
    #[serde(default)]
    pub module_number: Option<i64>,
    #[serde(default)]
    pub fps: Option<f64>,
}

/// Validated correlation of a notification to one processing record
#[derive(Debug, Clone, PartialEq)]
pub struct Correlation {
    pub provider_job_id: String,
    /// Owning course
    pub entity_id: String,
    pub module_id: Option<String>,
    pub key: RecordKey,
    pub step: PipelineStep,
    pub module_number: Option<i64>,
    pub fps: Option<f64>,
}

impl ProviderNotification {
    pub fn decode(body: &[u8]) -> Result<Self, PayloadError> {
        serde_json::from_slice(body).map_err(|e| PayloadError::Malformed(e.to_string()))
    }

    pub fn status(&self) -> &'static str {
        match self {
            ProviderNotification::Starting(_) => "starting",
            ProviderNotification::Processing(_) => "processing",
            ProviderNotification::Succeeded(_) => "succeeded",
            ProviderNotification::Failed(_) => "failed",
            ProviderNotification::Canceled(_) => "canceled",
        }
    }

    fn parts(&self) -> (&str, &WebhookMetadata) {
        match self {
            ProviderNotification::Starting(n) | ProviderNotification::Processing(n) => {
                (&n.id, &n.input.webhook_metadata)
            },
            ProviderNotification::Succeeded(n) => (&n.id, &n.input.webhook_metadata),
            ProviderNotification::Failed(n) | ProviderNotification::Canceled(n) => {
                (&n.id, &n.input.webhook_metadata)
            },
        }
    }

    pub fn correlation(&self) -> Result<Correlation, PayloadError> {
        let (id, metadata) = self.parts();
        metadata.validate(id)
    }
}

impl WebhookMetadata {
    pub fn validate(&self, provider_job_id: &str) -> Result<Correlation, PayloadError> {
        let entity_id = required("courseId", &self.course_id)?;
        let record_id = required("recordId", &self.record_id)?;
        let table = required("tableName", &self.table_name)?
            .parse::<RecordTable>()
            .map_err(|e| PayloadError::InvalidField {
                field: "tableName",
                reason: e.to_string(),
            })?;
        let step = required("step", &self.step)?
            .parse::<PipelineStep>()
            .map_err(|e| PayloadError::InvalidField {
                field: "step",
                reason: e.to_string(),
            })?;

        let fps = match self.fps {
            Some(fps) if !fps.is_finite() || fps <= 0.0 => {
                return Err(PayloadError::InvalidField {
                    field: "fps",
                    reason: format!("expected a positive rate, got {}", fps),
                });
            },
            other => other,
        };

        Ok(Correlation {
            provider_job_id: provider_job_id.to_string(),
            entity_id,
            module_id: self
                .module_id
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            key: RecordKey::new(table, record_id),
            step,
            module_number: self.module_number,
            fps,
        })
    }
}

fn required(field: &'static str, value: &Option<String>) -> Result<String, PayloadError> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .ok_or(PayloadError::MissingField(field))
}
