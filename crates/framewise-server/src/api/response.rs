//! API response types

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};

/// Standard success response wrapper
#[derive(Debug, Serialize)]
pub struct ApiResponse<T> {
    pub success: bool,
    pub data: T,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn success(data: T) -> Self {
        Self {
            success: true,
            data,
        }
    }
}

impl<T: Serialize> IntoResponse for ApiResponse<T> {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}

/// Webhook acknowledgement
///
/// Always sent with `200 OK`. The fields, not the status code, tell the
/// provider what happened, so a malformed or duplicate delivery is never
/// retried.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub processed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub skipped: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frames_persisted: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub total_frames: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub degraded: Option<bool>,
}

impl WebhookAck {
    fn received() -> Self {
        Self {
            received: true,
            ..Default::default()
        }
    }

    /// Dropped without touching any state.
    pub fn skipped(reason: impl Into<String>) -> Self {
        Self {
            skipped: Some(true),
            reason: Some(reason.into()),
            ..Self::received()
        }
    }

    pub fn processed(reason: impl Into<String>) -> Self {
        Self {
            processed: Some(true),
            reason: Some(reason.into()),
            ..Self::received()
        }
    }

    /// An internal failure the provider should not retry on its own.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            processed: Some(false),
            error: Some(message.into()),
            ..Self::received()
        }
    }

    pub fn with_frames(mut self, persisted: usize, total: usize) -> Self {
        self.frames_persisted = Some(persisted);
        self.total_frames = Some(total);
        self
    }

    pub fn with_degraded(mut self, degraded: bool) -> Self {
        self.degraded = Some(degraded);
        self
    }

    pub fn with_error(mut self, message: impl Into<String>) -> Self {
        self.error = Some(message.into());
        self
    }

    pub fn is_skipped(&self) -> bool {
        self.skipped == Some(true)
    }
}

impl IntoResponse for WebhookAck {
    fn into_response(self) -> Response {
        (StatusCode::OK, Json(self)).into_response()
    }
}
