//! Hand-off of provider failures to human review

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use reqwest::Client;
use serde::Serialize;
use std::time::Duration;

/// Source tag attached to every escalation raised by the webhook
pub const ESCALATION_SOURCE: &str = "frame_extraction_webhook";

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct EscalationRequest {
    pub entity_id: String,
    pub step: String,
    pub error_message: String,
    pub attempt_count: u32,
    pub source: String,
}

#[async_trait]
pub trait Escalator: Send + Sync {
    async fn escalate(&self, request: &EscalationRequest) -> Result<()>;
}

/// Posts escalation requests as JSON to a notification endpoint
#[derive(Clone)]
pub struct HttpEscalator {
    client: Client,
    url: String,
}

impl HttpEscalator {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .context("Failed to build escalation HTTP client")?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }
}

#[async_trait]
impl Escalator for HttpEscalator {
    async fn escalate(&self, request: &EscalationRequest) -> Result<()> {
        let response = self
            .client
            .post(&self.url)
            .json(request)
            .send()
            .await
            .with_context(|| format!("Failed to reach escalation endpoint {}", self.url))?;

        if !response.status().is_success() {
            bail!("Escalation endpoint answered {}", response.status());
        }

        Ok(())
    }
}
