//! Frame-extraction webhook handling
//!
//! The handler keeps no state between requests. Everything it knows comes
//! from the processing record, which a watchdog may rewrite at any moment,
//! so every write is a compare-and-update and a zero-row result is logged
//! and re-examined instead of being taken as success.

use anyhow::anyhow;
use std::sync::Arc;
use tracing::{debug, error, info, info_span, warn, Instrument};

use super::escalation::{EscalationRequest, Escalator, ESCALATION_SOURCE};
use super::nudge::{NudgeSender, WorkerNudge};
use super::payload::{Correlation, ProviderNotification};
use super::persistor::{AssetFetcher, FramePersistor, ObjectStore};
use super::queue::{NewJob, WorkQueue};
use super::records::RecordStore;
use super::sampling::{duration_minutes, sample_evenly, target_frame_count};
use super::types::{ConstraintStatus, FrameUpdate, PipelineStep, RecordKey, RecordStatus};
use super::violations::{Severity, Violation, ViolationLog};
use crate::api::response::WebhookAck;
use crate::config::IngestionConfig;

/// Everything the handler talks to
#[derive(Clone)]
pub struct Collaborators {
    pub records: Arc<dyn RecordStore>,
    pub queue: Arc<dyn WorkQueue>,
    pub violations: Arc<dyn ViolationLog>,
    /// `None` sends provider failures straight to `needs_review`.
    pub escalator: Option<Arc<dyn Escalator>>,
    pub fetcher: Arc<dyn AssetFetcher>,
    pub objects: Arc<dyn ObjectStore>,
}

/// Result of a guarded frame write
enum WriteOutcome {
    Written,
    /// The record left the expected statuses; nothing was written.
    Conflict,
    Failed(String),
}

#[derive(Default)]
struct Advance {
    degraded: bool,
    error: Option<String>,
}

pub struct IngestionWebhookHandler {
    records: Arc<dyn RecordStore>,
    queue: Arc<dyn WorkQueue>,
    violations: Arc<dyn ViolationLog>,
    escalator: Option<Arc<dyn Escalator>>,
    persistor: FramePersistor,
    nudges: NudgeSender,
    config: IngestionConfig,
}

impl IngestionWebhookHandler {
    pub fn new(collaborators: Collaborators, nudges: NudgeSender, config: IngestionConfig) -> Self {
        let persistor = FramePersistor::new(
            collaborators.fetcher,
            collaborators.objects,
            config.persist_batch_size,
            config.persist_concurrency,
            config.default_content_type.clone(),
        );

        Self {
            records: collaborators.records,
            queue: collaborators.queue,
            violations: collaborators.violations,
            escalator: collaborators.escalator,
            persistor,
            nudges,
            config,
        }
    }

    pub fn records(&self) -> Arc<dyn RecordStore> {
        self.records.clone()
    }

    /// Handle one raw webhook body. Never fails; every outcome is an ack.
    pub async fn handle(&self, body: &[u8]) -> WebhookAck {
        let notification = match ProviderNotification::decode(body) {
            Ok(notification) => notification,
            Err(e) => {
                warn!(error = %e, "Dropping undecodable webhook");
                return WebhookAck::skipped(e.to_string());
            },
        };

        let correlation = match notification.correlation() {
            Ok(correlation) => correlation,
            Err(e) => {
                warn!(status = notification.status(), error = %e, "Dropping webhook without usable correlation");
                return WebhookAck::skipped(e.to_string());
            },
        };

        let span = info_span!(
            "frame_webhook",
            provider_job_id = %correlation.provider_job_id,
            record_id = %correlation.key.record_id,
            table = %correlation.key.table,
            step = %correlation.step,
        );

        async move {
            info!(status = notification.status(), "Webhook received");
            match notification {
                ProviderNotification::Starting(_) | ProviderNotification::Processing(_) => {
                    self.handle_progress(&correlation).await
                },
                ProviderNotification::Succeeded(notice) => {
                    self.handle_succeeded(&correlation, notice.output.unwrap_or_default())
                        .await
                },
                ProviderNotification::Failed(notice) => {
                    let message = notice
                        .error
                        .unwrap_or_else(|| "provider reported failure".to_string());
                    self.handle_failure(&correlation, message).await
                },
                ProviderNotification::Canceled(notice) => {
                    let message = notice
                        .error
                        .unwrap_or_else(|| "provider job canceled".to_string());
                    self.handle_failure(&correlation, message).await
                },
            }
        }
        .instrument(span)
        .await
    }

    async fn handle_progress(&self, correlation: &Correlation) -> WebhookAck {
        match self
            .records
            .touch_heartbeat(
                &correlation.key,
                correlation.step.as_str(),
                &RecordStatus::WRITABLE,
            )
            .await
        {
            Ok(0) => {
                warn!("Heartbeat matched no in-flight record");
                WebhookAck::processed("heartbeat_ignored")
            },
            Ok(_) => {
                debug!("Heartbeat refreshed");
                WebhookAck::processed("heartbeat")
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Heartbeat write failed");
                WebhookAck::error(format!("{:#}", e))
            },
        }
    }

    async fn handle_succeeded(&self, correlation: &Correlation, output: Vec<String>) -> WebhookAck {
        if correlation.step != PipelineStep::ExtractFrames {
            warn!("Succeeded webhook for a step that does not produce frames");
            return WebhookAck::skipped(format!(
                "step '{}' does not produce frames",
                correlation.step
            ));
        }
        if output.is_empty() {
            warn!("Succeeded webhook without output");
            return WebhookAck::skipped("no_output");
        }

        let record = match self.records.load(&correlation.key).await {
            Ok(Some(record)) => record,
            Ok(None) => {
                warn!("No processing record for webhook");
                return WebhookAck::skipped("record_not_found");
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to load processing record");
                return WebhookAck::error(format!("{:#}", e));
            },
        };

        let raw_count = output.len();
        let minutes = duration_minutes(record.video_duration_seconds, correlation.fps, raw_count);
        let target = target_frame_count(minutes, raw_count, &self.config);
        let sampled = sample_evenly(&output, target);
        let stored = record.frame_urls.len();

        let mut recovering = false;
        match record.status {
            RecordStatus::Failed if stored > 0 => {
                return self.reconcile_existing(correlation, stored).await;
            },
            RecordStatus::Completed if stored >= sampled.len() => {
                info!(stored, incoming = sampled.len(), "Duplicate delivery, nothing to do");
                return WebhookAck::skipped("duplicate").with_frames(0, stored);
            },
            RecordStatus::Completed => {
                warn!(stored, incoming = sampled.len(), "Completed record is short of frames, recovering");
                recovering = true;
            },
            _ => {},
        }

        info!(raw_count, target, duration_minutes = ?minutes, "Persisting sampled frames");
        let persisted = self
            .persistor
            .persist_all(&correlation.key.record_id, &sampled)
            .await;
        let persisted_count = persisted.len();

        if recovering && persisted_count <= stored {
            // the stored durable set is still the best copy
            warn!(
                stored,
                persisted = persisted_count,
                "Recovery persisted no more frames than stored, keeping stored frames"
            );
            return WebhookAck::processed("frames_kept")
                .with_frames(persisted_count, stored)
                .with_degraded(true);
        }

        if record.status == RecordStatus::Failed && persisted.is_empty() {
            warn!(
                requested = sampled.len(),
                "Record failed and no frames persisted, leaving failure in place"
            );
            return WebhookAck::processed("record_failed").with_frames(0, 0);
        }

        let (frame_urls, constraint_status) = if persisted.is_empty() {
            error!(
                requested = sampled.len(),
                "No frames persisted, storing ephemeral provider URLs"
            );
            (sampled.clone(), ConstraintStatus::PendingCheck)
        } else if persisted_count < sampled.len() {
            warn!(
                persisted = persisted_count,
                requested = sampled.len(),
                "Partial frame persistence"
            );
            (
                persisted.into_iter().map(|f| f.url).collect(),
                ConstraintStatus::PartialCoverage,
            )
        } else {
            (
                persisted.into_iter().map(|f| f.url).collect(),
                ConstraintStatus::Satisfied,
            )
        };

        if record.status == RecordStatus::Failed {
            // frames are durable now, so they outrank the failure marker
            self.reconcile_race(correlation, frame_urls.len()).await;
        }

        let mut expected = RecordStatus::WRITABLE.to_vec();
        if recovering {
            expected.push(RecordStatus::Completed);
        }

        let total_frames = frame_urls.len();
        let update = FrameUpdate {
            frame_urls,
            total_frames: total_frames as i32,
            progress: correlation.step.progress(),
            progress_step: correlation.step.as_str().to_string(),
            status: RecordStatus::Completed,
            constraint_status,
        };

        match self.write_frames(correlation, &update, &expected).await {
            WriteOutcome::Written => {},
            WriteOutcome::Conflict => {
                return WebhookAck::processed("record_conflict")
                    .with_frames(persisted_count, total_frames);
            },
            WriteOutcome::Failed(message) => {
                return WebhookAck::error(message).with_frames(persisted_count, total_frames);
            },
        }

        info!(
            persisted = persisted_count,
            total_frames,
            constraint_status = constraint_status.as_str(),
            "Frames recorded"
        );

        let advance = self.advance_pipeline(correlation).await;
        let ack = WebhookAck::processed("frames_ingested")
            .with_frames(persisted_count, total_frames)
            .with_degraded(advance.degraded);
        match advance.error {
            Some(message) => ack.with_error(message),
            None => ack,
        }
    }

    /// Write frames, re-checking the record when the write matches nothing.
    async fn write_frames(
        &self,
        correlation: &Correlation,
        update: &FrameUpdate,
        expected: &[RecordStatus],
    ) -> WriteOutcome {
        match self
            .records
            .write_frames(&correlation.key, update, expected)
            .await
        {
            Ok(0) => {},
            Ok(_) => return WriteOutcome::Written,
            Err(e) => return self.recover_silent_failure(correlation, update, expected, e).await,
        }

        warn!(frames = update.frame_urls.len(), "Frame write matched no rows");

        let current = match self.records.load(&correlation.key).await {
            Ok(current) => current,
            Err(e) => {
                error!(error = %format!("{:#}", e), "Failed to reload record after empty write");
                return WriteOutcome::Conflict;
            },
        };

        match current.map(|r| r.status) {
            // ephemeral URLs never outrank a failure marker
            Some(RecordStatus::Failed)
                if update.constraint_status == ConstraintStatus::PendingCheck =>
            {
                warn!("Record failed while only ephemeral URLs exist, frames not written");
                WriteOutcome::Conflict
            },
            Some(RecordStatus::Failed) => {
                if !self
                    .reconcile_race(correlation, update.frame_urls.len())
                    .await
                {
                    return WriteOutcome::Conflict;
                }
                match self
                    .records
                    .write_frames(&correlation.key, update, expected)
                    .await
                {
                    Ok(0) => {
                        warn!("Frame write matched no rows after reconciliation");
                        WriteOutcome::Conflict
                    },
                    Ok(_) => WriteOutcome::Written,
                    Err(e) => self.recover_silent_failure(correlation, update, expected, e).await,
                }
            },
            status => {
                warn!(status = ?status, "Record moved on, frames not written");
                WriteOutcome::Conflict
            },
        }
    }

    /// Frames are stored but the record write errored: log the bookkeeping
    /// violation and retry once with the minimal field set.
    async fn recover_silent_failure(
        &self,
        correlation: &Correlation,
        update: &FrameUpdate,
        expected: &[RecordStatus],
        err: anyhow::Error,
    ) -> WriteOutcome {
        error!(
            frames = update.frame_urls.len(),
            error = %format!("{:#}", err),
            "Silent failure: frames persisted but record write failed"
        );
        self.log_violation(Violation {
            entity_type: correlation.key.table.as_str().to_string(),
            entity_id: correlation.key.record_id.clone(),
            constraint_name: "frame_urls_recorded".to_string(),
            violation_type: "silent_failure".to_string(),
            expected_state: format!("frame_urls={}", update.frame_urls.len()),
            actual_state: format!("write_failed: {:#}", err),
            severity: Severity::Critical,
        })
        .await;

        match self
            .records
            .write_frames_minimal(&correlation.key, &update.frame_urls, update.status, expected)
            .await
        {
            Ok(0) => {
                warn!("Minimal frame write matched no rows");
                WriteOutcome::Conflict
            },
            Ok(_) => {
                warn!("Minimal frame write succeeded");
                WriteOutcome::Written
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Minimal frame write failed, giving up");
                WriteOutcome::Failed(format!("record update failed after persistence: {:#}", e))
            },
        }
    }

    /// Failed record that already holds frames: trust the frames.
    async fn reconcile_existing(&self, correlation: &Correlation, stored: usize) -> WebhookAck {
        if !self.reconcile_race(correlation, stored).await {
            return WebhookAck::processed("record_conflict").with_frames(0, stored);
        }

        let advance = self.advance_pipeline(correlation).await;
        let ack = WebhookAck::processed("race_reconciled")
            .with_frames(0, stored)
            .with_degraded(advance.degraded);
        match advance.error {
            Some(message) => ack.with_error(message),
            None => ack,
        }
    }

    /// Log the race and move the record from `failed` back to `processing`.
    async fn reconcile_race(&self, correlation: &Correlation, frames: usize) -> bool {
        error!(frames, "Record marked failed while frames exist, reconciling");
        self.log_violation(Violation {
            entity_type: correlation.key.table.as_str().to_string(),
            entity_id: correlation.key.record_id.clone(),
            constraint_name: "failed_status_with_frames".to_string(),
            violation_type: "race_condition".to_string(),
            expected_state: RecordStatus::Processing.as_str().to_string(),
            actual_state: format!("{} with {} frames", RecordStatus::Failed.as_str(), frames),
            severity: Severity::Error,
        })
        .await;

        match self
            .records
            .transition(&correlation.key, &[RecordStatus::Failed], RecordStatus::Processing)
            .await
        {
            Ok(0) => {
                warn!("Reconciliation matched no rows");
                false
            },
            Ok(_) => {
                info!("Record moved from failed back to processing");
                true
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Reconciliation write failed");
                false
            },
        }
    }

    /// Complete the current queue step and enqueue the next one.
    async fn advance_pipeline(&self, correlation: &Correlation) -> Advance {
        match self.queue.complete(&correlation.key, correlation.step).await {
            Ok(0) => warn!("No in-flight queue row to complete"),
            Ok(rows) => debug!(rows, "Queue step completed"),
            Err(e) => error!(error = %format!("{:#}", e), "Failed to complete queue step"),
        }

        let Some(next) = correlation.step.next() else {
            return Advance::default();
        };

        let degraded = next.requires_transcript() && !self.await_transcript(&correlation.key).await;
        if degraded {
            warn!(next_step = %next, "Transcript not ready, next step runs degraded");
        }

        let job = NewJob {
            entity_id: correlation.entity_id.clone(),
            key: correlation.key.clone(),
            step: next,
            payload: serde_json::json!({
                "courseId": correlation.entity_id,
                "moduleId": correlation.module_id,
                "moduleNumber": correlation.module_number,
                "providerJobId": correlation.provider_job_id,
                "degraded": degraded,
            }),
        };

        match self.queue.enqueue(&job).await {
            Ok(job_id) => {
                info!(%job_id, next_step = %next, degraded, "Next step enqueued");
                self.nudges.offer(WorkerNudge {
                    job_id,
                    step: next,
                    record_id: correlation.key.record_id.clone(),
                });
                Advance {
                    degraded,
                    error: None,
                }
            },
            Err(e) => {
                error!(next_step = %next, error = %format!("{:#}", e), "Failed to enqueue next step");
                Advance {
                    degraded,
                    error: Some(format!("failed to enqueue {}: {:#}", next, e)),
                }
            },
        }
    }

    /// Poll for the transcript within the fixed budget.
    async fn await_transcript(&self, key: &RecordKey) -> bool {
        let attempts = self.config.transcript_poll_attempts;
        for attempt in 1..=attempts {
            match self.records.load(key).await {
                Ok(Some(record)) if record.has_transcript() => return true,
                Ok(_) => {},
                Err(e) => warn!(attempt, error = %format!("{:#}", e), "Transcript poll failed"),
            }
            if attempt < attempts {
                debug!(attempt, attempts, "Transcript not ready yet");
                tokio::time::sleep(self.config.transcript_poll_interval()).await;
            }
        }
        false
    }

    async fn handle_failure(&self, correlation: &Correlation, message: String) -> WebhookAck {
        warn!(error = %message, "Provider reported failure");

        match self
            .queue
            .fail(&correlation.key, correlation.step, &message)
            .await
        {
            Ok(0) => warn!("No in-flight queue row to fail"),
            Ok(_) => {},
            Err(e) => error!(error = %format!("{:#}", e), "Failed to mark queue step failed"),
        }

        let attempt_count = self
            .queue
            .attempt_count(&correlation.key, correlation.step)
            .await
            .unwrap_or_else(|e| {
                warn!(error = %format!("{:#}", e), "Failed to read attempt count");
                0
            });

        let request = EscalationRequest {
            entity_id: correlation.entity_id.clone(),
            step: correlation.step.as_str().to_string(),
            error_message: message,
            attempt_count,
            source: ESCALATION_SOURCE.to_string(),
        };

        let escalated = match &self.escalator {
            Some(escalator) => escalator.escalate(&request).await,
            None => Err(anyhow!("no escalation endpoint configured")),
        };

        match escalated {
            Ok(()) => {
                info!(attempt_count, "Failure escalated for review");
                WebhookAck::processed("escalated")
            },
            Err(e) => {
                error!(error = %format!("{:#}", e), "Escalation failed, marking record for manual review");
                match self
                    .records
                    .transition(
                        &correlation.key,
                        &RecordStatus::ESCALATABLE,
                        RecordStatus::NeedsReview,
                    )
                    .await
                {
                    Ok(0) => {
                        warn!("Record not in a state that can move to needs_review");
                        WebhookAck::processed("needs_review_skipped")
                    },
                    Ok(_) => WebhookAck::processed("needs_review"),
                    Err(e) => {
                        error!(error = %format!("{:#}", e), "Failed to mark record for manual review");
                        WebhookAck::error(format!("{:#}", e))
                    },
                }
            },
        }
    }

    async fn log_violation(&self, violation: Violation) {
        error!(
            entity_type = %violation.entity_type,
            entity_id = %violation.entity_id,
            constraint_name = %violation.constraint_name,
            violation_type = %violation.violation_type,
            severity = violation.severity.as_str(),
            "Constraint violation"
        );
        if let Err(e) = self.violations.record(&violation).await {
            error!(error = %format!("{:#}", e), "Failed to record violation");
        }
    }
}
