//! End-to-end webhook handling against in-memory collaborators

#![allow(clippy::unwrap_used, clippy::expect_used)]

mod common;

use common::*;
use framewise_server::config::IngestionConfig;
use framewise_server::ingest::memory::RecordingEscalator;
use framewise_server::ingest::escalation::ESCALATION_SOURCE;
use framewise_server::ingest::{
    ConstraintStatus, NudgeSender, PipelineStep, ProcessingRecord, QueueStatus, RecordStatus,
    Severity,
};
use serde_json::json;
use std::time::Duration;

async fn next_step_jobs(harness: &Harness) -> usize {
    harness
        .queue
        .jobs()
        .await
        .iter()
        .filter(|j| j.step == PipelineStep::AnalyzeContent && j.status == QueueStatus::Pending)
        .count()
}

// ============================================================================
// Succeeded notifications
// ============================================================================

#[tokio::test]
async fn test_frames_persisted_and_pipeline_advanced() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness
        .queue
        .seed(COURSE_ID, key(), PipelineStep::ExtractFrames, QueueStatus::AwaitingWebhook, 1)
        .await;
    let urls = provider_urls(20);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_ingested"));
    assert_eq!(ack.frames_persisted, Some(20));
    assert_eq!(ack.total_frames, Some(20));
    assert_eq!(ack.degraded, Some(false));

    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.frame_urls.len(), 20);
    assert_eq!(record.total_frames, 20);
    assert_eq!(record.progress, 40);
    assert_eq!(record.progress_step.as_deref(), Some("extract_frames"));
    assert_eq!(record.constraint_status, Some(ConstraintStatus::Satisfied));
    assert_eq!(
        record.frame_urls[0],
        "https://durable.test/frames/rec-1/frame-00001.jpg"
    );
    assert!(record.frame_urls.iter().all(|u| u.starts_with("https://durable.test/")));

    let jobs = harness.queue.jobs().await;
    let extract = jobs
        .iter()
        .find(|j| j.step == PipelineStep::ExtractFrames)
        .unwrap();
    assert_eq!(extract.status, QueueStatus::Completed);
    let next = jobs
        .iter()
        .find(|j| j.step == PipelineStep::AnalyzeContent)
        .unwrap();
    assert_eq!(next.status, QueueStatus::Pending);
    assert_eq!(next.entity_id, COURSE_ID);
    assert_eq!(next.payload["courseId"], COURSE_ID);
    assert_eq!(next.payload["providerJobId"], "pred-ok");
    assert_eq!(next.payload["degraded"], false);

    assert!(harness.violations.entries().await.is_empty());
}

#[tokio::test]
async fn test_duplicate_delivery_writes_once() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(20);
    harness.serve(&urls).await;

    let first = harness.handler.handle(&succeeded(&urls)).await;
    let second = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(first.reason.as_deref(), Some("frames_ingested"));
    assert!(second.is_skipped());
    assert_eq!(second.reason.as_deref(), Some("duplicate"));
    assert_eq!(second.total_frames, Some(20));
    assert_eq!(harness.records.frame_write_count(), 1);
    assert_eq!(next_step_jobs(&harness).await, 1);
}

#[tokio::test]
async fn test_hour_long_video_keeps_evenly_spread_frames() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            video_duration_seconds: Some(3600.0),
            ..ready_record()
        })
        .await;
    let urls = provider_urls(3600);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.frames_persisted, Some(150));
    let record = harness.record().await;
    assert_eq!(record.frame_urls.len(), 150);
    assert_eq!(record.total_frames, 150);
    assert_eq!(harness.objects.len().await, 150);

    // frame 1 comes from the start of the video, frame 150 from its last 24 raw frames
    let first = harness.objects.get("rec-1/frame-00001.jpg").await.unwrap();
    assert_eq!(first.data, jpeg(0));
    assert_eq!(first.content_type, "image/jpeg");
    let last = harness.objects.get("rec-1/frame-00150.jpg").await.unwrap();
    assert_eq!(last.data, jpeg(3576));
}

#[tokio::test]
async fn test_fps_hint_sets_duration_when_record_has_none() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    // 7200 raw frames at 2 fps is one hour
    let urls = provider_urls(7200);
    harness.serve(&urls).await;
    let body = serde_json::to_vec(&json!({
        "id": "pred-fps",
        "status": "succeeded",
        "output": urls,
        "input": { "webhook_metadata": {
            "courseId": COURSE_ID,
            "recordId": RECORD_ID,
            "tableName": "course_processing",
            "step": "extract_frames",
            "fps": 2.0
        }}
    }))
    .unwrap();

    harness.handler.handle(&body).await;

    assert_eq!(harness.record().await.frame_urls.len(), 150);
}

#[tokio::test]
async fn test_nothing_fetchable_stores_ephemeral_urls() {
    let capture = LogCapture::default();
    let _guard = capture.install();

    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(20);

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.frames_persisted, Some(0));
    assert_eq!(ack.total_frames, Some(20));
    let record = harness.record().await;
    assert_eq!(record.frame_urls, urls);
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.constraint_status, Some(ConstraintStatus::PendingCheck));
    assert!(harness.objects.is_empty().await);

    let logs = capture.contents();
    assert!(logs
        .lines()
        .any(|l| l.contains("ERROR") && l.contains("No frames persisted")));
}

#[tokio::test]
async fn test_object_store_outage_falls_back_to_ephemeral_urls() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(12);
    harness.serve(&urls).await;
    harness.objects.set_failing(true);

    harness.handler.handle(&succeeded(&urls)).await;

    let record = harness.record().await;
    assert_eq!(record.frame_urls, urls);
    assert_eq!(record.constraint_status, Some(ConstraintStatus::PendingCheck));
}

#[tokio::test]
async fn test_partial_persistence_records_coverage() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(20);
    harness.serve(&urls[..15]).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.frames_persisted, Some(15));
    assert_eq!(ack.total_frames, Some(15));
    let record = harness.record().await;
    assert_eq!(record.frame_urls.len(), 15);
    assert_eq!(record.constraint_status, Some(ConstraintStatus::PartialCoverage));
    assert!(record.frame_urls.iter().all(|u| u.starts_with("https://durable.test/")));
    assert_eq!(
        record.frame_urls.last().map(String::as_str),
        Some("https://durable.test/frames/rec-1/frame-00015.jpg")
    );
}

#[tokio::test]
async fn test_completed_record_short_of_frames_is_recovered() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Completed,
            frame_urls: provider_urls(5),
            total_frames: 5,
            ..ready_record()
        })
        .await;
    let urls = provider_urls(20);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_ingested"));
    assert_eq!(harness.record().await.frame_urls.len(), 20);
    assert_eq!(harness.records.frame_write_count(), 1);
}

#[tokio::test]
async fn test_recovery_with_nothing_fetchable_keeps_durable_frames() {
    let harness = Harness::new();
    let durable: Vec<String> = (1..=5)
        .map(|i| format!("https://durable.test/frames/rec-1/frame-{:05}.jpg", i))
        .collect();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Completed,
            frame_urls: durable.clone(),
            total_frames: 5,
            constraint_status: Some(ConstraintStatus::PartialCoverage),
            ..ready_record()
        })
        .await;
    let urls = provider_urls(20);

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_kept"));
    assert_eq!(ack.frames_persisted, Some(0));
    assert_eq!(ack.total_frames, Some(5));
    assert_eq!(ack.degraded, Some(true));
    let record = harness.record().await;
    assert_eq!(record.frame_urls, durable);
    assert_eq!(record.constraint_status, Some(ConstraintStatus::PartialCoverage));
    assert_eq!(harness.records.frame_write_count(), 0);
    assert_eq!(next_step_jobs(&harness).await, 0);
}

#[tokio::test]
async fn test_recovery_persisting_fewer_than_stored_keeps_durable_frames() {
    let harness = Harness::new();
    let durable: Vec<String> = (1..=5)
        .map(|i| format!("https://durable.test/frames/rec-1/frame-{:05}.jpg", i))
        .collect();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Completed,
            frame_urls: durable.clone(),
            total_frames: 5,
            ..ready_record()
        })
        .await;
    let urls = provider_urls(20);
    harness.serve(&urls[..3]).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_kept"));
    assert_eq!(ack.frames_persisted, Some(3));
    assert_eq!(harness.record().await.frame_urls, durable);
    assert_eq!(harness.records.frame_write_count(), 0);
}

#[tokio::test]
async fn test_handler_future_runs_on_spawned_task() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;
    let records = harness.records.clone();
    let handler = std::sync::Arc::new(harness.handler);
    let body = succeeded(&urls);

    let ack = tokio::spawn(async move { handler.handle(&body).await })
        .await
        .unwrap();

    assert_eq!(ack.frames_persisted, Some(4));
    assert_eq!(records.get(&key()).await.unwrap().frame_urls.len(), 4);
}

#[tokio::test]
async fn test_missing_record_is_skipped() {
    let harness = Harness::new();
    let urls = provider_urls(3);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert!(ack.is_skipped());
    assert_eq!(ack.reason.as_deref(), Some("record_not_found"));
    assert!(harness.objects.is_empty().await);
}

#[tokio::test]
async fn test_empty_output_is_skipped() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;

    let ack = harness.handler.handle(&succeeded(&[])).await;

    assert_eq!(ack.reason.as_deref(), Some("no_output"));
    assert_eq!(harness.record().await.status, RecordStatus::AwaitingWebhook);
}

// ============================================================================
// Races with the watchdog
// ============================================================================

#[tokio::test]
async fn test_failed_record_with_frames_is_reconciled() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Failed,
            frame_urls: provider_urls(30),
            total_frames: 30,
            ..ready_record()
        })
        .await;
    let urls = provider_urls(30);

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("race_reconciled"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Processing);
    assert_eq!(record.frame_urls.len(), 30);
    assert_eq!(harness.records.frame_write_count(), 0);

    let violations = harness.violations.entries().await;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].violation_type, "race_condition");
    assert_eq!(violations[0].entity_id, RECORD_ID);
    assert_eq!(violations[0].severity, Severity::Error);

    assert_eq!(next_step_jobs(&harness).await, 1);
}

#[tokio::test]
async fn test_failed_record_without_frames_is_written() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Failed,
            ..ready_record()
        })
        .await;
    let urls = provider_urls(10);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_ingested"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.frame_urls.len(), 10);
    assert_eq!(harness.violations.entries().await.len(), 1);
}

#[tokio::test]
async fn test_failed_record_with_nothing_persisted_stays_failed() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Failed,
            ..ready_record()
        })
        .await;
    let urls = provider_urls(10);

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("record_failed"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Failed);
    assert!(record.frame_urls.is_empty());
    assert!(harness.violations.entries().await.is_empty());
    assert_eq!(harness.records.frame_write_count(), 0);
    assert_eq!(next_step_jobs(&harness).await, 0);
}

#[tokio::test]
async fn test_watchdog_failure_outranks_ephemeral_fallback() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness
        .records
        .schedule_watchdog(key(), RecordStatus::Failed)
        .await;
    let urls = provider_urls(8);

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("record_conflict"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Failed);
    assert!(record.frame_urls.is_empty());
    assert!(harness.violations.entries().await.is_empty());
}

#[tokio::test]
async fn test_watchdog_failing_record_mid_write() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness
        .records
        .schedule_watchdog(key(), RecordStatus::Failed)
        .await;
    let urls = provider_urls(8);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_ingested"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.frame_urls.len(), 8);

    let violations = harness.violations.entries().await;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].constraint_name, "failed_status_with_frames");
}

#[tokio::test]
async fn test_watchdog_moving_record_elsewhere_is_a_conflict() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness
        .records
        .schedule_watchdog(key(), RecordStatus::NeedsReview)
        .await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("record_conflict"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::NeedsReview);
    assert!(record.frame_urls.is_empty());
    assert_eq!(next_step_jobs(&harness).await, 0);
}

// ============================================================================
// Silent failures
// ============================================================================

#[tokio::test]
async fn test_failed_record_write_retries_minimal_update() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness.records.fail_next_frame_writes(1);
    let urls = provider_urls(6);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.reason.as_deref(), Some("frames_ingested"));
    let record = harness.record().await;
    assert_eq!(record.status, RecordStatus::Completed);
    assert_eq!(record.frame_urls.len(), 6);

    let violations = harness.violations.entries().await;
    assert_eq!(violations.len(), 1);
    assert_eq!(violations[0].violation_type, "silent_failure");
    assert_eq!(violations[0].severity, Severity::Critical);
}

#[tokio::test]
async fn test_minimal_update_failure_is_reported() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness.records.fail_next_frame_writes(2);
    let urls = provider_urls(6);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.processed, Some(false));
    assert!(ack.error.unwrap().contains("record update failed"));
    // frames stay in the object store for a later repair
    assert_eq!(harness.objects.len().await, 6);
    assert!(harness.record().await.frame_urls.is_empty());
    assert_eq!(next_step_jobs(&harness).await, 0);
}

// ============================================================================
// Transcript readiness
// ============================================================================

#[tokio::test]
async fn test_missing_transcript_marks_next_step_degraded() {
    let harness = Harness::new();
    harness.seed(ProcessingRecord::awaiting_webhook()).await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.degraded, Some(true));
    let jobs = harness.queue.jobs().await;
    let next = jobs
        .iter()
        .find(|j| j.step == PipelineStep::AnalyzeContent)
        .unwrap();
    assert_eq!(next.payload["degraded"], true);
}

#[tokio::test(start_paused = true)]
async fn test_transcript_arriving_within_poll_budget() {
    let harness = Harness::build(
        Some(RecordingEscalator::new()),
        IngestionConfig::default(),
        NudgeSender::disabled(),
    );
    harness.seed(ProcessingRecord::awaiting_webhook()).await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;

    let records = harness.records.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_secs(12)).await;
        records.set_transcript(&key(), "late transcript").await;
    });

    let ack = harness.handler.handle(&succeeded(&urls)).await;

    assert_eq!(ack.degraded, Some(false));
}

#[tokio::test(start_paused = true)]
async fn test_transcript_poll_is_bounded() {
    let harness = Harness::build(
        Some(RecordingEscalator::new()),
        IngestionConfig::default(),
        NudgeSender::disabled(),
    );
    harness.seed(ProcessingRecord::awaiting_webhook()).await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;

    let started = tokio::time::Instant::now();
    let ack = harness.handler.handle(&succeeded(&urls)).await;

    // six polls, five sleeps of five seconds
    assert_eq!(ack.degraded, Some(true));
    assert!(started.elapsed() >= Duration::from_secs(25));
    assert!(started.elapsed() < Duration::from_secs(30));
}

#[tokio::test]
async fn test_enqueued_step_nudges_worker() {
    let (nudges, mut rx) = NudgeSender::channel(4);
    let harness = Harness::build(Some(RecordingEscalator::new()), fast_config(), nudges);
    harness.seed(ready_record()).await;
    let urls = provider_urls(4);
    harness.serve(&urls).await;

    harness.handler.handle(&succeeded(&urls)).await;

    let nudge = rx.try_recv().unwrap();
    assert_eq!(nudge.step, PipelineStep::AnalyzeContent);
    assert_eq!(nudge.record_id, RECORD_ID);
    let jobs = harness.queue.jobs().await;
    assert!(jobs.iter().any(|j| j.id == nudge.job_id));
}

// ============================================================================
// Failure notifications
// ============================================================================

#[tokio::test]
async fn test_provider_failure_is_escalated() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    harness
        .queue
        .seed(COURSE_ID, key(), PipelineStep::ExtractFrames, QueueStatus::Processing, 3)
        .await;

    let ack = harness
        .handler
        .handle(&failed("failed", "CUDA out of memory"))
        .await;

    assert_eq!(ack.reason.as_deref(), Some("escalated"));
    assert_eq!(harness.record().await.status, RecordStatus::AwaitingWebhook);

    let jobs = harness.queue.jobs().await;
    assert_eq!(jobs[0].status, QueueStatus::Failed);
    assert_eq!(jobs[0].error.as_deref(), Some("CUDA out of memory"));

    let requests = harness.escalator.as_ref().unwrap().requests().await;
    assert_eq!(requests.len(), 1);
    assert_eq!(requests[0].entity_id, COURSE_ID);
    assert_eq!(requests[0].step, "extract_frames");
    assert_eq!(requests[0].error_message, "CUDA out of memory");
    assert_eq!(requests[0].attempt_count, 3);
    assert_eq!(requests[0].source, ESCALATION_SOURCE);
}

#[tokio::test]
async fn test_escalation_failure_marks_needs_review() {
    let harness = Harness::build(
        Some(RecordingEscalator::failing()),
        fast_config(),
        NudgeSender::disabled(),
    );
    harness.seed(ready_record()).await;

    let ack = harness.handler.handle(&failed("failed", "timeout")).await;

    assert_eq!(ack.reason.as_deref(), Some("needs_review"));
    assert_eq!(harness.record().await.status, RecordStatus::NeedsReview);
    assert_eq!(harness.escalator.as_ref().unwrap().requests().await.len(), 1);
}

#[tokio::test]
async fn test_missing_escalator_marks_needs_review() {
    let harness = Harness::build(None, fast_config(), NudgeSender::disabled());
    harness.seed(ready_record()).await;

    let ack = harness.handler.handle(&failed("canceled", "user abort")).await;

    assert_eq!(ack.reason.as_deref(), Some("needs_review"));
    assert_eq!(harness.record().await.status, RecordStatus::NeedsReview);
}

#[tokio::test]
async fn test_completed_record_is_not_sent_to_review() {
    let harness = Harness::build(None, fast_config(), NudgeSender::disabled());
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Completed,
            ..ready_record()
        })
        .await;

    let ack = harness.handler.handle(&failed("failed", "late failure")).await;

    assert_eq!(ack.reason.as_deref(), Some("needs_review_skipped"));
    assert_eq!(harness.record().await.status, RecordStatus::Completed);
}

#[tokio::test]
async fn test_cancel_without_message_uses_default() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let body = serde_json::to_vec(&json!({
        "id": "pred-c",
        "status": "canceled",
        "input": { "webhook_metadata": {
            "courseId": COURSE_ID,
            "recordId": RECORD_ID,
            "tableName": "course_processing",
            "step": "extract_frames"
        }}
    }))
    .unwrap();

    harness.handler.handle(&body).await;

    let requests = harness.escalator.as_ref().unwrap().requests().await;
    assert_eq!(requests[0].error_message, "provider job canceled");
}

// ============================================================================
// Progress and malformed notifications
// ============================================================================

#[tokio::test]
async fn test_progress_refreshes_heartbeat() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;

    let ack = harness.handler.handle(&progress("processing")).await;

    assert_eq!(ack.reason.as_deref(), Some("heartbeat"));
    let record = harness.record().await;
    assert!(record.last_heartbeat_at.is_some());
    assert_eq!(record.progress_step.as_deref(), Some("extract_frames"));
    assert_eq!(record.status, RecordStatus::AwaitingWebhook);
}

#[tokio::test]
async fn test_progress_for_finished_record_is_ignored() {
    let harness = Harness::new();
    harness
        .seed(ProcessingRecord {
            status: RecordStatus::Completed,
            ..ready_record()
        })
        .await;

    let ack = harness.handler.handle(&progress("starting")).await;

    assert_eq!(ack.reason.as_deref(), Some("heartbeat_ignored"));
    assert!(harness.record().await.last_heartbeat_at.is_none());
}

#[tokio::test]
async fn test_undecodable_body_is_skipped() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;

    let ack = harness.handler.handle(b"{not json").await;

    assert!(ack.received);
    assert!(ack.is_skipped());
    assert_eq!(harness.records.frame_write_count(), 0);
}

#[tokio::test]
async fn test_missing_record_id_is_skipped() {
    let harness = Harness::new();
    harness.seed(ready_record()).await;
    let urls = provider_urls(3);
    harness.serve(&urls).await;
    let body = serde_json::to_vec(&json!({
        "id": "pred-x",
        "status": "succeeded",
        "output": urls,
        "input": { "webhook_metadata": {
            "courseId": COURSE_ID,
            "tableName": "course_processing",
            "step": "extract_frames"
        }}
    }))
    .unwrap();

    let ack = harness.handler.handle(&body).await;

    assert!(ack.is_skipped());
    assert!(ack.reason.unwrap().contains("recordId"));
    assert!(harness.objects.is_empty().await);
    assert!(harness.queue.jobs().await.is_empty());
}
