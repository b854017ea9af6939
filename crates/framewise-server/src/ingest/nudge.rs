//! Best-effort worker wake-ups
//!
//! After a job is enqueued the handler offers a [`WorkerNudge`] on a bounded
//! channel. Delivery is at-most-once: when the channel is full or closed the
//! nudge is dropped and the worker picks the job up on its next poll.

use reqwest::Client;
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::task::JoinHandle;
use tracing::{debug, warn};
use uuid::Uuid;

use super::types::PipelineStep;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WorkerNudge {
    pub job_id: Uuid,
    pub step: PipelineStep,
    pub record_id: String,
}

#[derive(Debug, Clone)]
pub struct NudgeSender {
    tx: Option<mpsc::Sender<WorkerNudge>>,
}

impl NudgeSender {
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<WorkerNudge>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx: Some(tx) }, rx)
    }

    /// A sender that drops everything.
    pub fn disabled() -> Self {
        Self { tx: None }
    }

    /// Offer a nudge without waiting. Returns whether it was queued.
    pub fn offer(&self, nudge: WorkerNudge) -> bool {
        let Some(tx) = &self.tx else {
            debug!(job_id = %nudge.job_id, "Worker nudges disabled");
            return false;
        };

        match tx.try_send(nudge) {
            Ok(()) => true,
            Err(TrySendError::Full(nudge)) => {
                debug!(job_id = %nudge.job_id, "Nudge channel full, dropping nudge");
                false
            },
            Err(TrySendError::Closed(nudge)) => {
                debug!(job_id = %nudge.job_id, "Nudge dispatcher gone, dropping nudge");
                false
            },
        }
    }
}

/// Drain nudges and POST each one to the worker endpoint.
///
/// Without a URL nudges are only logged. The task ends once every sender
/// has been dropped.
pub fn spawn_dispatcher(
    mut rx: mpsc::Receiver<WorkerNudge>,
    client: Client,
    worker_url: Option<String>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        while let Some(nudge) = rx.recv().await {
            let Some(url) = worker_url.as_deref() else {
                debug!(job_id = %nudge.job_id, step = %nudge.step, "No worker URL, nudge logged only");
                continue;
            };

            match client.post(url).json(&nudge).send().await {
                Ok(response) if response.status().is_success() => {
                    debug!(job_id = %nudge.job_id, step = %nudge.step, "Worker nudged");
                },
                Ok(response) => {
                    warn!(job_id = %nudge.job_id, status = %response.status(), "Worker rejected nudge");
                },
                Err(e) => {
                    warn!(job_id = %nudge.job_id, error = %e, "Worker nudge failed");
                },
            }
        }
        debug!("Nudge dispatcher stopped");
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn nudge() -> WorkerNudge {
        WorkerNudge {
            job_id: Uuid::new_v4(),
            step: PipelineStep::AnalyzeContent,
            record_id: "rec-1".to_string(),
        }
    }

    #[tokio::test]
    async fn test_offer_queues_until_full() {
        let (sender, mut rx) = NudgeSender::channel(1);
        assert!(sender.offer(nudge()));
        assert!(!sender.offer(nudge()));

        let received = rx.recv().await.unwrap();
        assert_eq!(received.step, PipelineStep::AnalyzeContent);
    }

    #[test]
    fn test_offer_on_closed_channel() {
        let (sender, rx) = NudgeSender::channel(4);
        drop(rx);
        assert!(!sender.offer(nudge()));
    }

    #[test]
    fn test_disabled_sender_drops() {
        assert!(!NudgeSender::disabled().offer(nudge()));
    }

    #[tokio::test]
    async fn test_dispatcher_without_url_drains() {
        let (sender, rx) = NudgeSender::channel(4);
        let handle = spawn_dispatcher(rx, Client::new(), None);
        assert!(sender.offer(nudge()));
        drop(sender);
        handle.await.unwrap();
    }
}
