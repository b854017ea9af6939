//! Frame-extraction ingestion
//!
//! [`IngestionWebhookHandler`] turns provider notifications into durable
//! state: sampled frames in the object store, a guarded record update, and
//! the next pipeline step on the work queue.

pub mod escalation;
pub mod handler;
pub mod memory;
pub mod nudge;
pub mod payload;
pub mod persistor;
pub mod queue;
pub mod records;
pub mod sampling;
pub mod types;
pub mod violations;

pub use escalation::{EscalationRequest, Escalator, HttpEscalator};
pub use handler::{Collaborators, IngestionWebhookHandler};
pub use nudge::{NudgeSender, WorkerNudge};
pub use payload::{Correlation, PayloadError, ProviderNotification};
pub use persistor::{AssetFetcher, FramePersistor, HttpAssetFetcher, ObjectStore, PersistedFrame};
pub use queue::{NewJob, PgWorkQueue, QueueStatus, WorkQueue};
pub use records::{PgRecordStore, RecordStore};
pub use types::{
    ConstraintStatus, FrameUpdate, PipelineStep, ProcessingRecord, RecordKey, RecordStatus,
    RecordTable,
};
pub use violations::{PgViolationLog, Severity, Violation, ViolationLog};
