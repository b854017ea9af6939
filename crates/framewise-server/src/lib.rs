//! Framewise Server Library
#![deny(clippy::unwrap_used, clippy::expect_used)]
//!
//! HTTP server receiving frame-extraction callbacks.
//!
//! # Overview
//!
//! - **Webhook**: `POST /api/v1/webhooks/frame-extraction` accepts provider
//!   notifications and always answers `200 OK` with a [`api::response::WebhookAck`]
//! - **Ingestion**: [`ingest::IngestionWebhookHandler`] persists ephemeral
//!   frames, updates the processing record with optimistic compare-and-update,
//!   reconciles watchdog races and advances the job pipeline
//! - **Storage**: S3-compatible durable frame storage
//! - **Database**: PostgreSQL via SQLx for records, the work queue and the
//!   violation log
//!
//! # Architecture
//!
//! Every collaborator of the handler sits behind an `async_trait`
//! ([`ingest::RecordStore`], [`ingest::WorkQueue`], [`ingest::ViolationLog`],
//! [`ingest::Escalator`], [`ingest::AssetFetcher`], [`ingest::ObjectStore`]).
//! Production wiring uses Postgres, S3 and HTTP; [`ingest::memory`] provides
//! in-process implementations.
//!
//! # Example
//!
//! ```no_run
//! use framewise_server::{api, config::Config, features::FeatureState, ingest};
//! use std::sync::Arc;
//!
//! # fn build(handler: ingest::IngestionWebhookHandler, records: Arc<dyn ingest::RecordStore>) -> anyhow::Result<()> {
//! let config = Config::load()?;
//! let state = FeatureState {
//!     handler: Arc::new(handler),
//!     records,
//! };
//! let _app = api::create_router(state, &config.cors);
//! # Ok(())
//! # }
//! ```

pub mod api;
pub mod config;
pub mod db;
pub mod error;
pub mod features;
pub mod ingest;
pub mod middleware;
pub mod storage;

// Re-export commonly used types
pub use error::AppError;
