//! Configuration management

use framewise_common::env;
use serde::{Deserialize, Serialize};
use std::time::Duration;

// ============================================================================
// Server Configuration Constants
// ============================================================================

/// Default server host binding.
pub const DEFAULT_SERVER_HOST: &str = "127.0.0.1";

/// Default server port.
pub const DEFAULT_SERVER_PORT: u16 = 8000;

/// Default shutdown timeout in seconds.
pub const DEFAULT_SHUTDOWN_TIMEOUT_SECS: u64 = 30;

/// Default database URL for local development.
pub const DEFAULT_DATABASE_URL: &str = "postgresql://localhost/framewise";

/// Default maximum database connections in the pool.
pub const DEFAULT_DATABASE_MAX_CONNECTIONS: u32 = 10;

/// Default minimum database connections in the pool.
pub const DEFAULT_DATABASE_MIN_CONNECTIONS: u32 = 2;

/// Default database connection timeout in seconds.
pub const DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS: u64 = 10;

/// Default database idle timeout in seconds (10 minutes).
pub const DEFAULT_DATABASE_IDLE_TIMEOUT_SECS: u64 = 600;

/// Default CORS allowed origin for local development.
pub const DEFAULT_CORS_ALLOWED_ORIGIN: &str = "http://localhost:3000";

// ============================================================================
// Ingestion Constants
// ============================================================================

/// Sampled frames per minute of video.
pub const DEFAULT_FRAMES_PER_MINUTE: f64 = 2.5;

/// Lower bound on frames kept per video.
pub const DEFAULT_MIN_FRAMES: usize = 100;

/// Upper bound on frames kept per video.
pub const DEFAULT_MAX_FRAMES: usize = 2000;

/// Frames fetched per persistence wave.
pub const DEFAULT_PERSIST_BATCH_SIZE: usize = 50;

/// Concurrent fetches within one wave.
pub const DEFAULT_PERSIST_CONCURRENCY: usize = 10;

/// Transcript polls before the next step runs degraded.
pub const DEFAULT_TRANSCRIPT_POLL_ATTEMPTS: u32 = 6;

/// Delay between transcript polls in milliseconds.
pub const DEFAULT_TRANSCRIPT_POLL_INTERVAL_MS: u64 = 5000;

/// Content type assumed when the provider omits one.
pub const DEFAULT_FRAME_CONTENT_TYPE: &str = "image/jpeg";

/// Pending worker nudges buffered before new ones are dropped.
pub const DEFAULT_NUDGE_CAPACITY: usize = 64;

/// Server configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub server: ServerConfig,
    pub database: DatabaseConfig,
    pub cors: CorsConfig,
    pub ingestion: IngestionConfig,
}

/// Server-specific configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub shutdown_timeout_secs: u64,
}

/// Database configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub url: String,
    pub max_connections: u32,
    pub min_connections: u32,
    pub connect_timeout_secs: u64,
    pub idle_timeout_secs: u64,
}

/// CORS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CorsConfig {
    pub allowed_origins: Vec<String>,
    pub allow_credentials: bool,
}

/// Webhook ingestion tuning
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestionConfig {
    pub frames_per_minute: f64,
    pub min_frames: usize,
    pub max_frames: usize,
    pub persist_batch_size: usize,
    pub persist_concurrency: usize,
    pub transcript_poll_attempts: u32,
    pub transcript_poll_interval_ms: u64,
    pub default_content_type: String,
    /// Human-review escalation endpoint. Without it provider failures go
    /// straight to `needs_review`.
    pub escalation_url: Option<String>,
    /// Worker wake-up endpoint. Without it nudges are only logged.
    pub worker_url: Option<String>,
    pub nudge_capacity: usize,
}

impl IngestionConfig {
    pub fn transcript_poll_interval(&self) -> Duration {
        Duration::from_millis(self.transcript_poll_interval_ms)
    }

    /// Load ingestion settings from `FRAMEWISE_*` variables.
    pub fn from_env() -> anyhow::Result<Self> {
        Ok(Self {
            frames_per_minute: env::parse_or(
                "FRAMEWISE_FRAMES_PER_MINUTE",
                DEFAULT_FRAMES_PER_MINUTE,
            )?,
            min_frames: env::parse_or("FRAMEWISE_MIN_FRAMES", DEFAULT_MIN_FRAMES)?,
            max_frames: env::parse_or("FRAMEWISE_MAX_FRAMES", DEFAULT_MAX_FRAMES)?,
            persist_batch_size: env::parse_or(
                "FRAMEWISE_PERSIST_BATCH_SIZE",
                DEFAULT_PERSIST_BATCH_SIZE,
            )?,
            persist_concurrency: env::parse_or(
                "FRAMEWISE_PERSIST_CONCURRENCY",
                DEFAULT_PERSIST_CONCURRENCY,
            )?,
            transcript_poll_attempts: env::parse_or(
                "FRAMEWISE_TRANSCRIPT_POLL_ATTEMPTS",
                DEFAULT_TRANSCRIPT_POLL_ATTEMPTS,
            )?,
            transcript_poll_interval_ms: env::parse_or(
                "FRAMEWISE_TRANSCRIPT_POLL_INTERVAL_MS",
                DEFAULT_TRANSCRIPT_POLL_INTERVAL_MS,
            )?,
            default_content_type: env::string("FRAMEWISE_DEFAULT_CONTENT_TYPE")
                .unwrap_or_else(|| DEFAULT_FRAME_CONTENT_TYPE.to_string()),
            escalation_url: env::string("FRAMEWISE_ESCALATION_URL"),
            worker_url: env::string("FRAMEWISE_WORKER_URL"),
            nudge_capacity: env::parse_or("FRAMEWISE_NUDGE_CAPACITY", DEFAULT_NUDGE_CAPACITY)?,
        })
    }

    pub fn validate(&self) -> anyhow::Result<()> {
        if !(self.frames_per_minute > 0.0) {
            anyhow::bail!("Frames per minute must be positive");
        }
        if self.min_frames == 0 {
            anyhow::bail!("Minimum frame count must be greater than 0");
        }
        if self.min_frames > self.max_frames {
            anyhow::bail!(
                "Minimum frame count ({}) cannot exceed maximum ({})",
                self.min_frames,
                self.max_frames
            );
        }
        if self.persist_batch_size == 0 || self.persist_concurrency == 0 {
            anyhow::bail!("Persist batch size and concurrency must be greater than 0");
        }
        if self.nudge_capacity == 0 {
            anyhow::bail!("Nudge capacity must be greater than 0");
        }
        Ok(())
    }
}

impl Default for IngestionConfig {
    fn default() -> Self {
        Self {
            frames_per_minute: DEFAULT_FRAMES_PER_MINUTE,
            min_frames: DEFAULT_MIN_FRAMES,
            max_frames: DEFAULT_MAX_FRAMES,
            persist_batch_size: DEFAULT_PERSIST_BATCH_SIZE,
            persist_concurrency: DEFAULT_PERSIST_CONCURRENCY,
            transcript_poll_attempts: DEFAULT_TRANSCRIPT_POLL_ATTEMPTS,
            transcript_poll_interval_ms: DEFAULT_TRANSCRIPT_POLL_INTERVAL_MS,
            default_content_type: DEFAULT_FRAME_CONTENT_TYPE.to_string(),
            escalation_url: None,
            worker_url: None,
            nudge_capacity: DEFAULT_NUDGE_CAPACITY,
        }
    }
}

impl Config {
    /// Load configuration from environment and defaults
    pub fn load() -> anyhow::Result<Self> {
        dotenvy::dotenv().ok();

        let config = Config {
            server: ServerConfig {
                host: env::string("FRAMEWISE_HOST")
                    .unwrap_or_else(|| DEFAULT_SERVER_HOST.to_string()),
                port: env::parse_or("FRAMEWISE_PORT", DEFAULT_SERVER_PORT)?,
                shutdown_timeout_secs: env::parse_or(
                    "FRAMEWISE_SHUTDOWN_TIMEOUT",
                    DEFAULT_SHUTDOWN_TIMEOUT_SECS,
                )?,
            },
            database: DatabaseConfig {
                url: env::string("DATABASE_URL")
                    .unwrap_or_else(|| DEFAULT_DATABASE_URL.to_string()),
                max_connections: env::parse_or(
                    "DATABASE_MAX_CONNECTIONS",
                    DEFAULT_DATABASE_MAX_CONNECTIONS,
                )?,
                min_connections: env::parse_or(
                    "DATABASE_MIN_CONNECTIONS",
                    DEFAULT_DATABASE_MIN_CONNECTIONS,
                )?,
                connect_timeout_secs: env::parse_or(
                    "DATABASE_CONNECT_TIMEOUT",
                    DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                )?,
                idle_timeout_secs: env::parse_or(
                    "DATABASE_IDLE_TIMEOUT",
                    DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
                )?,
            },
            cors: CorsConfig {
                allowed_origins: env::string("CORS_ALLOWED_ORIGINS")
                    .unwrap_or_else(|| DEFAULT_CORS_ALLOWED_ORIGIN.to_string())
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect(),
                allow_credentials: env::parse_or("CORS_ALLOW_CREDENTIALS", true)?,
            },
            ingestion: IngestionConfig::from_env()?,
        };

        config.validate()?;

        Ok(config)
    }

    /// Validate configuration
    pub fn validate(&self) -> anyhow::Result<()> {
        if self.server.port == 0 {
            anyhow::bail!("Server port must be greater than 0");
        }

        if self.database.url.is_empty() {
            anyhow::bail!("Database URL cannot be empty");
        }

        if self.database.max_connections == 0 {
            anyhow::bail!("Database max_connections must be greater than 0");
        }

        if self.database.min_connections > self.database.max_connections {
            anyhow::bail!(
                "Database min_connections ({}) cannot be greater than max_connections ({})",
                self.database.min_connections,
                self.database.max_connections
            );
        }

        if self.cors.allowed_origins.is_empty() {
            tracing::warn!("No CORS origins configured - all origins will be allowed");
        }

        self.ingestion.validate()
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: DEFAULT_SERVER_HOST.to_string(),
                port: DEFAULT_SERVER_PORT,
                shutdown_timeout_secs: DEFAULT_SHUTDOWN_TIMEOUT_SECS,
            },
            database: DatabaseConfig {
                url: DEFAULT_DATABASE_URL.to_string(),
                max_connections: DEFAULT_DATABASE_MAX_CONNECTIONS,
                min_connections: DEFAULT_DATABASE_MIN_CONNECTIONS,
                connect_timeout_secs: DEFAULT_DATABASE_CONNECT_TIMEOUT_SECS,
                idle_timeout_secs: DEFAULT_DATABASE_IDLE_TIMEOUT_SECS,
            },
            cors: CorsConfig {
                allowed_origins: vec![DEFAULT_CORS_ALLOWED_ORIGIN.to_string()],
                allow_credentials: true,
            },
            ingestion: IngestionConfig::default(),
        }
    }
}
