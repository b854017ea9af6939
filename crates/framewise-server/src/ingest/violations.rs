//! Structured constraint-violation log

use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use sqlx::PgPool;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Warning,
    Error,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Warning => "warning",
            Severity::Error => "error",
            Severity::Critical => "critical",
        }
    }
}

/// One detected disagreement between expected and actual state
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Violation {
    pub entity_type: String,
    pub entity_id: String,
    pub constraint_name: String,
    pub violation_type: String,
    pub expected_state: String,
    pub actual_state: String,
    pub severity: Severity,
}

#[async_trait]
pub trait ViolationLog: Send + Sync {
    async fn record(&self, violation: &Violation) -> Result<()>;
}

#[derive(Clone)]
pub struct PgViolationLog {
    pool: PgPool,
}

impl PgViolationLog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl ViolationLog for PgViolationLog {
    async fn record(&self, violation: &Violation) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO constraint_violations
                (entity_type, entity_id, constraint_name, violation_type,
                 expected_state, actual_state, severity)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&violation.entity_type)
        .bind(&violation.entity_id)
        .bind(&violation.constraint_name)
        .bind(&violation.violation_type)
        .bind(&violation.expected_state)
        .bind(&violation.actual_state)
        .bind(violation.severity.as_str())
        .execute(&self.pool)
        .await
        .with_context(|| {
            format!(
                "Failed to log {} violation for {}",
                violation.constraint_name, violation.entity_id
            )
        })?;

        Ok(())
    }
}
