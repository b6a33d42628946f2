// src/incident/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use sqlx::postgres::PgPool;
use tracing::debug;

use super::{Incident, Reporter};

/// Stores incidents in the `incidents` table
pub struct PostgresReporter {
    pool: PgPool,
    source: String,
}

impl PostgresReporter {
    /// Create new reporter; `source` names what raised the incidents. The
    /// table is created by `PostgresStorage::migrate`.
    pub fn new(pool: PgPool, source: &str) -> Self {
        Self {
            pool,
            source: source.to_string(),
        }
    }
}

#[async_trait]
impl Reporter for PostgresReporter {
    async fn report(&self, incident: &Incident) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO incidents (
                source, base_url, summary, category, is_violation, full_url, details
            ) VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(&self.source)
        .bind(&incident.base_url)
        .bind(&incident.summary)
        .bind(&incident.category)
        .bind(incident.is_violation)
        .bind(&incident.full_url)
        .bind(&incident.details)
        .execute(&self.pool)
        .await
        .with_context(|| format!("Failed to insert incident for {}", self.source))?;

        debug!("Saved incident for {}: {}", incident.base_url, incident.summary);

        Ok(())
    }
}
