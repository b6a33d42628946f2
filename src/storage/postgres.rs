// src/storage/postgres.rs
use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::Row;
use sqlx::postgres::{PgPool, PgPoolOptions};
use std::time::Duration;
use tokio::sync::{mpsc, watch};
use tracing::{debug, info, warn};

use super::{ApiCallWriter, RootsReader, RootsWriter, SthWriter, dedup_certs};
use crate::apicall::ApiCall;
use crate::certificate::Certificate;
use crate::ct_log::{Log, SignedTreeHead};
use crate::roots::{RootSetId, generate_cert_id, generate_set_id};
use crate::verification::VerificationError;

/// PostgreSQL storage backend
#[derive(Clone)]
pub struct PostgresStorage {
    pool: PgPool,
    poll_interval: Duration,
}

impl PostgresStorage {
    /// Create new PostgreSQL storage. `poll_interval` is how often
    /// `watch_roots` checks for new observations.
    pub async fn new(database_url: &str, max_connections: u32, poll_interval: Duration) -> Result<Self> {
        info!("Connecting to PostgreSQL database");

        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(database_url)
            .await
            .context("Failed to connect to PostgreSQL database")?;

        info!("Connected to PostgreSQL successfully");

        Ok(Self::from_pool(pool, poll_interval))
    }

    pub fn from_pool(pool: PgPool, poll_interval: Duration) -> Self {
        Self {
            pool,
            poll_interval,
        }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Run database migrations
    pub async fn migrate(&self) -> Result<()> {
        info!("Running database migrations");

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS api_calls (
                id BIGSERIAL PRIMARY KEY,
                log_name TEXT NOT NULL,
                log_url TEXT NOT NULL,
                endpoint TEXT NOT NULL,
                start_time TIMESTAMPTZ NOT NULL,
                end_time TIMESTAMPTZ NOT NULL,
                http_status INTEGER,
                response_body BYTEA NOT NULL,
                error TEXT
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create api_calls table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS sths (
                id BIGSERIAL PRIMARY KEY,
                log_name TEXT NOT NULL,
                tree_size BIGINT NOT NULL,
                timestamp_ms BIGINT NOT NULL,
                root_hash BYTEA NOT NULL,
                signature BYTEA NOT NULL,
                received_at TIMESTAMPTZ NOT NULL,
                error_kinds TEXT[] NOT NULL,
                errors TEXT[] NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create sths table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS roots (
                id BYTEA PRIMARY KEY,
                der BYTEA NOT NULL
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create roots table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS root_sets (
                root_set_id BYTEA NOT NULL,
                root_id BYTEA NOT NULL REFERENCES roots(id),
                PRIMARY KEY (root_set_id, root_id)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create root_sets table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS root_set_observations (
                log_name TEXT NOT NULL,
                root_set_id BYTEA NOT NULL,
                received_at TIMESTAMPTZ NOT NULL,
                PRIMARY KEY (log_name, root_set_id, received_at)
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create root_set_observations table")?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS incidents (
                id BIGSERIAL PRIMARY KEY,
                source TEXT NOT NULL,
                base_url TEXT NOT NULL,
                summary TEXT NOT NULL,
                category TEXT NOT NULL,
                is_violation BOOLEAN NOT NULL,
                full_url TEXT NOT NULL,
                details TEXT NOT NULL,
                parent_id BIGINT REFERENCES incidents(id),
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create incidents table")?;

        sqlx::query(
            r#"
            CREATE INDEX IF NOT EXISTS idx_root_set_observations_latest
            ON root_set_observations(log_name, received_at DESC)
            "#,
        )
        .execute(&self.pool)
        .await
        .context("Failed to create index on root_set_observations")?;

        info!("Database migrations completed successfully");

        Ok(())
    }

    /// Close the database connection pool
    pub async fn close(&self) {
        self.pool.close().await;
    }

    async fn latest_root_set(&self, log_name: &str) -> Result<Option<RootSetId>> {
        let row = sqlx::query(
            r#"
            SELECT root_set_id FROM root_set_observations
            WHERE log_name = $1
            ORDER BY received_at DESC
            LIMIT 1
            "#,
        )
        .bind(log_name)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch latest root set observation")?;

        row.map(|r| {
            let bytes: Vec<u8> = r.get("root_set_id");
            let id: [u8; 32] = bytes
                .try_into()
                .map_err(|_| anyhow::anyhow!("Stored root set ID is not 32 bytes"))?;
            Ok(RootSetId(id))
        })
        .transpose()
    }
}

#[async_trait]
impl ApiCallWriter for PostgresStorage {
    async fn write_api_call(&self, log: &Log, api_call: &ApiCall) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO api_calls (
                log_name, log_url, endpoint, start_time, end_time,
                http_status, response_body, error
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&log.name)
        .bind(&log.url)
        .bind(api_call.endpoint.as_str())
        .bind(api_call.start)
        .bind(api_call.end)
        .bind(api_call.status.map(i32::from))
        .bind(&api_call.body)
        .bind(&api_call.error)
        .execute(&self.pool)
        .await
        .context("Failed to insert API call")?;

        debug!("Saved {} API call for {}", api_call.endpoint, log.name);

        Ok(())
    }
}

/// BIGINT columns are signed
fn to_bigint(value: u64, column: &str) -> Result<i64> {
    i64::try_from(value).with_context(|| format!("STH {} {} does not fit in BIGINT", column, value))
}

#[async_trait]
impl SthWriter for PostgresStorage {
    async fn write_sth(
        &self,
        log: &Log,
        sth: &SignedTreeHead,
        received_at: DateTime<Utc>,
        errs: &[VerificationError],
    ) -> Result<()> {
        let kinds: Vec<String> = errs.iter().map(|e| e.kind().to_string()).collect();
        let messages: Vec<String> = errs.iter().map(|e| e.to_string()).collect();
        let tree_size = to_bigint(sth.tree_size, "tree_size")?;
        let timestamp = to_bigint(sth.timestamp, "timestamp")?;

        sqlx::query(
            r#"
            INSERT INTO sths (
                log_name, tree_size, timestamp_ms, root_hash, signature,
                received_at, error_kinds, errors
            ) VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            "#,
        )
        .bind(&log.name)
        .bind(tree_size)
        .bind(timestamp)
        .bind(&sth.sha256_root_hash[..])
        .bind(sth.tree_head_signature.to_bytes())
        .bind(received_at)
        .bind(&kinds)
        .bind(&messages)
        .execute(&self.pool)
        .await
        .context("Failed to insert STH")?;

        Ok(())
    }
}

#[async_trait]
impl RootsWriter for PostgresStorage {
    async fn write_roots(
        &self,
        log: &Log,
        roots: &[Certificate],
        received_at: DateTime<Utc>,
    ) -> Result<()> {
        let roots = dedup_certs(roots);
        let set_id = generate_set_id(&roots).context("Failed to generate root set ID")?;

        let mut tx = self.pool.begin().await.context("Failed to begin transaction")?;

        for root in &roots {
            let root_id = generate_cert_id(root)?;

            sqlx::query("INSERT INTO roots (id, der) VALUES ($1, $2) ON CONFLICT (id) DO NOTHING")
                .bind(&root_id[..])
                .bind(root.raw())
                .execute(&mut *tx)
                .await
                .context("Failed to insert root")?;

            sqlx::query(
                "INSERT INTO root_sets (root_set_id, root_id) VALUES ($1, $2) ON CONFLICT DO NOTHING",
            )
            .bind(&set_id.0[..])
            .bind(&root_id[..])
            .execute(&mut *tx)
            .await
            .context("Failed to insert root set member")?;
        }

        sqlx::query(
            r#"
            INSERT INTO root_set_observations (log_name, root_set_id, received_at)
            VALUES ($1, $2, $3)
            ON CONFLICT DO NOTHING
            "#,
        )
        .bind(&log.name)
        .bind(&set_id.0[..])
        .bind(received_at)
        .execute(&mut *tx)
        .await
        .context("Failed to insert root set observation")?;

        tx.commit().await.context("Failed to commit root set")?;

        debug!("Saved root set {} ({} roots) for {}", set_id, roots.len(), log.name);

        Ok(())
    }
}

#[async_trait]
impl RootsReader for PostgresStorage {
    async fn watch_roots(
        &self,
        log: &Log,
        mut shutdown_rx: watch::Receiver<bool>,
    ) -> Result<mpsc::UnboundedReceiver<RootSetId>> {
        let (tx, rx) = mpsc::unbounded_channel();
        let storage = self.clone();
        let log_name = log.name.clone();

        // Fail early if the table can't be read at all.
        let mut last = storage.latest_root_set(&log_name).await?;
        if let Some(id) = last {
            let _ = tx.send(id);
        }

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(storage.poll_interval);
            ticker.tick().await;

            loop {
                tokio::select! {
                    _ = shutdown_rx.changed() => return,
                    _ = ticker.tick() => {}
                }

                match storage.latest_root_set(&log_name).await {
                    Ok(Some(id)) if Some(id) != last => {
                        if tx.send(id).is_err() {
                            return;
                        }
                        last = Some(id);
                    }
                    Ok(_) => {}
                    Err(e) => warn!("{}: failed to poll root set observations: {:#}", log_name, e),
                }
            }
        });

        Ok(rx)
    }

    async fn read_roots(&self, id: &RootSetId) -> Result<Vec<Certificate>> {
        let rows = sqlx::query(
            r#"
            SELECT r.der FROM root_sets s
            JOIN roots r ON r.id = s.root_id
            WHERE s.root_set_id = $1
            ORDER BY r.id
            "#,
        )
        .bind(&id.0[..])
        .fetch_all(&self.pool)
        .await
        .with_context(|| format!("Failed to read root set {}", id))?;

        Ok(rows
            .into_iter()
            .map(|row| Certificate::new(row.get::<Vec<u8>, _>("der")))
            .collect())
    }
}
