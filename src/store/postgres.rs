//! PostgreSQL backend

use async_trait::async_trait;
use sqlx::postgres::{PgPool, PgPoolOptions};
use sqlx::Row;
use std::time::Duration;
use tracing::{debug, info};

use super::{LogEntry, StateStore};
use crate::error::{AateError, Result};

pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .acquire_timeout(Duration::from_secs(10))
            .connect(url)
            .await?;
        info!(max_connections, "Connected to PostgreSQL state store");
        Ok(Self::new(pool))
    }

    /// Create tables if missing
    pub async fn migrate(&self) -> Result<()> {
        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aate_state (
                key TEXT PRIMARY KEY,
                value JSONB NOT NULL,
                updated_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query(
            r#"
            CREATE TABLE IF NOT EXISTS aate_log (
                id BIGSERIAL PRIMARY KEY,
                log TEXT NOT NULL,
                value JSONB NOT NULL,
                created_at TIMESTAMPTZ NOT NULL DEFAULT NOW()
            )
            "#,
        )
        .execute(&self.pool)
        .await?;

        sqlx::query("CREATE INDEX IF NOT EXISTS idx_aate_log_log_id ON aate_log (log, id)")
            .execute(&self.pool)
            .await?;

        debug!("State store schema ready");
        Ok(())
    }
}

#[async_trait]
impl StateStore for PgStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        sqlx::query(
            r#"
            INSERT INTO aate_state (key, value, updated_at)
            VALUES ($1, $2, NOW())
            ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = NOW()
            "#,
        )
        .bind(key)
        .bind(&value)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let row = sqlx::query("SELECT value FROM aate_state WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|r| r.get("value")))
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let result = sqlx::query("DELETE FROM aate_state WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }

    /// Sequence numbers are the table's global id, so they are monotonic
    /// within a log but not contiguous.
    async fn append(&self, log: &str, value: serde_json::Value) -> Result<u64> {
        let row = sqlx::query(
            r#"
            INSERT INTO aate_log (log, value)
            VALUES ($1, $2)
            RETURNING id
            "#,
        )
        .bind(log)
        .bind(&value)
        .fetch_one(&self.pool)
        .await?;

        let id: i64 = row.get("id");
        u64::try_from(id).map_err(|_| AateError::Store(format!("negative log id {id}")))
    }

    async fn read_log(&self, log: &str, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        let rows = sqlx::query(
            r#"
            SELECT id, value FROM aate_log
            WHERE log = $1 AND id > $2
            ORDER BY id ASC
            LIMIT $3
            "#,
        )
        .bind(log)
        .bind(i64::try_from(after).unwrap_or(i64::MAX))
        .bind(i64::try_from(limit).unwrap_or(i64::MAX))
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .iter()
            .map(|row| LogEntry {
                seq: row.get::<i64, _>("id") as u64,
                value: row.get("value"),
            })
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        sqlx::query("SELECT 1")
            .execute(&self.pool)
            .await
            .map_err(|e| AateError::Store(format!("PostgreSQL health check failed: {e}")))?;
        Ok(())
    }

    async fn append_batch(&self, log: &str, values: Vec<serde_json::Value>) -> Result<u64> {
        let mut tx = self.pool.begin().await?;
        let mut last = 0;
        for value in values {
            let row = sqlx::query("INSERT INTO aate_log (log, value) VALUES ($1, $2) RETURNING id")
                .bind(log)
                .bind(&value)
                .fetch_one(&mut *tx)
                .await?;
            last = row.get::<i64, _>("id") as u64;
        }
        tx.commit().await?;
        Ok(last)
    }
}
