//! Persistent state store
//!
//! Key/value state plus append-only logs. Values are JSON; typed records go
//! through the versioned envelope in [`record`].

pub mod file;
pub mod memory;
pub mod postgres;
pub mod record;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::config::{StoreBackend, StoreConfig};
use crate::error::{AateError, Result};

pub use file::FileStore;
pub use memory::MemoryStore;
pub use postgres::PgStore;
pub use record::{Persisted, Record, SCHEMA_VERSION};

/// Well-known keys and log names
pub mod keys {
    use crate::domain::{EvaluationWindow, StrategyId};

    pub const LIVE_STRATEGY: &str = "coordinator/live";
    pub const POPULATION: &str = "ga/population";
    pub const CHECKPOINT_INDEX: &str = "rl/checkpoints/index";

    pub const PROMOTION_LOG: &str = "promotion_decisions";
    pub const EVENT_LOG: &str = "engine_events";

    pub fn strategy(id: &StrategyId) -> String {
        format!("strategies/{id}")
    }

    pub fn report(id: &StrategyId, window: &EvaluationWindow) -> String {
        format!("reports/{id}/{}", window.key())
    }

    pub fn checkpoint(id: &uuid::Uuid) -> String {
        format!("rl/checkpoints/{id}")
    }
}

/// One entry of an append-only log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    /// Monotonic position within the log, starting at 1
    pub seq: u64,
    pub value: serde_json::Value,
}

#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StateStore: Send + Sync {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()>;

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>>;

    /// Returns whether the key existed
    async fn delete(&self, key: &str) -> Result<bool>;

    /// Append to a log; returns the new entry's sequence number
    async fn append(&self, log: &str, value: serde_json::Value) -> Result<u64>;

    /// Entries with `seq > after`, oldest first, at most `limit`
    async fn read_log(&self, log: &str, after: u64, limit: usize) -> Result<Vec<LogEntry>>;

    async fn health_check(&self) -> Result<()>;

    /// Append several entries; returns the last sequence number
    async fn append_batch(&self, log: &str, values: Vec<serde_json::Value>) -> Result<u64> {
        let mut last = 0;
        for value in values {
            last = self.append(log, value).await?;
        }
        Ok(last)
    }
}

/// Build the configured backend
pub async fn open(config: &StoreConfig) -> Result<Arc<dyn StateStore>> {
    match config.backend {
        StoreBackend::Memory => Ok(Arc::new(MemoryStore::new())),
        StoreBackend::File => {
            let path = config
                .path
                .as_ref()
                .ok_or_else(|| AateError::Validation("store.path is not set".to_string()))?;
            Ok(Arc::new(FileStore::open(path).await?))
        }
        StoreBackend::Postgres => {
            let url = config
                .url
                .as_deref()
                .ok_or_else(|| AateError::Validation("store.url is not set".to_string()))?;
            let store = PgStore::connect(url, config.max_connections).await?;
            store.migrate().await?;
            Ok(Arc::new(store))
        }
    }
}
