use async_trait::async_trait;
use std::collections::HashMap;
use tokio::sync::RwLock;

use super::{LogEntry, StateStore};
use crate::error::Result;

/// In-process store for tests and paper runs
#[derive(Debug, Default)]
pub struct MemoryStore {
    state: RwLock<HashMap<String, serde_json::Value>>,
    logs: RwLock<HashMap<String, Vec<LogEntry>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn log_len(&self, log: &str) -> usize {
        self.logs.read().await.get(log).map(Vec::len).unwrap_or(0)
    }
}

#[async_trait]
impl StateStore for MemoryStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.state.write().await.insert(key.to_string(), value);
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        Ok(self.state.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        Ok(self.state.write().await.remove(key).is_some())
    }

    async fn append(&self, log: &str, value: serde_json::Value) -> Result<u64> {
        let mut logs = self.logs.write().await;
        let entries = logs.entry(log.to_string()).or_default();
        let seq = entries.len() as u64 + 1;
        entries.push(LogEntry { seq, value });
        Ok(seq)
    }

    async fn read_log(&self, log: &str, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        let logs = self.logs.read().await;
        Ok(logs
            .get(log)
            .map(|entries| {
                entries
                    .iter()
                    .filter(|e| e.seq > after)
                    .take(limit)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default())
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[tokio::test]
    async fn test_log_is_append_only_and_ordered() {
        let store = MemoryStore::new();
        assert_eq!(store.append("decisions", json!({"n": 1})).await.unwrap(), 1);
        assert_eq!(store.append("decisions", json!({"n": 2})).await.unwrap(), 2);
        assert_eq!(store.append("other", json!({})).await.unwrap(), 1);

        let page = store.read_log("decisions", 1, 10).await.unwrap();
        assert_eq!(page.len(), 1);
        assert_eq!(page[0].value["n"], 2);
        assert_eq!(store.log_len("decisions").await, 2);
    }

    #[tokio::test]
    async fn test_put_get_delete() {
        let store = MemoryStore::new();
        store.put("a/b", json!(1)).await.unwrap();
        assert_eq!(store.get("a/b").await.unwrap(), Some(json!(1)));
        assert!(store.delete("a/b").await.unwrap());
        assert!(!store.delete("a/b").await.unwrap());
        assert_eq!(store.get("a/b").await.unwrap(), None);
    }
}
