//! JSON file directory backend
//!
//! Layout under the root:
//! - `state/<key>.json`, one file per key (`/` in keys becomes a directory)
//! - `logs/<log>.jsonl`, one `{"seq", "value"}` line per entry

use async_trait::async_trait;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::Mutex;
use tracing::{debug, warn};

use super::{LogEntry, StateStore};
use crate::error::{AateError, Result};

pub struct FileStore {
    root: PathBuf,
    /// Next sequence number per log, loaded lazily
    sequences: Mutex<HashMap<String, u64>>,
}

impl FileStore {
    pub async fn open(root: impl AsRef<Path>) -> Result<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(root.join("state")).await?;
        fs::create_dir_all(root.join("logs")).await?;
        debug!(root = %root.display(), "File store opened");
        Ok(Self {
            root,
            sequences: Mutex::new(HashMap::new()),
        })
    }

    fn state_path(&self, key: &str) -> Result<PathBuf> {
        let segments = checked_segments(key)?;
        let mut path = self.root.join("state");
        if let Some((last, dirs)) = segments.split_last() {
            for dir in dirs {
                path.push(dir);
            }
            path.push(format!("{last}.json"));
        }
        Ok(path)
    }

    fn log_path(&self, log: &str) -> Result<PathBuf> {
        let segments = checked_segments(log)?;
        if segments.len() != 1 {
            return Err(AateError::Validation(format!("log name {log:?} must not contain '/'")));
        }
        Ok(self.root.join("logs").join(format!("{log}.jsonl")))
    }

    async fn read_entries(&self, path: &Path) -> Result<Vec<LogEntry>> {
        let raw = match fs::read_to_string(path).await {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut entries = Vec::new();
        for (n, line) in raw.lines().enumerate() {
            if line.trim().is_empty() {
                continue;
            }
            match serde_json::from_str::<LogEntry>(line) {
                Ok(entry) => entries.push(entry),
                // A torn final line from a crash is skipped, not fatal
                Err(e) => warn!(path = %path.display(), line = n + 1, error = %e, "Skipping unreadable log line"),
            }
        }
        Ok(entries)
    }
}

fn checked_segments(key: &str) -> Result<Vec<&str>> {
    if key.is_empty() {
        return Err(AateError::Validation("empty store key".to_string()));
    }
    let segments: Vec<&str> = key.split('/').collect();
    for segment in &segments {
        let valid = !segment.is_empty()
            && *segment != "."
            && *segment != ".."
            && segment
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.' | ':'));
        if !valid {
            return Err(AateError::Validation(format!("invalid store key {key:?}")));
        }
    }
    Ok(segments)
}

#[async_trait]
impl StateStore for FileStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        let path = self.state_path(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }
        // Write-then-rename so readers never see a partial file
        let mut tmp = path.clone().into_os_string();
        tmp.push(".tmp");
        let tmp = PathBuf::from(tmp);
        fs::write(&tmp, serde_json::to_vec_pretty(&value)?).await?;
        fs::rename(&tmp, &path).await?;
        Ok(())
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        let path = self.state_path(key)?;
        match fs::read(&path).await {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        let path = self.state_path(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    async fn append(&self, log: &str, value: serde_json::Value) -> Result<u64> {
        let path = self.log_path(log)?;
        let mut sequences = self.sequences.lock().await;
        let next = match sequences.get(log) {
            Some(next) => *next,
            None => {
                let last = self
                    .read_entries(&path)
                    .await?
                    .last()
                    .map(|e| e.seq)
                    .unwrap_or(0);
                last + 1
            }
        };

        let mut line = serde_json::to_vec(&LogEntry { seq: next, value })?;
        line.push(b'\n');
        let mut file = fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&path)
            .await?;
        file.write_all(&line).await?;
        file.flush().await?;

        sequences.insert(log.to_string(), next + 1);
        Ok(next)
    }

    async fn read_log(&self, log: &str, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        let path = self.log_path(log)?;
        Ok(self
            .read_entries(&path)
            .await?
            .into_iter()
            .filter(|e| e.seq > after)
            .take(limit)
            .collect())
    }

    async fn health_check(&self) -> Result<()> {
        let probe = self.root.join(".aate_write_test");
        fs::write(&probe, b"ok")
            .await
            .map_err(|e| AateError::Store(format!("{} is not writable: {e}", self.root.display())))?;
        let _ = fs::remove_file(&probe).await;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn temp_root() -> PathBuf {
        std::env::temp_dir().join(format!("aate_store_{}", uuid::Uuid::new_v4()))
    }

    #[tokio::test]
    async fn test_state_roundtrip_with_nested_keys() {
        let root = temp_root();
        let store = FileStore::open(&root).await.unwrap();
        store.put("strategies/abc", json!({"v": 1})).await.unwrap();
        assert_eq!(store.get("strategies/abc").await.unwrap(), Some(json!({"v": 1})));
        assert!(store.delete("strategies/abc").await.unwrap());
        assert_eq!(store.get("strategies/abc").await.unwrap(), None);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_log_sequence_survives_reopen() {
        let root = temp_root();
        {
            let store = FileStore::open(&root).await.unwrap();
            store.append("decisions", json!(1)).await.unwrap();
            store.append("decisions", json!(2)).await.unwrap();
        }
        let store = FileStore::open(&root).await.unwrap();
        assert_eq!(store.append("decisions", json!(3)).await.unwrap(), 3);
        let all = store.read_log("decisions", 0, 100).await.unwrap();
        assert_eq!(all.iter().map(|e| e.seq).collect::<Vec<_>>(), vec![1, 2, 3]);
        let _ = std::fs::remove_dir_all(root);
    }

    #[tokio::test]
    async fn test_rejects_path_traversal() {
        let root = temp_root();
        let store = FileStore::open(&root).await.unwrap();
        assert!(store.put("../escape", json!(1)).await.is_err());
        assert!(store.put("a//b", json!(1)).await.is_err());
        assert!(store.append("nested/log", json!(1)).await.is_err());
        store.health_check().await.unwrap();
        let _ = std::fs::remove_dir_all(root);
    }
}
