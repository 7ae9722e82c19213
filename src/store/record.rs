//! Versioned JSON envelope for persisted values
//!
//! ```json
//! {"kind": "strategy", "schema_version": 1, "written_at": "...", "payload": {...}}
//! ```
//!
//! Readers accept any version up to the one they were built with and reject
//! newer ones with [`AateError::SchemaVersion`].

use chrono::{DateTime, Utc};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};

use super::{LogEntry, StateStore};
use crate::domain::{FitnessReport, PromotionDecision, Strategy};
use crate::error::{AateError, Result};

/// Current on-disk schema version
pub const SCHEMA_VERSION: u32 = 1;

/// A value that can be written through the envelope
pub trait Persisted: Serialize + DeserializeOwned {
    const KIND: &'static str;
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Record<T> {
    pub kind: String,
    pub schema_version: u32,
    pub written_at: DateTime<Utc>,
    pub payload: T,
}

pub fn encode<T: Persisted>(value: &T) -> Result<serde_json::Value> {
    let record = Record {
        kind: T::KIND.to_string(),
        schema_version: SCHEMA_VERSION,
        written_at: Utc::now(),
        payload: value,
    };
    Ok(serde_json::to_value(record)?)
}

pub fn decode<T: Persisted>(value: serde_json::Value) -> Result<T> {
    let record: Record<serde_json::Value> = serde_json::from_value(value)?;
    if record.kind != T::KIND {
        return Err(AateError::Validation(format!(
            "expected a {} record, found {}",
            T::KIND,
            record.kind
        )));
    }
    if record.schema_version > SCHEMA_VERSION {
        return Err(AateError::SchemaVersion {
            kind: record.kind,
            found: record.schema_version,
            supported: SCHEMA_VERSION,
        });
    }
    Ok(serde_json::from_value(record.payload)?)
}

pub async fn put_record<T: Persisted>(store: &dyn StateStore, key: &str, value: &T) -> Result<()> {
    store.put(key, encode(value)?).await
}

pub async fn get_record<T: Persisted>(store: &dyn StateStore, key: &str) -> Result<Option<T>> {
    match store.get(key).await? {
        Some(value) => decode(value).map(Some),
        None => Ok(None),
    }
}

pub async fn append_record<T: Persisted>(store: &dyn StateStore, log: &str, value: &T) -> Result<u64> {
    store.append(log, encode(value)?).await
}

impl Persisted for Strategy {
    const KIND: &'static str = "strategy";
}

impl Persisted for FitnessReport {
    const KIND: &'static str = "fitness_report";
}

impl Persisted for PromotionDecision {
    const KIND: &'static str = "promotion_decision";
}

/// Decode a page of log entries, keeping sequence numbers
pub fn decode_entries<T: Persisted>(entries: Vec<LogEntry>) -> Result<Vec<(u64, T)>> {
    entries
        .into_iter()
        .map(|e| decode(e.value).map(|v| (e.seq, v)))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Probe {
        n: u32,
    }

    impl Persisted for Probe {
        const KIND: &'static str = "probe";
    }

    #[test]
    fn test_envelope_carries_kind_and_version() {
        let value = encode(&Probe { n: 3 }).unwrap();
        assert_eq!(value["kind"], "probe");
        assert_eq!(value["schema_version"], SCHEMA_VERSION);
        assert_eq!(decode::<Probe>(value).unwrap(), Probe { n: 3 });
    }

    #[test]
    fn test_newer_schema_is_rejected() {
        let mut value = encode(&Probe { n: 1 }).unwrap();
        value["schema_version"] = serde_json::json!(SCHEMA_VERSION + 1);
        let err = decode::<Probe>(value).unwrap_err();
        assert!(matches!(err, AateError::SchemaVersion { found, .. } if found == SCHEMA_VERSION + 1));
    }

    #[test]
    fn test_kind_mismatch_is_rejected() {
        let mut value = encode(&Probe { n: 1 }).unwrap();
        value["kind"] = serde_json::json!("strategy");
        assert!(matches!(decode::<Probe>(value), Err(AateError::Validation(_))));
    }
}
