#![allow(dead_code)]

use async_trait::async_trait;
use chrono::{Duration, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use aate::domain::Observation;
use aate::error::{AateError, Result};
use aate::store::{LogEntry, MemoryStore, StateStore};

pub const SYMBOL: &str = "BTC/USDT";

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap_or_default().round_dp(6)
}

/// Hourly bars with a gentle drift and a sinusoidal wobble
pub fn bars(symbol: &str, n: usize) -> Vec<Observation> {
    let t0 = Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap();
    let mut prev = 100.0;
    (0..n)
        .map(|i| {
            let x = i as f64;
            let close = 100.0 * 1.001f64.powf(x) * (1.0 + 0.03 * (x * 0.5).sin());
            let open = prev;
            prev = close;
            Observation::new(
                symbol,
                t0 + Duration::hours(i as i64),
                dec(open),
                dec(open.max(close) * 1.003),
                dec(open.min(close) * 0.997),
                dec(close),
                dec(500.0 + (i % 5) as f64 * 20.0),
            )
        })
        .collect()
}

/// Memory store whose writes fail while `failing` is set.
///
/// Health checks fail while failing; after `heal_after` failed checks the
/// store recovers on its own.
pub struct FlakyStore {
    inner: MemoryStore,
    failing: AtomicBool,
    failed_checks: AtomicUsize,
    heal_after: usize,
}

impl FlakyStore {
    pub fn new(heal_after: usize) -> Self {
        Self {
            inner: MemoryStore::new(),
            failing: AtomicBool::new(false),
            failed_checks: AtomicUsize::new(0),
            heal_after,
        }
    }

    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn failed_checks(&self) -> usize {
        self.failed_checks.load(Ordering::SeqCst)
    }

    pub fn inner(&self) -> &MemoryStore {
        &self.inner
    }

    fn check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            Err(AateError::Store("simulated outage".to_string()))
        } else {
            Ok(())
        }
    }
}

#[async_trait]
impl StateStore for FlakyStore {
    async fn put(&self, key: &str, value: serde_json::Value) -> Result<()> {
        self.check()?;
        self.inner.put(key, value).await
    }

    async fn get(&self, key: &str) -> Result<Option<serde_json::Value>> {
        self.inner.get(key).await
    }

    async fn delete(&self, key: &str) -> Result<bool> {
        self.check()?;
        self.inner.delete(key).await
    }

    async fn append(&self, log: &str, value: serde_json::Value) -> Result<u64> {
        self.check()?;
        self.inner.append(log, value).await
    }

    async fn read_log(&self, log: &str, after: u64, limit: usize) -> Result<Vec<LogEntry>> {
        self.inner.read_log(log, after, limit).await
    }

    async fn health_check(&self) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            let failed = self.failed_checks.fetch_add(1, Ordering::SeqCst) + 1;
            if failed >= self.heal_after {
                self.failing.store(false, Ordering::SeqCst);
            }
            return Err(AateError::Store("simulated outage".to_string()));
        }
        Ok(())
    }
}
