//! Deterministic synthetic market data for unit tests

use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;

use crate::domain::Observation;

pub fn t0() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap()
}

fn dec(v: f64) -> Decimal {
    Decimal::from_f64(v).unwrap().round_dp(6)
}

fn bars_from_closes(symbol: &str, closes: &[f64]) -> Vec<Observation> {
    let mut prev = closes.first().copied().unwrap_or(100.0);
    closes
        .iter()
        .enumerate()
        .map(|(i, close)| {
            let open = prev;
            prev = *close;
            let high = open.max(*close) * 1.002;
            let low = open.min(*close) * 0.998;
            Observation::new(
                symbol,
                t0() + Duration::hours(i as i64),
                dec(open),
                dec(high),
                dec(low),
                dec(*close),
                dec(1000.0 + (i % 7) as f64 * 50.0),
            )
        })
        .collect()
}

/// Hourly bars oscillating around a geometric drift
pub fn series(symbol: &str, n: usize, drift: f64) -> Vec<Observation> {
    let closes: Vec<f64> = (0..n)
        .map(|i| {
            let x = i as f64;
            100.0 * (1.0 + drift).powf(x) * (1.0 + 0.02 * (x * 0.7).sin())
        })
        .collect();
    bars_from_closes(symbol, &closes)
}

/// Hourly bars rising (or falling) by `step` per bar
pub fn trending_series(symbol: &str, n: usize, step: f64) -> Vec<Observation> {
    let closes: Vec<f64> = (0..n).map(|i| 100.0 * (1.0 + step).powi(i as i32)).collect();
    bars_from_closes(symbol, &closes)
}
