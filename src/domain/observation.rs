use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

use super::fitness::EvaluationWindow;

/// A single OHLCV bar for one symbol. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<Utc>,
    pub symbol: String,
    pub open: Decimal,
    pub high: Decimal,
    pub low: Decimal,
    pub close: Decimal,
    pub volume: Decimal,
    /// Optional derived indicators (name -> value)
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub indicators: BTreeMap<String, f64>,
}

impl Observation {
    pub fn new(
        symbol: impl Into<String>,
        timestamp: DateTime<Utc>,
        open: Decimal,
        high: Decimal,
        low: Decimal,
        close: Decimal,
        volume: Decimal,
    ) -> Self {
        Self {
            timestamp,
            symbol: symbol.into(),
            open,
            high,
            low,
            close,
            volume,
            indicators: BTreeMap::new(),
        }
    }

    /// Attach a derived indicator
    pub fn with_indicator(mut self, name: impl Into<String>, value: f64) -> Self {
        self.indicators.insert(name.into(), value);
        self
    }

    /// Check the guaranteed fields are coherent.
    ///
    /// Prices must be strictly positive: features and P&L divide by them.
    /// Volume may be zero.
    pub fn validate(&self) -> Result<(), String> {
        if self.symbol.trim().is_empty() {
            return Err("empty symbol".to_string());
        }
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| *p <= Decimal::ZERO) {
            return Err("prices must be positive".to_string());
        }
        if self.volume < Decimal::ZERO {
            return Err("volume must be non-negative".to_string());
        }
        if self.high < self.low {
            return Err(format!("high {} below low {}", self.high, self.low));
        }
        if self.open > self.high || self.open < self.low {
            return Err(format!("open {} outside [{}, {}]", self.open, self.low, self.high));
        }
        if self.close > self.high || self.close < self.low {
            return Err(format!("close {} outside [{}, {}]", self.close, self.low, self.high));
        }
        if self.indicators.values().any(|v| !v.is_finite()) {
            return Err("non-finite indicator".to_string());
        }
        Ok(())
    }

    /// Float view used by the simulator
    pub fn to_bar(&self) -> Bar {
        Bar {
            timestamp_ms: self.timestamp.timestamp_millis(),
            open: self.open.to_f64().unwrap_or(0.0),
            high: self.high.to_f64().unwrap_or(0.0),
            low: self.low.to_f64().unwrap_or(0.0),
            close: self.close.to_f64().unwrap_or(0.0),
            volume: self.volume.to_f64().unwrap_or(0.0),
        }
    }
}

/// Simplified bar data for simulation
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Bar {
    /// Timestamp in milliseconds
    pub timestamp_ms: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Bar {
    /// UTC day index, used for daily loss accounting
    pub fn day(&self) -> i64 {
        self.timestamp_ms.div_euclid(86_400_000)
    }
}

/// An immutable, timestamp-ordered slice of one symbol's observations.
///
/// Cloning is cheap; the observations are shared.
#[derive(Debug, Clone)]
pub struct ObservationWindow {
    symbol: String,
    observations: Arc<Vec<Observation>>,
}

impl ObservationWindow {
    /// Build a window, keeping only `symbol` and sorting by timestamp.
    pub fn new(symbol: impl Into<String>, mut observations: Vec<Observation>) -> Self {
        let symbol = symbol.into();
        observations.retain(|o| o.symbol == symbol);
        observations.sort_by_key(|o| o.timestamp);
        Self {
            symbol,
            observations: Arc::new(observations),
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    pub fn len(&self) -> usize {
        self.observations.len()
    }

    pub fn is_empty(&self) -> bool {
        self.observations.is_empty()
    }

    pub fn observations(&self) -> &[Observation] {
        &self.observations
    }

    pub fn start(&self) -> Option<DateTime<Utc>> {
        self.observations.first().map(|o| o.timestamp)
    }

    pub fn end(&self) -> Option<DateTime<Utc>> {
        self.observations.last().map(|o| o.timestamp)
    }

    pub fn bars(&self) -> Vec<Bar> {
        self.observations.iter().map(Observation::to_bar).collect()
    }

    /// Descriptor recorded on fitness reports
    pub fn descriptor(&self) -> EvaluationWindow {
        EvaluationWindow {
            symbol: self.symbol.clone(),
            start: self.start(),
            end: self.end(),
            observations: self.len(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use rust_decimal_macros::dec;

    fn obs(symbol: &str, secs: i64) -> Observation {
        Observation::new(
            symbol,
            Utc.timestamp_opt(secs, 0).single().unwrap(),
            dec!(100),
            dec!(101),
            dec!(99),
            dec!(100.5),
            dec!(10),
        )
    }

    #[test]
    fn test_validate_rejects_inverted_range() {
        let mut o = obs("BTC/USDT", 0);
        o.high = dec!(98);
        assert!(o.validate().is_err());
        assert!(obs("BTC/USDT", 0).validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_price_accepts_zero_volume() {
        let mut o = obs("BTC/USDT", 0);
        o.low = dec!(0);
        assert!(o.validate().is_err());

        let mut o = obs("BTC/USDT", 0);
        o.volume = dec!(0);
        assert!(o.validate().is_ok());
    }

    #[test]
    fn test_window_filters_and_sorts() {
        let window = ObservationWindow::new(
            "BTC/USDT",
            vec![obs("BTC/USDT", 20), obs("ETH/USDT", 10), obs("BTC/USDT", 10)],
        );
        assert_eq!(window.len(), 2);
        assert_eq!(window.start().unwrap().timestamp(), 10);
        assert_eq!(window.descriptor().observations, 2);
    }

    #[test]
    fn test_bar_day_index() {
        let bar = obs("BTC/USDT", 86_400 + 5).to_bar();
        assert_eq!(bar.day(), 1);
        assert!((bar.close - 100.5).abs() < 1e-12);
    }
}
