//! Derived features
//!
//! Rolling feature vector shared by the evaluator, the RL trainer and
//! `act`. Features only look at bars already pushed, so there is no
//! look-ahead. Timestamps are ignored; gaps simply join adjacent bars.

use std::collections::VecDeque;

use crate::domain::{Bar, FEATURE_COUNT};

/// Every feature is clipped to this magnitude
const FEATURE_CLIP: f64 = 5.0;

pub type FeatureVector = [f64; FEATURE_COUNT];

#[derive(Debug, Clone)]
pub struct FeatureExtractor {
    lookback: usize,
    closes: VecDeque<f64>,
    highs: VecDeque<f64>,
    lows: VecDeque<f64>,
    volumes: VecDeque<f64>,
}

impl FeatureExtractor {
    pub fn new(lookback: usize) -> Self {
        let lookback = lookback.max(6);
        Self {
            lookback,
            closes: VecDeque::with_capacity(lookback + 1),
            highs: VecDeque::with_capacity(lookback),
            lows: VecDeque::with_capacity(lookback),
            volumes: VecDeque::with_capacity(lookback),
        }
    }

    pub fn lookback(&self) -> usize {
        self.lookback
    }

    pub fn is_warm(&self) -> bool {
        self.closes.len() > self.lookback
    }

    /// Push a bar; returns features once `lookback + 1` bars are seen
    pub fn push(&mut self, bar: &Bar) -> Option<FeatureVector> {
        push_bounded(&mut self.closes, bar.close, self.lookback + 1);
        push_bounded(&mut self.highs, bar.high, self.lookback);
        push_bounded(&mut self.lows, bar.low, self.lookback);
        push_bounded(&mut self.volumes, bar.volume, self.lookback);

        if !self.is_warm() {
            return None;
        }
        Some(self.compute())
    }

    fn compute(&self) -> FeatureVector {
        let n = self.closes.len();
        let close = self.closes[n - 1];

        // 1-bar and 5-bar returns in percent
        let ret_1 = pct_change(self.closes[n - 2], close);
        let ret_5 = pct_change(self.closes[n - 6], close) / 5f64.sqrt();

        // Deviation from the simple moving average
        let window: Vec<f64> = self.closes.iter().skip(1).copied().collect();
        let sma = mean(&window);
        let sma_dev = if sma > 0.0 { (close - sma) / sma * 100.0 } else { 0.0 };

        // Realized volatility of 1-bar returns
        let returns: Vec<f64> = self
            .closes
            .iter()
            .zip(self.closes.iter().skip(1))
            .map(|(a, b)| pct_change(*a, *b))
            .collect();
        let volatility = std_dev(&returns);

        // Position inside the lookback range, -1 at the low, +1 at the high
        let high = self.highs.iter().copied().fold(f64::MIN, f64::max);
        let low = self.lows.iter().copied().fold(f64::MAX, f64::min);
        let range_pos = if high > low {
            2.0 * (close - low) / (high - low) - 1.0
        } else {
            0.0
        };

        // Volume z-score of the latest bar
        let volumes: Vec<f64> = self.volumes.iter().copied().collect();
        let vol_std = std_dev(&volumes);
        let volume_z = if vol_std > 0.0 {
            (volumes[volumes.len() - 1] - mean(&volumes)) / vol_std
        } else {
            0.0
        };

        let mut features = [ret_1, ret_5, sma_dev, volatility, range_pos, volume_z];
        for f in features.iter_mut() {
            *f = if f.is_finite() { f.clamp(-FEATURE_CLIP, FEATURE_CLIP) } else { 0.0 };
        }
        features
    }
}

fn push_bounded(buf: &mut VecDeque<f64>, value: f64, cap: usize) {
    if buf.len() == cap {
        buf.pop_front();
    }
    buf.push_back(value);
}

fn pct_change(from: f64, to: f64) -> f64 {
    if from > 0.0 {
        (to / from - 1.0) * 100.0
    } else {
        0.0
    }
}

pub(crate) fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        return 0.0;
    }
    values.iter().sum::<f64>() / values.len() as f64
}

pub(crate) fn std_dev(values: &[f64]) -> f64 {
    if values.len() < 2 {
        return 0.0;
    }
    let m = mean(values);
    let var = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / (values.len() - 1) as f64;
    var.sqrt()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(i: i64, close: f64) -> Bar {
        Bar {
            timestamp_ms: i * 60_000,
            open: close,
            high: close * 1.01,
            low: close * 0.99,
            close,
            volume: 100.0 + i as f64,
        }
    }

    #[test]
    fn test_warmup_then_features() {
        let mut fx = FeatureExtractor::new(10);
        for i in 0..10 {
            assert!(fx.push(&bar(i, 100.0 + i as f64)).is_none());
        }
        let features = fx.push(&bar(10, 110.0)).expect("warm after lookback + 1 bars");
        // Rising prices: positive returns and above-average close
        assert!(features[0] > 0.0);
        assert!(features[1] > 0.0);
        assert!(features[2] > 0.0);
        assert!(features.iter().all(|f| f.abs() <= FEATURE_CLIP));
    }

    #[test]
    fn test_flat_prices_give_zero_features() {
        let mut fx = FeatureExtractor::new(6);
        let mut last = None;
        for i in 0..10 {
            let b = Bar {
                timestamp_ms: i,
                open: 50.0,
                high: 50.0,
                low: 50.0,
                close: 50.0,
                volume: 1.0,
            };
            last = fx.push(&b);
        }
        assert_eq!(last.unwrap(), [0.0; FEATURE_COUNT]);
    }
}
