//! Evaluator Configuration

use serde::{Deserialize, Serialize};

/// Backtest/simulation settings
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EvaluatorConfig {
    /// Minimum observations in a window; fewer is `InsufficientDataWindow`
    pub min_observations: usize,
    /// Rolling lookback for derived features (bars of warm-up)
    pub lookback: usize,
    /// Taker fee in basis points of notional
    pub fee_bps: f64,
    /// Adverse slippage applied to every fill, in basis points
    pub slippage_bps: f64,
    /// Periods per year used to annualize the Sharpe-like ratio
    pub annualization_periods: f64,
    /// Fitness weight of the Sharpe-like ratio
    pub sharpe_weight: f64,
    /// Fitness weight of total return
    pub return_weight: f64,
    /// Fitness weight of max drawdown (subtracted)
    pub drawdown_weight: f64,
    /// Subtracted from fitness when max drawdown ends the run early
    pub early_termination_penalty: f64,
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            min_observations: 100,
            lookback: 20,
            fee_bps: 10.0,
            slippage_bps: 5.0,
            annualization_periods: 365.0,
            sharpe_weight: 1.0,
            return_weight: 1.0,
            drawdown_weight: 2.0,
            early_termination_penalty: 1.0,
        }
    }
}

impl EvaluatorConfig {
    pub fn validate(&self, errors: &mut Vec<String>) {
        if self.lookback < 6 {
            errors.push("evaluator.lookback must be at least 6".to_string());
        }
        if self.min_observations <= self.lookback {
            errors.push(format!(
                "evaluator.min_observations ({}) must exceed evaluator.lookback ({})",
                self.min_observations, self.lookback
            ));
        }
        if !(self.fee_bps >= 0.0 && self.fee_bps < 10_000.0) {
            errors.push("evaluator.fee_bps must be within [0, 10000)".to_string());
        }
        if !(self.slippage_bps >= 0.0 && self.slippage_bps < 10_000.0) {
            errors.push("evaluator.slippage_bps must be within [0, 10000)".to_string());
        }
        if !(self.annualization_periods > 0.0) {
            errors.push("evaluator.annualization_periods must be positive".to_string());
        }
        if self.early_termination_penalty < 0.0 {
            errors.push("evaluator.early_termination_penalty must be non-negative".to_string());
        }
    }
}
