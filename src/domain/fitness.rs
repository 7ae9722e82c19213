use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::strategy::StrategyId;

/// The (symbol, time range) an evaluation covered
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EvaluationWindow {
    pub symbol: String,
    pub start: Option<DateTime<Utc>>,
    pub end: Option<DateTime<Utc>>,
    /// Number of observations in the window
    pub observations: usize,
}

impl EvaluationWindow {
    /// Stable key fragment for persisted reports
    pub fn key(&self) -> String {
        format!(
            "{}:{}:{}",
            self.symbol.replace('/', "-"),
            self.start.map(|t| t.timestamp_millis()).unwrap_or_default(),
            self.end.map(|t| t.timestamp_millis()).unwrap_or_default()
        )
    }
}

/// Performance breakdown behind the scalar fitness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FitnessBreakdown {
    /// Final equity / initial capital - 1
    pub total_return: f64,
    /// Peak-to-trough drawdown as a fraction of peak equity
    pub max_drawdown: f64,
    /// Annualized mean/std of per-bar equity returns
    pub sharpe: f64,
    /// Fraction of closed trades with positive P&L
    pub win_rate: f64,
    pub trade_count: usize,
    pub profit_factor: f64,
    pub fees_paid: f64,
    pub final_equity: f64,
    /// Bars simulated before the run ended
    pub bars_simulated: usize,
}

/// Result of evaluating one strategy over one window. Immutable.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitnessReport {
    pub strategy_id: StrategyId,
    pub window: EvaluationWindow,
    /// Risk-adjusted scalar score; higher is better
    pub fitness: f64,
    pub breakdown: FitnessBreakdown,
    /// Run stopped because max drawdown was breached
    pub terminated_early: bool,
}
