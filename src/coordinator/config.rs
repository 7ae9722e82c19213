//! Coordinator Configuration

use serde::{Deserialize, Serialize};

use crate::evaluator::EvaluatorConfig;

/// Configuration for the feedback coordinator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CoordinatorConfig {
    /// Seconds between cycles
    pub interval_secs: u64,
    /// Symbol evaluated each cycle; defaults to the first data symbol
    pub symbol: Option<String>,
    /// Observations per evaluation window
    pub window_len: usize,
    /// GA generations run per cycle
    pub generations_per_cycle: usize,
    /// RL steps per cycle
    pub rl_steps_per_cycle: usize,
    /// Fitness a candidate must beat the live strategy by (absolute)
    pub promotion_margin: f64,
    /// Fitness a candidate must beat when nothing is live
    pub min_fitness: f64,
    /// Shorter windows can only produce `hold`
    pub min_evaluation_window: usize,
    /// First health-check retry delay while halted (ms)
    pub halt_backoff_ms: u64,
    /// Backoff ceiling (ms)
    pub max_halt_backoff_ms: u64,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            interval_secs: 60,
            symbol: None,
            window_len: 500,
            generations_per_cycle: 1,
            rl_steps_per_cycle: 500,
            promotion_margin: 0.05,
            min_fitness: 0.0,
            min_evaluation_window: 200,
            halt_backoff_ms: 5_000,
            max_halt_backoff_ms: 300_000,
        }
    }
}

impl CoordinatorConfig {
    pub fn validate(&self, evaluator: &EvaluatorConfig, errors: &mut Vec<String>) {
        if self.interval_secs == 0 {
            errors.push("coordinator.interval_secs must be positive".to_string());
        }
        if self.generations_per_cycle == 0 {
            errors.push("coordinator.generations_per_cycle must be positive".to_string());
        }
        if !(self.promotion_margin >= 0.0 && self.promotion_margin.is_finite()) {
            errors.push("coordinator.promotion_margin must be non-negative".to_string());
        }
        if !self.min_fitness.is_finite() {
            errors.push("coordinator.min_fitness must be finite".to_string());
        }
        if self.min_evaluation_window < evaluator.min_observations {
            errors.push(format!(
                "coordinator.min_evaluation_window ({}) must be at least evaluator.min_observations ({})",
                self.min_evaluation_window, evaluator.min_observations
            ));
        }
        if self.window_len < self.min_evaluation_window {
            errors.push(format!(
                "coordinator.window_len ({}) must be at least coordinator.min_evaluation_window ({})",
                self.window_len, self.min_evaluation_window
            ));
        }
        if self.halt_backoff_ms == 0 || self.max_halt_backoff_ms < self.halt_backoff_ms {
            errors.push(
                "coordinator.halt_backoff_ms must be positive and at most max_halt_backoff_ms"
                    .to_string(),
            );
        }
    }
}
