//! Coordinator State: what the feedback loop publishes and persists

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::{Decision, FitnessReport, Strategy, StrategyId};
use crate::store::Persisted;

/// Strategy currently live, with the report that won it the promotion
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LiveStrategy {
    pub strategy: Strategy,
    pub report: FitnessReport,
    pub decision_id: Uuid,
    pub promoted_at: DateTime<Utc>,
}

impl Persisted for LiveStrategy {
    const KIND: &'static str = "live_strategy";
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum CoordinatorState {
    Idle,
    Running,
    /// Persistence is unavailable; no evolution, training or promotion
    Halted { reason: String, since: DateTime<Utc> },
    Stopped,
}

impl CoordinatorState {
    pub fn is_halted(&self) -> bool {
        matches!(self, CoordinatorState::Halted { .. })
    }
}

/// Read-only snapshot for operators
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorStatus {
    pub state: CoordinatorState,
    pub cycle: u64,
    pub generation: u64,
    pub ga_best_fitness: Option<f64>,
    pub rl_checkpoint: Option<Uuid>,
    pub rl_step: u64,
    pub live_strategy: Option<StrategyId>,
    pub live_fitness: Option<f64>,
    pub last_decision: Option<Decision>,
    pub updated_at: DateTime<Utc>,
}

impl Default for CoordinatorStatus {
    fn default() -> Self {
        Self {
            state: CoordinatorState::Idle,
            cycle: 0,
            generation: 0,
            ga_best_fitness: None,
            rl_checkpoint: None,
            rl_step: 0,
            live_strategy: None,
            live_fitness: None,
            last_decision: None,
            updated_at: Utc::now(),
        }
    }
}
