use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::fitness::EvaluationWindow;
use super::strategy::{Provenance, StrategyId};

/// Outcome of a promotion review
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    Promote,
    Reject,
    Hold,
}

impl Decision {
    pub fn as_str(&self) -> &'static str {
        match self {
            Decision::Promote => "promote",
            Decision::Reject => "reject",
            Decision::Hold => "hold",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Everything the decision compared, so it can be reconstructed later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReasoningSnapshot {
    pub candidate_source: Provenance,
    pub candidate_fitness: Option<f64>,
    pub live_strategy_id: Option<StrategyId>,
    pub live_fitness: Option<f64>,
    pub promotion_margin: f64,
    pub min_fitness: f64,
    pub window: EvaluationWindow,
    pub min_evaluation_window: usize,
    pub reason: String,
}

/// Append-only log entry
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PromotionDecision {
    pub id: Uuid,
    pub candidate_id: StrategyId,
    pub decision: Decision,
    pub reasoning: ReasoningSnapshot,
    pub timestamp: DateTime<Utc>,
}

impl PromotionDecision {
    pub fn new(candidate_id: StrategyId, decision: Decision, reasoning: ReasoningSnapshot) -> Self {
        Self {
            id: Uuid::new_v4(),
            candidate_id,
            decision,
            reasoning,
            timestamp: Utc::now(),
        }
    }

    pub fn is_promote(&self) -> bool {
        self.decision == Decision::Promote
    }
}
