//! Structured engine events
//!
//! Everything the engine reports beyond plain tracing lines goes through
//! [`EngineEvent`] so sinks can persist or forward it.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::Level;
use uuid::Uuid;

use crate::domain::{Decision, EvaluationWindow, StrategyId};
use crate::store::Persisted;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    ObservationRejected {
        symbol: String,
        timestamp: DateTime<Utc>,
        kind: String,
        reason: String,
    },
    ObservationsDropped {
        subscriber: String,
        count: u64,
    },
    EvaluationSkipped {
        strategy_id: StrategyId,
        reason: String,
    },
    GenerationCompleted {
        generation: u64,
        best_fitness: f64,
        mean_fitness: f64,
        distinct_genomes: usize,
        evaluated: usize,
        skipped: usize,
    },
    PopulationReseeded {
        generation: u64,
        distinct_before: usize,
        replaced: usize,
    },
    EvolutionTerminated {
        generation: u64,
        reason: String,
        best_fitness: Option<f64>,
    },
    CheckpointSaved {
        checkpoint_id: Uuid,
        step: u64,
        cumulative_reward: f64,
    },
    CheckpointCorrupt {
        checkpoint_id: String,
        reason: String,
    },
    TrainingEpochCompleted {
        steps: u64,
        total_steps: u64,
        mean_reward: f64,
        exploration_std: f64,
    },
    PromotionDecided {
        decision_id: Uuid,
        candidate_id: StrategyId,
        decision: Decision,
        candidate_fitness: Option<f64>,
        live_fitness: Option<f64>,
        promotion_margin: f64,
        window: EvaluationWindow,
        reason: String,
    },
    CycleFailed {
        cycle: u64,
        error: String,
    },
    CoordinatorHalted {
        error: String,
        retry_in_ms: u64,
    },
    CoordinatorResumed {
        halted_for_ms: u64,
    },
}

impl EngineEvent {
    pub fn level(&self) -> Level {
        match self {
            EngineEvent::ObservationRejected { .. }
            | EngineEvent::ObservationsDropped { .. }
            | EngineEvent::EvaluationSkipped { .. }
            | EngineEvent::PopulationReseeded { .. }
            | EngineEvent::CheckpointCorrupt { .. } => Level::WARN,
            EngineEvent::CycleFailed { .. } | EngineEvent::CoordinatorHalted { .. } => Level::ERROR,
            EngineEvent::CheckpointSaved { .. } | EngineEvent::TrainingEpochCompleted { .. } => {
                Level::DEBUG
            }
            _ => Level::INFO,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            EngineEvent::ObservationRejected { .. } => "observation_rejected",
            EngineEvent::ObservationsDropped { .. } => "observations_dropped",
            EngineEvent::EvaluationSkipped { .. } => "evaluation_skipped",
            EngineEvent::GenerationCompleted { .. } => "generation_completed",
            EngineEvent::PopulationReseeded { .. } => "population_reseeded",
            EngineEvent::EvolutionTerminated { .. } => "evolution_terminated",
            EngineEvent::CheckpointSaved { .. } => "checkpoint_saved",
            EngineEvent::CheckpointCorrupt { .. } => "checkpoint_corrupt",
            EngineEvent::TrainingEpochCompleted { .. } => "training_epoch_completed",
            EngineEvent::PromotionDecided { .. } => "promotion_decided",
            EngineEvent::CycleFailed { .. } => "cycle_failed",
            EngineEvent::CoordinatorHalted { .. } => "coordinator_halted",
            EngineEvent::CoordinatorResumed { .. } => "coordinator_resumed",
        }
    }
}

impl Persisted for EngineEvent {
    const KIND: &'static str = "engine_event";
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialized_tag_matches_name() {
        let event = EngineEvent::CoordinatorResumed { halted_for_ms: 3 };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["event"], event.name());
        assert_eq!(event.level(), Level::INFO);
    }
}
