//! Promotion rule

use crate::domain::{Decision, EvaluationWindow, FitnessReport, ReasoningSnapshot, Strategy};

/// Hysteresis rule deciding whether a candidate replaces the live strategy
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PromotionPolicy {
    pub promotion_margin: f64,
    pub min_fitness: f64,
    pub min_evaluation_window: usize,
}

impl PromotionPolicy {
    pub fn new(promotion_margin: f64, min_fitness: f64, min_evaluation_window: usize) -> Self {
        Self {
            promotion_margin,
            min_fitness,
            min_evaluation_window,
        }
    }

    /// Compare a candidate with the live strategy over the same window.
    ///
    /// `promote` requires a long enough window and a fitness gain strictly
    /// above the margin (or above `min_fitness` with nothing live, or when
    /// the live strategy cannot be evaluated). A missing candidate report or
    /// a short window is `hold`; a gain within the margin is `reject`.
    pub fn decide(
        &self,
        candidate: &Strategy,
        candidate_report: Option<&FitnessReport>,
        live: Option<(&Strategy, Option<&FitnessReport>)>,
        window: &EvaluationWindow,
    ) -> (Decision, ReasoningSnapshot) {
        let candidate_fitness = candidate_report.map(|r| r.fitness);
        let live_fitness = live.and_then(|(_, report)| report.map(|r| r.fitness));

        let (decision, reason) = if window.observations < self.min_evaluation_window {
            (
                Decision::Hold,
                format!(
                    "evaluation window of {} observations is shorter than the minimum {}",
                    window.observations, self.min_evaluation_window
                ),
            )
        } else if let Some(fitness) = candidate_fitness {
            match live {
                Some((live_strategy, _)) if live_strategy.id == candidate.id => {
                    (Decision::Hold, "candidate is already live".to_string())
                }
                Some((_, Some(live_report))) => {
                    let gain = fitness - live_report.fitness;
                    if gain > self.promotion_margin {
                        (
                            Decision::Promote,
                            format!(
                                "fitness {:.6} beats live {:.6} by {:.6} > margin {}",
                                fitness, live_report.fitness, gain, self.promotion_margin
                            ),
                        )
                    } else {
                        (
                            Decision::Reject,
                            format!(
                                "fitness {:.6} vs live {:.6}: gain {:.6} within margin {}",
                                fitness, live_report.fitness, gain, self.promotion_margin
                            ),
                        )
                    }
                }
                _ => {
                    let context = if live.is_some() {
                        "live strategy not evaluable"
                    } else {
                        "no live strategy"
                    };
                    if fitness > self.min_fitness {
                        (
                            Decision::Promote,
                            format!("{context}; fitness {:.6} > minimum {}", fitness, self.min_fitness),
                        )
                    } else {
                        (
                            Decision::Reject,
                            format!("{context}; fitness {:.6} <= minimum {}", fitness, self.min_fitness),
                        )
                    }
                }
            }
        } else {
            (Decision::Hold, "candidate could not be evaluated".to_string())
        };

        let reasoning = ReasoningSnapshot {
            candidate_source: candidate.provenance,
            candidate_fitness,
            live_strategy_id: live.map(|(s, _)| s.id),
            live_fitness,
            promotion_margin: self.promotion_margin,
            min_fitness: self.min_fitness,
            window: window.clone(),
            min_evaluation_window: self.min_evaluation_window,
            reason,
        };
        (decision, reasoning)
    }
}
