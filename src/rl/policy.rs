//! Linear Gaussian policy
//!
//! The policy samples a trading signal from `N(w·x, std)` over the
//! evaluator's feature vector and maps it to a side with the genome's
//! entry/exit thresholds. Its parameters are a [`Genome`], so a trained
//! policy is scored exactly like any GA strategy.

use rand::Rng;
use serde::{Deserialize, Serialize};

use super::rollout::RolloutBuffer;
use crate::domain::{Genome, Side, StrategyParams, FEATURE_COUNT};
use crate::evaluator::FeatureVector;
use crate::ga::operators::standard_normal;

/// Step size of the running return baseline
const BASELINE_RATE: f64 = 0.1;

/// Discrete trading action implied by a policy decision
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// Do nothing, maintain current state
    Hold,
    GoLong,
    GoShort,
    /// Exit current position
    Flatten,
}

impl Action {
    /// Action that moves `current` exposure to `target`
    pub fn between(current: Side, target: Side) -> Self {
        if current == target {
            return Action::Hold;
        }
        match target {
            Side::Long => Action::GoLong,
            Side::Short => Action::GoShort,
            Side::Flat => Action::Flatten,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Action::Hold => "hold",
            Action::GoLong => "go_long",
            Action::GoShort => "go_short",
            Action::Flatten => "flatten",
        }
    }
}

/// Outcome of one policy-gradient update
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct UpdateStats {
    pub transitions: usize,
    pub mean_return: f64,
    /// Gradient norm before clipping
    pub grad_norm: f64,
    pub clipped: bool,
}

#[derive(Debug, Clone, PartialEq)]
pub struct LinearGaussianPolicy {
    params: StrategyParams,
    exploration_std: f64,
    baseline: f64,
}

impl LinearGaussianPolicy {
    pub fn from_genome(genome: &Genome, exploration_std: f64, baseline: f64) -> Result<Self, String> {
        Ok(Self {
            params: genome.params()?,
            exploration_std,
            baseline,
        })
    }

    pub fn params(&self) -> &StrategyParams {
        &self.params
    }

    pub fn exploration_std(&self) -> f64 {
        self.exploration_std
    }

    pub fn baseline(&self) -> f64 {
        self.baseline
    }

    /// Deterministic signal
    pub fn mean(&self, features: &FeatureVector) -> f64 {
        self.params.signal(features)
    }

    /// Exploratory signal drawn around the mean
    pub fn sample<R: Rng + ?Sized>(&self, features: &FeatureVector, rng: &mut R) -> (f64, f64) {
        let mean = self.mean(features);
        (mean, mean + self.exploration_std * standard_normal(rng))
    }

    pub fn decide(&self, signal: f64, current: Side) -> Side {
        self.params.target_side(signal, current)
    }

    /// REINFORCE over the rollout with the running baseline.
    ///
    /// Only the feature weights are learned; thresholds and risk genes are
    /// inherited from the source genome.
    pub fn update(
        &mut self,
        rollout: &RolloutBuffer,
        gamma: f64,
        learning_rate: f64,
        max_grad_norm: f64,
    ) -> UpdateStats {
        let n = rollout.len();
        if n == 0 {
            return UpdateStats {
                transitions: 0,
                mean_return: 0.0,
                grad_norm: 0.0,
                clipped: false,
            };
        }

        let returns = rollout.discounted_returns(gamma);
        let mut grad = [0.0; FEATURE_COUNT];
        for (transition, ret) in rollout.transitions().iter().zip(returns.iter()) {
            let advantage = ret - self.baseline;
            for (g, s) in grad.iter_mut().zip(transition.score().iter()) {
                *g += advantage * s / n as f64;
            }
        }

        let grad_norm = grad.iter().map(|g| g * g).sum::<f64>().sqrt();
        let clipped = grad_norm > max_grad_norm;
        let scale = if clipped { max_grad_norm / grad_norm } else { 1.0 };

        if grad_norm.is_finite() {
            for (w, g) in self.params.weights.iter_mut().zip(grad.iter()) {
                *w = (*w + learning_rate * scale * g).clamp(-1.0, 1.0);
            }
        }

        let mean_return = returns.iter().sum::<f64>() / n as f64;
        self.baseline += BASELINE_RATE * (mean_return - self.baseline);

        UpdateStats {
            transitions: n,
            mean_return,
            grad_norm,
            clipped,
        }
    }

    pub fn decay_exploration(&mut self, decay: f64, min: f64) {
        self.exploration_std = (self.exploration_std * decay).max(min);
    }

    /// Current parameters as a valid genome
    pub fn genome(&self) -> Genome {
        let mut genome = Genome::from_params(&self.params);
        genome.repair();
        genome
    }
}
