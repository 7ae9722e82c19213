//! Rollout Buffer
//!
//! On-policy storage for one update's worth of transitions.

use serde::{Deserialize, Serialize};

use super::reward::RewardSignal;
use crate::evaluator::FeatureVector;

/// A single transition in the environment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transition {
    /// Features the action was sampled from
    pub features: FeatureVector,
    /// Policy mean at sampling time
    pub mean: f64,
    /// Sampled signal
    pub action: f64,
    /// Exploration std at sampling time
    pub exploration_std: f64,
    /// Detailed reward signal
    pub reward: RewardSignal,
}

impl Transition {
    /// Gradient of log N(action; w·x, std) with respect to the weights
    pub fn score(&self) -> FeatureVector {
        let variance = self.exploration_std * self.exploration_std;
        let scale = if variance > 0.0 {
            (self.action - self.mean) / variance
        } else {
            0.0
        };
        let mut grad = self.features;
        for g in grad.iter_mut() {
            *g *= scale;
        }
        grad
    }
}

/// Rollout buffer for on-policy updates
#[derive(Debug)]
pub struct RolloutBuffer {
    /// Transitions in current rollout
    transitions: Vec<Transition>,
    /// Maximum rollout length
    max_length: usize,
}

impl RolloutBuffer {
    pub fn new(max_length: usize) -> Self {
        Self {
            transitions: Vec::with_capacity(max_length),
            max_length,
        }
    }

    /// Add a transition; ignored once full
    pub fn push(&mut self, transition: Transition) {
        if self.transitions.len() < self.max_length {
            self.transitions.push(transition);
        }
    }

    pub fn is_full(&self) -> bool {
        self.transitions.len() >= self.max_length
    }

    pub fn len(&self) -> usize {
        self.transitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.transitions.is_empty()
    }

    pub fn transitions(&self) -> &[Transition] {
        &self.transitions
    }

    /// Discounted return from each step to the end of the rollout
    pub fn discounted_returns(&self, gamma: f64) -> Vec<f64> {
        let mut returns = vec![0.0; self.transitions.len()];
        let mut running = 0.0;
        for (t, transition) in self.transitions.iter().enumerate().rev() {
            running = transition.reward.total + gamma * running;
            returns[t] = running;
        }
        returns
    }

    pub fn clear(&mut self) {
        self.transitions.clear();
    }
}
