//! RL Configuration

use serde::{Deserialize, Serialize};

/// Policy-gradient trainer hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RlConfig {
    /// Learning rate
    pub learning_rate: f64,
    /// Discount factor (gamma)
    pub gamma: f64,
    /// Initial std of the Gaussian over the policy signal
    pub exploration_std: f64,
    /// Floor for the decayed exploration std
    pub exploration_std_min: f64,
    /// Multiplicative decay applied after every update
    pub exploration_decay: f64,
    /// Per-step rewards are clipped to [-reward_clip, reward_clip]
    pub reward_clip: f64,
    /// Number of steps between policy updates
    pub update_frequency: usize,
    /// Steps between checkpoints
    pub checkpoint_every: usize,
    /// Checkpoints kept after cleanup
    pub checkpoint_retention: usize,
    /// Maximum gradient norm for clipping
    pub max_grad_norm: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for RlConfig {
    fn default() -> Self {
        Self {
            learning_rate: 3e-4,
            gamma: 0.99,
            exploration_std: 0.5,
            exploration_std_min: 0.05,
            exploration_decay: 0.995,
            reward_clip: 1.0,
            update_frequency: 64,
            checkpoint_every: 500,
            checkpoint_retention: 5,
            max_grad_norm: 1.0,
            seed: None,
        }
    }
}

impl RlConfig {
    pub fn validate(&self, errors: &mut Vec<String>) {
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            errors.push("rl.learning_rate must be positive".to_string());
        }
        if !(self.gamma > 0.0 && self.gamma <= 1.0) {
            errors.push("rl.gamma must be within (0, 1]".to_string());
        }
        if !(self.exploration_std_min > 0.0) {
            errors.push("rl.exploration_std_min must be positive".to_string());
        }
        if !(self.exploration_std >= self.exploration_std_min) {
            errors.push(format!(
                "rl.exploration_std ({}) must be at least rl.exploration_std_min ({})",
                self.exploration_std, self.exploration_std_min
            ));
        }
        if !(self.exploration_decay > 0.0 && self.exploration_decay <= 1.0) {
            errors.push("rl.exploration_decay must be within (0, 1]".to_string());
        }
        if !(self.reward_clip > 0.0) {
            errors.push("rl.reward_clip must be positive".to_string());
        }
        if self.update_frequency == 0 {
            errors.push("rl.update_frequency must be positive".to_string());
        }
        if self.checkpoint_every == 0 {
            errors.push("rl.checkpoint_every must be positive".to_string());
        }
        if self.checkpoint_retention == 0 {
            errors.push("rl.checkpoint_retention must be at least 1".to_string());
        }
        if !(self.max_grad_norm > 0.0) {
            errors.push("rl.max_grad_norm must be positive".to_string());
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        let mut errors = Vec::new();
        RlConfig::default().validate(&mut errors);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn test_gamma_out_of_range() {
        let config = RlConfig {
            gamma: 1.5,
            ..Default::default()
        };
        let mut errors = Vec::new();
        config.validate(&mut errors);
        assert_eq!(errors.len(), 1);
        assert!(errors[0].contains("rl.gamma"));
    }
}
