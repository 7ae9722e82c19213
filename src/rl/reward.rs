//! Reward Functions
//!
//! Defines reward signals and functions for RL training.

use serde::{Deserialize, Serialize};

/// Reward signal components
///
/// Kept apart so logs show whether costs or price moves drive the total.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct RewardSignal {
    /// Equity change as a fraction of initial capital, before clipping
    pub pnl_reward: f64,
    /// Fees paid this step as a fraction of initial capital (already in pnl)
    pub cost_penalty: f64,
    /// Clipped reward fed to the learner
    pub total: f64,
}

impl RewardSignal {
    /// Create a zero reward signal
    pub fn zero() -> Self {
        Self::default()
    }

    pub fn is_clipped(&self) -> bool {
        self.total != self.pnl_reward
    }
}

/// Information needed to compute rewards
#[derive(Debug, Clone, Copy, Default)]
pub struct RewardTransition {
    /// Marked equity at the previous step
    pub equity_before: f64,
    /// Marked equity now (realized and unrealized)
    pub equity_after: f64,
    /// Fees incurred during the step
    pub fees: f64,
}

/// Trait for computing rewards
pub trait RewardFunction: Send + Sync {
    /// Compute reward from a state transition
    fn compute(&self, transition: &RewardTransition) -> RewardSignal;
}

/// PnL-based reward function
///
/// Per-step portfolio P&L delta normalized by initial capital and clipped.
#[derive(Debug, Clone)]
pub struct PnLRewardFunction {
    initial_capital: f64,
    clip: f64,
}

impl PnLRewardFunction {
    pub fn new(initial_capital: f64, clip: f64) -> Self {
        Self {
            initial_capital,
            clip: clip.abs(),
        }
    }
}

impl RewardFunction for PnLRewardFunction {
    fn compute(&self, transition: &RewardTransition) -> RewardSignal {
        if !(self.initial_capital > 0.0) {
            return RewardSignal::zero();
        }
        let pnl = (transition.equity_after - transition.equity_before) / self.initial_capital;
        if !pnl.is_finite() {
            return RewardSignal::zero();
        }
        RewardSignal {
            pnl_reward: pnl,
            cost_penalty: transition.fees / self.initial_capital,
            total: pnl.clamp(-self.clip, self.clip),
        }
    }
}
