//! Reinforcement Learning Module
//!
//! Policy-gradient training of a linear Gaussian policy whose parameters
//! share the strategy genome encoding.
//!
//! # Features
//!
//! - **Reward**: per-step portfolio P&L as a fraction of initial capital
//! - **Learning**: REINFORCE with discounted returns and a running baseline
//! - **Checkpoints**: checksummed, retained in the state store, resumable

pub mod checkpoint;
pub mod config;
pub mod policy;
pub mod reward;
pub mod rollout;
pub mod trainer;

pub use checkpoint::{CheckpointIndex, CheckpointStore, PolicyCheckpoint};
pub use config::RlConfig;
pub use policy::{Action, LinearGaussianPolicy, UpdateStats};
pub use reward::{PnLRewardFunction, RewardFunction, RewardSignal, RewardTransition};
pub use rollout::{RolloutBuffer, Transition};
pub use trainer::{PolicySource, RlTrainer};
