pub mod cli;
pub mod config;
pub mod coordination;
pub mod coordinator;
pub mod domain;
pub mod engine;
pub mod error;
pub mod evaluator;
pub mod feed;
pub mod ga;
pub mod logging;
pub mod rl;
pub mod store;

#[cfg(test)]
mod test_support;

pub use config::AppConfig;
pub use coordination::{ShutdownHandle, ShutdownSignal};
pub use coordinator::{FeedbackCoordinator, PromotionPolicy};
pub use error::{AateError, Result};
pub use evaluator::{Evaluator, StrategyEvaluator};
pub use feed::ObservationFeed;
pub use ga::GaEvolver;
pub use rl::RlTrainer;
pub use store::StateStore;
