//! Feedback Coordinator
//!
//! Runs the evolve / train / evaluate / promote loop and owns the
//! promotion decision log.

pub mod config;
pub mod coordinator;
pub mod decision_log;
pub mod policy;
pub mod state;

pub use config::CoordinatorConfig;
pub use coordinator::{Components, CycleOutcome, FeedbackCoordinator};
pub use decision_log::DecisionLog;
pub use policy::PromotionPolicy;
pub use state::{CoordinatorState, CoordinatorStatus, LiveStrategy};
