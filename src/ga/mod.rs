//! Genetic-Algorithm Evolver
//!
//! Population search over strategy genomes, scored by the shared evaluator.

pub mod config;
pub mod evolver;
pub mod operators;
pub mod population;
pub mod selection;

pub use config::{GaConfig, SelectionMethod};
pub use evolver::{GaEvolver, GaPhase};
pub use population::{
    Member, Population, PopulationSnapshot, PopulationSummary, TerminationReason,
};
pub use selection::Selector;

use crate::store::Persisted;

impl Persisted for PopulationSnapshot {
    const KIND: &'static str = "population_snapshot";
}
