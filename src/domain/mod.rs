pub mod decision;
pub mod fitness;
pub mod genome;
pub mod lineage;
pub mod observation;
pub mod strategy;

pub use decision::*;
pub use fitness::*;
pub use genome::{Gene, GeneKind, Genome, Side, StrategyParams, FEATURE_COUNT, GENOME_LEN};
pub use lineage::*;
pub use observation::*;
pub use strategy::*;
