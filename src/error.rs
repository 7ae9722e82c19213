use chrono::{DateTime, Utc};
use thiserror::Error;

/// Main error type for the engine
#[derive(Error, Debug)]
pub enum AateError {
    // Configuration errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Configuration invalid: {}", .0.join("; "))]
    ConfigurationInvalid(Vec<String>),

    // Data quality errors (recovered by skip)
    #[error("Data quality: {0}")]
    DataQuality(#[from] FeedError),

    // Evaluation errors (strategy skipped for this cycle)
    #[error("Evaluation infeasible: {0}")]
    EvaluationInfeasible(#[from] EvaluationError),

    // GA errors
    #[error("Evolution error: {0}")]
    Evolution(#[from] EvolutionError),

    // RL errors
    #[error("Checkpoint {id} corrupt: {reason}")]
    CheckpointCorrupt { id: String, reason: String },

    // Persistence errors
    #[error("Store error: {0}")]
    Store(String),

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Schema error: {kind} v{found} is newer than supported v{supported}")]
    SchemaVersion {
        kind: String,
        found: u32,
        supported: u32,
    },

    // Serialization errors
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    // IO errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    // Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),

    // Generic errors
    #[error("Internal error: {0}")]
    Internal(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AateError {
    /// Failures that must halt the coordinator's cadence until resolved.
    ///
    /// Per-strategy and per-observation failures are contained where they
    /// happen and never reach this check.
    pub fn is_systemic(&self) -> bool {
        matches!(
            self,
            AateError::Config(_)
                | AateError::ConfigurationInvalid(_)
                | AateError::Store(_)
                | AateError::Database(_)
                | AateError::Io(_)
        )
    }
}

/// Result type alias for AateError
pub type Result<T> = std::result::Result<T, AateError>;

/// Observation feed rejections. Never fatal: the record is skipped.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum FeedError {
    #[error("OutOfOrderObservation: {symbol} at {timestamp} is before last seen {last_seen}")]
    OutOfOrderObservation {
        symbol: String,
        timestamp: DateTime<Utc>,
        last_seen: DateTime<Utc>,
    },

    #[error("DuplicateObservation: {symbol} at {timestamp}")]
    DuplicateObservation {
        symbol: String,
        timestamp: DateTime<Utc>,
    },

    #[error("Invalid observation for {symbol}: {reason}")]
    InvalidObservation { symbol: String, reason: String },
}

impl FeedError {
    pub fn kind(&self) -> &'static str {
        match self {
            FeedError::OutOfOrderObservation { .. } => "out_of_order",
            FeedError::DuplicateObservation { .. } => "duplicate",
            FeedError::InvalidObservation { .. } => "invalid",
        }
    }
}

/// Evaluator failures. The caller skips the strategy for this cycle.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvaluationError {
    #[error("InsufficientDataWindow: {available} observations, need {required}")]
    InsufficientDataWindow { available: usize, required: usize },

    #[error("Invalid genome for strategy {strategy_id}: {reason}")]
    InvalidGenome { strategy_id: String, reason: String },

    #[error("Invalid initial capital: {0}")]
    InvalidCapital(String),
}

/// Genetic algorithm failures
#[derive(Error, Debug, Clone, PartialEq)]
pub enum EvolutionError {
    #[error("DegeneratePopulation: only {distinct} distinct genome(s)")]
    DegeneratePopulation { distinct: usize },

    #[error("Empty population")]
    EmptyPopulation,

    #[error("No strategy in the generation could be evaluated")]
    NothingEvaluated,

    #[error("Evolution already terminated: {0}")]
    Terminated(String),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_invalid_joins_messages() {
        let err = AateError::ConfigurationInvalid(vec![
            "ga.mutation_rate must be within [0, 1]".to_string(),
            "rl.gamma must be within (0, 1]".to_string(),
        ]);
        let msg = err.to_string();
        assert!(msg.contains("mutation_rate"));
        assert!(msg.contains("; rl.gamma"));
    }

    #[test]
    fn test_systemic_classification() {
        assert!(AateError::Store("unreachable".into()).is_systemic());
        assert!(!AateError::from(EvolutionError::DegeneratePopulation { distinct: 1 }).is_systemic());
        assert!(!AateError::CheckpointCorrupt {
            id: "ckpt".into(),
            reason: "bad checksum".into()
        }
        .is_systemic());
    }
}
