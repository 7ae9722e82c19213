use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::genome::Genome;

/// Strategy identifier
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StrategyId(pub Uuid);

impl StrategyId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for StrategyId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for StrategyId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Where a strategy came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Provenance {
    /// Random or operator-provided genome
    Seeded,
    /// Parameters exported from an RL policy checkpoint
    RlDerived,
    /// Single-parent GA offspring (copy and/or mutation)
    GaDerived,
    /// Two-parent GA offspring (crossover)
    GaChild,
}

impl Provenance {
    pub fn as_str(&self) -> &'static str {
        match self {
            Provenance::Seeded => "seeded",
            Provenance::RlDerived => "rl-derived",
            Provenance::GaDerived => "ga-derived",
            Provenance::GaChild => "ga-child",
        }
    }
}

impl std::fmt::Display for Provenance {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An evaluable trading policy.
///
/// The genome never changes after construction; operators build a new
/// `Strategy` with a fresh id and record the parents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Strategy {
    pub id: StrategyId,
    genome: Genome,
    pub provenance: Provenance,
    /// 1 for seeds, parent version + 1 for offspring
    pub version: u32,
    #[serde(default)]
    pub parents: Vec<StrategyId>,
    pub created_at: DateTime<Utc>,
}

impl Strategy {
    /// A root strategy with no parents
    pub fn seeded(genome: Genome) -> Self {
        Self {
            id: StrategyId::new(),
            genome,
            provenance: Provenance::Seeded,
            version: 1,
            parents: Vec::new(),
            created_at: Utc::now(),
        }
    }

    /// Offspring of one or more parents
    pub fn derived(genome: Genome, provenance: Provenance, parents: &[&Strategy]) -> Self {
        let version = parents.iter().map(|p| p.version).max().unwrap_or(0) + 1;
        Self {
            id: StrategyId::new(),
            genome,
            provenance,
            version,
            parents: parents.iter().map(|p| p.id).collect(),
            created_at: Utc::now(),
        }
    }

    /// Rebuild with a known identifier (checkpoint export, restore)
    pub fn with_id(
        id: StrategyId,
        genome: Genome,
        provenance: Provenance,
        version: u32,
        parents: Vec<StrategyId>,
    ) -> Self {
        Self {
            id,
            genome,
            provenance,
            version,
            parents,
            created_at: Utc::now(),
        }
    }

    pub fn genome(&self) -> &Genome {
        &self.genome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn test_derived_bumps_version_and_records_parents() {
        let mut rng = StdRng::seed_from_u64(1);
        let a = Strategy::seeded(Genome::random(&mut rng));
        let b = Strategy::derived(Genome::random(&mut rng), Provenance::GaDerived, &[&a]);
        let c = Strategy::derived(Genome::random(&mut rng), Provenance::GaChild, &[&a, &b]);

        assert_eq!(b.version, 2);
        assert_eq!(c.version, 3);
        assert_eq!(c.parents, vec![a.id, b.id]);
        assert_ne!(c.id, a.id);
    }

    #[test]
    fn test_provenance_serializes_kebab_case() {
        let json = serde_json::to_string(&Provenance::RlDerived).unwrap();
        assert_eq!(json, "\"rl-derived\"");
    }
}
