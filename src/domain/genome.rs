//! Strategy Genome
//!
//! Fixed-length, typed encoding shared by GA strategies and RL policies.
//!
//! Layout (positional, so crossover exchanges genes index by index):
//!
//! | index | gene | kind |
//! |---|---|---|
//! | 0..6 | feature weights | real, [-1, 1] |
//! | 6 | entry threshold | real, [0.05, 3] |
//! | 7 | exit threshold | real, [0, 2], must stay below entry |
//! | 8 | position fraction | real, [0.05, 1] |
//! | 9 | stop loss pct | real, [0.002, 0.25] |
//! | 10 | take profit pct | real, [0.002, 0.5] |
//! | 11 | allow short | flag |

use rand::Rng;
use serde::{Deserialize, Serialize};

/// Number of derived features a genome weights
pub const FEATURE_COUNT: usize = 6;

/// Total number of genes
pub const GENOME_LEN: usize = FEATURE_COUNT + 6;

pub const ENTRY_THRESHOLD: usize = FEATURE_COUNT;
pub const EXIT_THRESHOLD: usize = FEATURE_COUNT + 1;
pub const POSITION_FRACTION: usize = FEATURE_COUNT + 2;
pub const STOP_LOSS: usize = FEATURE_COUNT + 3;
pub const TAKE_PROFIT: usize = FEATURE_COUNT + 4;
pub const ALLOW_SHORT: usize = FEATURE_COUNT + 5;

/// A single typed gene value
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum Gene {
    Real(f64),
    Flag(bool),
}

/// Kind and bounds of a gene position
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum GeneKind {
    Real { min: f64, max: f64 },
    Flag,
}

#[derive(Debug, Clone, Copy)]
pub struct GeneSpec {
    pub name: &'static str,
    pub kind: GeneKind,
}

const WEIGHT: GeneKind = GeneKind::Real { min: -1.0, max: 1.0 };

pub static GENOME_LAYOUT: [GeneSpec; GENOME_LEN] = [
    GeneSpec { name: "w_return_1", kind: WEIGHT },
    GeneSpec { name: "w_return_5", kind: WEIGHT },
    GeneSpec { name: "w_sma_deviation", kind: WEIGHT },
    GeneSpec { name: "w_volatility", kind: WEIGHT },
    GeneSpec { name: "w_range_position", kind: WEIGHT },
    GeneSpec { name: "w_volume_z", kind: WEIGHT },
    GeneSpec { name: "entry_threshold", kind: GeneKind::Real { min: 0.05, max: 3.0 } },
    GeneSpec { name: "exit_threshold", kind: GeneKind::Real { min: 0.0, max: 2.0 } },
    GeneSpec { name: "position_fraction", kind: GeneKind::Real { min: 0.05, max: 1.0 } },
    GeneSpec { name: "stop_loss_pct", kind: GeneKind::Real { min: 0.002, max: 0.25 } },
    GeneSpec { name: "take_profit_pct", kind: GeneKind::Real { min: 0.002, max: 0.5 } },
    GeneSpec { name: "allow_short", kind: GeneKind::Flag },
];

/// Target exposure of a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Side {
    Long,
    Flat,
    Short,
}

impl Side {
    /// Signed unit exposure
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Flat => 0.0,
            Side::Short => -1.0,
        }
    }
}

/// Decoded, typed view of a genome
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StrategyParams {
    pub weights: [f64; FEATURE_COUNT],
    pub entry_threshold: f64,
    pub exit_threshold: f64,
    pub position_fraction: f64,
    pub stop_loss_pct: f64,
    pub take_profit_pct: f64,
    pub allow_short: bool,
}

impl StrategyParams {
    /// Linear signal over the feature vector
    pub fn signal(&self, features: &[f64; FEATURE_COUNT]) -> f64 {
        self.weights
            .iter()
            .zip(features.iter())
            .map(|(w, x)| w * x)
            .sum()
    }

    /// Desired side given a signal and the currently held side.
    ///
    /// Entries need |signal| >= entry; an open position is kept until the
    /// signal falls back inside the exit band or flips to the other side.
    pub fn target_side(&self, signal: f64, current: Side) -> Side {
        if signal >= self.entry_threshold {
            return Side::Long;
        }
        if self.allow_short && signal <= -self.entry_threshold {
            return Side::Short;
        }
        match current {
            Side::Long if signal < self.exit_threshold => Side::Flat,
            Side::Short if signal > -self.exit_threshold => Side::Flat,
            Side::Short if !self.allow_short => Side::Flat,
            other => other,
        }
    }
}

/// Ordered sequence of typed genes following [`GENOME_LAYOUT`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Genome(Vec<Gene>);

impl Genome {
    /// Wrap raw genes. Use [`Genome::validate`] before trusting the result.
    pub fn from_genes(genes: Vec<Gene>) -> Self {
        Self(genes)
    }

    pub fn genes(&self) -> &[Gene] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn from_params(params: &StrategyParams) -> Self {
        let mut genes: Vec<Gene> = params.weights.iter().map(|w| Gene::Real(*w)).collect();
        genes.push(Gene::Real(params.entry_threshold));
        genes.push(Gene::Real(params.exit_threshold));
        genes.push(Gene::Real(params.position_fraction));
        genes.push(Gene::Real(params.stop_loss_pct));
        genes.push(Gene::Real(params.take_profit_pct));
        genes.push(Gene::Flag(params.allow_short));
        Self(genes)
    }

    /// Uniformly random genome within bounds, repaired to satisfy constraints
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        let genes = GENOME_LAYOUT
            .iter()
            .map(|spec| match spec.kind {
                GeneKind::Real { min, max } => Gene::Real(rng.gen_range(min..=max)),
                GeneKind::Flag => Gene::Flag(rng.gen_bool(0.5)),
            })
            .collect();
        let mut genome = Self(genes);
        genome.repair();
        genome
    }

    /// Structural validity check applied to every genome, seeded or bred
    pub fn validate(&self) -> Result<(), String> {
        if self.0.len() != GENOME_LEN {
            return Err(format!("expected {} genes, got {}", GENOME_LEN, self.0.len()));
        }
        for (i, (gene, spec)) in self.0.iter().zip(GENOME_LAYOUT.iter()).enumerate() {
            match (gene, spec.kind) {
                (Gene::Real(v), GeneKind::Real { min, max }) => {
                    if !v.is_finite() {
                        return Err(format!("gene {} ({}) is not finite", i, spec.name));
                    }
                    if *v < min || *v > max {
                        return Err(format!(
                            "gene {} ({}) = {} outside [{}, {}]",
                            i, spec.name, v, min, max
                        ));
                    }
                }
                (Gene::Flag(_), GeneKind::Flag) => {}
                _ => return Err(format!("gene {} ({}) has the wrong type", i, spec.name)),
            }
        }
        let entry = self.real(ENTRY_THRESHOLD);
        let exit = self.real(EXIT_THRESHOLD);
        if exit >= entry {
            return Err(format!("exit threshold {} must be below entry {}", exit, entry));
        }
        Ok(())
    }

    /// Clamp reals into bounds, fix wrong-typed genes and restore exit < entry.
    ///
    /// Only the length cannot be repaired.
    pub fn repair(&mut self) {
        for (gene, spec) in self.0.iter_mut().zip(GENOME_LAYOUT.iter()) {
            *gene = match (*gene, spec.kind) {
                (Gene::Real(v), GeneKind::Real { min, max }) => {
                    let v = if v.is_finite() { v } else { (min + max) / 2.0 };
                    Gene::Real(v.clamp(min, max))
                }
                (Gene::Flag(b), GeneKind::Flag) => Gene::Flag(b),
                (_, GeneKind::Real { min, max }) => Gene::Real((min + max) / 2.0),
                (_, GeneKind::Flag) => Gene::Flag(false),
            };
        }
        if self.0.len() == GENOME_LEN {
            let entry = self.real(ENTRY_THRESHOLD);
            if self.real(EXIT_THRESHOLD) >= entry {
                self.0[EXIT_THRESHOLD] = Gene::Real(entry * 0.5);
            }
        }
    }

    /// Decode into typed parameters. Fails on a structurally invalid genome.
    pub fn params(&self) -> Result<StrategyParams, String> {
        self.validate()?;
        let mut weights = [0.0; FEATURE_COUNT];
        for (i, w) in weights.iter_mut().enumerate() {
            *w = self.real(i);
        }
        Ok(StrategyParams {
            weights,
            entry_threshold: self.real(ENTRY_THRESHOLD),
            exit_threshold: self.real(EXIT_THRESHOLD),
            position_fraction: self.real(POSITION_FRACTION),
            stop_loss_pct: self.real(STOP_LOSS),
            take_profit_pct: self.real(TAKE_PROFIT),
            allow_short: matches!(self.0.get(ALLOW_SHORT), Some(Gene::Flag(true))),
        })
    }

    /// Bit-exact identity key, used to count distinct genomes
    pub fn fingerprint(&self) -> Vec<u64> {
        self.0
            .iter()
            .map(|g| match g {
                Gene::Real(v) => v.to_bits(),
                Gene::Flag(b) => *b as u64,
            })
            .collect()
    }

    fn real(&self, index: usize) -> f64 {
        match self.0.get(index) {
            Some(Gene::Real(v)) => *v,
            _ => f64::NAN,
        }
    }
}
