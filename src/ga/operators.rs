//! Variation operators
//!
//! The encoding is fixed-length, so crossover exchanges genes by position.
//! Both operators repair their output; a child that still fails validation
//! is an error in the operator, not in the parents.

use rand::Rng;

use crate::domain::genome::{GeneKind, GENOME_LAYOUT};
use crate::domain::{Gene, Genome};

/// Uniform per-gene exchange producing two complementary children
pub fn crossover<R: Rng + ?Sized>(a: &Genome, b: &Genome, rng: &mut R) -> (Genome, Genome) {
    let mut left = Vec::with_capacity(a.len());
    let mut right = Vec::with_capacity(a.len());
    for (ga, gb) in a.genes().iter().zip(b.genes().iter()) {
        if rng.gen_bool(0.5) {
            left.push(*ga);
            right.push(*gb);
        } else {
            left.push(*gb);
            right.push(*ga);
        }
    }
    let mut left = Genome::from_genes(left);
    let mut right = Genome::from_genes(right);
    left.repair();
    right.repair();
    (left, right)
}

/// Gaussian perturbation of each real gene with probability `rate`, scaled
/// by `std_frac` of the gene's range and clamped to bounds; flags flip with
/// the same probability.
pub fn mutate<R: Rng + ?Sized>(genome: &Genome, rate: f64, std_frac: f64, rng: &mut R) -> Genome {
    let genes = genome
        .genes()
        .iter()
        .zip(GENOME_LAYOUT.iter())
        .map(|(gene, spec)| {
            if !rng.gen_bool(rate.clamp(0.0, 1.0)) {
                return *gene;
            }
            match (*gene, spec.kind) {
                (Gene::Real(v), GeneKind::Real { min, max }) => {
                    let sigma = (max - min) * std_frac;
                    Gene::Real((v + sigma * standard_normal(rng)).clamp(min, max))
                }
                (Gene::Flag(b), GeneKind::Flag) => Gene::Flag(!b),
                (other, _) => other,
            }
        })
        .collect();
    let mut child = Genome::from_genes(genes);
    child.repair();
    child
}

/// Box-Muller transform
pub fn standard_normal<R: Rng + ?Sized>(rng: &mut R) -> f64 {
    let u1: f64 = rng.gen_range(f64::EPSILON..1.0);
    let u2: f64 = rng.gen::<f64>();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}
