//! Parent selection

use rand::Rng;
use std::collections::HashSet;

use super::config::SelectionMethod;
use crate::domain::Genome;
use crate::error::EvolutionError;

/// Number of bit-distinct genomes
pub fn distinct_genomes<'a, I>(genomes: I) -> usize
where
    I: IntoIterator<Item = &'a Genome>,
{
    genomes
        .into_iter()
        .map(Genome::fingerprint)
        .collect::<HashSet<_>>()
        .len()
}

/// Picks parent indices from a fitness slice
#[derive(Debug, Clone, Copy)]
pub struct Selector {
    method: SelectionMethod,
    tournament_size: usize,
}

impl Selector {
    pub fn new(method: SelectionMethod, tournament_size: usize) -> Self {
        Self {
            method,
            tournament_size: tournament_size.max(1),
        }
    }

    /// Guard run before every selection round
    pub fn check_diversity<'a, I>(genomes: I) -> Result<(), EvolutionError>
    where
        I: IntoIterator<Item = &'a Genome>,
    {
        let distinct = distinct_genomes(genomes);
        if distinct < 2 {
            return Err(EvolutionError::DegeneratePopulation { distinct });
        }
        Ok(())
    }

    pub fn select<R: Rng + ?Sized>(&self, fitness: &[f64], rng: &mut R) -> Result<usize, EvolutionError> {
        if fitness.is_empty() {
            return Err(EvolutionError::EmptyPopulation);
        }
        Ok(match self.method {
            SelectionMethod::Tournament => tournament(fitness, self.tournament_size, rng),
            SelectionMethod::FitnessProportionate => roulette(fitness, rng),
        })
    }
}

fn tournament<R: Rng + ?Sized>(fitness: &[f64], k: usize, rng: &mut R) -> usize {
    let mut best = rng.gen_range(0..fitness.len());
    for _ in 1..k {
        let idx = rng.gen_range(0..fitness.len());
        if fitness[idx] > fitness[best] {
            best = idx;
        }
    }
    best
}

fn roulette<R: Rng + ?Sized>(fitness: &[f64], rng: &mut R) -> usize {
    let min = fitness.iter().copied().fold(f64::INFINITY, f64::min);
    let weights: Vec<f64> = fitness.iter().map(|f| f - min).collect();
    let total: f64 = weights.iter().sum();
    if !(total > 0.0) || !total.is_finite() {
        return rng.gen_range(0..fitness.len());
    }
    let mut pick = rng.gen_range(0.0..total);
    for (i, w) in weights.iter().enumerate() {
        if pick < *w {
            return i;
        }
        pick -= w;
    }
    fitness.len() - 1
}
