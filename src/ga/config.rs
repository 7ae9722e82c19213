//! GA Configuration

use serde::{Deserialize, Serialize};

/// Parent selection method
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SelectionMethod {
    Tournament,
    /// Roulette wheel over fitness shifted so the minimum is zero
    FitnessProportionate,
}

/// Genetic algorithm hyperparameters
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GaConfig {
    pub population_size: usize,
    pub max_generations: usize,
    /// Per-offspring mutation probability
    pub mutation_rate: f64,
    /// Gaussian std as a fraction of each gene's range
    pub mutation_std: f64,
    /// Per-pair crossover probability
    pub crossover_rate: f64,
    /// Top-K carried over unchanged
    pub elitism: usize,
    pub selection: SelectionMethod,
    pub tournament_size: usize,
    /// Generations without improvement before stopping
    pub stagnation_generations: usize,
    /// Minimum best-fitness gain that counts as improvement
    pub stagnation_epsilon: f64,
    /// Share of the population replaced when it degenerates
    pub reseed_fraction: f64,
    /// Fixed RNG seed for reproducible runs
    pub seed: Option<u64>,
}

impl Default for GaConfig {
    fn default() -> Self {
        Self {
            population_size: 50,
            max_generations: 100,
            mutation_rate: 0.1,
            mutation_std: 0.1,
            crossover_rate: 0.7,
            elitism: 2,
            selection: SelectionMethod::Tournament,
            tournament_size: 3,
            stagnation_generations: 10,
            stagnation_epsilon: 1e-4,
            reseed_fraction: 0.25,
            seed: None,
        }
    }
}

impl GaConfig {
    pub fn validate(&self, errors: &mut Vec<String>) {
        if self.population_size < 2 {
            errors.push("ga.population_size must be at least 2".to_string());
        }
        if self.max_generations == 0 {
            errors.push("ga.max_generations must be positive".to_string());
        }
        if !(0.0..=1.0).contains(&self.mutation_rate) {
            errors.push("ga.mutation_rate must be within [0, 1]".to_string());
        }
        if !(self.mutation_std > 0.0 && self.mutation_std <= 1.0) {
            errors.push("ga.mutation_std must be within (0, 1]".to_string());
        }
        if !(0.0..=1.0).contains(&self.crossover_rate) {
            errors.push("ga.crossover_rate must be within [0, 1]".to_string());
        }
        if self.elitism >= self.population_size {
            errors.push(format!(
                "ga.elitism ({}) must be below ga.population_size ({})",
                self.elitism, self.population_size
            ));
        }
        if self.selection == SelectionMethod::Tournament && self.tournament_size == 0 {
            errors.push("ga.tournament_size must be positive".to_string());
        }
        if self.stagnation_generations == 0 {
            errors.push("ga.stagnation_generations must be positive".to_string());
        }
        if self.stagnation_epsilon < 0.0 {
            errors.push("ga.stagnation_epsilon must be non-negative".to_string());
        }
        if !(self.reseed_fraction > 0.0 && self.reseed_fraction <= 1.0) {
            errors.push("ga.reseed_fraction must be within (0, 1]".to_string());
        }
    }
}
