//! Population and its published views

use ordered_float::OrderedFloat;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;

use crate::domain::{FitnessReport, Strategy};

/// A strategy with the report it was ranked by
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Member {
    pub strategy: Strategy,
    pub report: FitnessReport,
}

impl Member {
    pub fn fitness(&self) -> f64 {
        self.report.fitness
    }
}

/// One committed generation, sorted by descending fitness
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Population {
    generation: u64,
    members: Vec<Member>,
}

impl Population {
    pub fn new(generation: u64, mut members: Vec<Member>) -> Self {
        sort_members(&mut members);
        Self {
            generation,
            members,
        }
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn members(&self) -> &[Member] {
        &self.members
    }

    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn best(&self) -> Option<&Member> {
        self.members.first()
    }

    pub fn best_fitness(&self) -> Option<f64> {
        self.best().map(Member::fitness)
    }

    pub fn mean_fitness(&self) -> f64 {
        if self.members.is_empty() {
            return 0.0;
        }
        self.members.iter().map(Member::fitness).sum::<f64>() / self.members.len() as f64
    }

    pub fn fitness(&self) -> Vec<f64> {
        self.members.iter().map(Member::fitness).collect()
    }

    pub(crate) fn into_members(self) -> Vec<Member> {
        self.members
    }
}

/// Descending fitness; ties keep insertion order so elites stay first
pub(crate) fn sort_members(members: &mut [Member]) {
    members.sort_by_key(|m| Reverse(OrderedFloat(m.fitness())));
}

/// Why evolution stopped
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TerminationReason {
    Stagnation,
    MaxGenerations,
    Cancelled,
}

impl TerminationReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            TerminationReason::Stagnation => "stagnation",
            TerminationReason::MaxGenerations => "max_generations",
            TerminationReason::Cancelled => "cancelled",
        }
    }
}

/// Read-only view the coordinator consumes
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct PopulationSummary {
    pub generation: u64,
    pub size: usize,
    pub best: Option<Member>,
    pub mean_fitness: f64,
    pub distinct_genomes: usize,
    pub terminated: Option<TerminationReason>,
}

/// Everything needed to resume evolution after a restart
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PopulationSnapshot {
    pub population: Population,
    pub best_so_far: Option<f64>,
    pub stagnant_for: usize,
    /// Generation the current generation budget started from
    pub budget_start: u64,
    pub terminated: Option<TerminationReason>,
}
