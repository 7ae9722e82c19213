//! Strategy lineage
//!
//! Append-only arena of strategies keyed by id. Parent/child links are
//! identifier pairs, never references, so the graph stays acyclic and
//! ownership stays flat.

use serde::{Deserialize, Serialize};
use std::collections::{HashMap, HashSet, VecDeque};

use super::strategy::{Provenance, Strategy, StrategyId};

/// How a child was produced from its parent
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LineageOperator {
    Crossover,
    Mutation,
    RlTraining,
}

#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LineageEdge {
    pub parent: StrategyId,
    pub child: StrategyId,
    pub operator: LineageOperator,
}

#[derive(Debug, Default)]
pub struct StrategyArena {
    strategies: HashMap<StrategyId, Strategy>,
    edges: Vec<LineageEdge>,
}

impl StrategyArena {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a strategy and its parent edges. Re-inserting an id is a no-op.
    pub fn insert(&mut self, strategy: Strategy) -> bool {
        if self.strategies.contains_key(&strategy.id) {
            return false;
        }
        let operator = match strategy.provenance {
            Provenance::GaChild => Some(LineageOperator::Crossover),
            Provenance::GaDerived => Some(LineageOperator::Mutation),
            Provenance::RlDerived => Some(LineageOperator::RlTraining),
            Provenance::Seeded => None,
        };
        if let Some(operator) = operator {
            for parent in &strategy.parents {
                self.edges.push(LineageEdge {
                    parent: *parent,
                    child: strategy.id,
                    operator,
                });
            }
        }
        self.strategies.insert(strategy.id, strategy);
        true
    }

    pub fn get(&self, id: &StrategyId) -> Option<&Strategy> {
        self.strategies.get(id)
    }

    pub fn contains(&self, id: &StrategyId) -> bool {
        self.strategies.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.strategies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.strategies.is_empty()
    }

    pub fn edges(&self) -> &[LineageEdge] {
        &self.edges
    }

    pub fn parents_of(&self, id: &StrategyId) -> Vec<StrategyId> {
        self.edges
            .iter()
            .filter(|e| e.child == *id)
            .map(|e| e.parent)
            .collect()
    }

    pub fn children_of(&self, id: &StrategyId) -> Vec<StrategyId> {
        self.edges
            .iter()
            .filter(|e| e.parent == *id)
            .map(|e| e.child)
            .collect()
    }

    /// All transitive ancestors, nearest first
    pub fn ancestors(&self, id: &StrategyId) -> Vec<StrategyId> {
        let mut seen = HashSet::new();
        let mut out = Vec::new();
        let mut queue: VecDeque<StrategyId> = self.parents_of(id).into();
        while let Some(next) = queue.pop_front() {
            if !seen.insert(next) {
                continue;
            }
            out.push(next);
            queue.extend(self.parents_of(&next));
        }
        out
    }
}
