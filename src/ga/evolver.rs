//! Generation state machine
//!
//! `Init -> Evaluate -> Select -> Reproduce -> Evaluate -> ... -> Terminate`
//!
//! Each [`GaEvolver::step`] builds the next generation off to the side and
//! commits it only when complete, so readers never observe a partial
//! generation and any error leaves the previous one in place.

use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};

use super::config::GaConfig;
use super::operators;
use super::population::{
    sort_members, Member, Population, PopulationSnapshot, PopulationSummary, TerminationReason,
};
use super::selection::{distinct_genomes, Selector};
use crate::coordination::ShutdownHandle;
use crate::domain::{Genome, ObservationWindow, Provenance, Strategy, StrategyArena, StrategyId};
use crate::error::{AateError, EvolutionError, Result};
use crate::evaluator::StrategyEvaluator;
use crate::logging::{EngineEvent, EventSink};

/// Per-gene perturbation probability once an offspring is chosen for mutation
const GENE_MUTATION_PROB: f64 = 0.5;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GaPhase {
    Init,
    Evaluate,
    Select,
    Reproduce,
    Terminate,
}

pub struct GaEvolver {
    config: GaConfig,
    evaluator: Arc<dyn StrategyEvaluator>,
    initial_capital: Decimal,
    sink: Arc<dyn EventSink>,
    rng: StdRng,
    selector: Selector,
    phase: GaPhase,
    /// Seeded strategies waiting for their first evaluation
    candidates: Vec<Strategy>,
    population: Option<Population>,
    lineage: StrategyArena,
    best_so_far: Option<f64>,
    stagnant_for: usize,
    budget_start: u64,
    terminated: Option<TerminationReason>,
    summary_tx: watch::Sender<PopulationSummary>,
}

impl GaEvolver {
    pub fn new(
        config: GaConfig,
        evaluator: Arc<dyn StrategyEvaluator>,
        initial_capital: Decimal,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let selector = Selector::new(config.selection, config.tournament_size);
        let (summary_tx, _) = watch::channel(PopulationSummary::default());
        Self {
            config,
            evaluator,
            initial_capital,
            sink,
            rng,
            selector,
            phase: GaPhase::Init,
            candidates: Vec::new(),
            population: None,
            lineage: StrategyArena::new(),
            best_so_far: None,
            stagnant_for: 0,
            budget_start: 0,
            terminated: None,
            summary_tx,
        }
    }

    pub fn phase(&self) -> GaPhase {
        self.phase
    }

    pub fn population(&self) -> Option<&Population> {
        self.population.as_ref()
    }

    pub fn lineage(&self) -> &StrategyArena {
        &self.lineage
    }

    pub fn terminated(&self) -> Option<TerminationReason> {
        self.terminated
    }

    pub fn summary(&self) -> PopulationSummary {
        self.summary_tx.borrow().clone()
    }

    /// Latest committed summary; updates after every commit
    pub fn subscribe(&self) -> watch::Receiver<PopulationSummary> {
        self.summary_tx.subscribe()
    }

    /// Seed the initial population: valid provided genomes first, topped up
    /// with random ones. Nothing is evaluated until the first `step`.
    pub fn initialize(&mut self, seeds: Vec<Genome>) {
        let mut candidates = Vec::with_capacity(self.config.population_size);
        for genome in seeds.into_iter().take(self.config.population_size) {
            match genome.validate() {
                Ok(()) => candidates.push(Strategy::seeded(genome)),
                Err(reason) => warn!(%reason, "Discarding invalid seed genome"),
            }
        }
        while candidates.len() < self.config.population_size {
            candidates.push(Strategy::seeded(Genome::random(&mut self.rng)));
        }
        for strategy in &candidates {
            self.lineage.insert(strategy.clone());
        }
        info!(size = candidates.len(), "GA population seeded");

        self.candidates = candidates;
        self.population = None;
        self.best_so_far = None;
        self.stagnant_for = 0;
        self.budget_start = 0;
        self.terminated = None;
        self.phase = GaPhase::Init;
    }

    /// Advance one generation over `window`.
    ///
    /// The first call evaluates the seeded population (generation 0). Later
    /// calls select, reproduce and evaluate; elites survive unchanged.
    pub fn step(&mut self, window: &ObservationWindow) -> Result<PopulationSummary> {
        if let Some(reason) = self.terminated {
            return Err(EvolutionError::Terminated(reason.as_str().to_string()).into());
        }
        if self.population.is_none() && self.candidates.is_empty() {
            self.initialize(Vec::new());
        }

        let stale = self.population.as_ref().map(|p| {
            p.members().first().map(|m| &m.report.window) != Some(&window.descriptor())
        });
        let result = match stale {
            None => self.evaluate_initial(window),
            // Ranking on a stale window is meaningless; rescore first
            Some(true) => self
                .rebase(window)
                .and_then(|()| self.next_generation(window)),
            Some(false) => self.next_generation(window),
        };

        match result {
            Ok((next, skipped)) => Ok(self.commit(next, skipped)),
            Err(e) => {
                self.phase = if self.population.is_some() {
                    GaPhase::Evaluate
                } else {
                    GaPhase::Init
                };
                Err(e)
            }
        }
    }

    /// Re-evaluate the committed population on a new window, keeping ids.
    ///
    /// Members that cannot be evaluated on the new window are dropped; the
    /// next generation refills the population.
    pub fn rebase(&mut self, window: &ObservationWindow) -> Result<()> {
        let Some(current) = self.population.as_ref() else {
            return Ok(());
        };
        let strategies: Vec<Strategy> = current.members().iter().map(|m| m.strategy.clone()).collect();
        let results = self
            .evaluator
            .evaluate_many(&strategies, window, self.initial_capital);

        let mut members = Vec::with_capacity(strategies.len());
        for (strategy, result) in strategies.into_iter().zip(results) {
            match result {
                Ok(report) => members.push(Member { strategy, report }),
                Err(e) => self.sink.emit(EngineEvent::EvaluationSkipped {
                    strategy_id: strategy.id,
                    reason: e.to_string(),
                }),
            }
        }
        let evaluated = members.len();
        if evaluated == 0 {
            return Err(EvolutionError::NothingEvaluated.into());
        }

        let population = Population::new(self.generation(), members);
        // Fitness on the new window is not comparable with the old best
        self.best_so_far = population.best_fitness();
        self.population = Some(population);
        self.publish();
        debug!(evaluated, symbol = window.symbol(), "Population rebased onto new window");
        Ok(())
    }

    /// Run generations until termination, cancellation or `max_steps`
    pub fn run(
        &mut self,
        window: &ObservationWindow,
        shutdown: &ShutdownHandle,
        max_steps: Option<usize>,
    ) -> Result<PopulationSummary> {
        let mut steps = 0;
        while self.terminated.is_none() {
            if shutdown.is_requested() {
                info!(generation = self.generation(), "Evolution cancelled at generation boundary");
                self.terminate(TerminationReason::Cancelled);
                break;
            }
            if max_steps.is_some_and(|max| steps >= max) {
                break;
            }
            self.step(window)?;
            steps += 1;
        }
        Ok(self.summary())
    }

    /// Lift a termination so a long-running loop can keep searching.
    ///
    /// Starts a fresh generation budget and replaces `reseed_fraction` of
    /// the non-elite members with random strategies.
    pub fn reopen(&mut self, window: &ObservationWindow) -> Result<()> {
        if self.terminated.is_none() {
            return Ok(());
        }
        let Some(current) = self.population.clone() else {
            self.terminated = None;
            self.phase = GaPhase::Init;
            return Ok(());
        };
        let (members, replaced) = self.reseed(current.into_members(), window)?;
        self.population = Some(Population::new(self.generation(), members));
        self.terminated = None;
        self.stagnant_for = 0;
        self.budget_start = self.generation();
        self.phase = GaPhase::Evaluate;
        info!(replaced, generation = self.generation(), "Evolution reopened");
        self.publish();
        Ok(())
    }

    pub fn snapshot(&self) -> Option<PopulationSnapshot> {
        self.population.as_ref().map(|population| PopulationSnapshot {
            population: population.clone(),
            best_so_far: self.best_so_far,
            stagnant_for: self.stagnant_for,
            budget_start: self.budget_start,
            terminated: self.terminated,
        })
    }

    /// Restore a persisted generation. Members with invalid genomes are
    /// dropped; an empty result is an error.
    pub fn restore(&mut self, snapshot: PopulationSnapshot) -> Result<()> {
        let generation = snapshot.population.generation();
        let members: Vec<Member> = snapshot
            .population
            .into_members()
            .into_iter()
            .filter(|m| match m.strategy.genome().validate() {
                Ok(()) => true,
                Err(reason) => {
                    warn!(strategy_id = %m.strategy.id, %reason, "Dropping invalid restored member");
                    false
                }
            })
            .collect();
        if members.is_empty() {
            return Err(EvolutionError::EmptyPopulation.into());
        }
        for member in &members {
            self.lineage.insert(member.strategy.clone());
        }
        self.population = Some(Population::new(generation, members));
        self.candidates.clear();
        self.best_so_far = snapshot.best_so_far;
        self.stagnant_for = snapshot.stagnant_for;
        self.budget_start = snapshot.budget_start;
        self.terminated = snapshot.terminated;
        self.phase = if self.terminated.is_some() {
            GaPhase::Terminate
        } else {
            GaPhase::Evaluate
        };
        info!(generation, "GA population restored");
        self.publish();
        Ok(())
    }

    fn generation(&self) -> u64 {
        self.population.as_ref().map(Population::generation).unwrap_or(0)
    }

    fn evaluate_initial(&mut self, window: &ObservationWindow) -> Result<(Population, usize)> {
        self.phase = GaPhase::Evaluate;
        let results = self
            .evaluator
            .evaluate_many(&self.candidates, window, self.initial_capital);
        let mut members = Vec::with_capacity(self.candidates.len());
        let mut skipped = 0;
        for (strategy, result) in self.candidates.iter().zip(results) {
            match result {
                Ok(report) => members.push(Member {
                    strategy: strategy.clone(),
                    report,
                }),
                Err(e) => {
                    skipped += 1;
                    self.sink.emit(EngineEvent::EvaluationSkipped {
                        strategy_id: strategy.id,
                        reason: e.to_string(),
                    });
                }
            }
        }
        if members.is_empty() {
            return Err(EvolutionError::NothingEvaluated.into());
        }
        Ok((Population::new(0, members), skipped))
    }

    fn next_generation(&mut self, window: &ObservationWindow) -> Result<(Population, usize)> {
        let current = self
            .population
            .clone()
            .ok_or(AateError::Evolution(EvolutionError::EmptyPopulation))?;

        self.phase = GaPhase::Select;
        let current_generation = current.generation();
        let mut members = current.into_members();
        if let Err(EvolutionError::DegeneratePopulation { distinct }) =
            Selector::check_diversity(members.iter().map(|m| m.strategy.genome()))
        {
            warn!(distinct, generation = self.generation(), "Degenerate population, re-seeding");
            let (reseeded, _) = self.reseed(members, window)?;
            members = reseeded;
            Selector::check_diversity(members.iter().map(|m| m.strategy.genome()))?;
        }

        let size = self.config.population_size;
        let elite_count = self.config.elitism.min(members.len());
        let elites: Vec<Member> = members.iter().take(elite_count).cloned().collect();
        let fitness: Vec<f64> = members.iter().map(Member::fitness).collect();

        self.phase = GaPhase::Reproduce;
        let mut offspring: Vec<Strategy> = Vec::with_capacity(size.saturating_sub(elite_count));
        while offspring.len() + elite_count < size {
            let a = &members[self.selector.select(&fitness, &mut self.rng)?].strategy;
            let b = &members[self.selector.select(&fitness, &mut self.rng)?].strategy;

            let crossed = self.rng.gen_bool(self.config.crossover_rate);
            let (g1, g2) = if crossed {
                operators::crossover(a.genome(), b.genome(), &mut self.rng)
            } else {
                (a.genome().clone(), b.genome().clone())
            };

            for (genome, parent) in [(g1, a), (g2, b)] {
                if offspring.len() + elite_count >= size {
                    break;
                }
                let genome = if self.rng.gen_bool(self.config.mutation_rate) {
                    operators::mutate(&genome, GENE_MUTATION_PROB, self.config.mutation_std, &mut self.rng)
                } else {
                    genome
                };
                if let Err(reason) = genome.validate() {
                    warn!(%reason, "Operator produced an invalid genome, discarding");
                    continue;
                }
                let child = if crossed {
                    Strategy::derived(genome, Provenance::GaChild, &[a, b])
                } else {
                    Strategy::derived(genome, Provenance::GaDerived, &[parent])
                };
                offspring.push(child);
            }
        }

        self.phase = GaPhase::Evaluate;
        let results = self
            .evaluator
            .evaluate_many(&offspring, window, self.initial_capital);

        let mut next = elites;
        let mut skipped = 0;
        for (child, result) in offspring.into_iter().zip(results) {
            match result {
                Ok(report) => next.push(Member {
                    strategy: child,
                    report,
                }),
                Err(e) => {
                    skipped += 1;
                    self.sink.emit(EngineEvent::EvaluationSkipped {
                        strategy_id: child.id,
                        reason: e.to_string(),
                    });
                }
            }
        }

        // Fill gaps left by skipped offspring with previous survivors by rank
        if next.len() < size {
            let present: HashSet<_> = next.iter().map(|m| m.strategy.id).collect();
            let fill: Vec<Member> = members
                .iter()
                .filter(|m| !present.contains(&m.strategy.id))
                .take(size - next.len())
                .cloned()
                .collect();
            next.extend(fill);
        }
        if skipped > 0 {
            debug!(skipped, "Offspring skipped this generation");
        }

        Ok((Population::new(current_generation + 1, next), skipped))
    }

    /// Replace the worst `reseed_fraction` (never elites) with random
    /// strategies; evaluation failures keep the original member.
    fn reseed(&mut self, mut members: Vec<Member>, window: &ObservationWindow) -> Result<(Vec<Member>, usize)> {
        let distinct_before = distinct_genomes(members.iter().map(|m| m.strategy.genome()));
        let replaceable = members.len().saturating_sub(self.config.elitism);
        let count = ((members.len() as f64 * self.config.reseed_fraction).ceil() as usize)
            .max(1)
            .min(replaceable);
        if count == 0 {
            return Ok((members, 0));
        }

        let fresh: Vec<Strategy> = (0..count)
            .map(|_| Strategy::seeded(Genome::random(&mut self.rng)))
            .collect();
        let results = self
            .evaluator
            .evaluate_many(&fresh, window, self.initial_capital);

        let start = members.len() - count;
        let mut replaced = 0;
        for (slot, (strategy, result)) in fresh.into_iter().zip(results).enumerate() {
            match result {
                Ok(report) => {
                    self.lineage.insert(strategy.clone());
                    members[start + slot] = Member { strategy, report };
                    replaced += 1;
                }
                Err(e) => self.sink.emit(EngineEvent::EvaluationSkipped {
                    strategy_id: strategy.id,
                    reason: e.to_string(),
                }),
            }
        }
        sort_members(&mut members);

        self.sink.emit(EngineEvent::PopulationReseeded {
            generation: self.generation(),
            distinct_before,
            replaced,
        });
        Ok((members, replaced))
    }

    fn commit(&mut self, next: Population, skipped: usize) -> PopulationSummary {
        let previous: HashSet<StrategyId> = self
            .population
            .iter()
            .flat_map(|p| p.members().iter().map(|m| m.strategy.id))
            .collect();
        let evaluated = next
            .members()
            .iter()
            .filter(|m| !previous.contains(&m.strategy.id))
            .count();
        for member in next.members() {
            self.lineage.insert(member.strategy.clone());
        }

        let best = next.best_fitness().unwrap_or(f64::NEG_INFINITY);
        match self.best_so_far {
            Some(prev) if best <= prev + self.config.stagnation_epsilon => self.stagnant_for += 1,
            _ => {
                self.best_so_far = Some(best);
                self.stagnant_for = 0;
            }
        }
        if next.generation() == 0 {
            self.stagnant_for = 0;
        }

        let generation = next.generation();
        let distinct = distinct_genomes(next.members().iter().map(|m| m.strategy.genome()));
        self.sink.emit(EngineEvent::GenerationCompleted {
            generation,
            best_fitness: best,
            mean_fitness: next.mean_fitness(),
            distinct_genomes: distinct,
            evaluated,
            skipped,
        });

        self.candidates.clear();
        self.population = Some(next);
        self.phase = GaPhase::Evaluate;

        // Stagnation takes precedence over the generation budget
        if self.stagnant_for >= self.config.stagnation_generations {
            self.terminate(TerminationReason::Stagnation);
        } else if generation.saturating_sub(self.budget_start) >= self.config.max_generations as u64 {
            self.terminate(TerminationReason::MaxGenerations);
        }

        self.publish();
        self.summary()
    }

    fn terminate(&mut self, reason: TerminationReason) {
        self.terminated = Some(reason);
        self.phase = GaPhase::Terminate;
        let best_fitness = self.population.as_ref().and_then(Population::best_fitness);
        info!(generation = self.generation(), reason = reason.as_str(), ?best_fitness, "Evolution terminated");
        self.sink.emit(EngineEvent::EvolutionTerminated {
            generation: self.generation(),
            reason: reason.as_str().to_string(),
            best_fitness,
        });
        self.publish();
    }

    fn publish(&self) {
        let summary = match self.population.as_ref() {
            Some(population) => PopulationSummary {
                generation: population.generation(),
                size: population.len(),
                best: population.best().cloned(),
                mean_fitness: population.mean_fitness(),
                distinct_genomes: distinct_genomes(
                    population.members().iter().map(|m| m.strategy.genome()),
                ),
                terminated: self.terminated,
            },
            None => PopulationSummary {
                terminated: self.terminated,
                ..Default::default()
            },
        };
        self.summary_tx.send_replace(summary);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{FitnessBreakdown, FitnessReport, StrategyParams};
    use crate::error::EvaluationError;
    use crate::evaluator::MockStrategyEvaluator;
    use crate::logging::MemorySink;
    use crate::test_support::series;
    use rust_decimal_macros::dec;

    /// Fitness = 10 * first weight; window-independent
    struct WeightEvaluator;

    impl StrategyEvaluator for WeightEvaluator {
        fn evaluate(
            &self,
            strategy: &Strategy,
            window: &ObservationWindow,
            _initial_capital: Decimal,
        ) -> std::result::Result<FitnessReport, EvaluationError> {
            let params = strategy.genome().params().map_err(|reason| EvaluationError::InvalidGenome {
                strategy_id: strategy.id.to_string(),
                reason,
            })?;
            Ok(FitnessReport {
                strategy_id: strategy.id,
                window: window.descriptor(),
                fitness: 10.0 * params.weights[0],
                breakdown: FitnessBreakdown::default(),
                terminated_early: false,
            })
        }

        fn min_observations(&self) -> usize {
            1
        }
    }

    fn genome_with_w0(w0: f64) -> Genome {
        Genome::from_params(&StrategyParams {
            weights: [w0, 0.1, 0.2, 0.3, 0.4, 0.5],
            entry_threshold: 0.5,
            exit_threshold: 0.1,
            position_fraction: 0.5,
            stop_loss_pct: 0.02,
            take_profit_pct: 0.05,
            allow_short: false,
        })
    }

    fn evolver(config: GaConfig, sink: Arc<MemorySink>) -> GaEvolver {
        GaEvolver::new(config, Arc::new(WeightEvaluator), dec!(10000), sink)
    }

    fn window() -> ObservationWindow {
        ObservationWindow::new("BTC/USDT", series("BTC/USDT", 10, 0.0))
    }

    #[test]
    fn test_elitism_keeps_best_genome_unchanged() {
        let config = GaConfig {
            population_size: 10,
            elitism: 1,
            mutation_rate: 0.0,
            seed: Some(42),
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let mut ga = evolver(config, sink.clone());
        ga.initialize((0..10).map(|i| genome_with_w0(1.0 - 0.2 * i as f64)).collect());

        let window = window();
        let gen0 = ga.step(&window).unwrap();
        let top = gen0.best.unwrap();
        assert!((top.fitness() - 10.0).abs() < 1e-9);

        let gen1 = ga.step(&window).unwrap();
        assert_eq!(gen1.generation, 1);
        let population = ga.population().unwrap();
        let survivor = population
            .members()
            .iter()
            .find(|m| m.strategy.id == top.strategy.id)
            .expect("elite survives");
        assert_eq!(survivor, &top);
        assert!(gen1.best.unwrap().fitness() >= top.fitness());
        assert_eq!(sink.count("generation_completed"), 2);
    }

    #[test]
    fn test_best_fitness_never_regresses() {
        let config = GaConfig {
            population_size: 20,
            elitism: 2,
            seed: Some(7),
            stagnation_generations: 1000,
            ..Default::default()
        };
        let mut ga = evolver(config, Arc::new(MemorySink::new()));
        ga.initialize(Vec::new());
        let window = window();
        let mut best = f64::NEG_INFINITY;
        for _ in 0..15 {
            let summary = ga.step(&window).unwrap();
            let now = summary.best.unwrap().fitness();
            assert!(now >= best);
            best = now;
        }
    }

    #[test]
    fn test_offspring_recorded_in_lineage() {
        let config = GaConfig {
            population_size: 8,
            seed: Some(1),
            crossover_rate: 1.0,
            ..Default::default()
        };
        let mut ga = evolver(config, Arc::new(MemorySink::new()));
        ga.initialize(Vec::new());
        let window = window();
        ga.step(&window).unwrap();
        ga.step(&window).unwrap();

        let children: Vec<_> = ga
            .population()
            .unwrap()
            .members()
            .iter()
            .filter(|m| m.strategy.provenance == Provenance::GaChild)
            .collect();
        assert!(!children.is_empty());
        for child in children {
            assert_eq!(child.strategy.parents.len(), 2);
            assert_eq!(ga.lineage().parents_of(&child.strategy.id).len(), 2);
        }
    }

    #[test]
    fn test_degenerate_population_is_reseeded() {
        let config = GaConfig {
            population_size: 6,
            elitism: 1,
            seed: Some(3),
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let mut ga = evolver(config, sink.clone());
        ga.initialize(vec![genome_with_w0(0.3); 6]);
        let window = window();
        ga.step(&window).unwrap();
        ga.step(&window).unwrap();

        assert_eq!(sink.count("population_reseeded"), 1);
        assert_eq!(ga.population().unwrap().generation(), 1);
    }

    #[test]
    fn test_stagnation_terminates_before_generation_budget() {
        let config = GaConfig {
            population_size: 4,
            elitism: 1,
            max_generations: 50,
            stagnation_generations: 2,
            stagnation_epsilon: 100.0,
            seed: Some(5),
            ..Default::default()
        };
        let sink = Arc::new(MemorySink::new());
        let mut ga = evolver(config, sink.clone());
        ga.initialize(Vec::new());
        let summary = ga.run(&window(), &ShutdownHandle::new(), None).unwrap();

        assert_eq!(summary.terminated, Some(TerminationReason::Stagnation));
        assert_eq!(summary.generation, 2);
        assert_eq!(ga.phase(), GaPhase::Terminate);
        assert!(ga.step(&window()).is_err());

        ga.reopen(&window()).unwrap();
        assert!(ga.terminated().is_none());
        assert!(ga.step(&window()).is_ok());
    }

    #[test]
    fn test_max_generations_terminates() {
        let config = GaConfig {
            population_size: 4,
            elitism: 1,
            max_generations: 3,
            stagnation_generations: 100,
            seed: Some(9),
            ..Default::default()
        };
        let mut ga = evolver(config, Arc::new(MemorySink::new()));
        ga.initialize(Vec::new());
        let summary = ga.run(&window(), &ShutdownHandle::new(), None).unwrap();
        assert_eq!(summary.terminated, Some(TerminationReason::MaxGenerations));
        assert_eq!(summary.generation, 3);
    }

    #[test]
    fn test_failed_generation_keeps_previous() {
        let mut mock = MockStrategyEvaluator::new();
        mock.expect_evaluate_many().returning(|strategies, _, _| {
            strategies
                .iter()
                .map(|_| {
                    Err(EvaluationError::InsufficientDataWindow {
                        available: 1,
                        required: 100,
                    })
                })
                .collect()
        });
        let sink = Arc::new(MemorySink::new());
        let mut ga = GaEvolver::new(
            GaConfig {
                population_size: 4,
                seed: Some(2),
                ..Default::default()
            },
            Arc::new(mock),
            dec!(10000),
            sink.clone(),
        );
        ga.initialize(Vec::new());
        let err = ga.step(&window()).unwrap_err();
        assert!(matches!(err, AateError::Evolution(EvolutionError::NothingEvaluated)));
        assert!(ga.population().is_none());
        assert_eq!(ga.phase(), GaPhase::Init);
        assert_eq!(sink.count("evaluation_skipped"), 4);
    }

    #[test]
    fn test_snapshot_restore_roundtrip() {
        let config = GaConfig {
            population_size: 5,
            seed: Some(4),
            ..Default::default()
        };
        let mut ga = evolver(config.clone(), Arc::new(MemorySink::new()));
        ga.initialize(Vec::new());
        ga.step(&window()).unwrap();
        let snapshot = ga.snapshot().unwrap();

        let mut restored = evolver(config, Arc::new(MemorySink::new()));
        restored.restore(snapshot.clone()).unwrap();
        assert_eq!(restored.population(), Some(&snapshot.population));
        assert_eq!(restored.summary().generation, 0);
    }

    #[test]
    fn test_cancel_at_generation_boundary() {
        let mut ga = evolver(
            GaConfig {
                population_size: 4,
                seed: Some(8),
                ..Default::default()
            },
            Arc::new(MemorySink::new()),
        );
        ga.initialize(Vec::new());
        let shutdown = ShutdownHandle::new();
        ga.run(&window(), &shutdown, Some(2)).unwrap();
        shutdown.trigger(crate::coordination::ShutdownSignal::Graceful);
        let summary = ga.run(&window(), &shutdown, None).unwrap();
        assert_eq!(summary.terminated, Some(TerminationReason::Cancelled));
        assert_eq!(summary.generation, 1);
    }
}
