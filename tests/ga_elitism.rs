mod common;

use std::sync::Arc;

use aate::config::RiskConfig;
use aate::domain::{Genome, ObservationWindow, Provenance};
use aate::evaluator::{Evaluator, EvaluatorConfig, StrategyEvaluator};
use aate::ga::{GaConfig, GaEvolver};
use aate::logging::MemorySink;
use common::{bars, SYMBOL};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal_macros::dec;

fn evaluator() -> Arc<Evaluator> {
    Arc::new(Evaluator::new(
        EvaluatorConfig {
            min_observations: 100,
            lookback: 20,
            ..Default::default()
        },
        RiskConfig::default(),
    ))
}

/// Population of 10 with elitism 2: the top two survive each generation
/// unchanged and the best fitness never falls.
#[test]
fn elites_survive_and_best_fitness_never_regresses() {
    let window = ObservationWindow::new(SYMBOL, bars(SYMBOL, 300));
    let sink = Arc::new(MemorySink::new());
    let mut ga = GaEvolver::new(
        GaConfig {
            population_size: 10,
            elitism: 2,
            seed: Some(2024),
            ..Default::default()
        },
        evaluator(),
        dec!(10000),
        sink.clone(),
    );
    let mut rng = StdRng::seed_from_u64(7);
    ga.initialize((0..10).map(|_| Genome::random(&mut rng)).collect());

    let first = ga.step(&window).unwrap();
    assert_eq!(first.generation, 0);
    assert_eq!(first.size, 10);

    let mut previous = ga.population().unwrap().clone();
    for _ in 0..5 {
        let summary = ga.step(&window).unwrap();
        let current = ga.population().unwrap();
        assert_eq!(current.len(), 10);
        assert_eq!(summary.generation, previous.generation() + 1);

        let best_before = previous.best_fitness().unwrap();
        let best_after = current.best_fitness().unwrap();
        assert!(best_after >= best_before, "{best_after} < {best_before}");

        for elite in &previous.members()[..2] {
            let survivor = current
                .members()
                .iter()
                .find(|m| m.strategy.id == elite.strategy.id)
                .expect("elite carried over");
            assert_eq!(survivor.strategy.genome(), elite.strategy.genome());
            assert_eq!(survivor.fitness(), elite.fitness());
        }
        previous = current.clone();
    }

    assert_eq!(sink.count("generation_completed"), 6);
    let children = previous
        .members()
        .iter()
        .filter(|m| m.strategy.provenance != Provenance::Seeded)
        .count();
    assert!(children > 0);
}

#[test]
fn evaluation_is_deterministic() {
    let window = ObservationWindow::new(SYMBOL, bars(SYMBOL, 300));
    let evaluator = evaluator();
    let mut rng = StdRng::seed_from_u64(99);
    let strategy = aate::domain::Strategy::seeded(Genome::random(&mut rng));

    let a = evaluator.evaluate(&strategy, &window, dec!(10000)).unwrap();
    let b = evaluator.evaluate(&strategy, &window, dec!(10000)).unwrap();
    assert_eq!(a, b);

    let many = evaluator.evaluate_many(&[strategy.clone(), strategy], &window, dec!(10000));
    assert_eq!(many[0].as_ref().unwrap(), &a);
    assert_eq!(many[1].as_ref().unwrap().fitness, a.fitness);
}
