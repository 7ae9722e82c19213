mod common;

use std::sync::Arc;

use aate::config::RiskConfig;
use aate::domain::{Genome, Strategy, StrategyParams};
use aate::evaluator::{Evaluator, EvaluatorConfig};
use aate::logging::MemorySink;
use aate::rl::{PolicySource, RlConfig, RlTrainer};
use aate::store::{keys, MemoryStore, StateStore};
use common::{bars, SYMBOL};
use futures::stream;
use rust_decimal_macros::dec;
use serde_json::json;

fn trainer(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> RlTrainer {
    RlTrainer::new(
        RlConfig {
            update_frequency: 16,
            checkpoint_every: 1000,
            seed: Some(17),
            ..Default::default()
        },
        Evaluator::new(
            EvaluatorConfig {
                min_observations: 50,
                lookback: 10,
                ..Default::default()
            },
            RiskConfig::default(),
        ),
        dec!(10000),
        store,
        sink,
    )
}

fn seed() -> Strategy {
    Strategy::seeded(Genome::from_params(&StrategyParams {
        weights: [0.5, 0.3, 0.2, 0.0, 0.0, 0.0],
        entry_threshold: 0.4,
        exit_threshold: 0.1,
        position_fraction: 0.2,
        stop_loss_pct: 0.02,
        take_profit_pct: 0.05,
        allow_short: true,
    }))
}

/// The newest checkpoint is corrupted on disk: resuming falls back to the
/// previous valid one and reports the corruption.
#[tokio::test]
async fn resume_skips_corrupt_latest_checkpoint() {
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());

    let mut first = trainer(store.clone(), sink.clone());
    let older = first
        .train(PolicySource::Strategy(seed()), stream::iter(bars(SYMBOL, 120)), 30)
        .await
        .unwrap();
    let newer = first
        .train(
            PolicySource::ResumeLatest { fallback: seed() },
            stream::iter(bars(SYMBOL, 120)),
            20,
        )
        .await
        .unwrap();
    assert_eq!(newer.parent, Some(older.strategy_id()));
    assert_eq!(newer.step, older.step + 20);

    store
        .put(&keys::checkpoint(&newer.id), json!({"kind": "policy_checkpoint", "garbage": true}))
        .await
        .unwrap();

    let mut resumed = trainer(store.clone(), sink.clone());
    let latest = resumed.checkpoints().latest_valid().await.unwrap().unwrap();
    assert_eq!(latest.id, older.id);
    assert!(sink.count("checkpoint_corrupt") >= 1);

    let continued = resumed
        .train(
            PolicySource::ResumeLatest { fallback: seed() },
            stream::iter(bars(SYMBOL, 120)),
            10,
        )
        .await
        .unwrap();
    assert_eq!(continued.parent, Some(older.strategy_id()));
    assert_eq!(continued.step, older.step + 10);
    assert!(continued.verify().is_ok());
}

#[tokio::test]
async fn explicit_corrupt_checkpoint_is_refused() {
    let store = Arc::new(MemoryStore::new());
    let mut trainer = trainer(store, Arc::new(MemorySink::new()));
    let mut checkpoint = trainer
        .train(PolicySource::Strategy(seed()), stream::iter(bars(SYMBOL, 80)), 10)
        .await
        .unwrap();
    checkpoint.cumulative_reward += 1.0;

    let err = trainer
        .train(PolicySource::Checkpoint(checkpoint), stream::iter(bars(SYMBOL, 80)), 5)
        .await
        .unwrap_err();
    assert!(matches!(err, aate::AateError::CheckpointCorrupt { .. }));
}
