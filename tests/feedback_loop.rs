mod common;

use std::sync::Arc;

use aate::config::{AppConfig, StoreBackend, TradingMode};
use aate::coordinator::{CoordinatorState, CycleOutcome, LiveStrategy};
use aate::domain::Decision;
use aate::engine;
use aate::feed::ObservationFeed;
use aate::logging::MemorySink;
use aate::store::record::get_record;
use aate::store::{keys, FileStore, MemoryStore, StateStore};
use aate::ShutdownHandle;
use common::{bars, FlakyStore, SYMBOL};

fn config() -> AppConfig {
    let mut config = AppConfig::default();
    config.data.symbols = vec![SYMBOL.to_string()];
    config.evaluator.min_observations = 60;
    config.evaluator.lookback = 10;
    config.ga.population_size = 8;
    config.ga.seed = Some(31);
    config.rl.update_frequency = 16;
    config.rl.checkpoint_every = 1000;
    config.rl.seed = Some(41);
    config.coordinator.window_len = 150;
    config.coordinator.min_evaluation_window = 120;
    config.coordinator.rl_steps_per_cycle = 40;
    config.coordinator.min_fitness = -1e9;
    config.coordinator.halt_backoff_ms = 5;
    config.coordinator.max_halt_backoff_ms = 20;
    config
}

async fn feed(n: usize) -> Arc<ObservationFeed> {
    let feed = Arc::new(ObservationFeed::new(64, 1000, Arc::new(MemorySink::new())));
    for observation in bars(SYMBOL, n) {
        feed.ingest(observation).await.unwrap();
    }
    feed
}

/// A candidate that does not clear the margin never replaces the live strategy
#[tokio::test]
async fn margin_keeps_live_strategy_in_place() {
    let mut config = config();
    config.coordinator.promotion_margin = 1e6;
    assert!(config.validate().is_ok());

    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let feed = feed(200).await;
    let shutdown = ShutdownHandle::new();
    let mut coordinator =
        engine::build_coordinator(&config, feed.clone(), store.clone(), sink.clone(), &shutdown).unwrap();
    coordinator.restore().await.unwrap();

    let Some(CycleOutcome::Decided(first)) = coordinator.tick(&shutdown).await else {
        panic!("first cycle should decide");
    };
    assert_eq!(first.decision, Decision::Promote);
    let live_id = first.candidate_id;

    for observation in bars(SYMBOL, 230).into_iter().skip(200) {
        feed.ingest(observation).await.unwrap();
    }
    let Some(CycleOutcome::Decided(second)) = coordinator.tick(&shutdown).await else {
        panic!("second cycle should decide");
    };
    assert_ne!(second.decision, Decision::Promote);
    assert_eq!(second.reasoning.live_strategy_id, Some(live_id));
    assert!(second.reasoning.live_fitness.is_some());

    let live: LiveStrategy = get_record(store.as_ref(), keys::LIVE_STRATEGY).await.unwrap().unwrap();
    assert_eq!(live.strategy.id, live_id);

    let decisions = coordinator.decisions().all().await.unwrap();
    assert_eq!(decisions.len(), 2);
    assert_eq!(decisions[0].id, first.id);
    assert_eq!(decisions[1].id, second.id);
    assert_eq!(sink.count("promotion_decided"), 2);
}

/// A window that satisfies the evaluator but not the promotion minimum
/// produces no decision and no stored report
#[tokio::test]
async fn short_window_logs_no_decision() {
    let config = config();
    let store = Arc::new(MemoryStore::new());
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownHandle::new();
    let mut coordinator =
        engine::build_coordinator(&config, feed(100).await, store.clone(), sink.clone(), &shutdown).unwrap();
    coordinator.restore().await.unwrap();

    let outcome = coordinator.tick(&shutdown).await;
    assert_eq!(outcome, Some(CycleOutcome::Skipped { observations: 100 }));
    assert_eq!(store.log_len(keys::PROMOTION_LOG).await, 0);
    assert!(store.get(keys::LIVE_STRATEGY).await.unwrap().is_none());
    assert_eq!(sink.count("promotion_decided"), 0);
    assert!(coordinator.decisions().all().await.unwrap().is_empty());
}

/// Store writes fail mid-cycle: the coordinator halts without promoting,
/// resumes once the health check passes and then decides normally.
#[tokio::test]
async fn store_outage_halts_then_resumes() {
    let config = config();
    let store = Arc::new(FlakyStore::new(2));
    let sink = Arc::new(MemorySink::new());
    let shutdown = ShutdownHandle::new();
    let mut coordinator =
        engine::build_coordinator(&config, feed(200).await, store.clone(), sink.clone(), &shutdown).unwrap();
    coordinator.restore().await.unwrap();

    store.fail();
    assert!(coordinator.tick(&shutdown).await.is_none());
    assert_eq!(sink.count("coordinator_halted"), 1);
    assert_eq!(sink.count("coordinator_resumed"), 1);
    assert_eq!(store.failed_checks(), 2);
    assert_eq!(store.inner().log_len(keys::PROMOTION_LOG).await, 0);
    assert!(store.inner().get(keys::LIVE_STRATEGY).await.unwrap().is_none());
    assert_eq!(coordinator.status().state, CoordinatorState::Running);

    let outcome = coordinator.tick(&shutdown).await;
    assert!(matches!(outcome, Some(CycleOutcome::Decided(_))));
    assert_eq!(store.inner().log_len(keys::PROMOTION_LOG).await, 1);
}

/// Backtest mode end to end: replay a file, run one cycle, persist to disk
#[tokio::test]
async fn backtest_run_persists_decision() {
    let dir = std::env::temp_dir().join(format!("aate-backtest-{}", uuid::Uuid::new_v4()));
    tokio::fs::create_dir_all(&dir).await.unwrap();
    let data = dir.join("bars.jsonl");
    let lines: Vec<String> = bars(SYMBOL, 200)
        .iter()
        .map(|o| serde_json::to_string(o).unwrap())
        .collect();
    tokio::fs::write(&data, lines.join("\n")).await.unwrap();

    let mut config = config();
    config.app.mode = TradingMode::Backtest;
    config.data.replay_path = Some(data);
    config.data.poll_interval_ms = 1;
    config.store.backend = StoreBackend::File;
    config.store.path = Some(dir.join("state"));
    assert!(config.validate().is_ok());

    engine::run(config, ShutdownHandle::new()).await.unwrap();

    let store = FileStore::open(dir.join("state")).await.unwrap();
    let decisions = store.read_log(keys::PROMOTION_LOG, 0, 10).await.unwrap();
    assert_eq!(decisions.len(), 1);
    assert!(store.get(keys::LIVE_STRATEGY).await.unwrap().is_some());
    assert!(!store.read_log(keys::EVENT_LOG, 0, 1).await.unwrap().is_empty());

    let _ = tokio::fs::remove_dir_all(&dir).await;
}
