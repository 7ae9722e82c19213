//! Engine wiring
//!
//! Builds the store, sinks, feed, evaluator, GA, RL trainer and coordinator
//! from one [`AppConfig`] and runs them until shutdown.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

use crate::config::{AppConfig, RiskConfig, TradingConfig, TradingMode};
use crate::coordination::ShutdownHandle;
use crate::coordinator::{Components, FeedbackCoordinator};
use crate::domain::{Genome, Observation, ObservationWindow, StrategyParams, FEATURE_COUNT};
use crate::error::{AateError, Result};
use crate::evaluator::Evaluator;
use crate::feed::{DataConnector, FeedProducer, JsonLinesConnector, ObservationFeed};
use crate::ga::GaEvolver;
use crate::logging::{EventSink, FanoutSink, StoreSink, TracingSink};
use crate::rl::RlTrainer;
use crate::store::{self, StateStore};

/// Observations read per connector poll
const REPLAY_BATCH: usize = 500;

/// Momentum strategy every population and cold-started policy starts from
pub fn seed_genome(trading: &TradingConfig, risk: &RiskConfig) -> Genome {
    let mut weights = [0.0; FEATURE_COUNT];
    weights[0] = 0.6;
    weights[1] = 0.4;
    weights[2] = 0.3;
    let params = StrategyParams {
        weights,
        entry_threshold: 0.5,
        exit_threshold: 0.1,
        position_fraction: risk.max_position_size,
        stop_loss_pct: trading.stop_loss_pct,
        take_profit_pct: trading.take_profit_pct,
        allow_short: false,
    };
    let mut genome = Genome::from_params(&params);
    genome.repair();
    genome
}

/// Read a whole JSON-lines observation file, skipping unparseable lines
pub async fn load_observations(path: impl AsRef<Path>) -> Result<Vec<Observation>> {
    let mut connector = JsonLinesConnector::open(path, REPLAY_BATCH).await?;
    let mut observations = Vec::new();
    while let Some(batch) = connector.poll().await? {
        observations.extend(batch);
    }
    if connector.skipped() > 0 {
        warn!(skipped = connector.skipped(), "Some observation lines were skipped");
    }
    Ok(observations)
}

/// Load a file through the feed's validation and build a window for `symbol`
pub async fn load_window(config: &AppConfig, path: impl AsRef<Path>, symbol: &str) -> Result<ObservationWindow> {
    let feed = ObservationFeed::from_config(&config.data, Arc::new(TracingSink));
    let mut rejected = 0usize;
    for observation in load_observations(path).await? {
        if feed.ingest(observation).await.is_err() {
            rejected += 1;
        }
    }
    let window = feed.window(symbol, config.data.history_capacity).await;
    info!(symbol, observations = window.len(), rejected, "Loaded observation window");
    Ok(window)
}

pub fn coordinator_symbol(config: &AppConfig) -> Result<String> {
    config
        .primary_symbol()
        .map(str::to_string)
        .ok_or_else(|| AateError::Validation("no symbol configured".to_string()))
}

/// Assemble a coordinator over `feed`
pub fn build_coordinator(
    config: &AppConfig,
    feed: Arc<ObservationFeed>,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
    shutdown: &ShutdownHandle,
) -> Result<FeedbackCoordinator> {
    let evaluator = Evaluator::new(config.evaluator.clone(), config.risk.clone());
    let capital = config.trading.initial_capital;
    let ga = GaEvolver::new(config.ga.clone(), Arc::new(evaluator.clone()), capital, sink.clone());
    let rl = RlTrainer::new(config.rl.clone(), evaluator.clone(), capital, store.clone(), sink.clone())
        .with_shutdown(shutdown.clone());

    let components = Components {
        feed,
        evaluator: Arc::new(evaluator),
        ga,
        rl,
        store,
        sink,
        initial_capital: capital,
        seed: seed_genome(&config.trading, &config.risk),
    };
    Ok(FeedbackCoordinator::new(
        config.coordinator.clone(),
        coordinator_symbol(config)?,
        components,
    ))
}

/// Run the full feedback loop.
///
/// In backtest mode the replay file is consumed first and a single cycle
/// runs over it; otherwise cycles run on the configured interval.
pub async fn run(config: AppConfig, shutdown: ShutdownHandle) -> Result<()> {
    let store = store::open(&config.store).await?;
    store.health_check().await?;

    let store_sink = Arc::new(StoreSink::spawn(store.clone(), config.store.event_batch_size));
    let sink: Arc<dyn EventSink> = Arc::new(FanoutSink::new(vec![
        Arc::new(TracingSink) as Arc<dyn EventSink>,
        store_sink.clone(),
    ]));

    let feed = Arc::new(ObservationFeed::from_config(&config.data, sink.clone()));
    let producer = match &config.data.replay_path {
        Some(path) => {
            let connector: Box<dyn DataConnector> =
                Box::new(JsonLinesConnector::open(path, REPLAY_BATCH).await?);
            Some(FeedProducer::spawn(
                connector,
                feed.clone(),
                Duration::from_millis(config.data.poll_interval_ms),
                shutdown.clone(),
            ))
        }
        None => {
            warn!("No data source configured, waiting on an empty feed");
            None
        }
    };

    let mut coordinator = build_coordinator(&config, feed, store, sink, &shutdown)?;
    coordinator.restore().await?;

    let result = match (config.app.mode, producer) {
        (TradingMode::Backtest, Some(producer)) => {
            let report = producer
                .await
                .map_err(|e| AateError::Internal(format!("feed producer failed: {e}")))?;
            if shutdown.is_requested() {
                return finish(&store_sink, Ok(())).await;
            }
            info!(accepted = report.accepted, rejected = report.rejected, "Replay loaded");
            let outcome = coordinator.tick(&shutdown).await;
            info!(?outcome, "Backtest cycle finished");
            Ok(())
        }
        (mode, producer) => {
            if mode == TradingMode::Live {
                info!("Live mode: promoted strategies are published through the live strategy record");
            }
            let result = coordinator.run(shutdown.clone()).await;
            if let Some(producer) = producer {
                if let Err(e) = producer.await {
                    warn!(error = %e, "Feed producer task failed");
                }
            }
            result
        }
    };

    finish(&store_sink, result).await
}

async fn finish(store_sink: &StoreSink, result: Result<()>) -> Result<()> {
    store_sink.close().await;
    if store_sink.dropped() > 0 {
        warn!(dropped = store_sink.dropped(), "Engine events were dropped");
    }
    result
}
