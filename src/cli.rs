use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use crate::config::AppConfig;
use crate::coordination::ShutdownHandle;
use crate::domain::Strategy;
use crate::engine;
use crate::error::{AateError, Result};
use crate::evaluator::{Evaluator, StrategyEvaluator};
use crate::ga::GaEvolver;
use crate::logging::{EventSink, TracingSink};
use crate::rl::{PolicySource, RlTrainer};
use crate::store;

#[derive(Parser)]
#[command(name = "aate")]
#[command(version)]
#[command(about = "Autonomous adaptive trading engine: GA + RL strategy evolution", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Config directory (default.toml, then $AATE_ENV.toml)
    #[arg(short, long, env = "AATE_CONFIG_DIR", default_value = "config")]
    pub config: PathBuf,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the full evolve / train / promote loop
    Run,
    /// Evolve a population over a data file
    Evolve {
        /// JSON-lines observation file
        #[arg(short, long)]
        data: PathBuf,
        /// Generations to run (default: ga.max_generations)
        #[arg(short, long)]
        generations: Option<usize>,
    },
    /// Train the RL policy over a data file
    Train {
        /// JSON-lines observation file
        #[arg(short, long)]
        data: PathBuf,
        /// Training steps (default: coordinator.rl_steps_per_cycle)
        #[arg(short, long)]
        steps: Option<usize>,
        /// Start from the seed strategy instead of the latest checkpoint
        #[arg(long)]
        fresh: bool,
    },
    /// Score the seed strategy over a data file
    Evaluate {
        /// JSON-lines observation file
        #[arg(short, long)]
        data: PathBuf,
    },
    /// Print the validated configuration
    Config,
}

/// Dispatch a parsed command
pub async fn execute(command: Commands, config: AppConfig, shutdown: ShutdownHandle) -> Result<()> {
    match command {
        Commands::Run => engine::run(config, shutdown).await,
        Commands::Evolve { data, generations } => evolve(&config, &data, generations, shutdown).await,
        Commands::Train { data, steps, fresh } => train(&config, &data, steps, fresh, shutdown).await,
        Commands::Evaluate { data } => evaluate(&config, &data).await,
        Commands::Config => print_json(&config),
    }
}

async fn evolve(
    config: &AppConfig,
    data: &PathBuf,
    generations: Option<usize>,
    shutdown: ShutdownHandle,
) -> Result<()> {
    let symbol = engine::coordinator_symbol(config)?;
    let window = engine::load_window(config, data, &symbol).await?;
    let sink: Arc<dyn EventSink> = Arc::new(TracingSink);
    let evaluator = Arc::new(Evaluator::new(config.evaluator.clone(), config.risk.clone()));
    let mut ga = GaEvolver::new(config.ga.clone(), evaluator, config.trading.initial_capital, sink);
    ga.initialize(vec![engine::seed_genome(&config.trading, &config.risk)]);

    let max = generations.unwrap_or(config.ga.max_generations);
    let summary = tokio::task::spawn_blocking(move || ga.run(&window, &shutdown, Some(max + 1)))
        .await
        .map_err(|e| AateError::Internal(format!("evolution task failed: {e}")))??;
    info!(
        generation = summary.generation,
        terminated = ?summary.terminated,
        "Evolution finished"
    );
    print_json(&summary)
}

async fn train(
    config: &AppConfig,
    data: &PathBuf,
    steps: Option<usize>,
    fresh: bool,
    shutdown: ShutdownHandle,
) -> Result<()> {
    let symbol = engine::coordinator_symbol(config)?;
    let window = engine::load_window(config, data, &symbol).await?;
    let store = store::open(&config.store).await?;
    let evaluator = Evaluator::new(config.evaluator.clone(), config.risk.clone());
    let mut trainer = RlTrainer::new(
        config.rl.clone(),
        evaluator,
        config.trading.initial_capital,
        store,
        Arc::new(TracingSink),
    )
    .with_shutdown(shutdown);

    let seed = Strategy::seeded(engine::seed_genome(&config.trading, &config.risk));
    let source = if fresh {
        PolicySource::Strategy(seed)
    } else {
        PolicySource::ResumeLatest { fallback: seed }
    };
    let steps = steps.unwrap_or(config.coordinator.rl_steps_per_cycle);
    let observations = futures::stream::iter(window.observations().to_vec());
    let checkpoint = trainer.train(source, observations, steps).await?;
    print_json(&checkpoint)
}

async fn evaluate(config: &AppConfig, data: &PathBuf) -> Result<()> {
    let symbol = engine::coordinator_symbol(config)?;
    let window = engine::load_window(config, data, &symbol).await?;
    let evaluator = Evaluator::new(config.evaluator.clone(), config.risk.clone());
    let strategy = Strategy::seeded(engine::seed_genome(&config.trading, &config.risk));
    let report = evaluator.evaluate(&strategy, &window, config.trading.initial_capital)?;
    print_json(&report)
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
