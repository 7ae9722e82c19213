//! Feedback Coordinator: drives evolution, training and promotion
//!
//! Each cycle:
//!   1. Take the latest evaluation window from the feed
//!   2. Advance the GA (blocking pool) and the RL trainer concurrently
//!   3. Re-evaluate the GA best, the RL policy and the live strategy on
//!      the same window and pick the fitter candidate (ties go to the GA)
//!   4. Persist the candidate and its report
//!   5. On `promote`, persist the new live strategy, then append the decision
//!
//! A window shorter than the evaluation minimum, or a cycle where no
//! candidate can be scored, logs no decision at all.
//!
//! Persistence failures halt the loop until the store answers a health
//! check again; while halted nothing is evolved, trained or promoted.

use chrono::Utc;
use futures::stream;
use rust_decimal::Decimal;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tokio::sync::watch;
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use crate::coordination::ShutdownHandle;
use crate::domain::{
    FitnessReport, Genome, ObservationWindow, PromotionDecision, Strategy,
};
use crate::error::{AateError, Result};
use crate::evaluator::StrategyEvaluator;
use crate::feed::ObservationFeed;
use crate::ga::{GaEvolver, PopulationSnapshot, PopulationSummary};
use crate::logging::{EngineEvent, EventSink};
use crate::rl::{PolicyCheckpoint, PolicySource, RlTrainer};
use crate::store::record::{get_record, put_record};
use crate::store::{keys, StateStore};

use super::config::CoordinatorConfig;
use super::decision_log::DecisionLog;
use super::policy::PromotionPolicy;
use super::state::{CoordinatorState, CoordinatorStatus, LiveStrategy};

/// Everything the coordinator drives
pub struct Components {
    pub feed: Arc<ObservationFeed>,
    pub evaluator: Arc<dyn StrategyEvaluator>,
    pub ga: GaEvolver,
    pub rl: RlTrainer,
    pub store: Arc<dyn StateStore>,
    pub sink: Arc<dyn EventSink>,
    pub initial_capital: Decimal,
    /// Genome the GA and a cold-started policy begin from
    pub seed: Genome,
}

/// What one cycle did
#[derive(Debug, Clone, PartialEq)]
pub enum CycleOutcome {
    /// Window shorter than the evaluation minimum; nothing evolved or decided
    Skipped { observations: usize },
    /// Neither the GA nor the RL candidate could be scored; nothing decided
    NoCandidate,
    Decided(PromotionDecision),
}

pub struct FeedbackCoordinator {
    config: CoordinatorConfig,
    symbol: String,
    feed: Arc<ObservationFeed>,
    evaluator: Arc<dyn StrategyEvaluator>,
    ga: Arc<Mutex<GaEvolver>>,
    rl: RlTrainer,
    store: Arc<dyn StateStore>,
    sink: Arc<dyn EventSink>,
    initial_capital: Decimal,
    seed: Strategy,
    policy: PromotionPolicy,
    decisions: DecisionLog,
    live: Option<LiveStrategy>,
    cycle: u64,
    status_tx: watch::Sender<CoordinatorStatus>,
}

impl FeedbackCoordinator {
    pub fn new(config: CoordinatorConfig, symbol: impl Into<String>, components: Components) -> Self {
        let policy = PromotionPolicy::new(
            config.promotion_margin,
            config.min_fitness,
            config.min_evaluation_window,
        );
        let decisions = DecisionLog::new(components.store.clone(), components.sink.clone());
        let (status_tx, _) = watch::channel(CoordinatorStatus::default());
        Self {
            config,
            symbol: symbol.into(),
            feed: components.feed,
            evaluator: components.evaluator,
            ga: Arc::new(Mutex::new(components.ga)),
            rl: components.rl,
            store: components.store,
            sink: components.sink,
            initial_capital: components.initial_capital,
            seed: Strategy::seeded(components.seed),
            policy,
            decisions,
            live: None,
            cycle: 0,
            status_tx,
        }
    }

    pub fn subscribe(&self) -> watch::Receiver<CoordinatorStatus> {
        self.status_tx.subscribe()
    }

    pub fn status(&self) -> CoordinatorStatus {
        self.status_tx.borrow().clone()
    }

    pub fn live(&self) -> Option<&LiveStrategy> {
        self.live.as_ref()
    }

    pub fn decisions(&self) -> &DecisionLog {
        &self.decisions
    }

    pub fn rl(&self) -> &RlTrainer {
        &self.rl
    }

    pub fn ga_summary(&self) -> Result<PopulationSummary> {
        Ok(self.lock_ga()?.summary())
    }

    /// Load the live strategy and the last population from the store.
    ///
    /// Unreadable records are logged and ignored; an unreachable store is
    /// an error.
    pub async fn restore(&mut self) -> Result<()> {
        self.live = match get_record::<LiveStrategy>(self.store.as_ref(), keys::LIVE_STRATEGY).await {
            Ok(live) => live,
            Err(e) if !e.is_systemic() => {
                warn!(error = %e, "Ignoring unreadable live strategy record");
                None
            }
            Err(e) => return Err(e),
        };
        if let Some(live) = &self.live {
            info!(
                strategy_id = %live.strategy.id,
                fitness = live.report.fitness,
                promoted_at = %live.promoted_at,
                "Restored live strategy"
            );
        }

        let snapshot = match get_record::<PopulationSnapshot>(self.store.as_ref(), keys::POPULATION).await {
            Ok(snapshot) => snapshot,
            Err(e) if !e.is_systemic() => {
                warn!(error = %e, "Ignoring unreadable population snapshot");
                None
            }
            Err(e) => return Err(e),
        };

        let seeds = self.seed_genomes();
        let mut ga = self.lock_ga()?;
        match snapshot {
            Some(snapshot) => {
                let generation = snapshot.population.generation();
                match ga.restore(snapshot) {
                    Ok(()) => info!(generation, "Restored GA population"),
                    Err(e) => {
                        warn!(error = %e, "Population snapshot unusable, reseeding");
                        ga.initialize(seeds);
                    }
                }
            }
            None => ga.initialize(seeds),
        }
        drop(ga);

        self.publish(|status| {
            status.live_strategy = self.live.as_ref().map(|l| l.strategy.id);
            status.live_fitness = self.live.as_ref().map(|l| l.report.fitness);
        });
        Ok(())
    }

    /// One full evolve / train / evaluate / decide pass
    pub async fn run_cycle(&mut self, shutdown: &ShutdownHandle) -> Result<CycleOutcome> {
        self.cycle += 1;
        let cycle = self.cycle;

        let window = self.feed.window(&self.symbol, self.config.window_len).await;
        let required = self
            .evaluator
            .min_observations()
            .max(self.config.min_evaluation_window);
        if window.len() < required {
            debug!(
                cycle,
                observations = window.len(),
                required,
                "Not enough observations, skipping cycle"
            );
            self.publish(|status| status.cycle = cycle);
            return Ok(CycleOutcome::Skipped {
                observations: window.len(),
            });
        }
        let window = Arc::new(window);

        let ga_task = {
            let ga = self.ga.clone();
            let window = window.clone();
            let shutdown = shutdown.clone();
            let generations = self.config.generations_per_cycle;
            tokio::task::spawn_blocking(move || -> Result<PopulationSummary> {
                let mut ga = ga
                    .lock()
                    .map_err(|_| AateError::Internal("GA evolver lock poisoned".to_string()))?;
                if ga.terminated().is_some() {
                    ga.reopen(&window)?;
                }
                ga.run(&window, &shutdown, Some(generations))
            })
        };
        let fallback = self.rl_fallback();
        let training = self.rl.train(
            PolicySource::ResumeLatest { fallback },
            stream::iter(window.observations().to_vec()),
            self.config.rl_steps_per_cycle,
        );
        let (evolved, trained) = tokio::join!(ga_task, training);
        let summary = evolved.map_err(|e| AateError::Internal(format!("GA task failed: {e}")))??;
        let checkpoint = trained?;

        let (candidate, report, live_report) = self.select_candidate(&summary, &checkpoint, &window).await?;
        let Some(report) = report else {
            warn!(cycle, candidate_id = %candidate.id, "No candidate could be evaluated, nothing to decide");
            self.persist_population().await?;
            self.publish(|status| {
                status.cycle = cycle;
                status.generation = summary.generation;
                status.rl_checkpoint = Some(checkpoint.id);
                status.rl_step = checkpoint.step;
            });
            return Ok(CycleOutcome::NoCandidate);
        };

        put_record(self.store.as_ref(), &keys::strategy(&candidate.id), &candidate).await?;
        put_record(self.store.as_ref(), &keys::report(&candidate.id, &report.window), &report).await?;

        let descriptor = window.descriptor();
        let live = self.live.as_ref().map(|l| (&l.strategy, live_report.as_ref()));
        let (decision, reasoning) = self.policy.decide(&candidate, Some(&report), live, &descriptor);
        let decision = PromotionDecision::new(candidate.id, decision, reasoning);

        if decision.is_promote() {
            // A logged promote always has its live record
            let promoted = LiveStrategy {
                strategy: candidate,
                report,
                decision_id: decision.id,
                promoted_at: decision.timestamp,
            };
            put_record(self.store.as_ref(), keys::LIVE_STRATEGY, &promoted).await?;
            if let Err(e) = self.decisions.append(&decision).await {
                self.rollback_live().await;
                return Err(e);
            }
            info!(
                cycle,
                strategy_id = %promoted.strategy.id,
                source = %promoted.strategy.provenance,
                fitness = promoted.report.fitness,
                "Strategy promoted"
            );
            self.live = Some(promoted);
        } else {
            self.decisions.append(&decision).await?;
            if let (Some(live), Some(report)) = (self.live.as_mut(), live_report) {
                live.report = report;
                put_record(self.store.as_ref(), keys::LIVE_STRATEGY, &*live).await?;
            }
        }

        self.persist_population().await?;

        let live_strategy = self.live.as_ref().map(|l| l.strategy.id);
        let live_fitness = self.live.as_ref().map(|l| l.report.fitness);
        self.publish(|status| {
            status.cycle = cycle;
            status.generation = summary.generation;
            status.ga_best_fitness = summary.best.as_ref().map(|m| m.fitness());
            status.rl_checkpoint = Some(checkpoint.id);
            status.rl_step = checkpoint.step;
            status.live_strategy = live_strategy;
            status.live_fitness = live_fitness;
            status.last_decision = Some(decision.decision);
        });
        Ok(CycleOutcome::Decided(decision))
    }

    /// Run one cycle, halting on persistence failures.
    ///
    /// Returns `None` when the cycle failed or the coordinator was halted.
    pub async fn tick(&mut self, shutdown: &ShutdownHandle) -> Option<CycleOutcome> {
        match self.run_cycle(shutdown).await {
            Ok(outcome) => Some(outcome),
            Err(e) if e.is_systemic() => {
                self.halt(e, shutdown).await;
                None
            }
            Err(e) => {
                warn!(cycle = self.cycle, error = %e, "Cycle failed");
                self.sink.emit(EngineEvent::CycleFailed {
                    cycle: self.cycle,
                    error: e.to_string(),
                });
                None
            }
        }
    }

    /// Cycle on a fixed interval until shutdown
    pub async fn run(&mut self, shutdown: ShutdownHandle) -> Result<()> {
        let mut interval = tokio::time::interval(Duration::from_secs(self.config.interval_secs));
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
        self.set_state(CoordinatorState::Running);
        info!(
            symbol = %self.symbol,
            interval_secs = self.config.interval_secs,
            "Feedback coordinator started"
        );

        loop {
            tokio::select! {
                _ = shutdown.wait() => break,
                _ = interval.tick() => {}
            }
            if shutdown.is_requested() {
                break;
            }
            self.tick(&shutdown).await;
        }

        if let Err(e) = self.persist_population().await {
            error!(error = %e, "Failed to persist population on shutdown");
        }
        self.set_state(CoordinatorState::Stopped);
        info!(cycles = self.cycle, "Feedback coordinator stopped");
        Ok(())
    }

    /// Block until the store is healthy again or shutdown is requested
    async fn halt(&mut self, cause: AateError, shutdown: &ShutdownHandle) {
        let started = Instant::now();
        let reason = cause.to_string();
        let mut backoff = self.config.halt_backoff_ms;
        error!(cycle = self.cycle, error = %reason, retry_in_ms = backoff, "Coordinator halted");
        self.sink.emit(EngineEvent::CoordinatorHalted {
            error: reason.clone(),
            retry_in_ms: backoff,
        });
        self.set_state(CoordinatorState::Halted {
            reason,
            since: Utc::now(),
        });

        loop {
            tokio::select! {
                _ = shutdown.wait() => return,
                _ = tokio::time::sleep(Duration::from_millis(backoff)) => {}
            }
            match self.store.health_check().await {
                Ok(()) => break,
                Err(e) => {
                    backoff = backoff.saturating_mul(2).min(self.config.max_halt_backoff_ms);
                    warn!(error = %e, retry_in_ms = backoff, "Store still unavailable");
                }
            }
        }

        let halted_for_ms = started.elapsed().as_millis() as u64;
        info!(halted_for_ms, "Coordinator resumed");
        self.sink.emit(EngineEvent::CoordinatorResumed { halted_for_ms });
        self.set_state(CoordinatorState::Running);
    }

    /// Evaluate GA best, RL policy and live strategy on one window.
    ///
    /// Returns the fitter candidate with its report (ties favour the GA),
    /// and the live strategy's fresh report.
    async fn select_candidate(
        &self,
        summary: &PopulationSummary,
        checkpoint: &PolicyCheckpoint,
        window: &Arc<ObservationWindow>,
    ) -> Result<(Strategy, Option<FitnessReport>, Option<FitnessReport>)> {
        let mut strategies = Vec::with_capacity(3);
        if let Some(best) = &summary.best {
            strategies.push(best.strategy.clone());
        }
        strategies.push(checkpoint.to_strategy());
        let candidates = strategies.len();
        if let Some(live) = &self.live {
            strategies.push(live.strategy.clone());
        }

        let evaluator = self.evaluator.clone();
        let capital = self.initial_capital;
        let window = window.clone();
        let evaluated = strategies.clone();
        let results = tokio::task::spawn_blocking(move || evaluator.evaluate_many(&evaluated, &window, capital))
            .await
            .map_err(|e| AateError::Internal(format!("evaluation task failed: {e}")))?;

        let mut reports: Vec<Option<FitnessReport>> = results
            .into_iter()
            .zip(&strategies)
            .map(|(result, strategy)| match result {
                Ok(report) => Some(report),
                Err(e) => {
                    debug!(strategy_id = %strategy.id, error = %e, "Strategy not evaluable");
                    self.sink.emit(EngineEvent::EvaluationSkipped {
                        strategy_id: strategy.id,
                        reason: e.to_string(),
                    });
                    None
                }
            })
            .collect();

        let live_report = if reports.len() > candidates {
            reports.pop().flatten()
        } else {
            None
        };

        let mut chosen = 0;
        for (i, report) in reports.iter().enumerate().skip(1) {
            let better = match (report, &reports[chosen]) {
                (Some(r), Some(best)) => r.fitness > best.fitness,
                (Some(_), None) => true,
                _ => false,
            };
            if better {
                chosen = i;
            }
        }
        let report = reports.swap_remove(chosen);
        let candidate = strategies.swap_remove(chosen);
        Ok((candidate, report, live_report))
    }

    /// Put the previous live record back after a promotion failed to log
    async fn rollback_live(&self) {
        let restored = match &self.live {
            Some(previous) => put_record(self.store.as_ref(), keys::LIVE_STRATEGY, previous).await,
            None => self.store.delete(keys::LIVE_STRATEGY).await.map(|_| ()),
        };
        if let Err(e) = restored {
            error!(error = %e, "Failed to roll back live strategy record");
        }
    }

    async fn persist_population(&self) -> Result<()> {
        let snapshot = self.lock_ga()?.snapshot();
        if let Some(snapshot) = snapshot {
            put_record(self.store.as_ref(), keys::POPULATION, &snapshot).await?;
        }
        Ok(())
    }

    /// Cold-start policy when no checkpoint exists: the live strategy, else the seed
    fn rl_fallback(&self) -> Strategy {
        self.live
            .as_ref()
            .map(|l| l.strategy.clone())
            .unwrap_or_else(|| self.seed.clone())
    }

    fn seed_genomes(&self) -> Vec<Genome> {
        let mut seeds = Vec::with_capacity(2);
        if let Some(live) = &self.live {
            seeds.push(live.strategy.genome().clone());
        }
        seeds.push(self.seed.genome().clone());
        seeds
    }

    fn lock_ga(&self) -> Result<MutexGuard<'_, GaEvolver>> {
        self.ga
            .lock()
            .map_err(|_| AateError::Internal("GA evolver lock poisoned".to_string()))
    }

    fn set_state(&self, state: CoordinatorState) {
        self.publish(|status| status.state = state);
    }

    fn publish(&self, update: impl FnOnce(&mut CoordinatorStatus)) {
        self.status_tx.send_modify(|status| {
            update(status);
            status.updated_at = Utc::now();
        });
    }
}
