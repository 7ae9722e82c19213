//! Policy-gradient trainer
//!
//! Trains a [`LinearGaussianPolicy`] against the evaluator's fill model on a
//! stream of observations. Decisions on bar t's close fill at bar t+1's
//! open, and the reward for a decision is the equity change until the next
//! close.

use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use std::sync::Arc;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use super::checkpoint::{CheckpointStore, PolicyCheckpoint};
use super::config::RlConfig;
use super::policy::{Action, LinearGaussianPolicy};
use super::reward::{PnLRewardFunction, RewardFunction, RewardTransition};
use super::rollout::{RolloutBuffer, Transition};
use crate::coordination::ShutdownHandle;
use crate::domain::{Observation, Side, Strategy, StrategyId};
use crate::error::{AateError, EvaluationError, Result};
use crate::evaluator::{Evaluator, FeatureExtractor, FeatureVector, FillModel, Portfolio};
use crate::logging::{EngineEvent, EventSink};
use crate::store::StateStore;

/// Where training starts from
#[derive(Debug, Clone)]
pub enum PolicySource {
    /// Cold start from a strategy's genome
    Strategy(Strategy),
    /// Continue from an explicit checkpoint; it must verify
    Checkpoint(PolicyCheckpoint),
    /// Latest valid stored checkpoint, else cold start from `fallback`
    ResumeLatest { fallback: Strategy },
}

struct Origin {
    parent: StrategyId,
    version: u32,
    step: u64,
    cumulative_reward: f64,
    base: Option<PolicyCheckpoint>,
}

/// Decision waiting for the next close to be rewarded
struct OpenStep {
    features: FeatureVector,
    mean: f64,
    action: f64,
    exploration_std: f64,
    equity: f64,
    fees: f64,
}

/// Simulated account the policy trades during one `train` call
struct Episode {
    symbol: Option<String>,
    last_timestamp: Option<DateTime<Utc>>,
    features: FeatureExtractor,
    portfolio: Portfolio,
    fill: FillModel,
    capital: f64,
    peak: f64,
    pending: Option<Side>,
    open: Option<OpenStep>,
    resets: usize,
}

/// Deterministic replay of a checkpoint for `act`
struct Actor {
    checkpoint_id: Uuid,
    symbol: String,
    policy: LinearGaussianPolicy,
    features: FeatureExtractor,
    side: Side,
    last_timestamp: Option<DateTime<Utc>>,
}

pub struct RlTrainer {
    config: RlConfig,
    evaluator: Evaluator,
    initial_capital: f64,
    reward: Box<dyn RewardFunction>,
    checkpoints: CheckpointStore,
    sink: Arc<dyn EventSink>,
    rng: StdRng,
    shutdown: Option<ShutdownHandle>,
    latest_tx: watch::Sender<Option<PolicyCheckpoint>>,
    actor: Option<Actor>,
}

impl RlTrainer {
    pub fn new(
        config: RlConfig,
        evaluator: Evaluator,
        initial_capital: Decimal,
        store: Arc<dyn StateStore>,
        sink: Arc<dyn EventSink>,
    ) -> Self {
        let rng = match config.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        let initial_capital = initial_capital.to_f64().unwrap_or(0.0);
        let reward = Box::new(PnLRewardFunction::new(initial_capital, config.reward_clip));
        let checkpoints = CheckpointStore::new(store, config.checkpoint_retention, sink.clone());
        let (latest_tx, _) = watch::channel(None);
        Self {
            config,
            evaluator,
            initial_capital,
            reward,
            checkpoints,
            sink,
            rng,
            shutdown: None,
            latest_tx,
            actor: None,
        }
    }

    pub fn with_reward_function(mut self, reward: Box<dyn RewardFunction>) -> Self {
        self.reward = reward;
        self
    }

    /// Stop training at the next update boundary once shutdown is requested
    pub fn with_shutdown(mut self, shutdown: ShutdownHandle) -> Self {
        self.shutdown = Some(shutdown);
        self
    }

    pub fn checkpoints(&self) -> &CheckpointStore {
        &self.checkpoints
    }

    /// Latest checkpoint produced or resumed by this trainer
    pub fn latest(&self) -> Option<PolicyCheckpoint> {
        self.latest_tx.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<PolicyCheckpoint>> {
        self.latest_tx.subscribe()
    }

    /// Train for up to `steps` rewarded decisions.
    ///
    /// Ends early when the stream is exhausted or shutdown is requested;
    /// the returned checkpoint is always saved and published.
    pub async fn train<S>(&mut self, source: PolicySource, observations: S, steps: usize) -> Result<PolicyCheckpoint>
    where
        S: Stream<Item = Observation> + Unpin,
    {
        let (mut policy, origin) = self.resolve(source).await?;
        let mut observations = observations;
        let mut episode = Episode::new(&self.evaluator, self.initial_capital);
        let mut rollout = RolloutBuffer::new(self.config.update_frequency);
        let fraction = self.evaluator.position_fraction(policy.params());
        let max_drawdown = self.evaluator.risk().max_drawdown_pct;

        let mut done = 0usize;
        let mut epoch_reward = 0.0;
        let mut cumulative_reward = origin.cumulative_reward;
        let mut updates = 0usize;
        let mut version = origin.version;
        let mut parent = origin.parent;
        let mut last_saved: Option<PolicyCheckpoint> = None;

        while done < steps {
            let Some(observation) = observations.next().await else {
                debug!(steps = done, "Observation stream exhausted");
                break;
            };
            let Some(transition) = episode.advance(
                &observation,
                &policy,
                &mut self.rng,
                self.reward.as_ref(),
                fraction,
                max_drawdown,
            ) else {
                continue;
            };

            done += 1;
            epoch_reward += transition.reward.total;
            cumulative_reward += transition.reward.total;
            rollout.push(transition);

            if rollout.is_full() {
                self.apply_update(&mut policy, &mut rollout);
                updates += 1;
                if self.shutdown_requested() {
                    info!(steps = done, "Training stopped at update boundary");
                    break;
                }
                tokio::task::yield_now().await;
            }

            let total = origin.step + done as u64;
            if done < steps && total % self.config.checkpoint_every as u64 == 0 {
                let checkpoint = self.save(&policy, parent, version, total, cumulative_reward).await?;
                parent = checkpoint.strategy_id();
                version += 1;
                last_saved = Some(checkpoint);
            }
        }

        let flushed = !rollout.is_empty();
        if flushed {
            self.apply_update(&mut policy, &mut rollout);
            updates += 1;
        }

        let total = origin.step + done as u64;
        let checkpoint = match (last_saved, origin.base) {
            (Some(saved), _) if !flushed && saved.step == total => saved,
            (None, Some(base)) if done == 0 => {
                self.latest_tx.send_replace(Some(base.clone()));
                base
            }
            _ => self.save(&policy, parent, version, total, cumulative_reward).await?,
        };

        let mean_reward = if done > 0 { epoch_reward / done as f64 } else { 0.0 };
        info!(
            steps = done,
            total_steps = total,
            updates,
            resets = episode.resets,
            mean_reward,
            exploration_std = policy.exploration_std(),
            "Training epoch completed"
        );
        self.sink.emit(EngineEvent::TrainingEpochCompleted {
            steps: done as u64,
            total_steps: total,
            mean_reward,
            exploration_std: policy.exploration_std(),
        });
        Ok(checkpoint)
    }

    /// Deterministic action for `observation` under `checkpoint`.
    ///
    /// Keeps per-checkpoint feature state; switching checkpoint or symbol
    /// starts a new warm-up, during which the action is `Hold`.
    pub fn act(&mut self, checkpoint: &PolicyCheckpoint, observation: &Observation) -> Result<Action> {
        let stale = self
            .actor
            .as_ref()
            .map_or(true, |a| a.checkpoint_id != checkpoint.id || a.symbol != observation.symbol);
        if stale {
            let corrupt = |reason: String| AateError::CheckpointCorrupt {
                id: checkpoint.id.to_string(),
                reason,
            };
            checkpoint.verify().map_err(corrupt)?;
            let policy = LinearGaussianPolicy::from_genome(
                &checkpoint.genome,
                checkpoint.exploration_std,
                checkpoint.baseline,
            )
            .map_err(corrupt)?;
            self.actor = Some(Actor {
                checkpoint_id: checkpoint.id,
                symbol: observation.symbol.clone(),
                policy,
                features: FeatureExtractor::new(self.evaluator.config().lookback),
                side: Side::Flat,
                last_timestamp: None,
            });
        }
        let Some(actor) = self.actor.as_mut() else {
            return Ok(Action::Hold);
        };

        if actor.last_timestamp.is_some_and(|last| observation.timestamp <= last) {
            return Ok(Action::Hold);
        }
        actor.last_timestamp = Some(observation.timestamp);

        let Some(features) = actor.features.push(&observation.to_bar()) else {
            return Ok(Action::Hold);
        };
        let target = actor.policy.decide(actor.policy.mean(&features), actor.side);
        let action = Action::between(actor.side, target);
        actor.side = target;
        Ok(action)
    }

    async fn resolve(&mut self, source: PolicySource) -> Result<(LinearGaussianPolicy, Origin)> {
        let source = match source {
            PolicySource::ResumeLatest { fallback } => match self.checkpoints.latest_valid().await? {
                Some(checkpoint) => PolicySource::Checkpoint(checkpoint),
                None => {
                    info!(strategy_id = %fallback.id, "No valid checkpoint, cold start");
                    PolicySource::Strategy(fallback)
                }
            },
            other => other,
        };

        match source {
            PolicySource::Checkpoint(checkpoint) => {
                let corrupt = |reason: String| AateError::CheckpointCorrupt {
                    id: checkpoint.id.to_string(),
                    reason,
                };
                checkpoint.verify().map_err(corrupt)?;
                let policy = LinearGaussianPolicy::from_genome(
                    &checkpoint.genome,
                    checkpoint.exploration_std,
                    checkpoint.baseline,
                )
                .map_err(corrupt)?;
                debug!(checkpoint_id = %checkpoint.id, step = checkpoint.step, "Resuming from checkpoint");
                self.latest_tx.send_replace(Some(checkpoint.clone()));
                let origin = Origin {
                    parent: checkpoint.strategy_id(),
                    version: checkpoint.version + 1,
                    step: checkpoint.step,
                    cumulative_reward: checkpoint.cumulative_reward,
                    base: Some(checkpoint),
                };
                Ok((policy, origin))
            }
            PolicySource::Strategy(strategy) | PolicySource::ResumeLatest { fallback: strategy } => {
                let policy = LinearGaussianPolicy::from_genome(
                    strategy.genome(),
                    self.config.exploration_std,
                    0.0,
                )
                .map_err(|reason| EvaluationError::InvalidGenome {
                    strategy_id: strategy.id.to_string(),
                    reason,
                })?;
                let origin = Origin {
                    parent: strategy.id,
                    version: strategy.version + 1,
                    step: 0,
                    cumulative_reward: 0.0,
                    base: None,
                };
                Ok((policy, origin))
            }
        }
    }

    fn apply_update(&self, policy: &mut LinearGaussianPolicy, rollout: &mut RolloutBuffer) {
        let stats = policy.update(
            rollout,
            self.config.gamma,
            self.config.learning_rate,
            self.config.max_grad_norm,
        );
        policy.decay_exploration(self.config.exploration_decay, self.config.exploration_std_min);
        rollout.clear();
        debug!(
            transitions = stats.transitions,
            mean_return = stats.mean_return,
            grad_norm = stats.grad_norm,
            clipped = stats.clipped,
            exploration_std = policy.exploration_std(),
            "Policy updated"
        );
    }

    async fn save(
        &self,
        policy: &LinearGaussianPolicy,
        parent: StrategyId,
        version: u32,
        step: u64,
        cumulative_reward: f64,
    ) -> Result<PolicyCheckpoint> {
        let checkpoint = PolicyCheckpoint::new(
            Some(parent),
            version,
            step,
            cumulative_reward,
            policy.exploration_std(),
            policy.baseline(),
            policy.genome(),
        )?;
        self.checkpoints.save(&checkpoint).await?;
        self.latest_tx.send_replace(Some(checkpoint.clone()));
        Ok(checkpoint)
    }

    fn shutdown_requested(&self) -> bool {
        self.shutdown.as_ref().is_some_and(ShutdownHandle::is_requested)
    }
}

impl Episode {
    fn new(evaluator: &Evaluator, capital: f64) -> Self {
        Self {
            symbol: None,
            last_timestamp: None,
            features: FeatureExtractor::new(evaluator.config().lookback),
            portfolio: Portfolio::new(capital, evaluator.fill_model()),
            fill: evaluator.fill_model(),
            capital,
            peak: capital,
            pending: None,
            open: None,
            resets: 0,
        }
    }

    /// Apply one bar; returns the transition completed by it, if any
    fn advance(
        &mut self,
        observation: &Observation,
        policy: &LinearGaussianPolicy,
        rng: &mut StdRng,
        reward: &dyn RewardFunction,
        fraction: f64,
        max_drawdown: f64,
    ) -> Option<Transition> {
        match self.symbol.as_deref() {
            None => self.symbol = Some(observation.symbol.clone()),
            Some(symbol) if symbol != observation.symbol => return None,
            Some(_) => {}
        }
        if self.last_timestamp.is_some_and(|last| observation.timestamp <= last) {
            warn!(
                symbol = %observation.symbol,
                timestamp = %observation.timestamp,
                "Skipping non-increasing observation in training stream"
            );
            return None;
        }
        self.last_timestamp = Some(observation.timestamp);

        let bar = observation.to_bar();
        let params = policy.params();
        if let Some(target) = self.pending.take() {
            self.portfolio.rebalance(target, bar.open, fraction);
        }
        self.portfolio
            .check_exits(&bar, params.stop_loss_pct, params.take_profit_pct);

        let equity = self.portfolio.equity(bar.close);
        let fees = self.portfolio.fees_paid();
        let completed = self.open.take().map(|open| Transition {
            features: open.features,
            mean: open.mean,
            action: open.action,
            exploration_std: open.exploration_std,
            reward: reward.compute(&RewardTransition {
                equity_before: open.equity,
                equity_after: equity,
                fees: fees - open.fees,
            }),
        });

        self.peak = self.peak.max(equity);
        if self.peak > 0.0 && (self.peak - equity) / self.peak > max_drawdown {
            // Drawdown breached: restart the account, keep the feature state
            self.portfolio.close(bar.close);
            self.portfolio = Portfolio::new(self.capital, self.fill);
            self.peak = self.capital;
            self.resets += 1;
            return completed;
        }

        if let Some(features) = self.features.push(&bar) {
            let (mean, action) = policy.sample(&features, rng);
            let side = self.portfolio.side();
            let target = policy.decide(action, side);
            if target != side {
                self.pending = Some(target);
            }
            self.open = Some(OpenStep {
                features,
                mean,
                action,
                exploration_std: policy.exploration_std(),
                equity: self.portfolio.equity(bar.close),
                fees: self.portfolio.fees_paid(),
            });
        }
        completed
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RiskConfig;
    use crate::domain::Genome;
    use crate::evaluator::EvaluatorConfig;
    use crate::logging::MemorySink;
    use crate::store::MemoryStore;
    use crate::test_support::{series, trending_series};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use rust_decimal_macros::dec;

    fn config() -> RlConfig {
        RlConfig {
            update_frequency: 16,
            checkpoint_every: 50,
            checkpoint_retention: 5,
            seed: Some(11),
            ..Default::default()
        }
    }

    fn trainer(store: Arc<MemoryStore>, sink: Arc<MemorySink>) -> RlTrainer {
        let evaluator = Evaluator::new(
            EvaluatorConfig {
                min_observations: 30,
                lookback: 10,
                ..Default::default()
            },
            RiskConfig::default(),
        );
        RlTrainer::new(config(), evaluator, dec!(10000), store, sink)
    }

    fn seed_strategy() -> Strategy {
        Strategy::seeded(Genome::random(&mut StdRng::seed_from_u64(5)))
    }

    fn stream(observations: Vec<Observation>) -> futures::stream::Iter<std::vec::IntoIter<Observation>> {
        futures::stream::iter(observations)
    }

    #[tokio::test]
    async fn test_train_from_strategy_checkpoints_periodically() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut trainer = trainer(store, sink.clone());
        let origin = seed_strategy();

        let ckpt = trainer
            .train(
                PolicySource::Strategy(origin.clone()),
                stream(series("BTC/USDT", 300, 0.001)),
                100,
            )
            .await
            .unwrap();

        assert_eq!(ckpt.step, 100);
        assert!(ckpt.verify().is_ok());
        assert_eq!(trainer.checkpoints().list().await.unwrap().len(), 2);
        assert_eq!(sink.count("checkpoint_saved"), 2);
        assert_eq!(sink.count("training_epoch_completed"), 1);
        assert!(ckpt.exploration_std < config().exploration_std);
        assert_eq!(trainer.latest().map(|c| c.id), Some(ckpt.id));

        let strategy = ckpt.to_strategy();
        assert_eq!(strategy.version, origin.version + 2);
        assert!(strategy.genome().validate().is_ok());
    }

    #[tokio::test]
    async fn test_resume_latest_continues_step_count() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut trainer = trainer(store.clone(), sink.clone());
        let first = trainer
            .train(
                PolicySource::Strategy(seed_strategy()),
                stream(series("BTC/USDT", 200, 0.0)),
                40,
            )
            .await
            .unwrap();

        let mut resumed = self::trainer(store, sink);
        let second = resumed
            .train(
                PolicySource::ResumeLatest {
                    fallback: seed_strategy(),
                },
                stream(series("BTC/USDT", 200, 0.0)),
                5,
            )
            .await
            .unwrap();

        assert_eq!(second.step, 45);
        assert_eq!(second.parent, Some(first.strategy_id()));
        assert_eq!(second.version, first.version + 1);
    }

    #[tokio::test]
    async fn test_short_stream_ends_epoch_early() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut trainer = trainer(store, sink);
        let ckpt = trainer
            .train(
                PolicySource::Strategy(seed_strategy()),
                stream(trending_series("BTC/USDT", 20, 0.001)),
                500,
            )
            .await
            .unwrap();
        // 10-bar lookback: features from bar 11, rewards from bar 12
        assert_eq!(ckpt.step, 9);
    }

    #[tokio::test]
    async fn test_explicit_corrupt_checkpoint_is_rejected() {
        let store = Arc::new(MemoryStore::new());
        let sink = Arc::new(MemorySink::new());
        let mut trainer = trainer(store, sink);
        let mut ckpt = PolicyCheckpoint::new(None, 1, 10, 0.0, 0.5, 0.0, seed_strategy().genome().clone())
            .unwrap();
        ckpt.step = 99;

        let err = trainer
            .train(PolicySource::Checkpoint(ckpt), stream(Vec::new()), 10)
            .await
            .unwrap_err();
        assert!(matches!(err, AateError::CheckpointCorrupt { .. }));
    }

    #[tokio::test]
    async fn test_act_holds_during_warmup_and_is_deterministic() {
        let sink = Arc::new(MemorySink::new());
        let ckpt = PolicyCheckpoint::new(None, 1, 0, 0.0, 0.5, 0.0, seed_strategy().genome().clone())
            .unwrap();
        let data = series("BTC/USDT", 120, 0.002);

        let mut a = trainer(Arc::new(MemoryStore::new()), sink.clone());
        let mut b = trainer(Arc::new(MemoryStore::new()), sink);
        let actions_a: Vec<Action> = data.iter().map(|o| a.act(&ckpt, o).unwrap()).collect();
        let actions_b: Vec<Action> = data.iter().map(|o| b.act(&ckpt, o).unwrap()).collect();

        assert_eq!(actions_a, actions_b);
        assert!(actions_a[..10].iter().all(|a| *a == Action::Hold));
    }
}
