//! Backtest/Simulation Evaluator
//!
//! Scores a strategy over an observation window. Evaluation is a pure
//! function of (strategy, window, capital, config): the same inputs always
//! produce the same [`FitnessReport`].
//!
//! Bar loop, per bar `t`:
//! 1. New UTC day: reset the daily loss reference and lift any halt.
//! 2. Execute the decision made at `t-1`'s close at `t`'s open.
//! 3. Stop-loss / take-profit against `t`'s high/low.
//! 4. Mark equity at `t`'s close; drawdown and daily loss checks.
//! 5. Update features and decide the target side for `t+1`.

pub mod config;
pub mod features;
pub mod sim;

use rayon::prelude::*;
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use tracing::debug;

use crate::config::RiskConfig;
use crate::domain::{
    FitnessBreakdown, FitnessReport, ObservationWindow, Side, Strategy, StrategyParams,
};
use crate::error::EvaluationError;

pub use config::EvaluatorConfig;
pub use features::{FeatureExtractor, FeatureVector};
pub use sim::{ExitTrigger, FillModel, Portfolio};

/// Sharpe-like ratio is clipped to this magnitude
const SHARPE_CLIP: f64 = 10.0;

/// Profit factor reported when there are winning trades and no losers
const PROFIT_FACTOR_CAP: f64 = 99.0;

/// Anything that can score a strategy over a window
#[cfg_attr(test, mockall::automock)]
pub trait StrategyEvaluator: Send + Sync {
    fn evaluate(
        &self,
        strategy: &Strategy,
        window: &ObservationWindow,
        initial_capital: Decimal,
    ) -> Result<FitnessReport, EvaluationError>;

    /// Observations a window needs before `evaluate` can succeed
    fn min_observations(&self) -> usize;

    /// Evaluate in parallel; results keep the input order
    fn evaluate_many(
        &self,
        strategies: &[Strategy],
        window: &ObservationWindow,
        initial_capital: Decimal,
    ) -> Vec<Result<FitnessReport, EvaluationError>> {
        strategies
            .par_iter()
            .map(|s| self.evaluate(s, window, initial_capital))
            .collect()
    }
}

/// Deterministic bar-by-bar backtester
#[derive(Debug, Clone)]
pub struct Evaluator {
    config: EvaluatorConfig,
    risk: RiskConfig,
}

impl Evaluator {
    pub fn new(config: EvaluatorConfig, risk: RiskConfig) -> Self {
        Self { config, risk }
    }

    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    pub fn risk(&self) -> &RiskConfig {
        &self.risk
    }

    pub fn fill_model(&self) -> FillModel {
        FillModel::new(self.config.slippage_bps, self.config.fee_bps)
    }

    /// Effective position fraction after the risk cap
    pub fn position_fraction(&self, params: &StrategyParams) -> f64 {
        params.position_fraction.min(self.risk.max_position_size)
    }

    fn simulate(&self, params: &StrategyParams, window: &ObservationWindow, capital: f64) -> SimOutcome {
        let bars = window.bars();
        let fraction = self.position_fraction(params);
        let mut features = FeatureExtractor::new(self.config.lookback);
        let mut portfolio = Portfolio::new(capital, self.fill_model());

        let mut pending: Option<Side> = None;
        let mut current_day: Option<i64> = None;
        let mut day_open_equity = capital;
        let mut halted = false;

        let mut peak = capital;
        let mut max_drawdown = 0.0_f64;
        let mut prev_equity = capital;
        let mut returns = Vec::with_capacity(bars.len());
        let mut bars_simulated = 0;
        let mut terminated_early = false;

        for bar in &bars {
            bars_simulated += 1;

            if current_day != Some(bar.day()) {
                current_day = Some(bar.day());
                day_open_equity = portfolio.equity(bar.open);
                halted = false;
            }

            if let Some(target) = pending.take() {
                if !(halted && target != Side::Flat) {
                    portfolio.rebalance(target, bar.open, fraction);
                }
            }

            portfolio.check_exits(bar, params.stop_loss_pct, params.take_profit_pct);

            let equity = portfolio.equity(bar.close);
            if prev_equity > 0.0 {
                returns.push(equity / prev_equity - 1.0);
            }
            prev_equity = equity;

            peak = peak.max(equity);
            if peak > 0.0 {
                max_drawdown = max_drawdown.max((peak - equity) / peak);
            }
            if max_drawdown > self.risk.max_drawdown_pct {
                portfolio.close(bar.close);
                terminated_early = true;
                break;
            }

            if !halted
                && day_open_equity > 0.0
                && (day_open_equity - equity) / day_open_equity > self.risk.max_daily_loss_pct
            {
                portfolio.close(bar.close);
                halted = true;
            }

            if let Some(fv) = features.push(bar) {
                if !halted {
                    let side = portfolio.side();
                    let target = params.target_side(params.signal(&fv), side);
                    if target != side {
                        pending = Some(target);
                    }
                }
            }
        }

        if let Some(last) = bars.last() {
            if portfolio.side() != Side::Flat {
                portfolio.close(last.close);
            }
        }
        // Flat now, so equity is cash
        let final_equity = portfolio.equity(0.0);
        if peak > 0.0 {
            max_drawdown = max_drawdown.max((peak - final_equity) / peak);
        }

        SimOutcome {
            final_equity,
            max_drawdown,
            returns,
            trade_pnls: portfolio.trade_pnls().to_vec(),
            fees_paid: portfolio.fees_paid(),
            bars_simulated,
            terminated_early,
        }
    }

    fn score(&self, outcome: &SimOutcome, capital: f64) -> (f64, FitnessBreakdown) {
        let total_return = outcome.final_equity / capital - 1.0;
        let sharpe = sharpe_ratio(&outcome.returns, self.config.annualization_periods);

        let trades = &outcome.trade_pnls;
        let wins = trades.iter().filter(|p| **p > 0.0).count();
        let gross_profit: f64 = trades.iter().filter(|p| **p > 0.0).sum();
        let gross_loss: f64 = trades.iter().filter(|p| **p < 0.0).map(|p| p.abs()).sum();
        let win_rate = if trades.is_empty() {
            0.0
        } else {
            wins as f64 / trades.len() as f64
        };
        let profit_factor = if gross_loss > 0.0 {
            gross_profit / gross_loss
        } else if gross_profit > 0.0 {
            PROFIT_FACTOR_CAP
        } else {
            0.0
        };

        let penalty = if outcome.terminated_early {
            self.config.early_termination_penalty
        } else {
            0.0
        };
        let fitness = self.config.sharpe_weight * sharpe + self.config.return_weight * total_return
            - self.config.drawdown_weight * outcome.max_drawdown
            - penalty;

        let breakdown = FitnessBreakdown {
            total_return: finite_or_zero(total_return),
            max_drawdown: finite_or_zero(outcome.max_drawdown),
            sharpe,
            win_rate,
            trade_count: trades.len(),
            profit_factor: finite_or_zero(profit_factor),
            fees_paid: finite_or_zero(outcome.fees_paid),
            final_equity: finite_or_zero(outcome.final_equity),
            bars_simulated: outcome.bars_simulated,
        };
        (finite_or_zero(fitness), breakdown)
    }
}

impl StrategyEvaluator for Evaluator {
    fn evaluate(
        &self,
        strategy: &Strategy,
        window: &ObservationWindow,
        initial_capital: Decimal,
    ) -> Result<FitnessReport, EvaluationError> {
        if window.len() < self.config.min_observations {
            return Err(EvaluationError::InsufficientDataWindow {
                available: window.len(),
                required: self.config.min_observations,
            });
        }
        let capital = initial_capital
            .to_f64()
            .filter(|c| *c > 0.0 && c.is_finite())
            .ok_or_else(|| EvaluationError::InvalidCapital(initial_capital.to_string()))?;
        let params = strategy
            .genome()
            .params()
            .map_err(|reason| EvaluationError::InvalidGenome {
                strategy_id: strategy.id.to_string(),
                reason,
            })?;

        let outcome = self.simulate(&params, window, capital);
        let (fitness, breakdown) = self.score(&outcome, capital);

        debug!(
            strategy_id = %strategy.id,
            symbol = window.symbol(),
            fitness,
            trades = breakdown.trade_count,
            terminated_early = outcome.terminated_early,
            "Strategy evaluated"
        );

        Ok(FitnessReport {
            strategy_id: strategy.id,
            window: window.descriptor(),
            fitness,
            breakdown,
            terminated_early: outcome.terminated_early,
        })
    }

    fn min_observations(&self) -> usize {
        self.config.min_observations
    }
}

struct SimOutcome {
    final_equity: f64,
    max_drawdown: f64,
    returns: Vec<f64>,
    trade_pnls: Vec<f64>,
    fees_paid: f64,
    bars_simulated: usize,
    terminated_early: bool,
}

fn sharpe_ratio(returns: &[f64], periods: f64) -> f64 {
    let sd = features::std_dev(returns);
    if sd <= f64::EPSILON {
        return 0.0;
    }
    let sharpe = features::mean(returns) / sd * periods.sqrt();
    finite_or_zero(sharpe).clamp(-SHARPE_CLIP, SHARPE_CLIP)
}

fn finite_or_zero(v: f64) -> f64 {
    if v.is_finite() {
        v
    } else {
        0.0
    }
}
