//! Fill model and simulated portfolio
//!
//! Slippage always moves the fill price against the trader; fees are charged
//! on notional for both entry and exit.

use crate::domain::{Bar, Side};

const BPS: f64 = 10_000.0;

/// Slippage + fee model in basis points
#[derive(Debug, Clone, Copy)]
pub struct FillModel {
    pub slippage_bps: f64,
    pub fee_bps: f64,
}

impl FillModel {
    pub fn new(slippage_bps: f64, fee_bps: f64) -> Self {
        Self {
            slippage_bps,
            fee_bps,
        }
    }

    /// Price actually paid (buy) or received (sell)
    pub fn fill_price(&self, price: f64, buying: bool) -> f64 {
        let slip = self.slippage_bps / BPS;
        if buying {
            price * (1.0 + slip)
        } else {
            price * (1.0 - slip)
        }
    }

    pub fn fee(&self, notional: f64) -> f64 {
        notional.abs() * self.fee_bps / BPS
    }
}

/// Why a position was closed intrabar
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitTrigger {
    StopLoss,
    TakeProfit,
}

/// Single-symbol cash + signed position account
#[derive(Debug, Clone)]
pub struct Portfolio {
    fill: FillModel,
    cash: f64,
    /// Signed quantity; negative is short
    qty: f64,
    entry_price: f64,
    entry_fee: f64,
    fees_paid: f64,
    trade_pnls: Vec<f64>,
}

impl Portfolio {
    pub fn new(initial_capital: f64, fill: FillModel) -> Self {
        Self {
            fill,
            cash: initial_capital,
            qty: 0.0,
            entry_price: 0.0,
            entry_fee: 0.0,
            fees_paid: 0.0,
            trade_pnls: Vec::new(),
        }
    }

    /// Mark-to-market equity
    pub fn equity(&self, mark: f64) -> f64 {
        self.cash + self.qty * mark
    }

    pub fn side(&self) -> Side {
        if self.qty > 0.0 {
            Side::Long
        } else if self.qty < 0.0 {
            Side::Short
        } else {
            Side::Flat
        }
    }

    pub fn fees_paid(&self) -> f64 {
        self.fees_paid
    }

    /// Net P&L of every closed round trip, fees included
    pub fn trade_pnls(&self) -> &[f64] {
        &self.trade_pnls
    }

    /// Move to `target` at `price`, sizing new exposure as `fraction` of equity
    pub fn rebalance(&mut self, target: Side, price: f64, fraction: f64) {
        if target == self.side() {
            return;
        }
        if self.side() != Side::Flat {
            self.close(price);
        }
        if target == Side::Flat {
            return;
        }

        let equity = self.equity(price);
        if equity <= 0.0 || price <= 0.0 {
            return;
        }
        let buying = target == Side::Long;
        let fill_price = self.fill.fill_price(price, buying);
        let notional = equity * fraction;
        let qty = notional / fill_price * target.sign();
        let fee = self.fill.fee(notional);

        self.cash -= qty * fill_price + fee;
        self.qty = qty;
        self.entry_price = fill_price;
        self.entry_fee = fee;
        self.fees_paid += fee;
    }

    /// Close any open position at `price`; returns the trade's net P&L
    pub fn close(&mut self, price: f64) -> Option<f64> {
        if self.qty == 0.0 {
            return None;
        }
        let selling = self.qty > 0.0;
        let fill_price = self.fill.fill_price(price, !selling);
        let fee = self.fill.fee(self.qty * fill_price);

        self.cash += self.qty * fill_price - fee;
        self.fees_paid += fee;

        let pnl = self.qty * (fill_price - self.entry_price) - self.entry_fee - fee;
        self.trade_pnls.push(pnl);

        self.qty = 0.0;
        self.entry_price = 0.0;
        self.entry_fee = 0.0;
        Some(pnl)
    }

    /// Intrabar stop-loss / take-profit using the bar's range.
    ///
    /// The stop is checked first when both levels are inside the bar. A bar
    /// that opens beyond a level fills at the open.
    pub fn check_exits(&mut self, bar: &Bar, stop_pct: f64, take_pct: f64) -> Option<ExitTrigger> {
        let side = self.side();
        if side == Side::Flat {
            return None;
        }
        let entry = self.entry_price;

        let (trigger, price) = match side {
            Side::Long => {
                let stop = entry * (1.0 - stop_pct);
                let take = entry * (1.0 + take_pct);
                if bar.low <= stop {
                    (ExitTrigger::StopLoss, bar.open.min(stop))
                } else if bar.high >= take {
                    (ExitTrigger::TakeProfit, bar.open.max(take))
                } else {
                    return None;
                }
            }
            Side::Short => {
                let stop = entry * (1.0 + stop_pct);
                let take = entry * (1.0 - take_pct);
                if bar.high >= stop {
                    (ExitTrigger::StopLoss, bar.open.max(stop))
                } else if bar.low <= take {
                    (ExitTrigger::TakeProfit, bar.open.min(take))
                } else {
                    return None;
                }
            }
            Side::Flat => return None,
        };

        self.close(price);
        Some(trigger)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(open: f64, high: f64, low: f64, close: f64) -> Bar {
        Bar {
            timestamp_ms: 0,
            open,
            high,
            low,
            close,
            volume: 1.0,
        }
    }

    #[test]
    fn test_round_trip_without_costs_is_flat() {
        let mut p = Portfolio::new(1000.0, FillModel::new(0.0, 0.0));
        p.rebalance(Side::Long, 100.0, 0.5);
        assert_eq!(p.side(), Side::Long);
        assert!((p.equity(100.0) - 1000.0).abs() < 1e-9);
        let pnl = p.close(110.0).unwrap();
        // 5 units * 10
        assert!((pnl - 50.0).abs() < 1e-9);
        assert!((p.equity(0.0) - 1050.0).abs() < 1e-9);
    }

    #[test]
    fn test_costs_reduce_equity() {
        let mut p = Portfolio::new(1000.0, FillModel::new(10.0, 10.0));
        p.rebalance(Side::Long, 100.0, 1.0);
        p.close(100.0);
        assert!(p.equity(100.0) < 1000.0);
        assert!(p.fees_paid() > 0.0);
        assert!(p.trade_pnls()[0] < 0.0);
    }

    #[test]
    fn test_short_profits_when_price_falls() {
        let mut p = Portfolio::new(1000.0, FillModel::new(0.0, 0.0));
        p.rebalance(Side::Short, 100.0, 1.0);
        assert_eq!(p.side(), Side::Short);
        assert!(p.equity(90.0) > 1000.0);
    }

    #[test]
    fn test_stop_checked_before_take_profit() {
        let mut p = Portfolio::new(1000.0, FillModel::new(0.0, 0.0));
        p.rebalance(Side::Long, 100.0, 1.0);
        let trigger = p.check_exits(&bar(100.0, 120.0, 90.0, 100.0), 0.05, 0.05);
        assert_eq!(trigger, Some(ExitTrigger::StopLoss));
        assert!((p.equity(0.0) - 950.0).abs() < 1e-9);
    }

    #[test]
    fn test_gap_through_stop_fills_at_open() {
        let mut p = Portfolio::new(1000.0, FillModel::new(0.0, 0.0));
        p.rebalance(Side::Long, 100.0, 1.0);
        p.check_exits(&bar(80.0, 85.0, 79.0, 84.0), 0.05, 0.5);
        assert!((p.equity(0.0) - 800.0).abs() < 1e-9);
    }
}
