//! Performance aggregation over a trade log and realised equity curve

use rust_decimal::Decimal;
use serde::Serialize;
use std::collections::BTreeMap;

use crate::{EquityPoint, ExitReason, Money, Trade};

/// Flat summary of one backtest run.
///
/// `win_rate` is a fraction in `[0, 1]`. `profit_factor` is `f64::INFINITY`
/// when there is no losing trade (including when there are no trades at
/// all); JSON renders it as `null`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PerformanceSummary {
    pub trade_count: usize,
    pub winning_trades: usize,
    pub losing_trades: usize,
    pub win_rate: f64,
    /// Mean net P&L per trade
    pub expectancy: Money,
    pub net_profit: Money,
    pub gross_profit: Money,
    /// Absolute sum of losing trades
    pub gross_loss: Money,
    pub profit_factor: f64,
    pub avg_win: Money,
    /// Mean losing trade, as a non-positive amount
    pub avg_loss: Money,
    pub largest_win: Money,
    pub largest_loss: Money,
    pub total_costs: Money,
    pub exits: BTreeMap<ExitReason, usize>,
    pub initial_equity: Money,
    pub final_equity: Money,
    pub return_pct: f64,
    /// Deepest fall from a running peak, as a non-positive amount
    pub max_drawdown: Money,
    /// Same, in percent of that peak (non-positive)
    pub max_drawdown_pct: f64,
}

impl PerformanceSummary {
    /// Summary of a run with no trades
    pub fn empty(initial_equity: Money) -> Self {
        PerformanceSummary {
            trade_count: 0,
            winning_trades: 0,
            losing_trades: 0,
            win_rate: 0.0,
            expectancy: Money::ZERO,
            net_profit: Money::ZERO,
            gross_profit: Money::ZERO,
            gross_loss: Money::ZERO,
            profit_factor: f64::INFINITY,
            avg_win: Money::ZERO,
            avg_loss: Money::ZERO,
            largest_win: Money::ZERO,
            largest_loss: Money::ZERO,
            total_costs: Money::ZERO,
            exits: BTreeMap::new(),
            initial_equity,
            final_equity: initial_equity,
            return_pct: 0.0,
            max_drawdown: Money::ZERO,
            max_drawdown_pct: 0.0,
        }
    }

    pub fn has_trades(&self) -> bool {
        self.trade_count > 0
    }
}

fn mean(total: Money, count: usize) -> Money {
    if count == 0 {
        return Money::ZERO;
    }
    Money::from(total.inner() / Decimal::from(count))
}

/// Summarise a run.
///
/// `initial_equity` is the balance before the first equity point; it seeds
/// the drawdown peak and is the final equity when the curve is empty.
/// `transaction_cost` is the per-trade charge already netted into each P&L.
pub fn summarize(
    trades: &[Trade],
    equity_curve: &[EquityPoint],
    initial_equity: Money,
    transaction_cost: Money,
) -> PerformanceSummary {
    let final_equity = equity_curve
        .last()
        .map(|p| p.balance)
        .unwrap_or(initial_equity);
    let (max_drawdown, max_drawdown_pct) = max_drawdown(initial_equity, equity_curve);

    let mut summary = PerformanceSummary {
        final_equity,
        max_drawdown,
        max_drawdown_pct,
        ..PerformanceSummary::empty(initial_equity)
    };
    if !initial_equity.is_zero() {
        summary.return_pct =
            (final_equity - initial_equity).to_f64() / initial_equity.to_f64() * 100.0;
    }
    if trades.is_empty() {
        return summary;
    }

    let wins: Vec<Money> = trades.iter().map(|t| t.pnl).filter(|p| p.is_positive()).collect();
    let losses: Vec<Money> = trades.iter().map(|t| t.pnl).filter(|p| p.is_negative()).collect();

    let net_profit: Money = trades.iter().map(|t| t.pnl).sum();
    let gross_profit: Money = wins.iter().sum();
    let gross_loss: Money = losses.iter().sum::<Money>().abs();

    let profit_factor = if gross_loss.is_zero() {
        f64::INFINITY
    } else {
        gross_profit.to_f64() / gross_loss.to_f64()
    };

    let mut exits = BTreeMap::new();
    for trade in trades {
        *exits.entry(trade.outcome).or_insert(0) += 1;
    }

    PerformanceSummary {
        trade_count: trades.len(),
        winning_trades: wins.len(),
        losing_trades: losses.len(),
        win_rate: wins.len() as f64 / trades.len() as f64,
        expectancy: mean(net_profit, trades.len()),
        net_profit,
        gross_profit,
        gross_loss,
        profit_factor,
        avg_win: mean(gross_profit, wins.len()),
        avg_loss: -mean(gross_loss, losses.len()),
        largest_win: wins.iter().copied().max().unwrap_or(Money::ZERO),
        largest_loss: losses.iter().copied().min().unwrap_or(Money::ZERO),
        total_costs: transaction_cost * Money::from(Decimal::from(trades.len())),
        exits,
        ..summary
    }
}

/// Largest peak-to-trough fall of the equity curve, starting from
/// `initial_equity` as the first peak.
///
/// Returns `(amount, percent_of_peak)`, both non-positive.
pub fn max_drawdown(initial_equity: Money, equity_curve: &[EquityPoint]) -> (Money, f64) {
    let mut peak = initial_equity;
    let mut worst = Money::ZERO;
    let mut worst_pct = 0.0_f64;

    for point in equity_curve {
        if point.balance > peak {
            peak = point.balance;
        }
        let drawdown = point.balance - peak;
        if drawdown < worst {
            worst = drawdown;
        }
        if peak.is_positive() {
            let pct = drawdown.to_f64() / peak.to_f64() * 100.0;
            worst_pct = worst_pct.min(pct);
        }
    }

    (worst, worst_pct)
}
