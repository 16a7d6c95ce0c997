//! Walk-forward backtesting engine
//!
//! Slides a train/test window pair across the bar series with a step of one
//! test window. Every test bar is classified against the causal window
//! (train bars plus test bars so far), routed to a strategy and fed through
//! a single-position state machine: risk exits first, then the signal.
//! Fills happen at the bar close, or at the stop/target level for risk exits.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{validate_series, BacktestError};
use crate::indicators::{IndicatorConfig, IndicatorSet};
use crate::metrics::{summarize, PerformanceSummary};
use crate::regime::{RegimeClassifier, RegimeLabel};
use crate::router::StrategyRouter;
use crate::strategies::SignalContext;
use crate::{Bar, EquityPoint, ExitReason, Money, Position, Side, Signal, Trade};

// =============================================================================
// Configuration
// =============================================================================

/// Unit of `stop_loss` / `take_profit`
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitUnits {
    /// Absolute price distance from entry
    #[default]
    Price,
    /// Multiples of the ATR at the entry bar
    Atr,
}

/// Which level wins when one bar touches both stop and target
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IntrabarPolicy {
    #[default]
    StopFirst,
    TargetFirst,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Train segment length in bars
    pub train_window: usize,
    /// Test segment length in bars, also the window step
    pub test_window: usize,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub exit_units: ExitUnits,
    /// Charged once per closed trade, in P&L units
    pub transaction_cost: f64,
    pub initial_equity: f64,
    /// Units traded per position
    pub position_size: f64,
    /// Close at the bar close once a position is this many bars old
    pub max_holding_bars: Option<usize>,
    pub intrabar_policy: IntrabarPolicy,
    pub indicators: IndicatorConfig,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        BacktestConfig {
            train_window: 180,
            test_window: 30,
            stop_loss: 5.0,
            take_profit: 5.0,
            exit_units: ExitUnits::Price,
            transaction_cost: 0.0,
            initial_equity: 10_000.0,
            position_size: 1.0,
            max_holding_bars: None,
            intrabar_policy: IntrabarPolicy::StopFirst,
            indicators: IndicatorConfig::default(),
        }
    }
}

impl BacktestConfig {
    /// Reject non-positive windows, distances, equity and periods
    pub fn validate(&self) -> Result<(), BacktestError> {
        let counts = [
            ("train_window", self.train_window),
            ("test_window", self.test_window),
            ("indicators.ema_fast", self.indicators.ema_fast),
            ("indicators.ema_slow", self.indicators.ema_slow),
            ("indicators.atr_period", self.indicators.atr_period),
            ("indicators.zone_lookback", self.indicators.zone_lookback),
        ];
        for (field, value) in counts {
            if value == 0 {
                return Err(BacktestError::config(field, "must be > 0"));
            }
        }

        let positive = [
            ("stop_loss", self.stop_loss),
            ("take_profit", self.take_profit),
            ("initial_equity", self.initial_equity),
            ("position_size", self.position_size),
        ];
        for (field, value) in positive {
            if !value.is_finite() || value <= 0.0 {
                return Err(BacktestError::config(field, format!("must be > 0, got {}", value)));
            }
        }

        if !self.transaction_cost.is_finite() || self.transaction_cost < 0.0 {
            return Err(BacktestError::config(
                "transaction_cost",
                format!("must be >= 0, got {}", self.transaction_cost),
            ));
        }
        if self.max_holding_bars == Some(0) {
            return Err(BacktestError::config("max_holding_bars", "must be > 0 when set"));
        }
        Ok(())
    }
}

// =============================================================================
// Results
// =============================================================================

/// Index ranges of one train/test window pair (end bounds exclusive)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WalkForwardWindow {
    pub index: usize,
    pub train_start: usize,
    pub train_end: usize,
    pub test_start: usize,
    pub test_end: usize,
    pub test_start_time: DateTime<Utc>,
    pub test_end_time: DateTime<Utc>,
}

impl WalkForwardWindow {
    /// Window pairs starting at offset 0 with step `test`, while a full
    /// train + test pair still fits in the series
    pub fn plan(bars: &[Bar], train: usize, test: usize) -> Vec<WalkForwardWindow> {
        if train == 0 || test == 0 {
            return Vec::new();
        }
        (0..)
            .map(|k| k * test)
            .take_while(|&start| start + train + test <= bars.len())
            .enumerate()
            .map(|(index, start)| {
                let test_start = start + train;
                let test_end = test_start + test;
                WalkForwardWindow {
                    index,
                    train_start: start,
                    train_end: test_start,
                    test_start,
                    test_end,
                    test_start_time: bars[test_start].timestamp,
                    test_end_time: bars[test_end - 1].timestamp,
                }
            })
            .collect()
    }
}

/// One simulated test step
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalRecord {
    pub timestamp: DateTime<Utc>,
    pub bar_index: usize,
    pub window: usize,
    /// `None` when the window was too short to classify
    pub regime: Option<RegimeLabel>,
    pub signal: Signal,
    pub price: f64,
    /// Realised balance after the step
    pub equity: Money,
    /// Open position after the step
    pub position: Option<Side>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestResult {
    pub windows: Vec<WalkForwardWindow>,
    pub signals: Vec<SignalRecord>,
    pub trades: Vec<Trade>,
    pub equity_curve: Vec<EquityPoint>,
    pub summary: PerformanceSummary,
}

impl BacktestResult {
    fn empty(initial_equity: Money) -> Self {
        BacktestResult {
            windows: Vec::new(),
            signals: Vec::new(),
            trades: Vec::new(),
            equity_curve: Vec::new(),
            summary: PerformanceSummary::empty(initial_equity),
        }
    }

    /// Last realised balance
    pub fn final_equity(&self) -> Money {
        self.summary.final_equity
    }
}

// =============================================================================
// Account state machine
// =============================================================================

/// Position, balance and trade log owned by a single run
#[derive(Debug)]
struct Account {
    position: Option<Position>,
    balance: Money,
    trades: Vec<Trade>,
    cost: Money,
}

impl Account {
    fn new(initial_equity: Money, cost: Money) -> Self {
        Account {
            position: None,
            balance: initial_equity,
            trades: Vec::new(),
            cost,
        }
    }

    fn close(&mut self, price: f64, bar: &Bar, index: usize, outcome: ExitReason) {
        if let Some(position) = self.position.take() {
            let trade = position.close(price, bar.timestamp, index, outcome, self.cost);
            self.balance += trade.pnl;
            tracing::debug!(
                side = %trade.side,
                entry = trade.entry_price,
                exit = trade.exit_price,
                outcome = %trade.outcome,
                pnl = %trade.pnl,
                balance = %self.balance,
                "Position closed"
            );
            self.trades.push(trade);
        }
    }

    fn open(&mut self, position: Position) {
        tracing::debug!(
            side = %position.side,
            entry = position.entry_price,
            stop = position.stop_price,
            target = position.target_price,
            "Position opened"
        );
        self.position = Some(position);
    }
}

// =============================================================================
// Backtester
// =============================================================================

pub struct Backtester {
    config: BacktestConfig,
    classifier: RegimeClassifier,
    router: StrategyRouter,
}

impl Backtester {
    pub fn new(config: BacktestConfig, classifier: RegimeClassifier, router: StrategyRouter) -> Self {
        Backtester {
            config,
            classifier,
            router,
        }
    }

    pub fn config(&self) -> &BacktestConfig {
        &self.config
    }

    /// Run the walk-forward simulation over `bars`.
    ///
    /// Fails only on invalid configuration or an invalid series. A series
    /// too short for one window pair yields empty logs.
    pub fn run_walk_forward(&self, bars: &[Bar]) -> Result<BacktestResult, BacktestError> {
        self.config.validate()?;
        self.classifier.config().validate()?;
        validate_series(bars)?;

        let config = &self.config;
        let initial_equity = Money::from_f64(config.initial_equity);
        let cost = Money::from_f64(config.transaction_cost);

        let windows = WalkForwardWindow::plan(bars, config.train_window, config.test_window);
        if windows.is_empty() {
            tracing::warn!(
                bars = bars.len(),
                required = config.train_window + config.test_window,
                "Series shorter than one train/test window, nothing to simulate"
            );
            return Ok(BacktestResult::empty(initial_equity));
        }

        tracing::info!(
            bars = bars.len(),
            windows = windows.len(),
            train = config.train_window,
            test = config.test_window,
            "Starting walk-forward backtest"
        );

        let indicators = IndicatorSet::compute(bars, &config.indicators);
        let mut account = Account::new(initial_equity, cost);
        let mut signals = Vec::with_capacity(windows.len() * config.test_window);
        let mut equity_curve = Vec::with_capacity(windows.len() * config.test_window + 1);

        for window in &windows {
            for index in window.test_start..window.test_end {
                let bar = &bars[index];
                let regime = match self.classifier.classify(&bars[window.train_start..=index]) {
                    Ok(label) => Some(label),
                    Err(e) => {
                        tracing::trace!(index, error = %e, "Regime unavailable, holding");
                        None
                    }
                };

                let ctx = SignalContext::new(bar, index, indicators.snapshot(index));
                let signal = self.router.route(regime, &ctx);
                self.step(&mut account, &indicators, bar, index, signal);

                signals.push(SignalRecord {
                    timestamp: bar.timestamp,
                    bar_index: index,
                    window: window.index,
                    regime,
                    signal,
                    price: bar.close,
                    equity: account.balance,
                    position: account.position.as_ref().map(|p| p.side),
                });
                equity_curve.push(EquityPoint {
                    timestamp: bar.timestamp,
                    balance: account.balance,
                });
            }
        }

        // Force-close at the last bar of the series, even past the last window
        if account.position.is_some() {
            let last_index = bars.len() - 1;
            let last = &bars[last_index];
            account.close(last.close, last, last_index, ExitReason::EndOfData);

            let closing = EquityPoint {
                timestamp: last.timestamp,
                balance: account.balance,
            };
            match equity_curve.last_mut() {
                Some(point) if point.timestamp == closing.timestamp => *point = closing,
                _ => equity_curve.push(closing),
            }
        }

        let trades = account.trades;
        let summary = summarize(&trades, &equity_curve, initial_equity, cost);

        tracing::info!(
            trades = trades.len(),
            net_profit = %summary.net_profit,
            final_equity = %summary.final_equity,
            "Walk-forward backtest finished"
        );

        Ok(BacktestResult {
            windows,
            signals,
            trades,
            equity_curve,
            summary,
        })
    }

    /// One step of the position state machine: risk exit, then signal
    fn step(
        &self,
        account: &mut Account,
        indicators: &IndicatorSet,
        bar: &Bar,
        index: usize,
        signal: Signal,
    ) {
        if let Some(position) = &account.position {
            if let Some((price, outcome)) = self.risk_exit(position, bar, index) {
                account.close(price, bar, index, outcome);
                // no re-entry on the bar that exited
                return;
            }
        }

        let Some(side) = signal.side() else {
            return;
        };
        if account.position.as_ref().is_some_and(|p| p.side == side) {
            return;
        }
        let Some((stop_distance, target_distance)) = self.exit_distances(indicators, index) else {
            tracing::trace!(index, "ATR undefined at entry, ignoring signal");
            return;
        };

        if account.position.is_some() {
            account.close(bar.close, bar, index, ExitReason::Reversal);
        }
        account.open(Position::open(
            side,
            bar.close,
            bar.timestamp,
            index,
            stop_distance,
            target_distance,
            self.config.position_size,
        ));
    }

    /// Stop/target touch within the bar, then the holding timeout
    fn risk_exit(&self, position: &Position, bar: &Bar, index: usize) -> Option<(f64, ExitReason)> {
        let stop = position
            .stop_touched(bar)
            .then_some((position.stop_price, ExitReason::StopLoss));
        let target = position
            .target_touched(bar)
            .then_some((position.target_price, ExitReason::TakeProfit));

        let touched = match self.config.intrabar_policy {
            IntrabarPolicy::StopFirst => stop.or(target),
            IntrabarPolicy::TargetFirst => target.or(stop),
        };
        if touched.is_some() {
            return touched;
        }

        let held = index.saturating_sub(position.entry_index);
        self.config
            .max_holding_bars
            .filter(|&limit| held >= limit)
            .map(|_| (bar.close, ExitReason::Timeout))
    }

    fn exit_distances(&self, indicators: &IndicatorSet, index: usize) -> Option<(f64, f64)> {
        match self.config.exit_units {
            ExitUnits::Price => Some((self.config.stop_loss, self.config.take_profit)),
            ExitUnits::Atr => indicators
                .atr_at(index)
                .filter(|&atr| atr > 0.0)
                .map(|atr| (self.config.stop_loss * atr, self.config.take_profit * atr)),
        }
    }
}
