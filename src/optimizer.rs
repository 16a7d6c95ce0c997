//! Parallel parameter grid search
//!
//! Every combination is an independent walk-forward run over the same
//! read-only bar slice. Runs are spread over the rayon pool; a shared flag
//! cancels the combinations that have not started yet.

use indicatif::ProgressBar;
use itertools::iproduct;
use ordered_float::OrderedFloat;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::cmp::Reverse;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::backtest::{BacktestConfig, Backtester};
use crate::error::BacktestError;
use crate::metrics::PerformanceSummary;
use crate::regime::RegimeClassifier;
use crate::router::{RoutingConfig, StrategyRouter};
use crate::strategies::StrategiesConfig;
use crate::Bar;

// =============================================================================
// Grid definition
// =============================================================================

/// Values to try per parameter; an empty axis keeps the base value
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GridConfig {
    pub stop_loss: Vec<f64>,
    pub take_profit: Vec<f64>,
    pub transaction_cost: Vec<f64>,
    pub train_window: Vec<usize>,
    pub test_window: Vec<usize>,
    pub max_holding_bars: Vec<usize>,
    /// VWAP strategy minimum ATR
    pub min_atr: Vec<f64>,
    /// VWAP strategy touch tolerance
    pub vwap_tol: Vec<f64>,
}

fn axis<T: Clone>(values: &[T], base: T) -> Vec<T> {
    if values.is_empty() {
        vec![base]
    } else {
        values.to_vec()
    }
}

fn optional_axis<T: Copy>(values: &[T], base: Option<T>) -> Vec<Option<T>> {
    if values.is_empty() {
        vec![base]
    } else {
        values.iter().map(|&v| Some(v)).collect()
    }
}

/// One point of the grid: backtest settings plus strategy parameters
#[derive(Debug, Clone, PartialEq)]
pub struct Combination {
    pub backtest: BacktestConfig,
    pub strategies: StrategiesConfig,
}

impl GridConfig {
    pub fn is_empty(&self) -> bool {
        self.total_axes().iter().all(|&n| n == 0)
    }

    fn total_axes(&self) -> [usize; 8] {
        [
            self.stop_loss.len(),
            self.take_profit.len(),
            self.transaction_cost.len(),
            self.train_window.len(),
            self.test_window.len(),
            self.max_holding_bars.len(),
            self.min_atr.len(),
            self.vwap_tol.len(),
        ]
    }

    pub fn total_combinations(&self) -> usize {
        self.total_axes().iter().map(|&n| n.max(1)).product()
    }

    /// Cartesian product of all axes applied to `base` and `strategies`,
    /// in a fixed order
    pub fn combinations(&self, base: &BacktestConfig, strategies: &StrategiesConfig) -> Vec<Combination> {
        let backtests: Vec<BacktestConfig> = iproduct!(
            axis(&self.train_window, base.train_window),
            axis(&self.test_window, base.test_window),
            axis(&self.stop_loss, base.stop_loss),
            axis(&self.take_profit, base.take_profit),
            axis(&self.transaction_cost, base.transaction_cost),
            optional_axis(&self.max_holding_bars, base.max_holding_bars)
        )
        .map(
            |(train_window, test_window, stop_loss, take_profit, transaction_cost, max_holding_bars)| {
                BacktestConfig {
                    train_window,
                    test_window,
                    stop_loss,
                    take_profit,
                    transaction_cost,
                    max_holding_bars,
                    ..base.clone()
                }
            },
        )
        .collect();

        let strategy_sets: Vec<StrategiesConfig> = iproduct!(
            optional_axis(&self.min_atr, strategies.vwap.min_atr),
            axis(&self.vwap_tol, strategies.vwap.vwap_tol)
        )
        .map(|(min_atr, vwap_tol)| {
            let mut set = strategies.clone();
            set.vwap.min_atr = min_atr;
            set.vwap.vwap_tol = vwap_tol;
            set
        })
        .collect();

        iproduct!(backtests, strategy_sets)
            .map(|(backtest, strategies)| Combination { backtest, strategies })
            .collect()
    }

    /// Apply a CLI override of the form `param=v1,v2,...`
    pub fn apply_override(&mut self, arg: &str) -> Result<(), BacktestError> {
        let (key, values) = arg
            .split_once('=')
            .ok_or_else(|| BacktestError::config("grid", format!("expected param=values, got '{}'", arg)))?;
        let values: Vec<&str> = values.split(',').map(str::trim).filter(|v| !v.is_empty()).collect();

        fn parse<T: FromStr>(field: &'static str, values: &[&str]) -> Result<Vec<T>, BacktestError> {
            values
                .iter()
                .map(|v| {
                    v.parse()
                        .map_err(|_| BacktestError::config(field, format!("cannot parse '{}'", v)))
                })
                .collect()
        }

        match key.trim() {
            "stop_loss" => self.stop_loss = parse("grid.stop_loss", &values)?,
            "take_profit" => self.take_profit = parse("grid.take_profit", &values)?,
            "transaction_cost" => self.transaction_cost = parse("grid.transaction_cost", &values)?,
            "train_window" => self.train_window = parse("grid.train_window", &values)?,
            "test_window" => self.test_window = parse("grid.test_window", &values)?,
            "max_holding_bars" => self.max_holding_bars = parse("grid.max_holding_bars", &values)?,
            "min_atr" => self.min_atr = parse("grid.min_atr", &values)?,
            "vwap_tol" => self.vwap_tol = parse("grid.vwap_tol", &values)?,
            other => {
                return Err(BacktestError::config(
                    "grid",
                    format!("unknown parameter '{}'", other),
                ))
            }
        }
        Ok(())
    }
}

/// The swept parameters of one combination
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GridParams {
    pub train_window: usize,
    pub test_window: usize,
    pub stop_loss: f64,
    pub take_profit: f64,
    pub transaction_cost: f64,
    pub max_holding_bars: Option<usize>,
    pub min_atr: Option<f64>,
    pub vwap_tol: f64,
}

impl From<&Combination> for GridParams {
    fn from(combination: &Combination) -> Self {
        let config = &combination.backtest;
        let vwap = &combination.strategies.vwap;
        GridParams {
            train_window: config.train_window,
            test_window: config.test_window,
            stop_loss: config.stop_loss,
            take_profit: config.take_profit,
            transaction_cost: config.transaction_cost,
            max_holding_bars: config.max_holding_bars,
            min_atr: vwap.min_atr,
            vwap_tol: vwap.vwap_tol,
        }
    }
}

impl fmt::Display for GridParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "train={} test={} sl={} tp={} cost={}",
            self.train_window, self.test_window, self.stop_loss, self.take_profit, self.transaction_cost
        )?;
        if let Some(bars) = self.max_holding_bars {
            write!(f, " hold={}", bars)?;
        }
        if let Some(min_atr) = self.min_atr {
            write!(f, " min_atr={}", min_atr)?;
        }
        write!(f, " vwap_tol={}", self.vwap_tol)
    }
}

// =============================================================================
// Results
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OptimizationResult {
    pub params: GridParams,
    pub summary: PerformanceSummary,
}

/// Ranking metric, best first
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortMetric {
    #[default]
    Expectancy,
    NetProfit,
    WinRate,
    ProfitFactor,
}

impl SortMetric {
    fn value(self, summary: &PerformanceSummary) -> f64 {
        match self {
            SortMetric::Expectancy => summary.expectancy.to_f64(),
            SortMetric::NetProfit => summary.net_profit.to_f64(),
            SortMetric::WinRate => summary.win_rate,
            SortMetric::ProfitFactor => summary.profit_factor,
        }
    }
}

impl FromStr for SortMetric {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "expectancy" => Ok(SortMetric::Expectancy),
            "net_profit" | "profit" => Ok(SortMetric::NetProfit),
            "win_rate" => Ok(SortMetric::WinRate),
            "profit_factor" => Ok(SortMetric::ProfitFactor),
            other => Err(format!(
                "Unknown sort metric: '{}'. Available: expectancy, net_profit, win_rate, profit_factor",
                other
            )),
        }
    }
}

/// Sort results by `metric`, best first. Combinations without trades go
/// last whatever their metric. Ties keep grid order.
pub fn sort_results(results: &mut [OptimizationResult], metric: SortMetric) {
    results.sort_by_key(|r| {
        Reverse((r.summary.has_trades(), OrderedFloat(metric.value(&r.summary))))
    });
}

// =============================================================================
// Optimizer
// =============================================================================

pub struct Optimizer {
    classifier: RegimeClassifier,
    routing: RoutingConfig,
    cancel: Arc<AtomicBool>,
}

impl Optimizer {
    /// Each combination gets a router built from `routing` and its own
    /// strategy parameters
    pub fn new(classifier: RegimeClassifier, routing: RoutingConfig) -> Self {
        Optimizer {
            classifier,
            routing,
            cancel: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Flag that stops combinations not yet started when set
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancel)
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }

    fn run_one(
        &self,
        bars: &[Bar],
        combination: &Combination,
    ) -> Result<Option<OptimizationResult>, BacktestError> {
        if self.is_cancelled() {
            return Ok(None);
        }
        let router = StrategyRouter::from_config(&self.routing, &combination.strategies)?;
        let backtester = Backtester::new(combination.backtest.clone(), self.classifier.clone(), router);
        let result = backtester.run_walk_forward(bars)?;
        Ok(Some(OptimizationResult {
            params: GridParams::from(combination),
            summary: result.summary,
        }))
    }

    fn report_cancelled(completed: usize, total: usize) {
        if completed < total {
            tracing::warn!(completed, total, "Grid search cancelled");
        }
    }

    /// Run every combination in parallel. Results come back in grid order;
    /// cancelled combinations are missing.
    pub fn optimize(
        &self,
        bars: &[Bar],
        combinations: &[Combination],
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<OptimizationResult>, BacktestError> {
        tracing::info!(combinations = combinations.len(), bars = bars.len(), "Starting grid search");

        let results: Vec<Option<OptimizationResult>> = combinations
            .par_iter()
            .map(|combination| {
                let outcome = self.run_one(bars, combination);
                if let Some(pb) = progress {
                    pb.inc(1);
                }
                outcome
            })
            .collect::<Result<_, _>>()?;

        let completed: Vec<OptimizationResult> = results.into_iter().flatten().collect();
        Self::report_cancelled(completed.len(), combinations.len());
        Ok(completed)
    }

    /// Same as [`optimize`](Self::optimize) on the calling thread
    pub fn optimize_sequential(
        &self,
        bars: &[Bar],
        combinations: &[Combination],
        progress: Option<&ProgressBar>,
    ) -> Result<Vec<OptimizationResult>, BacktestError> {
        tracing::info!(combinations = combinations.len(), bars = bars.len(), "Starting sequential grid search");

        let mut results = Vec::with_capacity(combinations.len());
        for combination in combinations {
            if let Some(result) = self.run_one(bars, combination)? {
                results.push(result);
            }
            if let Some(pb) = progress {
                pb.inc(1);
            }
        }
        Self::report_cancelled(results.len(), combinations.len());
        Ok(results)
    }
}
