//! Walk-Forward Backtester
//!
//! Replays a historical bar series through rolling train/test windows,
//! classifies the market regime at every test bar, routes to a strategy,
//! simulates a single position with stop-loss, take-profit, timeout and
//! reversal exits, and aggregates the realised results.

pub mod backtest;
pub mod config;
pub mod data;
pub mod error;
pub mod indicators;
pub mod metrics;
pub mod optimizer;
pub mod regime;
pub mod router;
pub mod strategies;
pub mod types;

pub use backtest::{BacktestConfig, BacktestResult, Backtester};
pub use config::Config;
pub use error::BacktestError;
pub use metrics::PerformanceSummary;
pub use regime::{RegimeClassifier, RegimeLabel};
pub use router::StrategyRouter;
pub use strategies::{SignalContext, Strategy, StrategyKind};
pub use types::*;
