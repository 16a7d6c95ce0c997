//! Integration tests for the walk-forward backtester
//!
//! These tests drive whole runs through the public API with hand-built price
//! paths whose trades can be worked out on paper.

use approx::assert_relative_eq;
use chrono::{DateTime, Duration, TimeZone, Utc};
use rust_decimal_macros::dec;

use walkforward_backtester::backtest::{IntrabarPolicy, WalkForwardWindow};
use walkforward_backtester::indicators::IndicatorConfig;
use walkforward_backtester::optimizer::{sort_results, GridConfig, Optimizer, SortMetric};
use walkforward_backtester::router::RoutingConfig;
use walkforward_backtester::strategies::{
    MomentumConfig, MomentumMode, MomentumStrategy, StrategiesConfig, StrategyName,
};
use walkforward_backtester::{
    BacktestConfig, BacktestError, Backtester, Bar, Config, ExitReason, Money, RegimeClassifier,
    Side, StrategyKind, StrategyRouter,
};

// =============================================================================
// Test Utilities
// =============================================================================

const SERIES_LEN: usize = 300;

fn start_time() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 3, 1, 0, 0, 0).unwrap()
}

/// Single-price bars (open = high = low = close), one per hour
fn bars_from_closes(closes: &[f64]) -> Vec<Bar> {
    closes
        .iter()
        .enumerate()
        .map(|(i, &c)| Bar::new(start_time() + Duration::hours(i as i64), c, c, c, c, 1.0).unwrap())
        .collect()
}

/// Flat at 100 up to bar 199, then `tail(i)` for every later bar
fn path(tail: impl Fn(usize) -> f64) -> Vec<Bar> {
    let closes: Vec<f64> = (0..SERIES_LEN)
        .map(|i| if i < 200 { 100.0 } else { tail(i) })
        .collect();
    bars_from_closes(&closes)
}

fn crossover_router() -> StrategyRouter {
    StrategyRouter::uniform(StrategyKind::Momentum(MomentumStrategy::new(MomentumConfig {
        mode: MomentumMode::Crossover,
    })))
}

fn scenario_config() -> BacktestConfig {
    BacktestConfig {
        train_window: 180,
        test_window: 30,
        stop_loss: 5.0,
        take_profit: 5.0,
        transaction_cost: 0.5,
        initial_equity: 10_000.0,
        indicators: IndicatorConfig {
            ema_fast: 3,
            ema_slow: 8,
            ..IndicatorConfig::default()
        },
        ..BacktestConfig::default()
    }
}

fn scenario_backtester() -> Backtester {
    Backtester::new(scenario_config(), RegimeClassifier::default(), crossover_router())
}

// =============================================================================
// Scenario Tests
// =============================================================================

#[test]
fn test_flat_market_produces_no_trades() {
    let bars = path(|_| 100.0);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.windows.len(), 4);
    assert_eq!(result.signals.len(), 120);
    assert!(result.trades.is_empty());
    assert_eq!(result.equity_curve.len(), 120);
    assert_eq!(result.final_equity(), Money::from(dec!(10000)));
    assert_eq!(result.summary.max_drawdown, Money::ZERO);
}

#[test]
fn test_breakout_hits_take_profit() {
    // 101 at bar 200, one point per bar up to 106 at bar 205, then a slow drift up
    let bars = path(|i| match i {
        200..=205 => 101.0 + (i - 200) as f64,
        _ => 106.0 + 0.1 * (i - 205) as f64,
    });
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.side, Side::Long);
    assert_eq!(trade.entry_price, 101.0);
    assert_eq!(trade.exit_price, 106.0);
    assert_eq!(trade.outcome, ExitReason::TakeProfit);
    assert_eq!(trade.bars_held, 5);
    assert_eq!(trade.pnl, Money::from(dec!(4.5)));
    assert_eq!(result.final_equity(), Money::from(dec!(10004.5)));
}

#[test]
fn test_gap_down_hits_stop_loss() {
    let bars = path(|i| match i {
        200 => 101.0,
        _ => 95.0 - 0.1 * (i - 201) as f64,
    });
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.outcome, ExitReason::StopLoss);
    assert_eq!(trade.exit_price, 96.0);
    assert_eq!(trade.pnl, Money::from(dec!(-5.5)));

    // The bar that stopped out also crossed down, but does not re-enter
    let exit_bar = result.signals.iter().find(|s| s.bar_index == 201).unwrap();
    assert_eq!(exit_bar.position, None);
    assert_eq!(result.summary.max_drawdown, Money::from(dec!(-5.5)));
}

#[test]
fn test_opposite_signal_reverses_position() {
    let bars = path(|i| match i {
        200 => 101.0,
        _ => 99.0 - 0.01 * (i - 201) as f64,
    });
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.trades.len(), 2);

    let reversal = &result.trades[0];
    assert_eq!(reversal.side, Side::Long);
    assert_eq!(reversal.outcome, ExitReason::Reversal);
    assert_eq!(reversal.exit_price, 99.0);
    assert_eq!(reversal.pnl, Money::from(dec!(-2.5)));

    let short = &result.trades[1];
    assert_eq!(short.side, Side::Short);
    assert_eq!(short.entry_price, 99.0);
    assert_eq!(short.outcome, ExitReason::EndOfData);
    assert_eq!(short.exit_time, bars[SERIES_LEN - 1].timestamp);
    assert_eq!(short.exit_price, bars[SERIES_LEN - 1].close);
    assert_relative_eq!(short.pnl.to_f64(), 99.0 - 98.02 - 0.5, epsilon = 1e-9);
}

#[test]
fn test_open_position_closed_at_end_of_data() {
    let bars = path(|i| 101.0 + 0.04 * (i - 200) as f64);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.trades.len(), 1);
    let trade = &result.trades[0];
    assert_eq!(trade.outcome, ExitReason::EndOfData);
    assert_relative_eq!(trade.exit_price, 104.96, epsilon = 1e-9);
    assert_relative_eq!(trade.pnl.to_f64(), 3.46, epsilon = 1e-9);

    // The closing balance replaces the last equity point instead of adding one
    assert_eq!(result.equity_curve.len(), 120);
    let last = result.equity_curve.last().unwrap();
    assert_eq!(last.timestamp, bars[SERIES_LEN - 1].timestamp);
    assert_eq!(last.balance, result.final_equity());
}

#[test]
fn test_position_closed_at_last_bar_beyond_final_window() {
    // 310 bars: the last 10 fall outside every test window
    let closes: Vec<f64> = (0..310)
        .map(|i| if i < 200 { 100.0 } else { 101.0 + 0.04 * (i - 200) as f64 })
        .collect();
    let bars = bars_from_closes(&closes);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    assert_eq!(result.windows.len(), 4);
    let trade = &result.trades[0];
    assert_eq!(trade.outcome, ExitReason::EndOfData);
    assert_eq!(trade.exit_time, bars[309].timestamp);
    assert_eq!(result.equity_curve.len(), 121);
}

// =============================================================================
// Invariant Tests
// =============================================================================

#[test]
fn test_equity_reconciles_with_trades() {
    let bars = path(|i| 100.0 + 3.0 * ((i as f64) / 4.0).sin());
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    let pnl: Money = result.trades.iter().map(|t| t.pnl).sum();
    assert_eq!(result.final_equity(), Money::from_f64(10_000.0) + pnl);
    assert_eq!(result.summary.net_profit, pnl);
    assert_eq!(
        result.summary.total_costs,
        Money::from(dec!(0.5)) * Money::from(rust_decimal::Decimal::from(result.trades.len()))
    );

    let exit_total: usize = result.summary.exits.values().sum();
    assert_eq!(exit_total, result.trades.len());
    assert!(result.summary.max_drawdown <= Money::ZERO);
}

#[test]
fn test_trades_do_not_overlap() {
    let bars = path(|i| 100.0 + 4.0 * ((i as f64) / 3.0).sin());
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    for pair in result.trades.windows(2) {
        assert!(pair[0].exit_time <= pair[1].entry_time);
    }
    for trade in &result.trades {
        assert!(trade.entry_time <= trade.exit_time);
    }
}

#[test]
fn test_run_is_deterministic() {
    let bars = path(|i| 100.0 + 2.5 * ((i as f64) / 5.0).cos());
    let backtester = scenario_backtester();

    let first = backtester.run_walk_forward(&bars).unwrap();
    let second = backtester.run_walk_forward(&bars).unwrap();

    assert_eq!(first.trades, second.trades);
    assert_eq!(first.equity_curve, second.equity_curve);
    assert_eq!(first.summary, second.summary);
}

#[test]
fn test_signals_only_cover_test_segments() {
    let bars = path(|_| 100.0);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();

    let first_test = result.windows[0].test_start;
    assert_eq!(first_test, 180);
    assert!(result.signals.iter().all(|s| s.bar_index >= first_test));

    let indices: Vec<usize> = result.signals.iter().map(|s| s.bar_index).collect();
    let expected: Vec<usize> = (180..SERIES_LEN).collect();
    assert_eq!(indices, expected);
}

#[test]
fn test_future_bars_do_not_change_past_decisions() {
    let base = path(|i| 100.0 + 3.0 * ((i as f64) / 4.0).sin());
    let mut altered = base.clone();
    for bar in altered.iter_mut().skip(250) {
        let c = bar.close * 1.5;
        bar.open = c;
        bar.high = c;
        bar.low = c;
        bar.close = c;
    }

    let backtester = scenario_backtester();
    let a = backtester.run_walk_forward(&base).unwrap();
    let b = backtester.run_walk_forward(&altered).unwrap();

    let before = |s: &&walkforward_backtester::backtest::SignalRecord| s.bar_index < 250;
    let a_signals: Vec<_> = a.signals.iter().filter(before).collect();
    let b_signals: Vec<_> = b.signals.iter().filter(before).collect();
    assert_eq!(a_signals, b_signals);
}

// =============================================================================
// Boundary and Error Tests
// =============================================================================

#[test]
fn test_series_exactly_one_window() {
    let bars = bars_from_closes(&[100.0; 210]);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();
    assert_eq!(result.windows.len(), 1);
    assert_eq!(result.signals.len(), 30);
}

#[test]
fn test_series_one_bar_short_of_a_window() {
    let bars = bars_from_closes(&[100.0; 209]);
    let result = scenario_backtester().run_walk_forward(&bars).unwrap();
    assert!(result.windows.is_empty());
    assert!(result.signals.is_empty());
    assert!(result.trades.is_empty());
    assert_eq!(result.final_equity(), Money::from(dec!(10000)));
}

#[test]
fn test_window_plan_steps_by_test_length() {
    let bars = bars_from_closes(&[100.0; 100]);
    let windows = WalkForwardWindow::plan(&bars, 40, 20);
    let starts: Vec<usize> = windows.iter().map(|w| w.test_start).collect();
    assert_eq!(starts, vec![40, 60, 80]);
    for w in &windows {
        assert_eq!(w.train_end, w.test_start);
        assert_eq!(w.test_end - w.test_start, 20);
    }
}

#[test]
fn test_invalid_bar_reports_index() {
    let mut bars = path(|_| 100.0);
    bars[250] = Bar::new_unchecked(bars[250].timestamp, 100.0, 99.0, 101.0, 100.0, 1.0);

    let err = scenario_backtester().run_walk_forward(&bars).unwrap_err();
    assert!(matches!(err, BacktestError::InvalidBar { index: 250, .. }));
}

#[test]
fn test_out_of_order_timestamps_rejected() {
    let mut bars = path(|_| 100.0);
    bars.swap(120, 121);

    let err = scenario_backtester().run_walk_forward(&bars).unwrap_err();
    assert!(matches!(err, BacktestError::NonMonotonicTimestamp { index: 121, .. }));
}

#[test]
fn test_invalid_config_rejected() {
    let config = BacktestConfig {
        test_window: 0,
        ..scenario_config()
    };
    let backtester = Backtester::new(config, RegimeClassifier::default(), crossover_router());
    let err = backtester.run_walk_forward(&path(|_| 100.0)).unwrap_err();
    assert!(matches!(err, BacktestError::InvalidConfig { field: "test_window", .. }));
}

#[test]
fn test_stop_and_target_same_bar_follows_policy() {
    // Bar 201 spans 95..107: both levels of the long entered at 101
    let mut bars = path(|i| match i {
        200 => 101.0,
        _ => 101.0 + 0.1 * (i - 201) as f64,
    });
    bars[201] = Bar::new(bars[201].timestamp, 101.0, 107.0, 95.0, 101.0, 1.0).unwrap();

    let stop_first = scenario_backtester().run_walk_forward(&bars).unwrap();
    assert_eq!(stop_first.trades[0].outcome, ExitReason::StopLoss);

    let config = BacktestConfig {
        intrabar_policy: IntrabarPolicy::TargetFirst,
        ..scenario_config()
    };
    let target_first = Backtester::new(config, RegimeClassifier::default(), crossover_router())
        .run_walk_forward(&bars)
        .unwrap();
    assert_eq!(target_first.trades[0].outcome, ExitReason::TakeProfit);
    assert_eq!(target_first.trades[0].exit_price, 106.0);
}

// =============================================================================
// Configuration and Optimizer Tests
// =============================================================================

#[test]
fn test_default_config_runs_end_to_end() {
    let bars = path(|i| 100.0 + 3.0 * ((i as f64) / 6.0).sin());
    let config = Config::default();
    let result = config.backtester().unwrap().run_walk_forward(&bars).unwrap();

    assert_eq!(result.windows.len(), 4);
    assert_eq!(result.signals.len(), 120);
    assert!(result.signals.iter().all(|s| s.regime.is_some()));
}

#[test]
fn test_optimizer_matches_single_runs() {
    let bars = path(|i| 100.0 + 3.0 * ((i as f64) / 4.0).sin());
    let grid = GridConfig {
        stop_loss: vec![2.0, 5.0],
        take_profit: vec![2.0, 5.0],
        ..GridConfig::default()
    };
    // crossover momentum is the default momentum mode
    let combinations = grid.combinations(&scenario_config(), &StrategiesConfig::default());
    assert_eq!(combinations.len(), 4);

    let optimizer = Optimizer::new(
        RegimeClassifier::default(),
        RoutingConfig::uniform(StrategyName::Momentum),
    );
    let mut results = optimizer.optimize(&bars, &combinations, None).unwrap();
    assert_eq!(results.len(), 4);

    for result in &results {
        let single = combinations
            .iter()
            .find(|c| {
                c.backtest.stop_loss == result.params.stop_loss
                    && c.backtest.take_profit == result.params.take_profit
            })
            .unwrap();
        let expected = Backtester::new(single.backtest.clone(), RegimeClassifier::default(), crossover_router())
            .run_walk_forward(&bars)
            .unwrap();
        assert_eq!(result.summary, expected.summary);
    }

    sort_results(&mut results, SortMetric::NetProfit);
    for pair in results.windows(2) {
        assert!(pair[0].summary.net_profit >= pair[1].summary.net_profit);
    }
}
