use chrono::{Duration, TimeZone, Utc};
use proptest::prelude::*;

use walkforward_backtester::indicators::{atr, ema, sma, IndicatorConfig};
use walkforward_backtester::regime::{RegimeClassifier, RegimeConfig};
use walkforward_backtester::strategies::{MomentumConfig, MomentumMode, MomentumStrategy};
use walkforward_backtester::{
    BacktestConfig, Backtester, Bar, ExitReason, Money, StrategyKind, StrategyRouter,
};

fn bars(moves: &[(f64, f64)]) -> Vec<Bar> {
    let start = Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap();
    moves
        .iter()
        .enumerate()
        .map(|(i, &(close, spread))| {
            Bar::new(
                start + Duration::minutes(15 * i as i64),
                close,
                close + spread,
                close - spread.min(close / 2.0),
                close,
                10.0,
            )
            .unwrap()
        })
        .collect()
}

fn backtester(stop_loss: f64, take_profit: f64, cost: f64) -> Backtester {
    let config = BacktestConfig {
        train_window: 30,
        test_window: 10,
        stop_loss,
        take_profit,
        transaction_cost: cost,
        initial_equity: 1_000.0,
        max_holding_bars: Some(8),
        indicators: IndicatorConfig {
            ema_fast: 3,
            ema_slow: 7,
            atr_period: 5,
            ..IndicatorConfig::default()
        },
        ..BacktestConfig::default()
    };
    let classifier = RegimeClassifier::new(RegimeConfig {
        atr_period: 5,
        vol_smoothing: 10,
        slope_window: 5,
        ma_fast: 5,
        ma_slow: 15,
        ..RegimeConfig::default()
    });
    let router = StrategyRouter::uniform(StrategyKind::Momentum(MomentumStrategy::new(
        MomentumConfig {
            mode: MomentumMode::Level,
        },
    )));
    Backtester::new(config, classifier, router)
}

fn price_path() -> impl Strategy<Value = Vec<(f64, f64)>> {
    prop::collection::vec((50.0f64..150.0, 0.0f64..3.0), 40..160)
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn moving_averages_undefined_only_during_warm_up(
        values in prop::collection::vec(0.01f64..10_000.0, 1..120),
        period in 1usize..30,
    ) {
        for series in [sma(&values, period), ema(&values, period)] {
            prop_assert_eq!(series.len(), values.len());
            for (i, v) in series.iter().enumerate() {
                prop_assert_eq!(v.is_some(), i + 1 >= period);
            }
        }
    }

    #[test]
    fn atr_is_non_negative_after_warm_up(moves in price_path(), period in 1usize..20) {
        let bars = bars(&moves);
        let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();

        for (i, v) in atr(&high, &low, &close, period).iter().enumerate() {
            prop_assert_eq!(v.is_some(), i >= period);
            if let Some(v) = v {
                prop_assert!(*v >= 0.0);
            }
        }
    }

    #[test]
    fn final_equity_reconciles_with_trade_pnl(
        moves in price_path(),
        stop_loss in 0.5f64..10.0,
        take_profit in 0.5f64..10.0,
        cost in 0.0f64..1.0,
    ) {
        let bars = bars(&moves);
        let result = backtester(stop_loss, take_profit, cost).run_walk_forward(&bars).unwrap();

        let pnl: Money = result.trades.iter().map(|t| t.pnl).sum();
        prop_assert_eq!(result.final_equity(), Money::from_f64(1_000.0) + pnl);
        prop_assert_eq!(result.summary.trade_count, result.trades.len());
        prop_assert_eq!(result.summary.exits.values().sum::<usize>(), result.trades.len());
        prop_assert!(result.summary.max_drawdown <= Money::ZERO);
        prop_assert!((0.0..=1.0).contains(&result.summary.win_rate));
    }

    #[test]
    fn trades_are_sequential_and_logs_cover_every_test_bar(moves in price_path()) {
        let bars = bars(&moves);
        let result = backtester(2.0, 3.0, 0.1).run_walk_forward(&bars).unwrap();

        prop_assert_eq!(result.signals.len(), result.windows.len() * 10);
        for pair in result.trades.windows(2) {
            prop_assert!(pair[0].exit_time <= pair[1].entry_time);
        }
        for trade in result.trades.iter().filter(|t| t.outcome != ExitReason::EndOfData) {
            prop_assert!(trade.bars_held <= 8);
        }
        for pair in result.equity_curve.windows(2) {
            prop_assert!(pair[0].timestamp < pair[1].timestamp);
        }
    }

    #[test]
    fn repeated_runs_are_identical(moves in price_path()) {
        let bars = bars(&moves);
        let backtester = backtester(3.0, 3.0, 0.25);
        let first = backtester.run_walk_forward(&bars).unwrap();
        let second = backtester.run_walk_forward(&bars).unwrap();
        prop_assert_eq!(first.trades, second.trades);
        prop_assert_eq!(first.summary, second.summary);
    }
}
