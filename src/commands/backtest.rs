//! Backtest command implementation

use anyhow::{Context, Result};
use std::path::PathBuf;
use tracing::info;
use walkforward_backtester::config::CsvFormat;
use walkforward_backtester::router::RoutingConfig;
use walkforward_backtester::strategies::StrategyName;
use walkforward_backtester::{data, ExitReason};

use super::{load_config, load_data};

/// CLI overrides for a single backtest
#[derive(Debug, Default)]
pub struct BacktestArgs {
    pub config: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub format: Option<CsvFormat>,
    pub strategy: Option<String>,
    pub capital: Option<f64>,
    pub train: Option<usize>,
    pub test: Option<usize>,
    pub stop_loss: Option<f64>,
    pub take_profit: Option<f64>,
    pub cost: Option<f64>,
    pub output: Option<PathBuf>,
    pub no_export: bool,
}

pub fn run(args: BacktestArgs) -> Result<()> {
    info!("Starting backtest");

    let mut config = load_config(args.config.as_deref())?;

    // Apply overrides
    if let Some(strategy) = &args.strategy {
        let name: StrategyName = strategy.parse()?;
        info!("Routing every regime to: {}", name);
        config.routing = RoutingConfig::uniform(name);
    }
    if let Some(capital) = args.capital {
        info!("Overriding initial equity to: {:.2}", capital);
        config.backtest.initial_equity = capital;
    }
    if let Some(train) = args.train {
        config.backtest.train_window = train;
    }
    if let Some(test) = args.test {
        config.backtest.test_window = test;
    }
    if let Some(stop_loss) = args.stop_loss {
        config.backtest.stop_loss = stop_loss;
    }
    if let Some(take_profit) = args.take_profit {
        config.backtest.take_profit = take_profit;
    }
    if let Some(cost) = args.cost {
        config.backtest.transaction_cost = cost;
    }
    config.validate()?;

    let bars = load_data(&config, args.data, args.format)?;
    let backtester = config.backtester()?;

    info!("Running walk-forward backtest...");
    let result = backtester
        .run_walk_forward(&bars)
        .context("Backtest rejected the input")?;
    let s = &result.summary;

    // Print results
    println!("\n{}", "=".repeat(60));
    println!("WALK-FORWARD BACKTEST RESULTS");
    println!("{}", "=".repeat(60));
    println!("Bars:               {}", bars.len());
    println!(
        "Windows:            {} (train {} / test {})",
        result.windows.len(),
        config.backtest.train_window,
        config.backtest.test_window
    );
    println!("Initial Equity:     {:.2}", s.initial_equity.to_f64());
    println!("Final Equity:       {:.2}", s.final_equity.to_f64());
    println!("Net Profit:         {:.2}", s.net_profit.to_f64());
    println!("Return:             {:.2}%", s.return_pct);
    println!(
        "Max Drawdown:       {:.2} ({:.2}%)",
        s.max_drawdown.to_f64(),
        s.max_drawdown_pct
    );
    println!("Win Rate:           {:.2}%", s.win_rate * 100.0);
    println!("Expectancy:         {:.4}", s.expectancy.to_f64());
    if s.profit_factor.is_finite() {
        println!("Profit Factor:      {:.2}", s.profit_factor);
    } else {
        println!("Profit Factor:      inf (no losing trades)");
    }
    println!("Total Trades:       {}", s.trade_count);
    println!("Winning Trades:     {}", s.winning_trades);
    println!("Losing Trades:      {}", s.losing_trades);
    println!("Average Win:        {:.2}", s.avg_win.to_f64());
    println!("Average Loss:       {:.2}", s.avg_loss.to_f64());
    println!("Largest Win:        {:.2}", s.largest_win.to_f64());
    println!("Largest Loss:       {:.2}", s.largest_loss.to_f64());
    println!("Transaction Costs:  {:.2}", s.total_costs.to_f64());
    for reason in ExitReason::ALL {
        let count = s.exits.get(&reason).copied().unwrap_or(0);
        println!("  {:<17} {}", format!("{}:", reason), count);
    }
    println!("{}", "=".repeat(60));

    if !args.no_export {
        let dir = args.output.unwrap_or_else(|| config.data.output_dir.clone());
        for path in data::export_result(&result, &dir)? {
            println!("Saved {}", path.display());
        }
    }

    info!("Backtest completed successfully");

    Ok(())
}
