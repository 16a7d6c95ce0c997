//! Optimize command implementation with progress tracking

use anyhow::Result;
use indicatif::{ProgressBar, ProgressStyle};
use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{error, info, warn};
use walkforward_backtester::config::CsvFormat;
use walkforward_backtester::data;
use walkforward_backtester::optimizer::{sort_results, SortMetric};

use super::{load_config, load_data};

/// CLI options for a grid search
#[derive(Debug, Default)]
pub struct OptimizeArgs {
    pub config: Option<PathBuf>,
    pub data: Option<PathBuf>,
    pub format: Option<CsvFormat>,
    /// `param=v1,v2,...` overrides of grid axes
    pub grid: Vec<String>,
    pub sort_by: String,
    pub top: usize,
    pub sequential: bool,
    pub output: Option<PathBuf>,
}

pub fn run(args: OptimizeArgs) -> Result<()> {
    info!("Starting optimization");

    let config = load_config(args.config.as_deref())?;
    let metric: SortMetric = args.sort_by.parse().map_err(anyhow::Error::msg)?;

    let mut grid = config.grid.clone().unwrap_or_default();
    for entry in &args.grid {
        grid.apply_override(entry)?;
    }
    let combinations = config.combinations(&grid);
    info!("Parameter combinations: {}", combinations.len());

    let bars = load_data(&config, args.data, args.format)?;
    let optimizer = config.optimizer();

    // Ctrl+C stops combinations that have not started yet
    let runtime = tokio::runtime::Runtime::new()?;
    runtime.spawn(cancel_on_ctrl_c(optimizer.cancel_handle()));

    // Print summary
    println!("\n{}", "=".repeat(70));
    println!("OPTIMIZATION SUMMARY");
    println!("{}", "=".repeat(70));
    println!("  Bars:          {}", bars.len());
    println!("  Parameters:    {} combinations", combinations.len());
    println!("  Sort by:       {:?}", metric);
    println!("  Mode:          {}", if args.sequential { "sequential" } else { "parallel" });
    println!("{}\n", "=".repeat(70));

    let pb = ProgressBar::new(combinations.len() as u64);
    pb.set_style(
        ProgressStyle::default_bar()
            .template("⚡ {percent:>3}%|{bar:40}| {pos}/{len} [{elapsed}<{eta}, {per_sec:.2}]")?
            .progress_chars("█░ "),
    );

    let mut results = if args.sequential {
        optimizer.optimize_sequential(&bars, &combinations, Some(&pb))?
    } else {
        optimizer.optimize(&bars, &combinations, Some(&pb))?
    };
    pb.finish();
    println!();

    if optimizer.is_cancelled() {
        println!(
            "Cancelled: {} of {} combinations completed",
            results.len(),
            combinations.len()
        );
    }

    if results.is_empty() {
        info!("No results");
        return Ok(());
    }

    sort_results(&mut results, metric);
    info!("Total results: {}, sorted by: {:?}", results.len(), metric);

    // Display top results
    let display_count = args.top.min(results.len());
    println!("\n{}", "=".repeat(110));
    println!("TOP {} OPTIMIZATION RESULTS (sorted by {:?})", display_count, metric);
    println!("{}", "=".repeat(110));
    println!(
        "{:<4} {:>11} {:>11} {:>7} {:>7} {:>11} {:>6} | Parameters",
        "Rank", "Expectancy", "NetProfit", "WinR%", "PF", "MaxDD", "Trades"
    );
    println!("{}", "-".repeat(110));

    for (i, result) in results.iter().take(display_count).enumerate() {
        let s = &result.summary;
        println!(
            "{:<4} {:>11.4} {:>11.2} {:>7.2} {:>7.2} {:>11.2} {:>6} | {}",
            i + 1,
            s.expectancy.to_f64(),
            s.net_profit.to_f64(),
            s.win_rate * 100.0,
            s.profit_factor,
            s.max_drawdown.to_f64(),
            s.trade_count,
            result.params
        );
    }
    println!("{}", "=".repeat(110));

    let dir = args.output.unwrap_or_else(|| config.data.output_dir.clone());
    std::fs::create_dir_all(&dir)?;
    let path = dir.join("optimization.csv");
    data::write_optimization_csv(&results, &path)?;
    println!("Saved {}", path.display());

    info!("Optimization completed successfully");

    Ok(())
}

async fn cancel_on_ctrl_c(cancel: Arc<AtomicBool>) {
    match tokio::signal::ctrl_c().await {
        Ok(()) => {
            warn!("Ctrl+C received - finishing running combinations");
            cancel.store(true, Ordering::Relaxed);
        }
        Err(err) => {
            error!("Failed to listen for shutdown signal: {}", err);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, TimeZone, Utc};
    use walkforward_backtester::Bar;

    fn temp_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("wfb_optimize_{}_{}", name, std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    fn sine_bars(n: usize) -> Vec<Bar> {
        let start = Utc.with_ymd_and_hms(2024, 2, 1, 0, 0, 0).unwrap();
        (0..n)
            .map(|i| {
                let c = 100.0 + 3.0 * (i as f64 / 5.0).sin();
                Bar::new(start + Duration::hours(i as i64), c, c + 0.4, c - 0.4, c, 10.0).unwrap()
            })
            .collect()
    }

    fn args(dir: &std::path::Path, sequential: bool) -> OptimizeArgs {
        OptimizeArgs {
            data: Some(dir.join("bars.csv")),
            grid: vec![
                "train_window=100".to_string(),
                "test_window=20".to_string(),
                "stop_loss=1,2".to_string(),
                "min_atr=0.1,0.3".to_string(),
            ],
            sort_by: "net_profit".to_string(),
            top: 3,
            sequential,
            output: Some(dir.join(if sequential { "seq" } else { "par" })),
            ..OptimizeArgs::default()
        }
    }

    #[test]
    fn test_sequential_and_parallel_write_every_combination() {
        let dir = temp_dir("modes");
        data::save_bars_csv(&sine_bars(220), dir.join("bars.csv")).unwrap();

        run(args(&dir, true)).unwrap();
        run(args(&dir, false)).unwrap();

        let sequential = std::fs::read_to_string(dir.join("seq/optimization.csv")).unwrap();
        let parallel = std::fs::read_to_string(dir.join("par/optimization.csv")).unwrap();
        // header plus four combinations
        assert_eq!(sequential.lines().count(), 5);
        assert!(sequential.lines().next().unwrap().contains("vwap_tol"));
        assert_eq!(sequential, parallel);

        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_unknown_sort_metric_is_rejected() {
        let dir = temp_dir("metric");
        let err = run(OptimizeArgs {
            sort_by: "sharpe".to_string(),
            ..args(&dir, true)
        })
        .unwrap_err();
        assert!(err.to_string().contains("Unknown sort metric"));
        std::fs::remove_dir_all(&dir).unwrap();
    }
}
