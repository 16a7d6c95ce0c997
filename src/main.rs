//! Walk-forward backtester - main entry point
//!
//! This binary provides two subcommands:
//! - backtest: Run one walk-forward backtest and export its logs
//! - optimize: Run a parallel parameter grid search

use anyhow::Result;
use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};
use walkforward_backtester::config::CsvFormat;

mod commands;

use commands::backtest::BacktestArgs;
use commands::optimize::OptimizeArgs;

#[derive(Parser, Debug)]
#[command(name = "walkforward-backtester")]
#[command(about = "Walk-forward backtesting with regime-routed strategies", long_about = None)]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Format {
    Generic,
    Mt5,
}

impl From<Format> for CsvFormat {
    fn from(format: Format) -> Self {
        match format {
            Format::Generic => CsvFormat::Generic,
            Format::Mt5 => CsvFormat::Mt5,
        }
    }
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run a walk-forward backtest
    Backtest {
        /// Path to configuration file (defaults apply when omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Price CSV (overrides data.path)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// CSV layout (overrides data.format)
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// Route every regime to this strategy (vwap, momentum, smc_zone)
        #[arg(short, long)]
        strategy: Option<String>,

        /// Initial equity
        #[arg(long)]
        capital: Option<f64>,

        /// Train window in bars
        #[arg(long)]
        train: Option<usize>,

        /// Test window in bars
        #[arg(long)]
        test: Option<usize>,

        /// Stop-loss distance
        #[arg(long)]
        stop_loss: Option<f64>,

        /// Take-profit distance
        #[arg(long)]
        take_profit: Option<f64>,

        /// Transaction cost per trade
        #[arg(long)]
        cost: Option<f64>,

        /// Output directory (overrides data.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Print the summary only
        #[arg(long)]
        no_export: bool,
    },

    /// Optimize backtest parameters over a grid
    Optimize {
        /// Path to base configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Price CSV (overrides data.path)
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// CSV layout (overrides data.format)
        #[arg(long, value_enum)]
        format: Option<Format>,

        /// Grid axis override, repeatable. E.g. --grid stop_loss=1,2,3
        #[arg(short, long)]
        grid: Vec<String>,

        /// Sort results by metric (expectancy, net_profit, win_rate, profit_factor)
        #[arg(long, default_value = "expectancy")]
        sort_by: String,

        /// Number of top results to show
        #[arg(short, long, default_value = "10")]
        top: usize,

        /// Run sequentially instead of parallel
        #[arg(long)]
        sequential: bool,

        /// Output directory (overrides data.output_dir)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },
}

fn setup_logging(verbose: bool, command_name: &str, file_only: bool) -> Result<()> {
    std::fs::create_dir_all("logs")?;

    // {command}_{date}.log
    let log_filename = format!(
        "{}_{}.log",
        command_name,
        chrono::Local::now().format("%Y-%m-%d_%H-%M-%S")
    );
    let log_path = PathBuf::from("logs").join(&log_filename);

    let level = if verbose { "debug" } else { "info" };
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let file_appender = tracing_appender::rolling::never("logs", &log_filename);

    if file_only {
        // Optimizer: keep the console clean for the progress bar
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(file_layer)
            .init();
    } else {
        let console_layer = tracing_subscriber::fmt::layer()
            .with_target(true)
            .with_thread_ids(false)
            .with_thread_names(false)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(true);

        // Same format without ANSI colors
        let file_layer = tracing_subscriber::fmt::layer()
            .with_writer(file_appender)
            .with_target(true)
            .with_line_number(true)
            .with_file(true)
            .with_ansi(false);

        tracing_subscriber::registry()
            .with(env_filter)
            .with(console_layer)
            .with(file_layer)
            .init();

        info!("Logging initialized");
        info!("Log file: {}", log_path.display());
    }

    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    let (command_name, file_only) = match &cli.command {
        Commands::Backtest { .. } => ("backtest", false),
        Commands::Optimize { .. } => ("optimize", true),
    };
    setup_logging(cli.verbose, command_name, file_only)?;

    match cli.command {
        Commands::Backtest {
            config,
            data,
            format,
            strategy,
            capital,
            train,
            test,
            stop_loss,
            take_profit,
            cost,
            output,
            no_export,
        } => commands::backtest::run(BacktestArgs {
            config,
            data,
            format: format.map(CsvFormat::from),
            strategy,
            capital,
            train,
            test,
            stop_loss,
            take_profit,
            cost,
            output,
            no_export,
        }),

        Commands::Optimize {
            config,
            data,
            format,
            grid,
            sort_by,
            top,
            sequential,
            output,
        } => commands::optimize::run(OptimizeArgs {
            config,
            data,
            format: format.map(CsvFormat::from),
            grid,
            sort_by,
            top,
            sequential,
            output,
        }),
    }
}
