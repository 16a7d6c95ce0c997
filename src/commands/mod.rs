pub mod backtest;
pub mod optimize;

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};
use tracing::info;
use walkforward_backtester::config::CsvFormat;
use walkforward_backtester::{data, Bar, Config};

/// Load the config file, or defaults when no file is given
pub fn load_config(path: Option<&Path>) -> Result<Config> {
    match path {
        Some(path) => {
            let config = Config::from_file(path)?;
            info!("Loaded configuration from: {}", path.display());
            Ok(config)
        }
        None => {
            info!("No configuration file given, using defaults");
            Ok(Config::default())
        }
    }
}

/// Load bars from the CLI path or the config's data section
pub fn load_data(config: &Config, path: Option<PathBuf>, format: Option<CsvFormat>) -> Result<Vec<Bar>> {
    let path = path
        .or_else(|| config.data.path.clone())
        .context("No data file given: pass --data or set data.path in the config")?;
    data::load_bars(&path, format.unwrap_or(config.data.format))
}
