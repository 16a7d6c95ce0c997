//! Configuration management
//!
//! Loads the JSON configuration file tying the backtest, regime classifier,
//! strategies, routing table, data source and optimizer grid together.
//! Every section is optional and falls back to its defaults.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::backtest::{BacktestConfig, Backtester};
use crate::optimizer::{Combination, GridConfig, Optimizer};
use crate::regime::{RegimeClassifier, RegimeConfig};
use crate::router::{RoutingConfig, StrategyRouter};
use crate::strategies::StrategiesConfig;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub backtest: BacktestConfig,
    pub regime: RegimeConfig,
    pub strategies: StrategiesConfig,
    pub routing: RoutingConfig,
    pub data: DataConfig,
    /// Grid search axes for the `optimize` command
    #[serde(skip_serializing_if = "Option::is_none")]
    pub grid: Option<GridConfig>,
}

impl Config {
    /// Load configuration from JSON file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;
        let config: Config =
            serde_json::from_str(&contents).context("Failed to parse config JSON")?;
        config.validate()?;
        Ok(config)
    }

    /// Validate every section
    pub fn validate(&self) -> Result<()> {
        self.backtest.validate().context("Invalid backtest section")?;
        self.regime.validate().context("Invalid regime section")?;
        self.strategies.validate().context("Invalid strategies section")?;
        Ok(())
    }

    pub fn router(&self) -> Result<StrategyRouter> {
        StrategyRouter::from_config(&self.routing, &self.strategies)
            .context("Failed to build strategy router")
    }

    pub fn classifier(&self) -> RegimeClassifier {
        RegimeClassifier::new(self.regime.clone())
    }

    pub fn backtester(&self) -> Result<Backtester> {
        Ok(Backtester::new(self.backtest.clone(), self.classifier(), self.router()?))
    }

    /// Optimizer over this routing table; strategy parameters come with
    /// each combination
    pub fn optimizer(&self) -> Optimizer {
        Optimizer::new(self.classifier(), self.routing.clone())
    }

    /// Grid combinations around the configured backtest and strategies
    pub fn combinations(&self, grid: &GridConfig) -> Vec<Combination> {
        grid.combinations(&self.backtest, &self.strategies)
    }
}

/// Layout of the input CSV
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CsvFormat {
    /// `datetime,open,high,low,close,volume` with a header row
    #[default]
    Generic,
    /// MetaTrader 5 export: tab separated, `<DATE> <TIME> <OPEN> ... <TICKVOL> <VOL>`
    Mt5,
}

/// Data source and output locations
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DataConfig {
    pub path: Option<PathBuf>,
    pub format: CsvFormat,
    pub output_dir: PathBuf,
}

impl Default for DataConfig {
    fn default() -> Self {
        DataConfig {
            path: None,
            format: CsvFormat::Generic,
            output_dir: PathBuf::from("results"),
        }
    }
}
