//! Trading Strategies Module
//!
//! A closed set of stateless strategies behind one trait. Each strategy maps
//! the indicator snapshot of the current bar to BUY, SELL or HOLD and holds
//! whenever an input it needs is undefined.

pub mod momentum;
pub mod smc_zone;
pub mod vwap;

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::BacktestError;
use crate::indicators::IndicatorSnapshot;
use crate::{Bar, Signal};

pub use momentum::{MomentumConfig, MomentumMode, MomentumStrategy};
pub use smc_zone::{SmcZoneConfig, SmcZoneStrategy};
pub use vwap::{VwapConfig, VwapMode, VwapStrategy};

// =============================================================================
// Strategy Trait
// =============================================================================

/// Everything a strategy may look at for one bar
#[derive(Debug, Clone, Copy)]
pub struct SignalContext<'a> {
    pub bar: &'a Bar,
    /// Index of `bar` in the input series
    pub index: usize,
    pub indicators: IndicatorSnapshot,
}

impl<'a> SignalContext<'a> {
    pub fn new(bar: &'a Bar, index: usize, indicators: IndicatorSnapshot) -> Self {
        SignalContext {
            bar,
            index,
            indicators,
        }
    }

    pub fn close(&self) -> f64 {
        self.bar.close
    }
}

/// Signal generation contract shared by all strategies.
///
/// Implementations keep no state between calls.
pub trait Strategy: Send + Sync {
    /// Strategy identifier, as used in routing tables
    fn name(&self) -> &'static str;

    fn generate_signal(&self, ctx: &SignalContext<'_>) -> Signal;
}

// =============================================================================
// Strategy variants
// =============================================================================

/// Name of a known strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyName {
    Vwap,
    Momentum,
    SmcZone,
}

impl StrategyName {
    pub const ALL: [StrategyName; 3] = [
        StrategyName::Vwap,
        StrategyName::Momentum,
        StrategyName::SmcZone,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            StrategyName::Vwap => "vwap",
            StrategyName::Momentum => "momentum",
            StrategyName::SmcZone => "smc_zone",
        }
    }
}

impl fmt::Display for StrategyName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StrategyName {
    type Err = BacktestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_lowercase();
        StrategyName::ALL
            .into_iter()
            .find(|name| name.as_str() == wanted)
            .ok_or_else(|| {
                BacktestError::config(
                    "strategy",
                    format!(
                        "unknown strategy '{}', available: {}",
                        s,
                        available_strategies().join(", ")
                    ),
                )
            })
    }
}

/// Get list of available strategy names
pub fn available_strategies() -> Vec<&'static str> {
    StrategyName::ALL.iter().map(|n| n.as_str()).collect()
}

/// Parameters of every strategy variant
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StrategiesConfig {
    pub vwap: VwapConfig,
    pub momentum: MomentumConfig,
    pub smc_zone: SmcZoneConfig,
}

impl StrategiesConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        self.vwap.validate()
    }
}

/// A configured strategy
#[derive(Debug, Clone, PartialEq)]
pub enum StrategyKind {
    Vwap(VwapStrategy),
    Momentum(MomentumStrategy),
    SmcZone(SmcZoneStrategy),
}

impl StrategyKind {
    /// Build the named variant from its parameters
    pub fn create(name: StrategyName, config: &StrategiesConfig) -> Self {
        match name {
            StrategyName::Vwap => StrategyKind::Vwap(VwapStrategy::new(config.vwap.clone())),
            StrategyName::Momentum => {
                StrategyKind::Momentum(MomentumStrategy::new(config.momentum.clone()))
            }
            StrategyName::SmcZone => {
                StrategyKind::SmcZone(SmcZoneStrategy::new(config.smc_zone.clone()))
            }
        }
    }

    pub fn kind(&self) -> StrategyName {
        match self {
            StrategyKind::Vwap(_) => StrategyName::Vwap,
            StrategyKind::Momentum(_) => StrategyName::Momentum,
            StrategyKind::SmcZone(_) => StrategyName::SmcZone,
        }
    }
}

impl Strategy for StrategyKind {
    fn name(&self) -> &'static str {
        self.kind().as_str()
    }

    fn generate_signal(&self, ctx: &SignalContext<'_>) -> Signal {
        match self {
            StrategyKind::Vwap(s) => s.generate_signal(ctx),
            StrategyKind::Momentum(s) => s.generate_signal(ctx),
            StrategyKind::SmcZone(s) => s.generate_signal(ctx),
        }
    }
}
