//! Market regime classification
//!
//! Labels the last bar of a causal window from its volatility (ATR or return
//! dispersion, compared against a quantile of its own history in the window),
//! the VWAP slope and the spread between a fast and a slow moving average.

use serde::{Deserialize, Serialize};
use statrs::statistics::{Data, OrderStatistics};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::error::BacktestError;
use crate::indicators::{atr, returns, rolling_mean, rolling_std, sma, vwap};
use crate::Bar;

/// Coarse market behaviour
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RegimeLabel {
    Trending,
    Ranging,
    Choppy,
    Volatile,
}

impl RegimeLabel {
    pub const ALL: [RegimeLabel; 4] = [
        RegimeLabel::Trending,
        RegimeLabel::Ranging,
        RegimeLabel::Choppy,
        RegimeLabel::Volatile,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            RegimeLabel::Trending => "trending",
            RegimeLabel::Ranging => "ranging",
            RegimeLabel::Choppy => "choppy",
            RegimeLabel::Volatile => "volatile",
        }
    }
}

impl fmt::Display for RegimeLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for RegimeLabel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        RegimeLabel::ALL
            .into_iter()
            .find(|label| label.as_str() == s.trim().to_lowercase())
            .ok_or_else(|| {
                format!(
                    "Unknown regime: '{}'. Available: trending, ranging, choppy, volatile",
                    s
                )
            })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum RegimeError {
    #[error("insufficient data for regime classification: need {required} bars, have {available}")]
    InsufficientData { required: usize, available: usize },
}

/// Volatility input of the classifier
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VolatilityMeasure {
    /// Rolling mean of ATR
    #[default]
    Atr,
    /// Rolling standard deviation of close-to-close returns
    Returns,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub volatility: VolatilityMeasure,
    pub atr_period: usize,
    /// Smoothing window of the volatility series
    pub vol_smoothing: usize,
    /// Quantile (0..=1) of the volatility history that counts as "high"
    pub vol_percentile: f64,
    /// VWAP slope is measured over this many bars
    pub slope_window: usize,
    /// Minimum absolute VWAP change over `slope_window` for a trend (price units)
    pub slope_threshold: f64,
    pub ma_fast: usize,
    pub ma_slow: usize,
    /// Fast/slow MA spread, in ATRs, under which a quiet market is ranging
    pub range_band: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        RegimeConfig {
            volatility: VolatilityMeasure::Atr,
            atr_period: 14,
            vol_smoothing: 60,
            vol_percentile: 0.7,
            slope_window: 10,
            slope_threshold: 2.0,
            ma_fast: 10,
            ma_slow: 50,
            range_band: 0.5,
        }
    }
}

impl RegimeConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        let periods = [
            ("regime.atr_period", self.atr_period),
            ("regime.slope_window", self.slope_window),
            ("regime.ma_fast", self.ma_fast),
            ("regime.ma_slow", self.ma_slow),
        ];
        for (field, value) in periods {
            if value == 0 {
                return Err(BacktestError::config(field, "must be > 0"));
            }
        }
        if self.vol_smoothing < 2 {
            return Err(BacktestError::config("regime.vol_smoothing", "must be >= 2"));
        }
        if !(0.0..=1.0).contains(&self.vol_percentile) {
            return Err(BacktestError::config(
                "regime.vol_percentile",
                format!("must be within [0, 1], got {}", self.vol_percentile),
            ));
        }
        if !self.slope_threshold.is_finite() || self.slope_threshold < 0.0 {
            return Err(BacktestError::config("regime.slope_threshold", "must be >= 0"));
        }
        if !self.range_band.is_finite() || self.range_band < 0.0 {
            return Err(BacktestError::config("regime.range_band", "must be >= 0"));
        }
        Ok(())
    }
}

/// Inputs that produced a label, for auditing
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct RegimeReading {
    pub label: RegimeLabel,
    pub volatility: f64,
    pub volatility_threshold: f64,
    pub slope: f64,
    pub ma_spread: f64,
    pub atr: f64,
}

#[derive(Debug, Clone, Default)]
pub struct RegimeClassifier {
    config: RegimeConfig,
}

impl RegimeClassifier {
    pub fn new(config: RegimeConfig) -> Self {
        RegimeClassifier { config }
    }

    pub fn config(&self) -> &RegimeConfig {
        &self.config
    }

    /// Shortest window for which every input is defined at its last bar
    pub fn required_bars(&self) -> usize {
        let c = &self.config;
        let volatility = match c.volatility {
            VolatilityMeasure::Atr => c.atr_period + c.vol_smoothing,
            VolatilityMeasure::Returns => c.vol_smoothing + 1,
        };
        [
            volatility,
            c.atr_period + 1,
            c.slope_window + 1,
            c.ma_fast,
            c.ma_slow,
        ]
        .into_iter()
        .max()
        .unwrap_or(1)
    }

    /// Label the last bar of `window`; only bars inside the window are read
    pub fn classify(&self, window: &[Bar]) -> Result<RegimeLabel, RegimeError> {
        self.read(window).map(|reading| reading.label)
    }

    /// Like [`classify`](Self::classify) but also returns the inputs
    pub fn read(&self, window: &[Bar]) -> Result<RegimeReading, RegimeError> {
        let required = self.required_bars();
        let insufficient = || RegimeError::InsufficientData {
            required,
            available: window.len(),
        };
        if window.len() < required {
            return Err(insufficient());
        }

        let c = &self.config;
        let high: Vec<f64> = window.iter().map(|b| b.high).collect();
        let low: Vec<f64> = window.iter().map(|b| b.low).collect();
        let close: Vec<f64> = window.iter().map(|b| b.close).collect();
        let volume: Vec<f64> = window.iter().map(|b| b.volume).collect();
        let last = window.len() - 1;

        let atr_values = atr(&high, &low, &close, c.atr_period);
        let vol_series = match c.volatility {
            VolatilityMeasure::Atr => rolling_mean(&atr_values, c.vol_smoothing),
            VolatilityMeasure::Returns => rolling_std(&returns(&close), c.vol_smoothing),
        };

        let volatility = vol_series[last].ok_or_else(insufficient)?;
        let current_atr = atr_values[last].ok_or_else(insufficient)?;
        let history: Vec<f64> = vol_series.iter().flatten().copied().collect();
        let volatility_threshold = Data::new(history).quantile(c.vol_percentile);

        // An undefined VWAP (zero volume so far) reads as no slope
        let vwap_values = vwap(&high, &low, &close, &volume);
        let slope = match (vwap_values[last], vwap_values[last - c.slope_window]) {
            (Some(now), Some(then)) => now - then,
            _ => 0.0,
        };

        let ma_fast = sma(&close, c.ma_fast)[last].ok_or_else(insufficient)?;
        let ma_slow = sma(&close, c.ma_slow)[last].ok_or_else(insufficient)?;
        let ma_spread = ma_fast - ma_slow;

        let high_volatility = volatility > volatility_threshold;
        let strong_slope = slope.abs() > c.slope_threshold;

        let label = if high_volatility && strong_slope {
            RegimeLabel::Trending
        } else if high_volatility {
            RegimeLabel::Volatile
        } else if ma_spread.abs() <= c.range_band * current_atr {
            RegimeLabel::Ranging
        } else {
            RegimeLabel::Choppy
        };

        Ok(RegimeReading {
            label,
            volatility,
            volatility_threshold,
            slope,
            ma_spread,
            atr: current_atr,
        })
    }

    /// Label every bar of a series from the expanding window ending at it.
    ///
    /// Bars before the warm-up is satisfied are `None`.
    pub fn classify_series(&self, bars: &[Bar]) -> Vec<Option<RegimeLabel>> {
        (0..bars.len())
            .map(|i| self.classify(&bars[..=i]).ok())
            .collect()
    }
}
