//! VWAP Strategy Configuration

use serde::{Deserialize, Serialize};

use crate::error::BacktestError;

/// How the VWAP strategy enters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VwapMode {
    /// Trade the side of the close relative to VWAP
    #[default]
    Side,
    /// Trend pullback: the wick tags VWAP and the bar closes away from it
    Pullback,
}

/// VWAP Strategy Configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct VwapConfig {
    pub mode: VwapMode,
    /// Dead band around VWAP in percent of VWAP; no signal inside it (default: 0.0)
    pub band_pct: f64,
    /// Minimum ATR to trade, in price units (default: none)
    pub min_atr: Option<f64>,
    /// Pullback only: max wick distance from VWAP as a fraction of VWAP (default: 0.0008)
    pub vwap_tol: f64,
    /// Pullback only: min |close - fast EMA| in ATR multiples (default: 0.2)
    pub min_ema_distance_atr: f64,
}

impl Default for VwapConfig {
    fn default() -> Self {
        VwapConfig {
            mode: VwapMode::Side,
            band_pct: 0.0,
            min_atr: None,
            vwap_tol: 0.0008,
            min_ema_distance_atr: 0.2,
        }
    }
}

impl VwapConfig {
    pub fn validate(&self) -> Result<(), BacktestError> {
        if !self.band_pct.is_finite() || self.band_pct < 0.0 {
            return Err(BacktestError::config("strategies.vwap.band_pct", "must be >= 0"));
        }
        if let Some(min_atr) = self.min_atr {
            if !min_atr.is_finite() || min_atr < 0.0 {
                return Err(BacktestError::config("strategies.vwap.min_atr", "must be >= 0"));
            }
        }
        if !self.vwap_tol.is_finite() || self.vwap_tol < 0.0 {
            return Err(BacktestError::config("strategies.vwap.vwap_tol", "must be >= 0"));
        }
        if !self.min_ema_distance_atr.is_finite() || self.min_ema_distance_atr < 0.0 {
            return Err(BacktestError::config(
                "strategies.vwap.min_ema_distance_atr",
                "must be >= 0",
            ));
        }
        Ok(())
    }
}
