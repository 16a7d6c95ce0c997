//! VWAP Strategy Implementation
//!
//! ## Entry Logic (side mode)
//! 1. Close above VWAP (outside the dead band) -> BUY
//! 2. Close below VWAP (outside the dead band) -> SELL
//!
//! ## Entry Logic (pullback mode)
//! 1. Close above VWAP, fast EMA above slow EMA, the low within `vwap_tol`
//!    of VWAP, close above the previous close and at least
//!    `min_ema_distance_atr` ATRs from the fast EMA -> BUY
//! 2. Mirror image with the high tagging VWAP -> SELL
//!
//! VWAP undefined, ATR under the minimum, or any other input missing -> HOLD

use crate::strategies::{SignalContext, Strategy};
use crate::Signal;

use super::config::{VwapConfig, VwapMode};

#[derive(Debug, Clone, PartialEq)]
pub struct VwapStrategy {
    config: VwapConfig,
}

impl VwapStrategy {
    pub fn new(config: VwapConfig) -> Self {
        VwapStrategy { config }
    }

    fn volatility_ok(&self, ctx: &SignalContext<'_>) -> bool {
        match self.config.min_atr {
            None => true,
            Some(min_atr) => ctx.indicators.atr.is_some_and(|atr| atr >= min_atr),
        }
    }

    fn side_signal(&self, ctx: &SignalContext<'_>, vwap: f64) -> Signal {
        let band = vwap.abs() * self.config.band_pct / 100.0;
        let close = ctx.close();
        if close > vwap + band {
            Signal::Buy
        } else if close < vwap - band {
            Signal::Sell
        } else {
            Signal::Hold
        }
    }

    fn pullback_signal(&self, ctx: &SignalContext<'_>, vwap: f64) -> Signal {
        let ind = &ctx.indicators;
        let (Some(fast), Some(slow), Some(atr), Some(prev_close)) =
            (ind.ema_fast, ind.ema_slow, ind.atr, ind.prev_close)
        else {
            return Signal::Hold;
        };

        let bar = ctx.bar;
        let tolerance = vwap.abs() * self.config.vwap_tol;
        let extended = (bar.close - fast).abs() > self.config.min_ema_distance_atr * atr;

        if bar.close > vwap && fast > slow {
            let touch = (bar.low - vwap).abs() <= tolerance;
            if touch && bar.close > prev_close && extended {
                return Signal::Buy;
            }
        } else if bar.close < vwap && fast < slow {
            let touch = (bar.high - vwap).abs() <= tolerance;
            if touch && bar.close < prev_close && extended {
                return Signal::Sell;
            }
        }
        Signal::Hold
    }
}

impl Strategy for VwapStrategy {
    fn name(&self) -> &'static str {
        "vwap"
    }

    fn generate_signal(&self, ctx: &SignalContext<'_>) -> Signal {
        let Some(vwap) = ctx.indicators.vwap else {
            return Signal::Hold;
        };
        if !self.volatility_ok(ctx) {
            return Signal::Hold;
        }

        match self.config.mode {
            VwapMode::Side => self.side_signal(ctx, vwap),
            VwapMode::Pullback => self.pullback_signal(ctx, vwap),
        }
    }
}
