//! Momentum Strategy Implementation
//!
//! ## Entry Logic
//! - Crossover mode: fast EMA crosses above slow -> BUY, below -> SELL
//! - Level mode: fast above slow -> BUY, below -> SELL
//! - Any EMA value (current or previous, as the mode needs) undefined -> HOLD

use crate::strategies::{SignalContext, Strategy};
use crate::Signal;

use super::config::{MomentumConfig, MomentumMode};

#[derive(Debug, Clone, PartialEq)]
pub struct MomentumStrategy {
    config: MomentumConfig,
}

impl MomentumStrategy {
    pub fn new(config: MomentumConfig) -> Self {
        MomentumStrategy { config }
    }
}

impl Strategy for MomentumStrategy {
    fn name(&self) -> &'static str {
        "momentum"
    }

    fn generate_signal(&self, ctx: &SignalContext<'_>) -> Signal {
        let ind = &ctx.indicators;
        let (Some(fast), Some(slow)) = (ind.ema_fast, ind.ema_slow) else {
            return Signal::Hold;
        };

        match self.config.mode {
            MomentumMode::Level => {
                if fast > slow {
                    Signal::Buy
                } else if fast < slow {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
            MomentumMode::Crossover => {
                let (Some(prev_fast), Some(prev_slow)) = (ind.prev_ema_fast, ind.prev_ema_slow)
                else {
                    return Signal::Hold;
                };
                if prev_fast <= prev_slow && fast > slow {
                    Signal::Buy
                } else if prev_fast >= prev_slow && fast < slow {
                    Signal::Sell
                } else {
                    Signal::Hold
                }
            }
        }
    }
}
