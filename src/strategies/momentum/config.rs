//! Momentum Strategy Configuration
//!
//! EMA periods are shared with the other strategies and live in the
//! backtest's indicator settings.

use serde::{Deserialize, Serialize};

/// How the EMA pair is turned into a signal
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MomentumMode {
    /// Signal only on the bar where fast crosses slow
    #[default]
    Crossover,
    /// Signal on every bar from which side of slow the fast EMA is on
    Level,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MomentumConfig {
    pub mode: MomentumMode,
}
