//! VWAP Strategy
//!
//! Trades price relative to the volume-weighted average price, either on
//! the side of the close or on trend pullbacks that tag VWAP.

mod config;
mod strategy;

pub use config::{VwapConfig, VwapMode};
pub use strategy::VwapStrategy;
