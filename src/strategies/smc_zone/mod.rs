//! SMC Zone Strategy
//!
//! Fades into fair value gap zones: buys on a return to demand, sells on a
//! return to supply.

mod config;
mod strategy;

pub use config::SmcZoneConfig;
pub use strategy::SmcZoneStrategy;
