//! Momentum Strategy
//!
//! Fast/slow EMA crossover.

mod config;
mod strategy;

pub use config::{MomentumConfig, MomentumMode};
pub use strategy::MomentumStrategy;
