//! Core data types shared by the indicator, strategy and simulation layers

use chrono::{DateTime, Utc};
use rust_decimal::prelude::ToPrimitive;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::{Add, AddAssign, Mul, Neg, Sub};
use thiserror::Error;

/// Validation errors for a single bar
#[derive(Debug, Clone, PartialEq, Error)]
pub enum BarValidationError {
    #[error("prices must be finite: open={open}, high={high}, low={low}, close={close}")]
    NonFinitePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("prices must be positive: open={open}, high={high}, low={low}, close={close}")]
    NonPositivePrice {
        open: f64,
        high: f64,
        low: f64,
        close: f64,
    },

    #[error("high ({high}) must be >= low ({low})")]
    HighLessThanLow { high: f64, low: f64 },

    #[error("open ({open}) must be between low ({low}) and high ({high})")]
    OpenOutOfRange { open: f64, low: f64, high: f64 },

    #[error("close ({close}) must be between low ({low}) and high ({high})")]
    CloseOutOfRange { close: f64, low: f64, high: f64 },

    #[error("volume ({0}) must be a finite value >= 0")]
    InvalidVolume(f64),
}

/// One OHLCV sample
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    /// Traded volume, or a tick-count proxy when the source has none
    pub volume: f64,
}

impl Bar {
    /// Create a bar, rejecting any OHLC invariant violation
    pub fn new(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Result<Self, BarValidationError> {
        let bar = Self::new_unchecked(timestamp, open, high, low, close, volume);
        bar.validate()?;
        Ok(bar)
    }

    /// Create a bar without validation (the backtester validates the whole series)
    pub fn new_unchecked(
        timestamp: DateTime<Utc>,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
            volume,
        }
    }

    /// Check `low <= min(open, close) <= max(open, close) <= high` plus sign rules
    pub fn validate(&self) -> Result<(), BarValidationError> {
        let prices = [self.open, self.high, self.low, self.close];
        if prices.iter().any(|p| !p.is_finite()) {
            return Err(BarValidationError::NonFinitePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if prices.iter().any(|&p| p <= 0.0) {
            return Err(BarValidationError::NonPositivePrice {
                open: self.open,
                high: self.high,
                low: self.low,
                close: self.close,
            });
        }

        if self.high < self.low {
            return Err(BarValidationError::HighLessThanLow {
                high: self.high,
                low: self.low,
            });
        }

        if self.open < self.low || self.open > self.high {
            return Err(BarValidationError::OpenOutOfRange {
                open: self.open,
                low: self.low,
                high: self.high,
            });
        }

        if self.close < self.low || self.close > self.high {
            return Err(BarValidationError::CloseOutOfRange {
                close: self.close,
                low: self.low,
                high: self.high,
            });
        }

        if !self.volume.is_finite() || self.volume < 0.0 {
            return Err(BarValidationError::InvalidVolume(self.volume));
        }

        Ok(())
    }

    /// (high + low + close) / 3
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }
}

/// Discrete action emitted by a strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Signal {
    Buy,
    Sell,
    Hold,
}

impl Signal {
    /// Position side requested by this signal, `None` for HOLD
    pub fn side(self) -> Option<Side> {
        match self {
            Signal::Buy => Some(Side::Long),
            Signal::Sell => Some(Side::Short),
            Signal::Hold => None,
        }
    }
}

impl fmt::Display for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Signal::Buy => write!(f, "BUY"),
            Signal::Sell => write!(f, "SELL"),
            Signal::Hold => write!(f, "HOLD"),
        }
    }
}

/// Position direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Side {
    Long,
    Short,
}

impl Side {
    /// +1 for long, -1 for short
    pub fn sign(self) -> f64 {
        match self {
            Side::Long => 1.0,
            Side::Short => -1.0,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Long => write!(f, "long"),
            Side::Short => write!(f, "short"),
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ExitReason {
    TakeProfit,
    StopLoss,
    Timeout,
    Reversal,
    EndOfData,
}

impl ExitReason {
    pub const ALL: [ExitReason; 5] = [
        ExitReason::TakeProfit,
        ExitReason::StopLoss,
        ExitReason::Timeout,
        ExitReason::Reversal,
        ExitReason::EndOfData,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ExitReason::TakeProfit => "take-profit",
            ExitReason::StopLoss => "stop-loss",
            ExitReason::Timeout => "timeout",
            ExitReason::Reversal => "reversal",
            ExitReason::EndOfData => "end-of-data",
        }
    }
}

impl fmt::Display for ExitReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The single open position of a simulated account.
///
/// Never mutated after opening; a reversal replaces it with a new one.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub side: Side,
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    /// Index of the entry bar in the input series
    pub entry_index: usize,
    pub stop_price: f64,
    pub target_price: f64,
    pub size: f64,
}

impl Position {
    /// Open a position with stop and target placed `stop_distance` /
    /// `target_distance` away from the entry on the adverse / favourable side.
    pub fn open(
        side: Side,
        entry_price: f64,
        entry_time: DateTime<Utc>,
        entry_index: usize,
        stop_distance: f64,
        target_distance: f64,
        size: f64,
    ) -> Self {
        let sign = side.sign();
        Self {
            side,
            entry_price,
            entry_time,
            entry_index,
            stop_price: entry_price - sign * stop_distance,
            target_price: entry_price + sign * target_distance,
            size,
        }
    }

    /// Whether the bar's range reached the stop level
    pub fn stop_touched(&self, bar: &Bar) -> bool {
        match self.side {
            Side::Long => bar.low <= self.stop_price,
            Side::Short => bar.high >= self.stop_price,
        }
    }

    /// Whether the bar's range reached the target level
    pub fn target_touched(&self, bar: &Bar) -> bool {
        match self.side {
            Side::Long => bar.high >= self.target_price,
            Side::Short => bar.low <= self.target_price,
        }
    }

    /// Realised P&L: `(exit - entry) * sign * size - transaction_cost`
    pub fn realised_pnl(&self, exit_price: f64, transaction_cost: Money) -> Money {
        let move_per_unit = Money::from_f64(exit_price) - Money::from_f64(self.entry_price);
        let signed = match self.side {
            Side::Long => move_per_unit,
            Side::Short => -move_per_unit,
        };
        signed * Money::from_f64(self.size) - transaction_cost
    }

    /// Close the position, producing the immutable trade record
    pub fn close(
        &self,
        exit_price: f64,
        exit_time: DateTime<Utc>,
        exit_index: usize,
        outcome: ExitReason,
        transaction_cost: Money,
    ) -> Trade {
        Trade {
            side: self.side,
            entry_time: self.entry_time,
            entry_price: self.entry_price,
            exit_time,
            exit_price,
            size: self.size,
            outcome,
            pnl: self.realised_pnl(exit_price, transaction_cost),
            bars_held: exit_index.saturating_sub(self.entry_index),
        }
    }
}

/// Closed trade record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub side: Side,
    pub entry_time: DateTime<Utc>,
    pub entry_price: f64,
    pub exit_time: DateTime<Utc>,
    pub exit_price: f64,
    pub size: f64,
    pub outcome: ExitReason,
    /// Net of the per-trade transaction cost
    pub pnl: Money,
    pub bars_held: usize,
}

impl Trade {
    pub fn is_win(&self) -> bool {
        self.pnl.is_positive()
    }
}

/// One (timestamp, running balance) pair of the realised equity curve
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityPoint {
    pub timestamp: DateTime<Utc>,
    pub balance: Money,
}

// ============================================================================
// Money Type - Precise Decimal Arithmetic for Monetary Values
// ============================================================================

/// Decimal money amount.
///
/// Realised P&L is accumulated in `Money` so that the final balance equals
/// initial equity plus the sum of trade P&L exactly, independent of the
/// order the amounts are added in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Money(#[serde(with = "rust_decimal::serde::str")] Decimal);

impl Money {
    pub const ZERO: Money = Money(Decimal::ZERO);

    /// Convert from f64; NaN and infinities map to zero
    pub fn from_f64(value: f64) -> Self {
        if !value.is_finite() {
            return Money::ZERO;
        }
        Money(
            Decimal::try_from(value)
                .or_else(|_| Decimal::from_f64_retain(value).ok_or(()))
                .unwrap_or(Decimal::ZERO),
        )
    }

    pub fn to_f64(self) -> f64 {
        self.0.to_f64().unwrap_or(0.0)
    }

    pub fn abs(self) -> Self {
        Money(self.0.abs())
    }

    pub fn is_zero(self) -> bool {
        self.0.is_zero()
    }

    pub fn is_positive(self) -> bool {
        self.0.is_sign_positive() && !self.0.is_zero()
    }

    pub fn is_negative(self) -> bool {
        self.0.is_sign_negative() && !self.0.is_zero()
    }

    pub fn inner(self) -> Decimal {
        self.0
    }
}

impl From<Decimal> for Money {
    fn from(value: Decimal) -> Self {
        Money(value)
    }
}

impl fmt::Display for Money {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Add for Money {
    type Output = Self;
    fn add(self, rhs: Self) -> Self {
        Money(self.0 + rhs.0)
    }
}

impl AddAssign for Money {
    fn add_assign(&mut self, rhs: Self) {
        self.0 += rhs.0;
    }
}

impl Sub for Money {
    type Output = Self;
    fn sub(self, rhs: Self) -> Self {
        Money(self.0 - rhs.0)
    }
}

impl Mul for Money {
    type Output = Self;
    fn mul(self, rhs: Self) -> Self {
        Money(self.0 * rhs.0)
    }
}

impl Neg for Money {
    type Output = Self;
    fn neg(self) -> Self {
        Money(-self.0)
    }
}

impl std::iter::Sum for Money {
    fn sum<I: Iterator<Item = Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + x)
    }
}

impl<'a> std::iter::Sum<&'a Money> for Money {
    fn sum<I: Iterator<Item = &'a Self>>(iter: I) -> Self {
        iter.fold(Money::ZERO, |acc, x| acc + *x)
    }
}
