//! Technical indicators
//!
//! Pure functions over ordered bar columns. Every series output is aligned
//! with its input and uses `None` for points whose lookback is not yet
//! satisfied, so a warm-up value can never be mistaken for a real reading.
//!
//! EMA convention: seeded with the simple average of the first `period`
//! values (strict SMA seed), smoothing factor `2 / (period + 1)`.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use statrs::statistics::Statistics;
use ta::indicators::SimpleMovingAverage;
use ta::Next;

use crate::Bar;

// =============================================================================
// Moving Averages
// =============================================================================

/// Simple moving average
pub fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    if values.is_empty() || period == 0 {
        return vec![None; values.len()];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; values.len()],
    };

    values
        .iter()
        .enumerate()
        .map(|(i, &value)| {
            let avg = indicator.next(value);
            (i + 1 >= period).then_some(avg)
        })
        .collect()
}

/// Exponential moving average, SMA-seeded
pub fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = Vec::with_capacity(values.len());
    if period == 0 {
        result.resize(values.len(), None);
        return result;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut current: Option<f64> = None;

    for (i, &value) in values.iter().enumerate() {
        if i + 1 < period {
            result.push(None);
            continue;
        }
        let next = match current {
            None => values[i + 1 - period..=i].iter().sum::<f64>() / period as f64,
            // prev + k * (x - prev) keeps a constant series exactly constant
            Some(prev) => prev + multiplier * (value - prev),
        };
        current = Some(next);
        result.push(current);
    }

    result
}

// =============================================================================
// Volatility
// =============================================================================

/// True range per bar; undefined for the first bar (no previous close)
pub fn true_range(high: &[f64], low: &[f64], close: &[f64]) -> Vec<Option<f64>> {
    (0..high.len())
        .map(|i| {
            if i == 0 {
                return None;
            }
            let hl = high[i] - low[i];
            let hc = (high[i] - close[i - 1]).abs();
            let lc = (low[i] - close[i - 1]).abs();
            Some(hl.max(hc).max(lc))
        })
        .collect()
}

/// Average true range as the simple rolling mean of true range.
///
/// First defined at index `period` (true range starts at index 1).
pub fn atr(high: &[f64], low: &[f64], close: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = high.len();
    if period == 0 || low.len() != n || close.len() != n {
        return vec![None; n];
    }

    let mut indicator = match SimpleMovingAverage::new(period) {
        Ok(i) => i,
        Err(_) => return vec![None; n],
    };

    true_range(high, low, close)
        .into_iter()
        .enumerate()
        .map(|(i, tr)| {
            let avg = indicator.next(tr?);
            (i >= period).then_some(avg)
        })
        .collect()
}

/// Simple close-to-close returns; undefined for the first bar
pub fn returns(close: &[f64]) -> Vec<Option<f64>> {
    (0..close.len())
        .map(|i| {
            if i == 0 || close[i - 1] == 0.0 {
                None
            } else {
                Some(close[i] / close[i - 1] - 1.0)
            }
        })
        .collect()
}

/// Rolling mean over a partially defined series; a window containing any
/// undefined point is undefined.
pub fn rolling_mean(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    rolling(values, period, |window| window.iter().mean())
}

/// Rolling sample standard deviation over a partially defined series
pub fn rolling_std(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    if period < 2 {
        return vec![None; values.len()];
    }
    rolling(values, period, |window| window.iter().std_dev())
}

fn rolling<F>(values: &[Option<f64>], period: usize, reduce: F) -> Vec<Option<f64>>
where
    F: Fn(&[f64]) -> f64,
{
    if period == 0 {
        return vec![None; values.len()];
    }

    let mut buffer = Vec::with_capacity(period);
    (0..values.len())
        .map(|i| {
            if i + 1 < period {
                return None;
            }
            buffer.clear();
            for v in &values[i + 1 - period..=i] {
                buffer.push((*v)?);
            }
            let out = reduce(&buffer);
            out.is_finite().then_some(out)
        })
        .collect()
}

// =============================================================================
// Volume
// =============================================================================

/// Cumulative VWAP from the start of the series
pub fn vwap(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Vec<Option<f64>> {
    let mut anchors = vec![false; high.len()];
    if let Some(first) = anchors.first_mut() {
        *first = true;
    }
    vwap_anchored(high, low, close, volume, &anchors)
}

/// Cumulative VWAP that restarts wherever `anchors[i]` is true.
///
/// Uses the typical price `(high + low + close) / 3`. While cumulative
/// volume is zero the value is undefined.
pub fn vwap_anchored(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    anchors: &[bool],
) -> Vec<Option<f64>> {
    let mut cum_pv = 0.0;
    let mut cum_vol = 0.0;

    (0..high.len())
        .map(|i| {
            if anchors.get(i).copied().unwrap_or(false) {
                cum_pv = 0.0;
                cum_vol = 0.0;
            }
            let typical = (high[i] + low[i] + close[i]) / 3.0;
            cum_pv += typical * volume[i];
            cum_vol += volume[i];
            (cum_vol > 0.0).then(|| cum_pv / cum_vol)
        })
        .collect()
}

/// Session anchors: true at the first bar and whenever the UTC date changes
pub fn session_anchors(timestamps: &[DateTime<Utc>]) -> Vec<bool> {
    timestamps
        .iter()
        .enumerate()
        .map(|(i, ts)| i == 0 || ts.date_naive() != timestamps[i - 1].date_naive())
        .collect()
}

// =============================================================================
// Fair Value Gap Zones
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ZoneKind {
    Demand,
    Supply,
}

/// A price zone left behind by a three-bar fair value gap
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Zone {
    pub kind: ZoneKind,
    pub bottom: f64,
    pub top: f64,
    /// Index of the bar that completed the gap
    pub formed_at: usize,
}

impl Zone {
    /// Whether the bar's range overlaps the zone
    pub fn touched_by(&self, bar_low: f64, bar_high: f64) -> bool {
        bar_low <= self.top && bar_high >= self.bottom
    }
}

/// Gap completed at each bar: bullish when `low[i] > high[i-2]`
/// (demand zone), bearish when `high[i] < low[i-2]` (supply zone).
pub fn fair_value_gaps(high: &[f64], low: &[f64]) -> Vec<Option<Zone>> {
    (0..high.len())
        .map(|i| {
            if i < 2 {
                return None;
            }
            if low[i] > high[i - 2] {
                Some(Zone {
                    kind: ZoneKind::Demand,
                    bottom: high[i - 2],
                    top: low[i],
                    formed_at: i,
                })
            } else if high[i] < low[i - 2] {
                Some(Zone {
                    kind: ZoneKind::Supply,
                    bottom: high[i],
                    top: low[i - 2],
                    formed_at: i,
                })
            } else {
                None
            }
        })
        .collect()
}

/// Zones usable at each bar, as (demand, supply).
///
/// The value at `i` only reflects bars `< i`: the most recent gap of each
/// kind that has not been closed through and is at most `lookback` bars old.
pub fn active_zones(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    lookback: usize,
) -> (Vec<Option<Zone>>, Vec<Option<Zone>>) {
    let gaps = fair_value_gaps(high, low);
    let mut demand_out = Vec::with_capacity(high.len());
    let mut supply_out = Vec::with_capacity(high.len());
    let mut demand: Option<Zone> = None;
    let mut supply: Option<Zone> = None;

    for i in 0..high.len() {
        demand = demand.filter(|z| i - z.formed_at <= lookback);
        supply = supply.filter(|z| i - z.formed_at <= lookback);
        demand_out.push(demand);
        supply_out.push(supply);

        demand = demand.filter(|z| close[i] >= z.bottom);
        supply = supply.filter(|z| close[i] <= z.top);
        match gaps[i] {
            Some(z) if z.kind == ZoneKind::Demand => demand = Some(z),
            Some(z) => supply = Some(z),
            None => {}
        }
    }

    (demand_out, supply_out)
}

// =============================================================================
// Per-run indicator set
// =============================================================================

/// Where cumulative VWAP restarts
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum VwapAnchor {
    /// Cumulate from the first bar of the series
    #[default]
    Series,
    /// Restart at each UTC calendar day
    Session,
}

/// Indicator periods used by the strategies
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndicatorConfig {
    pub ema_fast: usize,
    pub ema_slow: usize,
    pub atr_period: usize,
    pub vwap_anchor: VwapAnchor,
    /// Maximum age in bars of a fair value gap zone
    pub zone_lookback: usize,
}

impl Default for IndicatorConfig {
    fn default() -> Self {
        IndicatorConfig {
            ema_fast: 20,
            ema_slow: 50,
            atr_period: 14,
            vwap_anchor: VwapAnchor::Series,
            zone_lookback: 50,
        }
    }
}

/// Indicator values at one bar
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: Option<f64>,
    pub ema_slow: Option<f64>,
    pub prev_ema_fast: Option<f64>,
    pub prev_ema_slow: Option<f64>,
    pub prev_close: Option<f64>,
    pub atr: Option<f64>,
    pub vwap: Option<f64>,
    pub demand_zone: Option<Zone>,
    pub supply_zone: Option<Zone>,
}

/// Indicator columns for one backtest run.
///
/// Every column is causal, so computing them once over the whole series and
/// reading index `i` is equivalent to recomputing on bars `0..=i`.
#[derive(Debug, Clone)]
pub struct IndicatorSet {
    close: Vec<f64>,
    ema_fast: Vec<Option<f64>>,
    ema_slow: Vec<Option<f64>>,
    atr: Vec<Option<f64>>,
    vwap: Vec<Option<f64>>,
    demand: Vec<Option<Zone>>,
    supply: Vec<Option<Zone>>,
}

impl IndicatorSet {
    pub fn compute(bars: &[Bar], config: &IndicatorConfig) -> Self {
        let high: Vec<f64> = bars.iter().map(|b| b.high).collect();
        let low: Vec<f64> = bars.iter().map(|b| b.low).collect();
        let close: Vec<f64> = bars.iter().map(|b| b.close).collect();
        let volume: Vec<f64> = bars.iter().map(|b| b.volume).collect();

        let vwap_values = match config.vwap_anchor {
            VwapAnchor::Series => vwap(&high, &low, &close, &volume),
            VwapAnchor::Session => {
                let timestamps: Vec<DateTime<Utc>> = bars.iter().map(|b| b.timestamp).collect();
                vwap_anchored(&high, &low, &close, &volume, &session_anchors(&timestamps))
            }
        };
        let (demand, supply) = active_zones(&high, &low, &close, config.zone_lookback);

        IndicatorSet {
            ema_fast: ema(&close, config.ema_fast),
            ema_slow: ema(&close, config.ema_slow),
            atr: atr(&high, &low, &close, config.atr_period),
            vwap: vwap_values,
            demand,
            supply,
            close,
        }
    }

    pub fn atr_at(&self, index: usize) -> Option<f64> {
        self.atr.get(index).copied().flatten()
    }

    /// Snapshot at `index`; out-of-range indices give an all-undefined snapshot
    pub fn snapshot(&self, index: usize) -> IndicatorSnapshot {
        let at = |col: &[Option<f64>], i: usize| col.get(i).copied().flatten();
        let prev = index.checked_sub(1);
        IndicatorSnapshot {
            ema_fast: at(&self.ema_fast, index),
            ema_slow: at(&self.ema_slow, index),
            prev_ema_fast: prev.and_then(|p| at(&self.ema_fast, p)),
            prev_ema_slow: prev.and_then(|p| at(&self.ema_slow, p)),
            prev_close: prev.and_then(|p| self.close.get(p).copied()),
            atr: at(&self.atr, index),
            vwap: at(&self.vwap, index),
            demand_zone: self.demand.get(index).copied().flatten(),
            supply_zone: self.supply.get(index).copied().flatten(),
        }
    }
}

// =============================================================================
// Tests
// =============================================================================
