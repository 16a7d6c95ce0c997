//! Data loading and result export
//!
//! Normalises CSV price files into [`Bar`] records and writes trade logs,
//! equity curves, signal logs and summaries back out. Bars are not
//! validated here; the backtester rejects invalid series with the failing
//! bar index.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, NaiveDate, NaiveDateTime, Utc};
use serde::Serialize;
use std::fs::{self, File};
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

use crate::backtest::{BacktestResult, SignalRecord};
use crate::config::CsvFormat;
use crate::optimizer::OptimizationResult;
use crate::{Bar, EquityPoint, Trade};

// =============================================================================
// CSV Data Loading
// =============================================================================

/// Load bars in the given layout
pub fn load_bars(path: impl AsRef<Path>, format: CsvFormat) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let bars = match format {
        CsvFormat::Generic => load_csv(path)?,
        CsvFormat::Mt5 => load_mt5_csv(path)?,
    };
    info!("Loaded {} bars from {}", bars.len(), path.display());
    Ok(bars)
}

fn parse_datetime(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = s.parse::<DateTime<Utc>>() {
        return Some(dt);
    }
    const FORMATS: [&str; 6] = [
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M",
        "%Y.%m.%d %H:%M:%S",
        "%Y.%m.%d %H:%M",
        "%d.%m.%Y %H:%M",
    ];
    FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
        .or_else(|| {
            ["%Y-%m-%d", "%Y.%m.%d"]
                .iter()
                .find_map(|fmt| NaiveDate::parse_from_str(s, fmt).ok())
                .and_then(|d| d.and_hms_opt(0, 0, 0))
        })
        .map(|ndt| DateTime::<Utc>::from_naive_utc_and_offset(ndt, Utc))
}

fn parse_field(record: &csv::StringRecord, idx: usize, name: &str, row: usize) -> Result<f64> {
    record
        .get(idx)
        .with_context(|| format!("Row {}: missing {} column", row, name))?
        .trim()
        .parse()
        .with_context(|| format!("Row {}: failed to parse {}", row, name))
}

/// Load `datetime,open,high,low,close[,volume]` with a header row.
///
/// A missing volume column reads as zero volume.
pub fn load_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .from_path(path)
        .with_context(|| format!("Failed to open CSV file {}", path.display()))?;

    let mut bars = Vec::new();
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Failed to read row {}", row))?;

        let dt_str = record.get(0).context("Missing datetime column")?;
        let timestamp = parse_datetime(dt_str)
            .with_context(|| format!("Row {}: failed to parse datetime '{}'", row, dt_str))?;
        let volume = match record.get(5) {
            Some(v) if !v.trim().is_empty() => parse_field(&record, 5, "volume", row)?,
            _ => 0.0,
        };

        bars.push(Bar::new_unchecked(
            timestamp,
            parse_field(&record, 1, "open", row)?,
            parse_field(&record, 2, "high", row)?,
            parse_field(&record, 3, "low", row)?,
            parse_field(&record, 4, "close", row)?,
            volume,
        ));
    }

    Ok(bars)
}

/// Decode UTF-16 (with BOM) or UTF-8 text
fn decode_text(bytes: &[u8]) -> Result<String> {
    let utf16 = |bytes: &[u8], little: bool| -> Result<String> {
        let units: Vec<u16> = bytes
            .chunks_exact(2)
            .map(|pair| {
                if little {
                    u16::from_le_bytes([pair[0], pair[1]])
                } else {
                    u16::from_be_bytes([pair[0], pair[1]])
                }
            })
            .collect();
        String::from_utf16(&units).context("Invalid UTF-16 text")
    };

    match bytes {
        [0xFF, 0xFE, rest @ ..] => utf16(rest, true),
        [0xFE, 0xFF, rest @ ..] => utf16(rest, false),
        [0xEF, 0xBB, 0xBF, rest @ ..] => String::from_utf8(rest.to_vec()).context("Invalid UTF-8 text"),
        _ => String::from_utf8(bytes.to_vec()).context("Invalid UTF-8 text"),
    }
}

/// Load a MetaTrader 5 history export.
///
/// Accepts UTF-16 or UTF-8, comma or tab separated, with either a combined
/// `YYYY.MM.DD HH:MM[:SS]` column or split date and time columns, followed by
/// open, high, low, close, tick volume, real volume and spread. Real volume
/// of zero falls back to tick volume. Rows with an unparsable timestamp are
/// dropped and the result is sorted by time.
pub fn load_mt5_csv(path: impl AsRef<Path>) -> Result<Vec<Bar>> {
    let path = path.as_ref();
    let bytes = fs::read(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let text = decode_text(&bytes)?;

    let first_line = text.lines().next().unwrap_or_default();
    let delimiter = if first_line.contains(',') { b',' } else { b'\t' };

    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .has_headers(true)
        .flexible(true)
        .from_reader(text.as_bytes());

    let mut bars = Vec::new();
    let mut dropped = 0usize;
    for (row_idx, result) in reader.records().enumerate() {
        let row = row_idx + 1;
        let record = result.with_context(|| format!("Failed to read row {}", row))?;
        let first = record.get(0).unwrap_or_default().trim();

        // combined "date time" column, or date and time in two columns
        let (timestamp, offset) = if first.contains(' ') && first.contains('.') {
            (parse_datetime(first), 1)
        } else {
            let time = record.get(1).unwrap_or_default().trim();
            (parse_datetime(&format!("{} {}", first, time)), 2)
        };
        let Some(timestamp) = timestamp else {
            dropped += 1;
            continue;
        };

        let field = |i: usize, name: &str| parse_field(&record, offset + i, name, row);
        let tick_volume = field(4, "tickvol")?;
        let real_volume = match record.get(offset + 5) {
            Some(v) if !v.trim().is_empty() => field(5, "volume")?,
            _ => 0.0,
        };
        let volume = if real_volume == 0.0 { tick_volume } else { real_volume };

        bars.push(Bar::new_unchecked(
            timestamp,
            field(0, "open")?,
            field(1, "high")?,
            field(2, "low")?,
            field(3, "close")?,
            volume,
        ));
    }

    if dropped > 0 {
        warn!("Dropped {} rows with unparsable timestamps from {}", dropped, path.display());
    }
    if bars.is_empty() {
        bail!("No bars found in {}", path.display());
    }
    bars.sort_by_key(|b| b.timestamp);
    Ok(bars)
}

// =============================================================================
// Export
// =============================================================================

/// Save bars as a generic CSV readable by [`load_csv`]
pub fn save_bars_csv(bars: &[Bar], path: impl AsRef<Path>) -> Result<()> {
    let path = path.as_ref();
    let mut file = File::create(path)
        .with_context(|| format!("Failed to create output file {}", path.display()))?;

    writeln!(file, "datetime,open,high,low,close,volume")?;
    for bar in bars {
        writeln!(
            file,
            "{},{},{},{},{},{}",
            bar.timestamp.format("%Y-%m-%d %H:%M:%S"),
            bar.open,
            bar.high,
            bar.low,
            bar.close,
            bar.volume
        )?;
    }
    Ok(())
}

fn write_rows<T: Serialize>(rows: &[T], path: &Path) -> Result<()> {
    let mut writer = csv::Writer::from_path(path)
        .with_context(|| format!("Failed to create {}", path.display()))?;
    for row in rows {
        writer.serialize(row)?;
    }
    writer.flush()?;
    Ok(())
}

pub fn write_trades_csv(trades: &[Trade], path: impl AsRef<Path>) -> Result<()> {
    write_rows(trades, path.as_ref())
}

pub fn write_equity_csv(equity_curve: &[EquityPoint], path: impl AsRef<Path>) -> Result<()> {
    write_rows(equity_curve, path.as_ref())
}

pub fn write_signals_csv(signals: &[SignalRecord], path: impl AsRef<Path>) -> Result<()> {
    write_rows(signals, path.as_ref())
}

/// Write `trades.csv`, `equity.csv`, `signals.csv` and `summary.json`
/// under `dir`, returning the written paths
pub fn export_result(result: &BacktestResult, dir: impl AsRef<Path>) -> Result<Vec<PathBuf>> {
    let dir = dir.as_ref();
    fs::create_dir_all(dir).with_context(|| format!("Failed to create {}", dir.display()))?;

    let trades = dir.join("trades.csv");
    let equity = dir.join("equity.csv");
    let signals = dir.join("signals.csv");
    let summary = dir.join("summary.json");

    write_trades_csv(&result.trades, &trades)?;
    write_equity_csv(&result.equity_curve, &equity)?;
    write_signals_csv(&result.signals, &signals)?;
    let json = serde_json::to_string_pretty(&result.summary)?;
    fs::write(&summary, json).with_context(|| format!("Failed to write {}", summary.display()))?;

    info!("Saved results to {}", dir.display());
    Ok(vec![trades, equity, signals, summary])
}

#[derive(Serialize)]
struct OptimizationRow {
    train_window: usize,
    test_window: usize,
    stop_loss: f64,
    take_profit: f64,
    transaction_cost: f64,
    max_holding_bars: Option<usize>,
    min_atr: Option<f64>,
    vwap_tol: f64,
    trades: usize,
    win_rate: f64,
    expectancy: String,
    net_profit: String,
    profit_factor: f64,
    max_drawdown: String,
}

/// One row per grid combination, in the order given
pub fn write_optimization_csv(results: &[OptimizationResult], path: impl AsRef<Path>) -> Result<()> {
    let rows: Vec<OptimizationRow> = results
        .iter()
        .map(|r| OptimizationRow {
            train_window: r.params.train_window,
            test_window: r.params.test_window,
            stop_loss: r.params.stop_loss,
            take_profit: r.params.take_profit,
            transaction_cost: r.params.transaction_cost,
            max_holding_bars: r.params.max_holding_bars,
            min_atr: r.params.min_atr,
            vwap_tol: r.params.vwap_tol,
            trades: r.summary.trade_count,
            win_rate: r.summary.win_rate,
            expectancy: r.summary.expectancy.to_string(),
            net_profit: r.summary.net_profit.to_string(),
            profit_factor: r.summary.profit_factor,
            max_drawdown: r.summary.max_drawdown.to_string(),
        })
        .collect();
    write_rows(&rows, path.as_ref())
}
