//! Fatal input violations that reject a whole backtest run

use chrono::{DateTime, Utc};
use thiserror::Error;

use crate::types::BarValidationError;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BacktestError {
    #[error("bar {index} violates the OHLC invariant: {source}")]
    InvalidBar {
        index: usize,
        #[source]
        source: BarValidationError,
    },

    #[error("bar {index} timestamp {current} is earlier than the previous bar ({previous})")]
    NonMonotonicTimestamp {
        index: usize,
        previous: DateTime<Utc>,
        current: DateTime<Utc>,
    },

    #[error("bar {index} repeats timestamp {timestamp}")]
    DuplicateTimestamp {
        index: usize,
        timestamp: DateTime<Utc>,
    },

    #[error("invalid configuration: {field} {reason}")]
    InvalidConfig { field: &'static str, reason: String },
}

impl BacktestError {
    pub(crate) fn config(field: &'static str, reason: impl Into<String>) -> Self {
        BacktestError::InvalidConfig {
            field,
            reason: reason.into(),
        }
    }
}

/// Validate a bar series: every bar must satisfy the OHLC invariant and
/// timestamps must be strictly increasing.
pub fn validate_series(bars: &[crate::Bar]) -> Result<(), BacktestError> {
    for (index, bar) in bars.iter().enumerate() {
        bar.validate()
            .map_err(|source| BacktestError::InvalidBar { index, source })?;

        if index > 0 {
            let previous = bars[index - 1].timestamp;
            if bar.timestamp < previous {
                return Err(BacktestError::NonMonotonicTimestamp {
                    index,
                    previous,
                    current: bar.timestamp,
                });
            }
            if bar.timestamp == previous {
                return Err(BacktestError::DuplicateTimestamp {
                    index,
                    timestamp: bar.timestamp,
                });
            }
        }
    }
    Ok(())
}
