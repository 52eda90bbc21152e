use serde::{Deserialize, Serialize};

use crate::error::FetchError;

// ---------------------------------------------------------------------------
// Data types
// ---------------------------------------------------------------------------

/// A single OHLCV candle from the kline endpoint.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
        close_time: i64,
    ) -> Self {
        Self {
            open_time,
            close_time,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

// ---------------------------------------------------------------------------
// Series helpers
// ---------------------------------------------------------------------------

/// Close prices, oldest first.
pub fn closes(candles: &[Candle]) -> Vec<f64> {
    candles.iter().map(|c| c.close).collect()
}

/// Whether the latest volume is above the mean volume of the whole series.
///
/// Returns `false` for an empty series.
pub fn volume_above_mean(candles: &[Candle]) -> bool {
    let Some(last) = candles.last() else {
        return false;
    };
    let mean = candles.iter().map(|c| c.volume).sum::<f64>() / candles.len() as f64;
    last.volume > mean
}

/// Reject sequences the rest of the pipeline cannot trust: timestamps must be
/// strictly increasing and every price/volume finite and non-negative.
pub fn validate_series(candles: &[Candle]) -> Result<(), FetchError> {
    for pair in candles.windows(2) {
        if pair[1].open_time <= pair[0].open_time {
            return Err(FetchError::Malformed(format!(
                "kline timestamps not strictly increasing at {}",
                pair[1].open_time
            )));
        }
    }

    for c in candles {
        let fields = [c.open, c.high, c.low, c.close, c.volume];
        if fields.iter().any(|v| !v.is_finite() || *v < 0.0) {
            return Err(FetchError::Malformed(format!(
                "non-finite or negative value in kline at {}",
                c.open_time
            )));
        }
    }

    Ok(())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
