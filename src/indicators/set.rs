// =============================================================================
// Indicator Set — named, aligned indicator series for one symbol
// =============================================================================
//
// Every series has exactly one slot per input candle. Undefined slots are
// `None`; nothing is ever back-filled with zero.
// =============================================================================

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use super::ema::{calculate_ema, last_defined};
use super::macd::calculate_macd;
use super::rsi::calculate_rsi;
use crate::market_data::candle::{closes, Candle};
use crate::types::TrendRule;

pub const EMA_FAST: &str = "EMA_fast";
pub const EMA_SLOW: &str = "EMA_slow";
pub const EMA_TREND: &str = "EMA_trend";
pub const MACD: &str = "MACD";
pub const MACD_SIGNAL: &str = "MACD_signal";
pub const MACD_HIST: &str = "MACD_hist";

fn default_ema_fast() -> usize {
    9
}

fn default_ema_slow() -> usize {
    21
}

fn default_ema_trend() -> usize {
    50
}

fn default_rsi_period() -> usize {
    14
}

fn default_macd_fast() -> usize {
    12
}

fn default_macd_slow() -> usize {
    26
}

fn default_macd_signal() -> usize {
    9
}

/// Look-back periods for every indicator the scorer consumes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndicatorParams {
    #[serde(default = "default_ema_fast")]
    pub ema_fast: usize,
    #[serde(default = "default_ema_slow")]
    pub ema_slow: usize,
    #[serde(default = "default_ema_trend")]
    pub ema_trend: usize,
    #[serde(default = "default_rsi_period")]
    pub rsi_period: usize,
    #[serde(default = "default_macd_fast")]
    pub macd_fast: usize,
    #[serde(default = "default_macd_slow")]
    pub macd_slow: usize,
    #[serde(default = "default_macd_signal")]
    pub macd_signal: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: default_ema_fast(),
            ema_slow: default_ema_slow(),
            ema_trend: default_ema_trend(),
            rsi_period: default_rsi_period(),
            macd_fast: default_macd_fast(),
            macd_slow: default_macd_slow(),
            macd_signal: default_macd_signal(),
        }
    }
}

impl IndicatorParams {
    /// Name of the RSI series, which carries its period (e.g. `RSI_14`).
    pub fn rsi_key(&self) -> String {
        format!("RSI_{}", self.rsi_period)
    }

    /// Minimum number of candles before every indicator `rule` scores with
    /// is defined at the latest candle. `EMA_trend` only counts for
    /// [`TrendRule::Nested`].
    pub fn required_history(&self, rule: TrendRule) -> usize {
        let trend = match rule {
            TrendRule::Nested => self.ema_trend,
            TrendRule::Crossover => 0,
        };
        [
            self.ema_fast,
            self.ema_slow,
            trend,
            self.macd_slow,
            self.rsi_period + 1,
        ]
        .into_iter()
        .max()
        .unwrap_or(0)
    }
}

/// Named indicator series aligned with a candle sequence.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct IndicatorSet {
    len: usize,
    series: BTreeMap<String, Vec<Option<f64>>>,
}

impl IndicatorSet {
    /// Compute every configured indicator over `candles`.
    pub fn compute(candles: &[Candle], params: &IndicatorParams) -> Self {
        let closes = closes(candles);
        let mut set = Self {
            len: closes.len(),
            series: BTreeMap::new(),
        };

        set.insert(EMA_FAST, calculate_ema(&closes, params.ema_fast));
        set.insert(EMA_SLOW, calculate_ema(&closes, params.ema_slow));
        set.insert(EMA_TREND, calculate_ema(&closes, params.ema_trend));
        set.insert(params.rsi_key(), calculate_rsi(&closes, params.rsi_period));

        let macd = calculate_macd(&closes, params.macd_fast, params.macd_slow, params.macd_signal);
        set.insert(MACD, macd.macd);
        set.insert(MACD_SIGNAL, macd.signal);
        set.insert(MACD_HIST, macd.histogram);

        set
    }

    fn insert(&mut self, name: impl Into<String>, values: Vec<Option<f64>>) {
        debug_assert_eq!(values.len(), self.len);
        self.series.insert(name.into(), values);
    }

    /// Number of candles every series is aligned with.
    pub fn len(&self) -> usize {
        self.len
    }

    #[cfg(test)]
    pub fn get(&self, name: &str) -> Option<&[Option<f64>]> {
        self.series.get(name).map(Vec::as_slice)
    }

    /// Value of `name` at the latest candle, `None` when undefined or unknown.
    pub fn latest(&self, name: &str) -> Option<f64> {
        self.series.get(name).and_then(|s| last_defined(s))
    }
}
