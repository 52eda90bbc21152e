// =============================================================================
// Signal Scorer — additive EMA / RSI / MACD heuristic
// =============================================================================
//
// Terms (evaluated on the latest candle only):
//   trend     ±3   EMA ordering (nested fast/slow/trend, or fast/slow crossover)
//   momentum  ±2   RSI < 30 oversold, RSI > 70 overbought, otherwise 0
//   macd      ±2   MACD vs its signal line; always fires one way
//
//   confidence = clamp((score + 5) / 10, 0, 1)
//   bias       = Long if confidence >= 0.6, Short if <= 0.4, else Neutral
//
// The score spans -7..=7 while the confidence denominator is calibrated for
// -5..=5, so |score| >= 5 saturates at 0 or 1.
// =============================================================================

use serde::Serialize;

use crate::error::SymbolError;
use crate::indicators::set::{
    IndicatorParams, IndicatorSet, EMA_FAST, EMA_SLOW, EMA_TREND, MACD, MACD_SIGNAL,
};
use crate::market_data::candle::{volume_above_mean, Candle};
use crate::types::{Bias, TrendRule};

const TREND_WEIGHT: i32 = 3;
const MOMENTUM_WEIGHT: i32 = 2;
const MACD_WEIGHT: i32 = 2;

const RSI_OVERSOLD: f64 = 30.0;
const RSI_OVERBOUGHT: f64 = 70.0;

const LONG_CONFIDENCE: f64 = 0.6;
const SHORT_CONFIDENCE: f64 = 0.4;

/// Take-profit steps as fractions of entry; the stop sits one step against.
const TAKE_PROFIT_STEPS: [f64; 3] = [0.01, 0.02, 0.03];
const STOP_LOSS_STEP: f64 = 0.01;

// =============================================================================
// Inputs / outputs
// =============================================================================

/// Latest-candle indicator readings consumed by the scorer.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct IndicatorSnapshot {
    pub ema_fast: f64,
    pub ema_slow: f64,
    /// Only required by [`TrendRule::Nested`].
    pub ema_trend: Option<f64>,
    pub rsi: f64,
    pub macd: f64,
    pub macd_signal: f64,
}

/// Raw additive score plus the reasons that produced it, in term order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScoreBreakdown {
    pub score: i32,
    pub reasons: Vec<String>,
}

/// Entry, stop and three take-profit levels for a directional bias.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TradeLevels {
    pub entry: f64,
    pub stop_loss: f64,
    pub take_profit_1: f64,
    pub take_profit_2: f64,
    pub take_profit_3: f64,
}

/// Scored outcome for one symbol in one scan cycle.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalResult {
    pub symbol: String,
    pub bias: Bias,
    pub confidence: f64,
    pub score: i32,
    pub reasons: Vec<String>,
    /// Open time of the candle the signal was scored on.
    pub as_of: i64,
    pub close: f64,
    pub volume: f64,
    pub volume_confirmed: bool,
    pub entry: Option<f64>,
    pub stop_loss: Option<f64>,
    pub take_profit_1: Option<f64>,
    pub take_profit_2: Option<f64>,
    pub take_profit_3: Option<f64>,
    pub suggested_leverage: Option<u32>,
    pub indicators: IndicatorSnapshot,
}

impl SignalResult {
    /// Strength in the signal's own direction: `confidence` for longs,
    /// `1 - confidence` for shorts.
    pub fn directional_strength(&self) -> f64 {
        self.confidence.max(1.0 - self.confidence)
    }

    pub fn levels(&self) -> Option<TradeLevels> {
        Some(TradeLevels {
            entry: self.entry?,
            stop_loss: self.stop_loss?,
            take_profit_1: self.take_profit_1?,
            take_profit_2: self.take_profit_2?,
            take_profit_3: self.take_profit_3?,
        })
    }
}

// =============================================================================
// Pure scoring functions
// =============================================================================

/// Sum the three terms for `snapshot` under `rule`.
pub fn score_snapshot(snapshot: &IndicatorSnapshot, rule: TrendRule) -> ScoreBreakdown {
    let mut score = 0;
    let mut reasons = Vec::with_capacity(3);

    let (fast, slow) = (snapshot.ema_fast, snapshot.ema_slow);
    match rule {
        TrendRule::Nested => {
            if let Some(trend) = snapshot.ema_trend {
                if fast > slow && slow > trend {
                    score += TREND_WEIGHT;
                    reasons.push("Bullish EMA trend".to_string());
                } else if fast < slow && slow < trend {
                    score -= TREND_WEIGHT;
                    reasons.push("Bearish EMA trend".to_string());
                }
            }
        }
        TrendRule::Crossover => {
            if fast > slow {
                score += TREND_WEIGHT;
                reasons.push("Bullish EMA crossover".to_string());
            } else if fast < slow {
                score -= TREND_WEIGHT;
                reasons.push("Bearish EMA crossover".to_string());
            }
        }
    }

    if snapshot.rsi < RSI_OVERSOLD {
        score += MOMENTUM_WEIGHT;
        reasons.push("Oversold RSI".to_string());
    } else if snapshot.rsi > RSI_OVERBOUGHT {
        score -= MOMENTUM_WEIGHT;
        reasons.push("Overbought RSI".to_string());
    }

    if snapshot.macd > snapshot.macd_signal {
        score += MACD_WEIGHT;
        reasons.push("MACD bullish crossover".to_string());
    } else {
        score -= MACD_WEIGHT;
        reasons.push("MACD bearish crossover".to_string());
    }

    ScoreBreakdown { score, reasons }
}

/// `clamp((score + 5) / 10, 0, 1)`.
pub fn confidence_from_score(score: i32) -> f64 {
    ((score as f64 + 5.0) / 10.0).clamp(0.0, 1.0)
}

pub fn bias_from_confidence(confidence: f64) -> Bias {
    if confidence >= LONG_CONFIDENCE {
        Bias::Long
    } else if confidence <= SHORT_CONFIDENCE {
        Bias::Short
    } else {
        Bias::Neutral
    }
}

/// Fixed ±1/2/3 % targets and a 1 % stop around `close`; `None` when neutral.
pub fn trade_levels(bias: Bias, close: f64) -> Option<TradeLevels> {
    let sign = match bias {
        Bias::Long => 1.0,
        Bias::Short => -1.0,
        Bias::Neutral => return None,
    };
    let entry = close;
    let [tp1, tp2, tp3] = TAKE_PROFIT_STEPS.map(|step| entry * (1.0 + sign * step));

    Some(TradeLevels {
        entry,
        stop_loss: entry * (1.0 - sign * STOP_LOSS_STEP),
        take_profit_1: tp1,
        take_profit_2: tp2,
        take_profit_3: tp3,
    })
}

// =============================================================================
// Scorer
// =============================================================================

/// Turns a symbol's candles and indicator set into a [`SignalResult`].
#[derive(Debug, Clone)]
pub struct SignalScorer {
    pub trend_rule: TrendRule,
    pub suggested_leverage: u32,
}

impl SignalScorer {
    pub fn new(trend_rule: TrendRule, suggested_leverage: u32) -> Self {
        Self {
            trend_rule,
            suggested_leverage,
        }
    }

    /// Read the latest value of every indicator the trend rule needs.
    ///
    /// The first undefined one is reported as [`SymbolError::ComputationSkipped`].
    pub fn snapshot(
        &self,
        indicators: &IndicatorSet,
        params: &IndicatorParams,
    ) -> Result<IndicatorSnapshot, SymbolError> {
        let require = |name: &str| {
            indicators
                .latest(name)
                .ok_or_else(|| SymbolError::ComputationSkipped {
                    indicator: name.to_string(),
                })
        };

        let ema_fast = require(EMA_FAST)?;
        let ema_slow = require(EMA_SLOW)?;
        let ema_trend = match self.trend_rule {
            TrendRule::Nested => Some(require(EMA_TREND)?),
            TrendRule::Crossover => indicators.latest(EMA_TREND),
        };
        let rsi = require(&params.rsi_key())?;
        let macd = require(MACD)?;
        let macd_signal = require(MACD_SIGNAL)?;

        Ok(IndicatorSnapshot {
            ema_fast,
            ema_slow,
            ema_trend,
            rsi,
            macd,
            macd_signal,
        })
    }

    /// Score the latest candle of `candles`.
    pub fn evaluate(
        &self,
        symbol: &str,
        candles: &[Candle],
        indicators: &IndicatorSet,
        params: &IndicatorParams,
    ) -> Result<SignalResult, SymbolError> {
        let last = candles.last().ok_or(SymbolError::InsufficientHistory {
            have: 0,
            need: params.required_history(self.trend_rule).max(1),
        })?;

        let snapshot = self.snapshot(indicators, params)?;
        let ScoreBreakdown { score, reasons } = score_snapshot(&snapshot, self.trend_rule);
        let confidence = confidence_from_score(score);
        let bias = bias_from_confidence(confidence);
        let levels = trade_levels(bias, last.close);

        Ok(SignalResult {
            symbol: symbol.to_string(),
            bias,
            confidence,
            score,
            reasons,
            as_of: last.open_time,
            close: last.close,
            volume: last.volume,
            volume_confirmed: volume_above_mean(candles),
            entry: levels.map(|l| l.entry),
            stop_loss: levels.map(|l| l.stop_loss),
            take_profit_1: levels.map(|l| l.take_profit_1),
            take_profit_2: levels.map(|l| l.take_profit_2),
            take_profit_3: levels.map(|l| l.take_profit_3),
            suggested_leverage: bias.is_directional().then_some(self.suggested_leverage),
            indicators: snapshot,
        })
    }
}

impl Default for SignalScorer {
    fn default() -> Self {
        Self::new(TrendRule::Nested, 10)
    }
}
