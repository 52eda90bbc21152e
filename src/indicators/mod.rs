// =============================================================================
// Technical Indicators Module
// =============================================================================
//
// Pure, side-effect-free implementations of the indicators used by the
// scorer. Every series is aligned one-to-one with its input and marks missing
// history as `None`, so callers are forced to handle insufficient data.

pub mod ema;
pub mod macd;
pub mod rsi;
pub mod set;

pub use set::{IndicatorParams, IndicatorSet};
