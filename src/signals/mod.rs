// =============================================================================
// Signals Module
// =============================================================================
//
// Signal pipeline for the screener:
// - Additive EMA / RSI / MACD scorer with fixed trade levels
// - Threshold filter and stable top-N ranking

pub mod ranker;
pub mod scorer;

pub use ranker::{rank, RankerConfig};
pub use scorer::{SignalResult, SignalScorer, TradeLevels};
