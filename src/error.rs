// =============================================================================
// Error taxonomy for the scan pipeline
// =============================================================================
//
// `FetchError` covers everything that can go wrong talking to the exchange.
// `SymbolError` is the per-symbol boundary: every variant is recovered by the
// scanner, recorded as a skipped outcome, and never aborts the batch.
// =============================================================================

use thiserror::Error;

/// Failure to obtain market data from the exchange.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("network error: {0}")]
    Network(#[from] reqwest::Error),

    #[error("request timed out after {0} ms")]
    Timeout(u64),

    #[error("exchange returned HTTP {status}: {body}")]
    Status { status: u16, body: String },

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("unknown symbol: {0}")]
    UnknownSymbol(String),

    #[error("rate limit reached ({used}/{limit} request weight)")]
    RateLimited { used: u32, limit: u32 },
}

/// Reason a single symbol produced no signal in a scan cycle.
#[derive(Debug, Error)]
pub enum SymbolError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error("insufficient history: {have} candles, need {need}")]
    InsufficientHistory { have: usize, need: usize },

    #[error("indicator {indicator} undefined at the latest candle")]
    ComputationSkipped { indicator: String },
}

impl SymbolError {
    /// Stable label used in scan reports and the dashboard.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Fetch(_) => "fetch",
            Self::InsufficientHistory { .. } => "insufficient_history",
            Self::ComputationSkipped { .. } => "computation_skipped",
        }
    }
}
