// =============================================================================
// Market data source abstraction
// =============================================================================
//
// The scanner only talks to this trait. `BinanceClient` is the production
// implementation; tests drive the pipeline with in-memory fixtures.
// =============================================================================

use async_trait::async_trait;

use crate::error::FetchError;
use crate::market_data::Candle;
use crate::types::Interval;

#[async_trait]
pub trait MarketDataSource: Send + Sync {
    /// Fetch the most recent `count` candles for `symbol`, oldest first.
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: u32,
    ) -> Result<Vec<Candle>, FetchError>;

    /// List the tradable symbols quoted in `quote_asset`, in exchange order.
    async fn list_tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError>;
}
