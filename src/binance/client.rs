// =============================================================================
// Binance USD-M Futures REST Client — public market data
// =============================================================================
//
// Only unauthenticated endpoints are used: the symbol directory
// (`/fapi/v1/exchangeInfo`) and candle history (`/fapi/v1/klines`). Every
// response passes through the request-weight tracker before it is parsed.
// =============================================================================

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, instrument, warn};

use crate::binance::rate_limit::{klines_weight, RateLimitTracker, EXCHANGE_INFO_WEIGHT};
use crate::error::FetchError;
use crate::market_data::candle::validate_series;
use crate::market_data::{Candle, MarketDataSource};
use crate::types::Interval;

pub const DEFAULT_BASE_URL: &str = "https://fapi.binance.com";

/// Error code the exchange returns for an unrecognised symbol.
const INVALID_SYMBOL_CODE: i64 = -1121;

/// Transport-level timeout. The scanner applies its own, usually tighter,
/// per-symbol bound on top of this.
const HTTP_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Clone)]
pub struct BinanceClient {
    base_url: String,
    client: reqwest::Client,
    rate_limit: Arc<RateLimitTracker>,
}

impl BinanceClient {
    // -------------------------------------------------------------------------
    // Construction
    // -------------------------------------------------------------------------

    pub fn new(base_url: impl Into<String>) -> Result<Self, FetchError> {
        let base_url = base_url.into().trim_end_matches('/').to_string();

        let client = reqwest::Client::builder()
            .timeout(HTTP_TIMEOUT)
            .build()?;

        debug!(base_url = %base_url, "BinanceClient initialised");

        Ok(Self {
            base_url,
            client,
            rate_limit: Arc::new(RateLimitTracker::new()),
        })
    }

    // -------------------------------------------------------------------------
    // Public market data
    // -------------------------------------------------------------------------

    /// GET /fapi/v1/klines
    #[instrument(skip(self), name = "binance::get_klines")]
    pub async fn get_klines(
        &self,
        symbol: &str,
        interval: Interval,
        limit: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        self.rate_limit.check(klines_weight(limit))?;

        let url = format!(
            "{}/fapi/v1/klines?symbol={}&interval={}&limit={}",
            self.base_url, symbol, interval, limit
        );
        let body = self.get_json(&url, symbol).await?;

        let candles = parse_klines(&body)?;
        validate_series(&candles)?;

        debug!(symbol, %interval, count = candles.len(), "klines fetched");
        Ok(candles)
    }

    /// GET /fapi/v1/exchangeInfo, reduced to tradable symbols quoted in
    /// `quote_asset`.
    #[instrument(skip(self), name = "binance::get_symbols")]
    pub async fn get_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError> {
        self.rate_limit.check(EXCHANGE_INFO_WEIGHT)?;

        let url = format!("{}/fapi/v1/exchangeInfo", self.base_url);
        let body = self.get_json(&url, "").await?;

        let symbols = parse_symbols(&body, quote_asset)?;
        debug!(
            quote_asset,
            count = symbols.len(),
            used_weight_1m = self.rate_limit.snapshot().used_weight_1m,
            "symbol directory fetched"
        );
        Ok(symbols)
    }

    // -------------------------------------------------------------------------
    // Internal helpers
    // -------------------------------------------------------------------------

    async fn get_json(&self, url: &str, symbol: &str) -> Result<Value, FetchError> {
        let resp = self.client.get(url).send().await?;

        self.rate_limit.update_from_headers(resp.headers());

        let status = resp.status();
        let text = resp.text().await?;

        if !status.is_success() {
            return Err(error_from_response(status.as_u16(), &text, symbol));
        }

        serde_json::from_str(&text)
            .map_err(|e| FetchError::Malformed(format!("invalid JSON from {url}: {e}")))
    }
}

impl std::fmt::Debug for BinanceClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BinanceClient")
            .field("base_url", &self.base_url)
            .field("rate_limit", &self.rate_limit)
            .finish()
    }
}

#[async_trait]
impl MarketDataSource for BinanceClient {
    async fn fetch_candles(
        &self,
        symbol: &str,
        interval: Interval,
        count: u32,
    ) -> Result<Vec<Candle>, FetchError> {
        self.get_klines(symbol, interval, count).await
    }

    async fn list_tradable_symbols(&self, quote_asset: &str) -> Result<Vec<String>, FetchError> {
        self.get_symbols(quote_asset).await
    }
}

// =============================================================================
// Response parsing
// =============================================================================

/// Map a non-2xx response onto the error taxonomy. The exchange reports an
/// unknown symbol as HTTP 400 with `{"code": -1121, ...}`.
fn error_from_response(status: u16, body: &str, symbol: &str) -> FetchError {
    let code = serde_json::from_str::<Value>(body)
        .ok()
        .and_then(|v| v["code"].as_i64());

    match code {
        Some(INVALID_SYMBOL_CODE) => FetchError::UnknownSymbol(symbol.to_string()),
        _ => {
            warn!(status, symbol, "exchange returned error status");
            FetchError::Status {
                status,
                body: body.to_string(),
            }
        }
    }
}

/// Parse the klines array-of-arrays payload.
///
/// Array indices:
///   [0] openTime, [1] open, [2] high, [3] low, [4] close, [5] volume,
///   [6] closeTime, [7] quoteAssetVolume, [8] numberOfTrades, ...
pub fn parse_klines(body: &Value) -> Result<Vec<Candle>, FetchError> {
    let raw = body
        .as_array()
        .ok_or_else(|| FetchError::Malformed("klines response is not an array".into()))?;

    raw.iter()
        .enumerate()
        .map(|(i, entry)| {
            let arr = entry
                .as_array()
                .filter(|a| a.len() >= 7)
                .ok_or_else(|| FetchError::Malformed(format!("kline entry {i} is malformed")))?;

            Ok(Candle::new(
                parse_i64(&arr[0])?,
                parse_str_f64(&arr[1])?,
                parse_str_f64(&arr[2])?,
                parse_str_f64(&arr[3])?,
                parse_str_f64(&arr[4])?,
                parse_str_f64(&arr[5])?,
                parse_i64(&arr[6])?,
            ))
        })
        .collect()
}

/// Symbols from an exchangeInfo payload whose `quoteAsset` equals
/// `quote_asset` and whose `status` (when present) is `TRADING`, in the
/// order the exchange lists them.
pub fn parse_symbols(body: &Value, quote_asset: &str) -> Result<Vec<String>, FetchError> {
    let entries = body["symbols"]
        .as_array()
        .ok_or_else(|| FetchError::Malformed("exchangeInfo missing 'symbols' array".into()))?;

    Ok(entries
        .iter()
        .filter(|s| s["quoteAsset"].as_str() == Some(quote_asset))
        .filter(|s| s["status"].as_str().map_or(true, |st| st == "TRADING"))
        .filter_map(|s| s["symbol"].as_str().map(str::to_string))
        .collect())
}

/// Parse a JSON value that may be either a string or a number into `f64`.
fn parse_str_f64(val: &Value) -> Result<f64, FetchError> {
    if let Some(s) = val.as_str() {
        s.parse::<f64>()
            .map_err(|_| FetchError::Malformed(format!("failed to parse '{s}' as f64")))
    } else if let Some(n) = val.as_f64() {
        Ok(n)
    } else {
        Err(FetchError::Malformed(format!("expected string or number, got: {val}")))
    }
}

fn parse_i64(val: &Value) -> Result<i64, FetchError> {
    val.as_i64()
        .ok_or_else(|| FetchError::Malformed(format!("expected integer timestamp, got: {val}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parses_kline_rows() {
        let body = json!([
            [1000, "1.0", "2.0", "0.5", "1.5", "100.0", 1999, "150.0", 10, "50", "75", "0"],
            [2000, "1.5", "2.5", "1.0", "2.0", 120.5, 2999, "240.0", 12, "60", "90", "0"]
        ]);
        let candles = parse_klines(&body).unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].open_time, 1000);
        assert_eq!(candles[0].close, 1.5);
        assert_eq!(candles[1].volume, 120.5);
        assert_eq!(candles[1].close_time, 2999);
    }

    #[test]
    fn rejects_non_numeric_price() {
        let body = json!([[1000, "abc", "2.0", "0.5", "1.5", "100.0", 1999]]);
        assert!(matches!(parse_klines(&body), Err(FetchError::Malformed(_))));
    }

    #[test]
    fn rejects_short_rows_and_non_arrays() {
        assert!(parse_klines(&json!([[1000, "1.0"]])).is_err());
        assert!(parse_klines(&json!({"code": -1121})).is_err());
    }

    #[test]
    fn symbol_directory_filters_quote_and_status() {
        let body = json!({
            "symbols": [
                {"symbol": "BTCUSDT", "quoteAsset": "USDT", "status": "TRADING"},
                {"symbol": "ETHBUSD", "quoteAsset": "BUSD", "status": "TRADING"},
                {"symbol": "OLDUSDT", "quoteAsset": "USDT", "status": "SETTLING"},
                {"symbol": "ETHUSDT", "quoteAsset": "USDT"}
            ]
        });
        assert_eq!(
            parse_symbols(&body, "USDT").unwrap(),
            vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()]
        );
        assert!(parse_symbols(&body, "EUR").unwrap().is_empty());
    }

    #[test]
    fn symbol_directory_requires_symbols_array() {
        assert!(parse_symbols(&json!({}), "USDT").is_err());
    }

    #[test]
    fn invalid_symbol_code_maps_to_unknown_symbol() {
        let err = error_from_response(400, r#"{"code":-1121,"msg":"Invalid symbol."}"#, "FOOUSDT");
        assert!(matches!(err, FetchError::UnknownSymbol(s) if s == "FOOUSDT"));

        let err = error_from_response(503, "Service Unavailable", "BTCUSDT");
        assert!(matches!(err, FetchError::Status { status: 503, .. }));
    }

    #[test]
    fn base_url_trailing_slash_is_trimmed() {
        let client = BinanceClient::new("http://localhost:9999/").unwrap();
        assert_eq!(client.base_url, "http://localhost:9999");
    }
}
