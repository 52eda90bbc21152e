// =============================================================================
// Scanner — per-symbol pipeline fan-out and the background scan loop
// =============================================================================
//
// One scan cycle:
//   1. Resolve the universe (configured symbols, else the exchange directory),
//      truncated to `scan_limit`.
//   2. For every symbol: fetch candles (bounded by `fetch_timeout_ms`), check
//      history, compute indicators, score.
//   3. Rank the successful results.
//
// Fetches run through an ordered buffered stream so at most
// `max_concurrent_fetches` are in flight while outcomes keep scan order. Any
// per-symbol failure becomes a `Skipped` outcome; the batch always completes.
// =============================================================================

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use futures_util::stream::{self, StreamExt};
use serde::Serialize;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::app_state::AppState;
use crate::error::{FetchError, SymbolError};
use crate::indicators::IndicatorSet;
use crate::market_data::{Candle, MarketDataSource};
use crate::runtime_config::RuntimeConfig;
use crate::signals::{rank, SignalResult, SignalScorer, TradeLevels};
use crate::types::Interval;

// =============================================================================
// Report types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "status", content = "detail", rename_all = "snake_case")]
pub enum OutcomeStatus {
    Signal(SignalResult),
    Skipped { kind: String, reason: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct SymbolOutcome {
    pub symbol: String,
    #[serde(flatten)]
    pub status: OutcomeStatus,
}

impl SymbolOutcome {
    pub fn signal(&self) -> Option<&SignalResult> {
        match &self.status {
            OutcomeStatus::Signal(s) => Some(s),
            OutcomeStatus::Skipped { .. } => None,
        }
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.status, OutcomeStatus::Skipped { .. })
    }
}

/// Result of one scan cycle.
#[derive(Debug, Clone, Serialize)]
pub struct ScanReport {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interval: Interval,
    /// Symbols considered after truncation to `scan_limit`.
    pub universe_size: usize,
    /// Symbols that produced a signal.
    pub scanned: usize,
    /// One entry per universe symbol, in scan order.
    pub outcomes: Vec<SymbolOutcome>,
    pub ranked: Vec<SignalResult>,
    pub skipped_count: usize,
    /// No symbol produced a signal (empty universe, directory failure, or
    /// every symbol skipped).
    pub no_data: bool,
    /// Universe resolution failure, if any.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

/// Chart payload for one symbol: candles, aligned indicators and its signal.
#[derive(Debug, Clone, Serialize)]
pub struct ChartData {
    pub symbol: String,
    pub interval: Interval,
    pub candles: Vec<Candle>,
    pub indicators: IndicatorSet,
    pub signal: SignalResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub levels: Option<TradeLevels>,
}

impl ChartData {
    fn new(interval: Interval, candles: Vec<Candle>, indicators: IndicatorSet, signal: SignalResult) -> Self {
        debug_assert_eq!(indicators.len(), candles.len());
        Self {
            symbol: signal.symbol.clone(),
            interval,
            candles,
            indicators,
            levels: signal.levels(),
            signal,
        }
    }
}

/// Everything a scan produces: the report plus chart data for ranked symbols.
#[derive(Debug, Clone)]
pub struct ScanOutput {
    pub report: ScanReport,
    pub charts: HashMap<String, ChartData>,
}

// =============================================================================
// Per-symbol pipeline
// =============================================================================

struct Evaluated {
    signal: SignalResult,
    candles: Vec<Candle>,
    indicators: IndicatorSet,
}

async fn evaluate_symbol<S>(
    source: &S,
    symbol: &str,
    config: &RuntimeConfig,
    scorer: &SignalScorer,
) -> Result<Evaluated, SymbolError>
where
    S: MarketDataSource + ?Sized,
{
    let fetch = source.fetch_candles(symbol, config.interval, config.candle_count);
    let candles = tokio::time::timeout(Duration::from_millis(config.fetch_timeout_ms), fetch)
        .await
        .map_err(|_| FetchError::Timeout(config.fetch_timeout_ms))??;

    let need = config.indicators.required_history(config.trend_rule);
    if candles.len() < need {
        return Err(SymbolError::InsufficientHistory {
            have: candles.len(),
            need,
        });
    }

    let indicators = IndicatorSet::compute(&candles, &config.indicators);
    let signal = scorer.evaluate(symbol, &candles, &indicators, &config.indicators)?;

    debug!(
        symbol,
        score = signal.score,
        confidence = signal.confidence,
        bias = %signal.bias,
        "symbol scored"
    );

    Ok(Evaluated {
        signal,
        candles,
        indicators,
    })
}

/// Score a single symbol on demand, whether or not it would rank, with the
/// same fetch bound and history checks as a scan.
pub async fn inspect_symbol<S>(
    source: &S,
    symbol: &str,
    config: &RuntimeConfig,
) -> Result<ChartData, SymbolError>
where
    S: MarketDataSource + ?Sized,
{
    let scorer = SignalScorer::new(config.trend_rule, config.suggested_leverage);
    let Evaluated {
        signal,
        candles,
        indicators,
    } = evaluate_symbol(source, symbol, config, &scorer).await?;
    Ok(ChartData::new(config.interval, candles, indicators, signal))
}

/// Symbols to scan this cycle, in scan order.
pub async fn resolve_universe<S>(source: &S, config: &RuntimeConfig) -> Result<Vec<String>, FetchError>
where
    S: MarketDataSource + ?Sized,
{
    let mut symbols = if config.symbols.is_empty() {
        source.list_tradable_symbols(&config.quote_asset).await?
    } else {
        config.symbols.clone()
    };

    if symbols.len() > config.scan_limit {
        info!(
            available = symbols.len(),
            scan_limit = config.scan_limit,
            "universe truncated to scan limit"
        );
        symbols.truncate(config.scan_limit);
    }

    Ok(symbols)
}

// =============================================================================
// Scan cycle
// =============================================================================

/// Run one full scan against `source` with a snapshot of the configuration.
pub async fn run_scan<S>(source: &S, config: &RuntimeConfig) -> ScanOutput
where
    S: MarketDataSource + ?Sized,
{
    let started_at = Utc::now();
    let id = Uuid::new_v4().to_string();

    let (universe, universe_error) = match resolve_universe(source, config).await {
        Ok(symbols) => (symbols, None),
        Err(e) => {
            error!(error = %e, quote_asset = %config.quote_asset, "failed to resolve scan universe");
            (Vec::new(), Some(format!("symbol directory unavailable: {e}")))
        }
    };

    let scorer = &SignalScorer::new(config.trend_rule, config.suggested_leverage);
    let evaluated: Vec<(String, Result<Evaluated, SymbolError>)> = stream::iter(universe.clone())
        .map(|symbol| async move {
            let outcome = evaluate_symbol(source, &symbol, config, scorer).await;
            (symbol, outcome)
        })
        .buffered(config.max_concurrent_fetches.max(1))
        .collect()
        .await;

    let mut outcomes = Vec::with_capacity(evaluated.len());
    let mut series: HashMap<String, (Vec<Candle>, IndicatorSet)> = HashMap::new();

    for (symbol, result) in evaluated {
        let status = match result {
            Ok(Evaluated {
                signal,
                candles,
                indicators,
            }) => {
                series.insert(symbol.clone(), (candles, indicators));
                OutcomeStatus::Signal(signal)
            }
            Err(e) => {
                warn!(symbol = %symbol, kind = e.kind(), error = %e, "symbol skipped");
                OutcomeStatus::Skipped {
                    kind: e.kind().to_string(),
                    reason: e.to_string(),
                }
            }
        };
        outcomes.push(SymbolOutcome { symbol, status });
    }

    let ranked = rank(outcomes.iter().filter_map(SymbolOutcome::signal), &config.ranker());

    let charts = ranked
        .iter()
        .filter_map(|signal| {
            let (candles, indicators) = series.remove(&signal.symbol)?;
            Some((
                signal.symbol.clone(),
                ChartData::new(config.interval, candles, indicators, signal.clone()),
            ))
        })
        .collect();

    let skipped_count = outcomes.iter().filter(|o| o.is_skipped()).count();
    let scanned = outcomes.len() - skipped_count;

    let report = ScanReport {
        id,
        started_at,
        finished_at: Utc::now(),
        interval: config.interval,
        universe_size: universe.len(),
        scanned,
        outcomes,
        ranked,
        skipped_count,
        no_data: scanned == 0,
        error: universe_error,
    };

    info!(
        scan_id = %report.id,
        universe = report.universe_size,
        scanned = report.scanned,
        skipped = report.skipped_count,
        ranked = report.ranked.len(),
        elapsed_ms = (report.finished_at - report.started_at).num_milliseconds(),
        "scan complete"
    );

    ScanOutput { report, charts }
}

// =============================================================================
// Background loop
// =============================================================================

/// Scan immediately, then every `refresh_period_secs` or whenever a refresh is
/// requested through [`AppState::request_refresh`]. Runs forever; scans never
/// overlap because this is the only task that runs them.
pub async fn run_scan_loop(state: Arc<AppState>) {
    loop {
        let config = state.runtime_config.read().clone();

        let output = run_scan(state.source.as_ref(), &config).await;
        state.apply_scan(output);

        let period = Duration::from_secs(config.refresh_period_secs.max(1));
        tokio::select! {
            _ = tokio::time::sleep(period) => {}
            _ = state.refresh.notified() => {
                info!("manual refresh requested");
            }
        }
    }
}
