// =============================================================================
// Central Application State — Kline Screener
// =============================================================================
//
// The single source of truth shared by the scan loop and the REST API. The
// scan loop is the only writer of scan results; the API reads snapshots and
// mutates the runtime configuration.
//
// Thread safety:
//   - Atomic counters for lock-free version tracking.
//   - parking_lot::RwLock for all mutable shared collections.
//   - tokio::sync::Notify to wake the scan loop for a manual refresh.
// =============================================================================

use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use tokio::sync::Notify;

use crate::market_data::MarketDataSource;
use crate::runtime_config::RuntimeConfig;
use crate::scanner::{ChartData, OutcomeStatus, ScanOutput, ScanReport, SymbolOutcome};
use crate::signals::SignalResult;
use crate::types::{Interval, RankingKey, TrendRule};

// =============================================================================
// Error Record
// =============================================================================

/// A recorded error event for the dashboard error log.
#[derive(Debug, Clone, Serialize)]
pub struct ErrorRecord {
    pub message: String,
    /// Symbol the error concerns, when it is per-symbol.
    pub symbol: Option<String>,
    /// ISO 8601 timestamp.
    pub at: String,
}

// =============================================================================
// AppState
// =============================================================================

/// Maximum number of recent errors to retain.
const MAX_RECENT_ERRORS: usize = 50;

/// Central application state shared across all async tasks via `Arc<AppState>`.
pub struct AppState {
    // ── Version tracking ────────────────────────────────────────────────
    /// Incremented on every completed scan and every config change. The
    /// dashboard polls it to detect fresh data.
    pub state_version: AtomicU64,

    // ── Configuration ───────────────────────────────────────────────────
    pub runtime_config: Arc<RwLock<RuntimeConfig>>,
    /// Where config changes made through the API are persisted.
    pub config_path: PathBuf,

    // ── Scan results ────────────────────────────────────────────────────
    pub latest_scan: RwLock<Option<ScanReport>>,
    pub charts: RwLock<HashMap<String, ChartData>>,
    pub scan_count: AtomicU64,

    // ── Market data ─────────────────────────────────────────────────────
    /// Shared by the scan loop and on-demand symbol inspection.
    pub source: Arc<dyn MarketDataSource>,

    // ── Scan loop control ───────────────────────────────────────────────
    pub refresh: Notify,

    // ── Error Log ───────────────────────────────────────────────────────
    pub recent_errors: RwLock<Vec<ErrorRecord>>,

    // ── Timing ──────────────────────────────────────────────────────────
    pub start_time: std::time::Instant,
}

impl AppState {
    pub fn new(
        config: RuntimeConfig,
        config_path: impl Into<PathBuf>,
        source: Arc<dyn MarketDataSource>,
    ) -> Self {
        Self {
            state_version: AtomicU64::new(1),
            runtime_config: Arc::new(RwLock::new(config)),
            config_path: config_path.into(),
            latest_scan: RwLock::new(None),
            charts: RwLock::new(HashMap::new()),
            scan_count: AtomicU64::new(0),
            source,
            refresh: Notify::new(),
            recent_errors: RwLock::new(Vec::new()),
            start_time: std::time::Instant::now(),
        }
    }

    // ── Version Management ──────────────────────────────────────────────

    pub fn increment_version(&self) -> u64 {
        self.state_version.fetch_add(1, Ordering::SeqCst)
    }

    pub fn current_state_version(&self) -> u64 {
        self.state_version.load(Ordering::SeqCst)
    }

    // ── Error Logging ───────────────────────────────────────────────────

    /// Record an error message. The ring buffer is capped at
    /// [`MAX_RECENT_ERRORS`]; oldest entries are evicted first.
    pub fn push_error(&self, msg: String) {
        self.push_error_for(msg, None);
    }

    pub fn push_error_for(&self, msg: String, symbol: Option<String>) {
        let record = ErrorRecord {
            message: msg,
            symbol,
            at: Utc::now().to_rfc3339(),
        };

        let mut errors = self.recent_errors.write();
        errors.push(record);
        while errors.len() > MAX_RECENT_ERRORS {
            errors.remove(0);
        }
    }

    // ── Scan results ────────────────────────────────────────────────────

    /// Publish a finished scan: replaces the latest report and chart data,
    /// logs universe and per-symbol failures, and bumps the version.
    pub fn apply_scan(&self, output: ScanOutput) {
        let ScanOutput { report, charts } = output;

        if let Some(err) = &report.error {
            self.push_error(err.clone());
        }
        for outcome in &report.outcomes {
            if let OutcomeStatus::Skipped { reason, .. } = &outcome.status {
                self.push_error_for(reason.clone(), Some(outcome.symbol.clone()));
            }
        }

        *self.charts.write() = charts;
        *self.latest_scan.write() = Some(report);
        self.scan_count.fetch_add(1, Ordering::Relaxed);
        self.increment_version();
    }

    /// Ranked signals of the latest scan (empty before the first scan).
    pub fn ranked_signals(&self) -> Vec<SignalResult> {
        self.latest_scan
            .read()
            .as_ref()
            .map(|r| r.ranked.clone())
            .unwrap_or_default()
    }

    pub fn chart(&self, symbol: &str) -> Option<ChartData> {
        self.charts.read().get(symbol).cloned()
    }

    /// Wake the scan loop. A request made while a scan is running starts the
    /// next scan as soon as the current one finishes.
    pub fn request_refresh(&self) {
        self.refresh.notify_one();
    }

    // ── Snapshot Builder ────────────────────────────────────────────────

    /// Payload of `GET /api/v1/state`.
    pub fn build_snapshot(&self) -> StateSnapshot {
        let now = Utc::now();
        let config = self.runtime_config.read();
        let scan = self.latest_scan.read();

        let runtime_config = RuntimeConfigSummary {
            interval: config.interval,
            quote_asset: config.quote_asset.clone(),
            scan_limit: config.scan_limit,
            symbols: config.symbols.clone(),
            confidence_threshold: config.confidence_threshold,
            top_n: config.top_n,
            ranking_key: config.ranking_key,
            trend_rule: config.trend_rule,
            refresh_period_secs: config.refresh_period_secs,
        };

        let last_scan = scan.as_ref().map(|r| ScanSummary {
            id: r.id.clone(),
            started_at: r.started_at,
            finished_at: r.finished_at,
            interval: r.interval,
            universe_size: r.universe_size,
            scanned: r.scanned,
            skipped_count: r.skipped_count,
            error: r.error.clone(),
        });

        let (ranked, skipped) = scan
            .as_ref()
            .map(|r| {
                let skipped: Vec<SymbolOutcome> =
                    r.outcomes.iter().filter(|o| o.is_skipped()).cloned().collect();
                (r.ranked.clone(), skipped)
            })
            .unwrap_or_default();

        StateSnapshot {
            state_version: self.current_state_version(),
            server_time: now.timestamp_millis(),
            uptime_secs: self.start_time.elapsed().as_secs(),
            scan_count: self.scan_count.load(Ordering::Relaxed),
            // Nothing to show until a scan has produced a signal.
            no_data: scan.as_ref().map_or(true, |r| r.no_data),
            runtime_config,
            last_scan,
            ranked,
            skipped,
            recent_errors: self.recent_errors.read().clone(),
        }
    }
}

// =============================================================================
// Serialisable snapshot types
// =============================================================================

#[derive(Debug, Clone, Serialize)]
pub struct StateSnapshot {
    pub state_version: u64,
    pub server_time: i64,
    pub uptime_secs: u64,
    pub scan_count: u64,
    pub no_data: bool,
    pub runtime_config: RuntimeConfigSummary,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_scan: Option<ScanSummary>,
    pub ranked: Vec<SignalResult>,
    pub skipped: Vec<SymbolOutcome>,
    pub recent_errors: Vec<ErrorRecord>,
}

/// Summary of runtime config for the dashboard.
#[derive(Debug, Clone, Serialize)]
pub struct RuntimeConfigSummary {
    pub interval: Interval,
    pub quote_asset: String,
    pub scan_limit: usize,
    pub symbols: Vec<String>,
    pub confidence_threshold: f64,
    pub top_n: usize,
    pub ranking_key: RankingKey,
    pub trend_rule: TrendRule,
    pub refresh_period_secs: u64,
}

/// Latest scan report without the per-symbol payloads.
#[derive(Debug, Clone, Serialize)]
pub struct ScanSummary {
    pub id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub interval: Interval,
    pub universe_size: usize,
    pub scanned: usize,
    pub skipped_count: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::source::test_support::FakeSource;

    fn state() -> AppState {
        AppState::new(RuntimeConfig::default(), "unused.json", Arc::new(FakeSource::default()))
    }

    fn report(outcomes: Vec<SymbolOutcome>, error: Option<String>) -> ScanReport {
        let now = Utc::now();
        let skipped_count = outcomes.iter().filter(|o| o.is_skipped()).count();
        ScanReport {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: now,
            interval: Interval::FifteenMinutes,
            universe_size: outcomes.len(),
            scanned: outcomes.len() - skipped_count,
            no_data: outcomes.len() == skipped_count,
            outcomes,
            ranked: Vec::new(),
            skipped_count,
            error,
        }
    }

    fn skipped(symbol: &str) -> SymbolOutcome {
        SymbolOutcome {
            symbol: symbol.to_string(),
            status: OutcomeStatus::Skipped {
                kind: "fetch".into(),
                reason: "request timed out after 10 ms".into(),
            },
        }
    }

    #[test]
    fn snapshot_before_first_scan_is_no_data() {
        let state = state();
        let snap = state.build_snapshot();
        assert!(snap.no_data);
        assert!(snap.last_scan.is_none());
        assert!(snap.ranked.is_empty());
        assert_eq!(snap.scan_count, 0);
    }

    #[test]
    fn apply_scan_publishes_report_and_bumps_version() {
        let state = state();
        let before = state.current_state_version();

        state.apply_scan(ScanOutput {
            report: report(vec![skipped("AUSDT")], None),
            charts: HashMap::new(),
        });

        let snap = state.build_snapshot();
        assert!(snap.state_version > before);
        assert_eq!(snap.scan_count, 1);
        assert_eq!(snap.skipped.len(), 1);
        assert_eq!(snap.recent_errors.len(), 1);
        assert_eq!(snap.recent_errors[0].symbol.as_deref(), Some("AUSDT"));
        assert_eq!(snap.last_scan.map(|s| s.skipped_count), Some(1));
    }

    #[test]
    fn snapshot_serialises_scan_id_as_string() {
        let state = state();
        let report = report(vec![skipped("AUSDT")], None);
        let id = report.id.clone();
        state.apply_scan(ScanOutput {
            report,
            charts: HashMap::new(),
        });

        let json = serde_json::to_value(state.build_snapshot()).unwrap();
        assert_eq!(json["last_scan"]["id"], id.as_str());
        assert_eq!(json["skipped"][0]["detail"]["kind"], "fetch");
    }

    #[test]
    fn universe_error_lands_in_error_log() {
        let state = state();
        state.apply_scan(ScanOutput {
            report: report(Vec::new(), Some("symbol directory unavailable".into())),
            charts: HashMap::new(),
        });
        let snap = state.build_snapshot();
        assert!(snap.no_data);
        assert_eq!(snap.recent_errors[0].message, "symbol directory unavailable");
    }

    #[test]
    fn error_log_is_capped() {
        let state = state();
        for i in 0..(MAX_RECENT_ERRORS + 10) {
            state.push_error(format!("error {i}"));
        }
        let errors = state.recent_errors.read();
        assert_eq!(errors.len(), MAX_RECENT_ERRORS);
        assert_eq!(errors[0].message, "error 10");
    }
}
