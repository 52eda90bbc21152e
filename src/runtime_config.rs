// =============================================================================
// Runtime Configuration — Hot-reloadable screener settings with atomic save
// =============================================================================
//
// Every tunable parameter of the scan lives here so the screener can be
// reconfigured from the dashboard without a restart. The scan loop reads a
// fresh copy at the start of every cycle.
//
// Persistence uses an atomic tmp + rename pattern to prevent corruption on
// crash.  All fields carry `#[serde(default)]` so that adding new fields
// never breaks loading an older config file.
//
// =============================================================================

use std::path::Path;

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::indicators::IndicatorParams;
use crate::signals::RankerConfig;
use crate::types::{Interval, RankingKey, TrendRule};

/// Largest `limit` the kline endpoint accepts.
pub const MAX_CANDLE_COUNT: u32 = 1500;

// =============================================================================
// Default-value helpers (required by serde `default = "..."` attribute)
// =============================================================================

fn default_candle_count() -> u32 {
    200
}

fn default_scan_limit() -> usize {
    20
}

fn default_quote_asset() -> String {
    "USDT".to_string()
}

fn default_confidence_threshold() -> f64 {
    0.6
}

fn default_top_n() -> usize {
    3
}

fn default_refresh_period_secs() -> u64 {
    60
}

fn default_fetch_timeout_ms() -> u64 {
    10_000
}

fn default_max_concurrent_fetches() -> usize {
    4
}

fn default_suggested_leverage() -> u32 {
    10
}

// =============================================================================
// RuntimeConfig
// =============================================================================

/// Top-level runtime configuration for the screener.
///
/// Every field has a serde default so that older JSON files missing new fields
/// will still deserialise correctly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuntimeConfig {
    // --- Universe ------------------------------------------------------------

    /// Kline interval requested for every symbol.
    #[serde(default)]
    pub interval: Interval,

    /// Candles fetched per symbol per scan.
    #[serde(default = "default_candle_count")]
    pub candle_count: u32,

    /// Maximum number of symbols taken from the directory per scan.
    #[serde(default = "default_scan_limit")]
    pub scan_limit: usize,

    /// Quote asset used to build the universe from the symbol directory.
    #[serde(default = "default_quote_asset")]
    pub quote_asset: String,

    /// Explicit symbol list. When non-empty it replaces the directory lookup
    /// (still truncated to `scan_limit`).
    #[serde(default)]
    pub symbols: Vec<String>,

    // --- Scoring -------------------------------------------------------------

    /// Which EMA relationship feeds the trend term.
    #[serde(default)]
    pub trend_rule: TrendRule,

    /// Indicator look-back periods.
    #[serde(default)]
    pub indicators: IndicatorParams,

    /// Leverage suggestion attached to directional signals.
    #[serde(default = "default_suggested_leverage")]
    pub suggested_leverage: u32,

    // --- Ranking -------------------------------------------------------------

    /// Minimum directional strength for a result to be ranked.
    #[serde(default = "default_confidence_threshold")]
    pub confidence_threshold: f64,

    /// Rank Neutral results as well.
    #[serde(default)]
    pub include_neutral: bool,

    /// Only rank results whose latest volume is above the series mean.
    #[serde(default)]
    pub require_volume_confirmation: bool,

    /// Ordering key for the ranked list.
    #[serde(default)]
    pub ranking_key: RankingKey,

    /// Length of the ranked list.
    #[serde(default = "default_top_n")]
    pub top_n: usize,

    // --- Scheduling ----------------------------------------------------------

    /// Seconds between scheduled scans.
    #[serde(default = "default_refresh_period_secs")]
    pub refresh_period_secs: u64,

    /// Per-symbol bound on the candle fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,

    /// Candle fetches in flight at once. 1 scans strictly sequentially.
    #[serde(default = "default_max_concurrent_fetches")]
    pub max_concurrent_fetches: usize,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            interval: Interval::default(),
            candle_count: default_candle_count(),
            scan_limit: default_scan_limit(),
            quote_asset: default_quote_asset(),
            symbols: Vec::new(),
            trend_rule: TrendRule::default(),
            indicators: IndicatorParams::default(),
            suggested_leverage: default_suggested_leverage(),
            confidence_threshold: default_confidence_threshold(),
            include_neutral: false,
            require_volume_confirmation: false,
            ranking_key: RankingKey::default(),
            top_n: default_top_n(),
            refresh_period_secs: default_refresh_period_secs(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
            max_concurrent_fetches: default_max_concurrent_fetches(),
        }
    }
}

impl RuntimeConfig {
    /// Load configuration from a JSON file at `path`.
    ///
    /// If the file does not exist, returns an error so the caller can fall
    /// back to defaults with a warning.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read runtime config from {}", path.display()))?;

        let config: Self = serde_json::from_str(&content)
            .with_context(|| format!("failed to parse runtime config from {}", path.display()))?;

        config
            .validate()
            .with_context(|| format!("invalid runtime config in {}", path.display()))?;

        info!(
            path = %path.display(),
            interval = %config.interval,
            scan_limit = config.scan_limit,
            "runtime config loaded"
        );

        Ok(config)
    }

    /// Persist the current configuration to `path` using an atomic write
    /// (write to `.tmp`, then rename).
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();

        let content = serde_json::to_string_pretty(self)
            .context("failed to serialise runtime config to JSON")?;

        let tmp_path = path.with_extension("json.tmp");

        std::fs::write(&tmp_path, &content)
            .with_context(|| format!("failed to write tmp config to {}", tmp_path.display()))?;

        std::fs::rename(&tmp_path, path)
            .with_context(|| format!("failed to rename tmp config to {}", path.display()))?;

        info!(path = %path.display(), "runtime config saved (atomic)");
        Ok(())
    }

    /// Reject settings the pipeline cannot run with.
    pub fn validate(&self) -> Result<()> {
        let p = &self.indicators;

        if self.candle_count == 0 || self.candle_count > MAX_CANDLE_COUNT {
            bail!("candle_count must be within 1..={MAX_CANDLE_COUNT}, got {}", self.candle_count);
        }
        if self.scan_limit == 0 {
            bail!("scan_limit must be at least 1");
        }
        if self.quote_asset.trim().is_empty() {
            bail!("quote_asset must not be empty");
        }
        if [p.ema_fast, p.ema_slow, p.ema_trend, p.rsi_period, p.macd_fast, p.macd_slow, p.macd_signal]
            .contains(&0)
        {
            bail!("indicator periods must be non-zero");
        }
        if p.ema_fast >= p.ema_slow {
            bail!("ema_fast ({}) must be shorter than ema_slow ({})", p.ema_fast, p.ema_slow);
        }
        if p.macd_fast >= p.macd_slow {
            bail!("macd_fast ({}) must be shorter than macd_slow ({})", p.macd_fast, p.macd_slow);
        }
        let need = p.required_history(self.trend_rule);
        if (self.candle_count as usize) < need {
            bail!(
                "candle_count ({}) is below the {need} candles the indicators need",
                self.candle_count
            );
        }
        if !(0.0..=1.0).contains(&self.confidence_threshold) {
            bail!("confidence_threshold must be within [0, 1], got {}", self.confidence_threshold);
        }
        if self.top_n == 0 {
            bail!("top_n must be at least 1");
        }
        if self.refresh_period_secs == 0 {
            bail!("refresh_period_secs must be at least 1");
        }
        if self.fetch_timeout_ms == 0 {
            bail!("fetch_timeout_ms must be at least 1");
        }
        if self.max_concurrent_fetches == 0 {
            bail!("max_concurrent_fetches must be at least 1");
        }

        Ok(())
    }

    /// Ranking policy derived from this configuration.
    pub fn ranker(&self) -> RankerConfig {
        RankerConfig {
            confidence_threshold: self.confidence_threshold,
            include_neutral: self.include_neutral,
            require_volume_confirmation: self.require_volume_confirmation,
            ranking_key: self.ranking_key,
            top_n: self.top_n,
        }
    }
}
