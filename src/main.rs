// =============================================================================
// Kline Screener — Main Entry Point
// =============================================================================
//
// Scans USD-M futures pairs on a fixed cadence, scores each one with an
// EMA / RSI / MACD heuristic and serves the top signals (with charts) over a
// small REST API and dashboard. Read-only: no orders are ever placed.
// =============================================================================

// ── Module declarations ──────────────────────────────────────────────────────
mod api;
mod app_state;
mod binance;
mod error;
mod indicators;
mod market_data;
mod runtime_config;
mod scanner;
mod signals;
mod types;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;

use crate::app_state::AppState;
use crate::binance::client::DEFAULT_BASE_URL;
use crate::binance::BinanceClient;
use crate::market_data::MarketDataSource;
use crate::runtime_config::RuntimeConfig;

const DEFAULT_CONFIG_PATH: &str = "screener_config.json";
const DEFAULT_BIND_ADDR: &str = "0.0.0.0:3001";

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // ── 1. Environment & config ──────────────────────────────────────────
    let _ = dotenv::dotenv();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("╔══════════════════════════════════════════════════════════╗");
    info!("║        Kline Screener — Starting Up                      ║");
    info!("╚══════════════════════════════════════════════════════════╝");

    let config_path = PathBuf::from(
        std::env::var("SCREENER_CONFIG").unwrap_or_else(|_| DEFAULT_CONFIG_PATH.into()),
    );

    let mut config = RuntimeConfig::load(&config_path).unwrap_or_else(|e| {
        warn!(error = %e, "Failed to load config, using defaults");
        RuntimeConfig::default()
    });

    // Override symbols from env if available.
    if let Ok(syms) = std::env::var("SCREENER_SYMBOLS") {
        config.symbols = syms
            .split(',')
            .map(|s| s.trim().to_uppercase())
            .filter(|s| !s.is_empty())
            .collect();
    }

    if let Ok(raw) = std::env::var("SCREENER_INTERVAL") {
        match raw.parse() {
            Ok(interval) => config.interval = interval,
            Err(e) => warn!(error = %e, "Ignoring SCREENER_INTERVAL"),
        }
    }

    config.validate().context("invalid screener configuration")?;

    if config.symbols.is_empty() {
        info!(
            quote_asset = %config.quote_asset,
            scan_limit = config.scan_limit,
            "Scanning the exchange symbol directory"
        );
    } else {
        info!(symbols = ?config.symbols, "Scanning configured symbols");
    }
    info!(
        interval = %config.interval,
        refresh_period_secs = config.refresh_period_secs,
        trend_rule = %config.trend_rule,
        ranking_key = %config.ranking_key,
        top_n = config.top_n,
        "Screener configuration"
    );

    if std::env::var(api::auth::ADMIN_TOKEN_ENV).map_or(true, |t| t.is_empty()) {
        warn!(
            "{} is not set: config updates and manual refresh are disabled",
            api::auth::ADMIN_TOKEN_ENV
        );
    }

    // ── 2. Build exchange client ─────────────────────────────────────────
    let base_url = std::env::var("SCREENER_BASE_URL").unwrap_or_else(|_| DEFAULT_BASE_URL.into());
    let client = BinanceClient::new(base_url).context("failed to build exchange client")?;
    let source: Arc<dyn MarketDataSource> = Arc::new(client);

    // ── 3. Build shared state ────────────────────────────────────────────
    let state = Arc::new(AppState::new(config, config_path.clone(), source));

    // ── 4. Start the API server ──────────────────────────────────────────
    let bind_addr =
        std::env::var("SCREENER_BIND_ADDR").unwrap_or_else(|_| DEFAULT_BIND_ADDR.into());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind API server to {bind_addr}"))?;
    info!(addr = %bind_addr, "API server listening");

    let app = api::rest::router(state.clone());
    tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app).await {
            error!(error = %e, "API server failed");
        }
    });

    // ── 5. Scan loop ─────────────────────────────────────────────────────
    tokio::spawn(scanner::run_scan_loop(state.clone()));

    info!("Screener running. Press Ctrl+C to stop.");

    // ── 6. Graceful shutdown ─────────────────────────────────────────────
    tokio::signal::ctrl_c().await?;
    warn!("Shutdown signal received — stopping gracefully");

    let config = state.runtime_config.read().clone();
    if let Err(e) = config.save(&config_path) {
        error!(error = %e, "Failed to save runtime config on shutdown");
    }

    info!("Kline Screener shut down complete.");
    Ok(())
}
