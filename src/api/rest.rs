// =============================================================================
// REST API Endpoints — Axum 0.7
// =============================================================================
//
// All JSON endpoints live under `/api/v1/`. Reads are public; the two
// mutating endpoints (config update, manual refresh) require a valid Bearer
// token checked via the `AuthBearer` extractor. `/` serves the dashboard.
//
// CORS is configured permissively so the dashboard can also be opened from
// a file or another origin during development.
// =============================================================================

use std::sync::Arc;

use axum::{
    extract::{Json, Path, State},
    http::StatusCode,
    response::{Html, IntoResponse, Response},
    routing::{get, post},
    Router,
};
use serde::Serialize;
use serde_json::Value;
use tower_http::cors::{Any, CorsLayer};
use tracing::{info, warn};

use crate::api::auth::AuthBearer;
use crate::app_state::AppState;
use crate::error::{FetchError, SymbolError};
use crate::runtime_config::RuntimeConfig;
use crate::scanner::inspect_symbol;

const DASHBOARD_HTML: &str = include_str!("../../static/dashboard.html");

// =============================================================================
// Router construction
// =============================================================================

/// Build the full REST API router with CORS middleware and shared state.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/", get(dashboard))
        // ── Public ──────────────────────────────────────────────────
        .route("/api/v1/health", get(health))
        .route("/api/v1/state", get(full_state))
        .route("/api/v1/signals", get(signals))
        .route("/api/v1/scan", get(latest_scan))
        .route("/api/v1/chart/:symbol", get(chart))
        .route("/api/v1/symbol/:symbol", get(inspect))
        // ── Authenticated on POST ───────────────────────────────────
        .route("/api/v1/config", get(get_config).post(update_config))
        .route("/api/v1/scan/refresh", post(refresh))
        // ── Middleware & State ───────────────────────────────────────
        .layer(cors)
        .with_state(state)
}

fn error_response(status: StatusCode, message: impl Into<String>) -> Response {
    let body = serde_json::json!({ "error": message.into() });
    (status, Json(body)).into_response()
}

// =============================================================================
// Dashboard + health
// =============================================================================

async fn dashboard() -> Html<&'static str> {
    Html(DASHBOARD_HTML)
}

#[derive(Serialize)]
struct HealthResponse {
    status: &'static str,
    state_version: u64,
    server_time: i64,
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(HealthResponse {
        status: "ok",
        state_version: state.current_state_version(),
        server_time: chrono::Utc::now().timestamp_millis(),
    })
}

// =============================================================================
// Scan results
// =============================================================================

async fn full_state(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.build_snapshot())
}

async fn signals(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.ranked_signals())
}

async fn latest_scan(State(state): State<Arc<AppState>>) -> Response {
    match state.latest_scan.read().clone() {
        Some(report) => Json(report).into_response(),
        None => error_response(StatusCode::NOT_FOUND, "no scan has completed yet"),
    }
}

async fn chart(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let symbol = symbol.to_uppercase();
    match state.chart(&symbol) {
        Some(chart) => Json(chart).into_response(),
        None => error_response(
            StatusCode::NOT_FOUND,
            format!("{symbol} is not in the latest ranking"),
        ),
    }
}

/// Score any symbol on demand against the current configuration.
async fn inspect(State(state): State<Arc<AppState>>, Path(symbol): Path<String>) -> Response {
    let symbol = symbol.to_uppercase();
    let config = state.runtime_config.read().clone();

    match inspect_symbol(state.source.as_ref(), &symbol, &config).await {
        Ok(chart) => Json(chart).into_response(),
        Err(e) => {
            let status = match &e {
                SymbolError::Fetch(FetchError::UnknownSymbol(_)) => StatusCode::NOT_FOUND,
                SymbolError::Fetch(FetchError::RateLimited { .. }) => StatusCode::TOO_MANY_REQUESTS,
                SymbolError::Fetch(_) => StatusCode::BAD_GATEWAY,
                SymbolError::InsufficientHistory { .. } | SymbolError::ComputationSkipped { .. } => {
                    StatusCode::UNPROCESSABLE_ENTITY
                }
            };
            warn!(symbol = %symbol, kind = e.kind(), error = %e, "symbol inspection failed");
            let body = serde_json::json!({ "error": e.to_string(), "kind": e.kind() });
            (status, Json(body)).into_response()
        }
    }
}

// =============================================================================
// Configuration
// =============================================================================

async fn get_config(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    Json(state.runtime_config.read().clone())
}

/// Merge `patch` into `base`. Objects merge key by key; anything else
/// replaces the existing value.
fn merge_json(base: &mut Value, patch: Value) {
    match (base, patch) {
        (Value::Object(base), Value::Object(patch)) => {
            for (key, value) in patch {
                merge_json(base.entry(key).or_insert(Value::Null), value);
            }
        }
        (base, patch) => *base = patch,
    }
}

/// Apply a partial JSON update to `current`, returning the validated result.
fn apply_config_patch(current: &RuntimeConfig, patch: Value) -> Result<RuntimeConfig, String> {
    if !patch.is_object() {
        return Err("config update must be a JSON object".to_string());
    }

    let mut merged = serde_json::to_value(current).map_err(|e| e.to_string())?;
    merge_json(&mut merged, patch);

    let updated: RuntimeConfig =
        serde_json::from_value(merged).map_err(|e| format!("invalid config: {e}"))?;
    updated.validate().map_err(|e| e.to_string())?;
    Ok(updated)
}

async fn update_config(
    _auth: AuthBearer,
    State(state): State<Arc<AppState>>,
    Json(patch): Json<Value>,
) -> Response {
    let updated = {
        let mut config = state.runtime_config.write();
        match apply_config_patch(&config, patch) {
            Ok(updated) => {
                *config = updated.clone();
                updated
            }
            Err(e) => {
                warn!(error = %e, "rejected config update");
                return error_response(StatusCode::BAD_REQUEST, e);
            }
        }
    };

    if let Err(e) = updated.save(&state.config_path) {
        warn!(error = %e, "failed to persist runtime config");
        state.push_error(format!("failed to persist runtime config: {e:#}"));
    }

    state.increment_version();
    info!(interval = %updated.interval, top_n = updated.top_n, "runtime config updated via API");

    Json(updated).into_response()
}

// =============================================================================
// Manual refresh
// =============================================================================

async fn refresh(_auth: AuthBearer, State(state): State<Arc<AppState>>) -> impl IntoResponse {
    state.request_refresh();
    info!("manual rescan requested via API");
    (
        StatusCode::ACCEPTED,
        Json(serde_json::json!({ "status": "refresh requested" })),
    )
}

// =============================================================================
// Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;
    use crate::market_data::source::test_support::{series, FakeSource};
    use crate::scanner::{ChartData, OutcomeStatus, ScanOutput, ScanReport, SymbolOutcome};
    use crate::signals::scorer::test_support::sample_signal;
    use axum::body::Body;
    use axum::http::{header, Request};
    use chrono::Utc;
    use std::collections::HashMap;
    use tower::ServiceExt;

    const TOKEN: &str = "test-admin-token";

    fn state() -> Arc<AppState> {
        std::env::set_var(crate::api::auth::ADMIN_TOKEN_ENV, TOKEN);
        let path = std::env::temp_dir().join(format!("screener-api-{}.json", uuid::Uuid::new_v4()));
        let mut source = FakeSource::default();
        source.candles.insert("SOLUSDT".into(), series(200, 100.0, -0.5));
        source.candles.insert("NEWUSDT".into(), series(20, 100.0, 1.0));
        Arc::new(AppState::new(RuntimeConfig::default(), path, Arc::new(source)))
    }

    fn with_scan(state: &Arc<AppState>) {
        let signal = sample_signal("BTCUSDT", 3, 50.0);
        let now = Utc::now();
        let report = ScanReport {
            id: uuid::Uuid::new_v4().to_string(),
            started_at: now,
            finished_at: now,
            interval: Default::default(),
            universe_size: 2,
            scanned: 1,
            outcomes: vec![
                SymbolOutcome {
                    symbol: "BTCUSDT".into(),
                    status: OutcomeStatus::Signal(signal.clone()),
                },
                SymbolOutcome {
                    symbol: "ETHUSDT".into(),
                    status: OutcomeStatus::Skipped {
                        kind: "fetch".into(),
                        reason: "request timed out after 10 ms".into(),
                    },
                },
            ],
            ranked: vec![signal.clone()],
            skipped_count: 1,
            no_data: false,
            error: None,
        };
        let mut charts = HashMap::new();
        charts.insert(
            "BTCUSDT".to_string(),
            ChartData {
                symbol: "BTCUSDT".into(),
                interval: Default::default(),
                candles: Vec::new(),
                indicators: Default::default(),
                levels: signal.levels(),
                signal,
            },
        );
        state.apply_scan(ScanOutput { report, charts });
    }

    async fn send(app: Router, req: Request<Body>) -> (StatusCode, Value) {
        let resp = app.oneshot(req).await.unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body = serde_json::from_slice(&bytes).unwrap_or(Value::Null);
        (status, body)
    }

    fn get(uri: &str) -> Request<Body> {
        Request::get(uri).body(Body::empty()).unwrap()
    }

    fn post_json(uri: &str, token: Option<&str>, body: Value) -> Request<Body> {
        let mut req = Request::post(uri).header(header::CONTENT_TYPE, "application/json");
        if let Some(t) = token {
            req = req.header(header::AUTHORIZATION, format!("Bearer {t}"));
        }
        req.body(Body::from(body.to_string())).unwrap()
    }

    #[tokio::test]
    async fn health_reports_version() {
        let (status, body) = send(router(state()), get("/api/v1/health")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["status"], "ok");
        assert!(body["state_version"].as_u64().is_some());
    }

    #[tokio::test]
    async fn dashboard_is_served() {
        let resp = router(state()).oneshot(get("/")).await.unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let html = String::from_utf8_lossy(&bytes);
        assert!(html.contains("<html"));
        assert!(html.contains("/api/v1/symbol/"));
    }

    #[test]
    fn dashboard_escapes_exchange_text() {
        for raw in ["${o.detail.reason}", "${o.symbol}", "<strong>${sig.symbol}"] {
            assert!(!DASHBOARD_HTML.contains(raw), "unescaped {raw}");
        }
        assert!(DASHBOARD_HTML.contains("esc(o.detail.reason)"));
        assert!(DASHBOARD_HTML.contains("esc(sig.symbol)"));
    }

    #[tokio::test]
    async fn state_before_first_scan_is_no_data() {
        let app_state = state();
        let (status, body) = send(router(app_state.clone()), get("/api/v1/state")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["no_data"], true);

        let (status, _) = send(router(app_state), get("/api/v1/scan")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn signals_scan_and_chart_after_scan() {
        let app_state = state();
        with_scan(&app_state);

        let (status, body) = send(router(app_state.clone()), get("/api/v1/signals")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body[0]["symbol"], "BTCUSDT");
        assert_eq!(body[0]["bias"], "LONG");

        let (_, body) = send(router(app_state.clone()), get("/api/v1/scan")).await;
        assert_eq!(body["skipped_count"], 1);
        assert_eq!(body["outcomes"][1]["status"], "skipped");
        assert_eq!(body["outcomes"][1]["detail"]["kind"], "fetch");

        let (status, body) = send(router(app_state.clone()), get("/api/v1/chart/btcusdt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "BTCUSDT");
        assert!(body["levels"]["stop_loss"].as_f64().is_some());

        let (status, _) = send(router(app_state), get("/api/v1/chart/ETHUSDT")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn inspect_scores_any_symbol_on_demand() {
        let app_state = state();
        with_scan(&app_state);

        let (status, body) = send(router(app_state.clone()), get("/api/v1/symbol/solusdt")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["symbol"], "SOLUSDT");
        assert_eq!(body["signal"]["bias"], "SHORT");
        assert_eq!(body["candles"].as_array().map(Vec::len), Some(200));
        assert!(body["indicators"]["series"]["EMA_fast"].is_array());
        assert!(body["levels"]["take_profit_1"].as_f64().is_some());

        let (status, body) = send(router(app_state.clone()), get("/api/v1/symbol/NEWUSDT")).await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["kind"], "insufficient_history");

        let (status, body) = send(router(app_state), get("/api/v1/symbol/GONEUSDT")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["kind"], "fetch");
    }

    #[tokio::test]
    async fn config_update_requires_token() {
        let app_state = state();
        let patch = serde_json::json!({ "top_n": 5 });

        let (status, _) = send(
            router(app_state.clone()),
            post_json("/api/v1/config", None, patch.clone()),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);

        let (status, _) = send(
            router(app_state.clone()),
            post_json("/api/v1/config", Some("nope"), patch),
        )
        .await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert_eq!(app_state.runtime_config.read().top_n, 3);
    }

    #[tokio::test]
    async fn config_update_merges_validates_and_persists() {
        let app_state = state();
        let before = app_state.current_state_version();
        let patch = serde_json::json!({
            "top_n": 5,
            "interval": "1h",
            "indicators": { "ema_trend": 100 }
        });

        let (status, body) = send(
            router(app_state.clone()),
            post_json("/api/v1/config", Some(TOKEN), patch),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["top_n"], 5);
        assert_eq!(body["indicators"]["ema_trend"], 100);
        assert_eq!(body["indicators"]["ema_fast"], 9);

        {
            let cfg = app_state.runtime_config.read();
            assert_eq!(cfg.top_n, 5);
            assert_eq!(cfg.interval, crate::types::Interval::OneHour);
        }
        assert!(app_state.current_state_version() > before);

        let saved = RuntimeConfig::load(&app_state.config_path).unwrap();
        assert_eq!(saved.top_n, 5);
        let _ = std::fs::remove_file(&app_state.config_path);
    }

    #[tokio::test]
    async fn invalid_config_is_rejected_unchanged() {
        let app_state = state();
        let patch = serde_json::json!({ "indicators": { "ema_fast": 40 } });

        let (status, body) = send(
            router(app_state.clone()),
            post_json("/api/v1/config", Some(TOKEN), patch),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["error"].as_str().unwrap_or("").contains("ema_fast"));
        assert_eq!(app_state.runtime_config.read().indicators.ema_fast, 9);

        let (status, _) = send(
            router(app_state),
            post_json("/api/v1/config", Some(TOKEN), serde_json::json!({ "interval": "7m" })),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
    }

    #[tokio::test]
    async fn refresh_wakes_scan_loop() {
        let app_state = state();
        let (status, _) = send(
            router(app_state.clone()),
            post_json("/api/v1/scan/refresh", Some(TOKEN), Value::Null),
        )
        .await;
        assert_eq!(status, StatusCode::ACCEPTED);

        // The stored permit completes `notified()` immediately.
        tokio::time::timeout(std::time::Duration::from_secs(1), app_state.refresh.notified())
            .await
            .unwrap();
    }

    #[test]
    fn merge_json_is_deep_for_objects() {
        let mut base = serde_json::json!({ "a": 1, "nested": { "x": 1, "y": 2 } });
        merge_json(&mut base, serde_json::json!({ "nested": { "y": 3 }, "b": true }));
        assert_eq!(base, serde_json::json!({ "a": 1, "b": true, "nested": { "x": 1, "y": 3 } }));
    }
}
