// =============================================================================
// Request-Weight Tracker — keeps the scanner under the futures weight budget
// =============================================================================
//
// USD-M futures allow 2400 request weight per minute per IP. A full scan costs
// one exchangeInfo call plus one klines call per symbol, so a tight refresh
// period over a large universe can exhaust the budget.
//
// The tracker reads `X-MBX-USED-WEIGHT-1M` from every response and refuses new
// requests once the hard ceiling would be crossed. A reading older than the
// one-minute window no longer counts, since refused requests never produce a
// fresh header. Counters are atomic so the concurrent fetches of one scan can
// share a tracker lock-free.
// =============================================================================

use std::sync::atomic::{AtomicI64, AtomicU32, Ordering};

use serde::Serialize;
use tracing::{debug, warn};

use crate::error::FetchError;

/// Ceiling at which requests are refused (exchange limit is 2400).
pub const WEIGHT_HARD_LIMIT: u32 = 2000;
/// Soft warning threshold.
const WEIGHT_WARN_THRESHOLD: u32 = 1600;

const USED_WEIGHT_HEADER: &str = "X-MBX-USED-WEIGHT-1M";

/// Length of the exchange's weight window.
const WINDOW_MS: i64 = 60_000;

/// Weight of one klines request. Depends on `limit`.
pub fn klines_weight(limit: u32) -> u32 {
    match limit {
        0..=99 => 1,
        100..=499 => 2,
        500..=1000 => 5,
        _ => 10,
    }
}

/// Weight of one exchangeInfo request.
pub const EXCHANGE_INFO_WEIGHT: u32 = 1;

pub struct RateLimitTracker {
    used_weight_1m: AtomicU32,
    /// Unix millis of the last header reading.
    updated_at_ms: AtomicI64,
    limit: u32,
}

#[derive(Debug, Clone, Serialize)]
pub struct RateLimitSnapshot {
    pub used_weight_1m: u32,
    pub limit: u32,
}

impl RateLimitTracker {
    pub fn new() -> Self {
        Self::with_limit(WEIGHT_HARD_LIMIT)
    }

    pub fn with_limit(limit: u32) -> Self {
        Self {
            used_weight_1m: AtomicU32::new(0),
            updated_at_ms: AtomicI64::new(0),
            limit,
        }
    }

    /// Record the exchange-reported weight from a response.
    pub fn update_from_headers(&self, headers: &reqwest::header::HeaderMap) {
        let Some(w) = headers
            .get(USED_WEIGHT_HEADER)
            .and_then(|v| v.to_str().ok())
            .and_then(|s| s.parse::<u32>().ok())
        else {
            return;
        };

        self.record(w, now_ms());
    }

    fn record(&self, weight: u32, at_ms: i64) {
        self.updated_at_ms.store(at_ms, Ordering::Relaxed);
        let prev = self.used_weight_1m.swap(weight, Ordering::Relaxed);
        if weight >= WEIGHT_WARN_THRESHOLD && prev < WEIGHT_WARN_THRESHOLD {
            warn!(
                used_weight = weight,
                hard_limit = self.limit,
                "request weight crossed warning threshold"
            );
        }
        debug!(used_weight_1m = weight, "request weight updated from header");
    }

    /// Fail with [`FetchError::RateLimited`] if spending `weight` more would
    /// exceed the ceiling.
    pub fn check(&self, weight: u32) -> Result<(), FetchError> {
        self.check_at(weight, now_ms())
    }

    fn check_at(&self, weight: u32, now_ms: i64) -> Result<(), FetchError> {
        let used = self.used_at(now_ms);
        if used.saturating_add(weight) > self.limit {
            warn!(
                current_weight = used,
                requested_weight = weight,
                hard_limit = self.limit,
                "request blocked, would exceed rate limit"
            );
            return Err(FetchError::RateLimited {
                used,
                limit: self.limit,
            });
        }
        Ok(())
    }

    /// Recorded weight, or 0 once the reading has aged out of the window.
    fn used_at(&self, now_ms: i64) -> u32 {
        let updated = self.updated_at_ms.load(Ordering::Relaxed);
        if now_ms - updated >= WINDOW_MS {
            0
        } else {
            self.used_weight_1m.load(Ordering::Relaxed)
        }
    }

    pub fn snapshot(&self) -> RateLimitSnapshot {
        RateLimitSnapshot {
            used_weight_1m: self.used_at(now_ms()),
            limit: self.limit,
        }
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Default for RateLimitTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for RateLimitTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimitTracker")
            .field("used_weight_1m", &self.used_weight_1m.load(Ordering::Relaxed))
            .field("limit", &self.limit)
            .finish()
    }
}
