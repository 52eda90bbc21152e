// =============================================================================
// Exponential Moving Average (EMA)
// =============================================================================
//
// EMA gives more weight to recent prices, making it more responsive to new
// information than the Simple Moving Average (SMA).
//
// Formula:
//   multiplier = 2 / (period + 1)
//   EMA_0      = x_0
//   EMA_t      = x_t * multiplier + EMA_{t-1} * (1 - multiplier)
//
// The recursion is seeded with the first value itself (no SMA warm-up), so the
// output is defined from index 0. Every EMA in the screener (fast, slow, trend
// and the MACD lines) uses this same rule so their comparisons line up.
// =============================================================================

/// Compute the EMA of `values` for look-back `period`, aligned one-to-one with
/// the input.
///
/// # Edge cases
/// - `period == 0` => all `None`
/// - `values.len() < period` => all `None` (not enough history to trust it)
/// - A non-finite input makes that index and every later index `None`.
pub fn calculate_ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let wrapped: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    ema_of_series(&wrapped, period)
}

/// EMA over an already-aligned series that may contain undefined values.
///
/// The recursion is seeded at the first defined value; leading `None`s stay
/// `None`. Once the series turns undefined (or non-finite) after the seed,
/// every later output is `None` as well.
pub fn ema_of_series(values: &[Option<f64>], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; values.len()];
    if period == 0 || values.len() < period {
        return result;
    }

    let multiplier = 2.0 / (period + 1) as f64;
    let mut prev: Option<f64> = None;

    for (i, value) in values.iter().enumerate() {
        let next = match (*value, prev) {
            (Some(x), _) if !x.is_finite() => break,
            (Some(x), None) => x,
            (Some(x), Some(p)) => x * multiplier + p * (1.0 - multiplier),
            (None, None) => continue,
            (None, Some(_)) => break,
        };
        if !next.is_finite() {
            break;
        }
        result[i] = Some(next);
        prev = Some(next);
    }

    result
}

/// Most recent defined value of an aligned series at its last index.
pub fn last_defined(series: &[Option<f64>]) -> Option<f64> {
    series.last().copied().flatten()
}
