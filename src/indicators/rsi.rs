// =============================================================================
// Relative Strength Index (RSI) — simple rolling averages
// =============================================================================
//
// RSI measures the speed and magnitude of recent price changes to evaluate
// whether an asset is overbought or oversold.
//
// Step 1 — Price deltas from consecutive closes: Δ_i = close_i - close_{i-1}.
// Step 2 — gain_i = max(Δ_i, 0), loss_i = max(-Δ_i, 0).
// Step 3 — avg_gain / avg_loss = simple mean over the trailing `period` deltas.
// Step 4 — RS  = avg_gain / avg_loss
//          RSI = 100 - 100 / (1 + RS)
//
// The scorer reads RSI > 70 as overbought and RSI < 30 as oversold.
// =============================================================================

/// Compute the RSI series for `closes`, aligned one-to-one with the input.
///
/// Index `i` holds the RSI of the `period` deltas ending at `i`, so indices
/// `< period` are `None`.
///
/// # Edge cases
/// - `period == 0` => all `None`
/// - `closes.len() <= period` => all `None`
/// - Average loss of zero (only gains, or no movement) => 100.0
/// - A non-finite result makes that index `None`.
pub fn calculate_rsi(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut result = vec![None; closes.len()];
    if period == 0 || closes.len() <= period {
        return result;
    }

    // deltas[j] is the change into close j + 1.
    let deltas: Vec<f64> = closes.windows(2).map(|w| w[1] - w[0]).collect();
    let period_f = period as f64;

    for i in period..closes.len() {
        let window = &deltas[i - period..i];
        let (sum_gain, sum_loss) = window.iter().fold((0.0_f64, 0.0_f64), |(g, l), &d| {
            (g + d.max(0.0), l + (-d).max(0.0))
        });
        result[i] = rsi_from_averages(sum_gain / period_f, sum_loss / period_f);
    }

    result
}

// =============================================================================
// Internal helpers
// =============================================================================

/// Convert average gain / average loss into an RSI value in [0, 100].
fn rsi_from_averages(avg_gain: f64, avg_loss: f64) -> Option<f64> {
    let rsi = if avg_loss == 0.0 {
        100.0
    } else {
        let rs = avg_gain / avg_loss;
        100.0 - 100.0 / (1.0 + rs)
    };

    rsi.is_finite().then_some(rsi)
}

// =============================================================================
// Unit Tests
// =============================================================================
#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rsi_empty_input() {
        assert!(calculate_rsi(&[], 14).is_empty());
    }

    #[test]
    fn rsi_period_zero() {
        assert!(calculate_rsi(&[1.0, 2.0, 3.0], 0).iter().all(Option::is_none));
    }

    #[test]
    fn rsi_period_at_least_length_is_undefined() {
        let closes: Vec<f64> = (1..=14).map(|x| x as f64).collect();
        let series = calculate_rsi(&closes, 14);
        assert_eq!(series.len(), 14);
        assert!(series.iter().all(Option::is_none));
    }

    #[test]
    fn rsi_leading_gap_matches_period() {
        let closes: Vec<f64> = (0..30).map(|x| 100.0 + (x as f64).sin()).collect();
        let series = calculate_rsi(&closes, 14);
        assert!(series[..14].iter().all(Option::is_none));
        assert!(series[14..].iter().all(Option::is_some));
    }

    #[test]
    fn rsi_all_gains() {
        let closes: Vec<f64> = (1..=30).map(|x| x as f64).collect();
        for v in calculate_rsi(&closes, 14).into_iter().flatten() {
            assert!((v - 100.0).abs() < 1e-10, "expected 100.0, got {v}");
        }
    }

    #[test]
    fn rsi_non_negative_deltas_is_100() {
        // Flat stretches count as non-negative deltas.
        let closes = vec![
            10.0, 10.0, 11.0, 11.0, 12.0, 12.0, 12.0, 13.0, 14.0, 14.0, 15.0, 15.0, 15.0, 16.0,
            16.0,
        ];
        let last = calculate_rsi(&closes, 14).last().copied().flatten().unwrap();
        assert!((last - 100.0).abs() < 1e-10);
    }

    #[test]
    fn rsi_flat_market_is_100() {
        let closes = vec![100.0; 30];
        for v in calculate_rsi(&closes, 14).into_iter().flatten() {
            assert!((v - 100.0).abs() < 1e-10);
        }
    }

    #[test]
    fn rsi_all_losses() {
        let closes: Vec<f64> = (1..=30).rev().map(|x| x as f64).collect();
        for v in calculate_rsi(&closes, 14).into_iter().flatten() {
            assert!(v.abs() < 1e-10, "expected 0.0, got {v}");
        }
    }

    #[test]
    fn rsi_known_value() {
        // Period 2, last two deltas: +2, -1 => avg gain 1, avg loss 0.5 => RS 2.
        let closes = vec![10.0, 12.0, 11.0];
        let rsi = calculate_rsi(&closes, 2)[2].unwrap();
        assert!((rsi - (100.0 - 100.0 / 3.0)).abs() < 1e-10);
    }

    #[test]
    fn rsi_range_check() {
        let closes = vec![
            44.34, 44.09, 44.15, 43.61, 44.33, 44.83, 45.10, 45.42, 45.84, 46.08,
            45.89, 46.03, 44.18, 44.22, 44.57, 43.42, 42.66, 43.13,
        ];
        let series = calculate_rsi(&closes, 14);
        assert!(series.iter().any(Option::is_some));
        for v in series.into_iter().flatten() {
            assert!((0.0..=100.0).contains(&v), "RSI {v} out of range");
        }
    }
}
