// =============================================================================
// Moving Average Convergence Divergence (MACD)
// =============================================================================
//
//   MACD      = EMA(close, fast) - EMA(close, slow)
//   Signal    = EMA(MACD, signal)
//   Histogram = MACD - Signal
//
// All three EMAs follow the first-value-seeded rule in `ema.rs`.
// =============================================================================

use super::ema::{calculate_ema, ema_of_series};

/// Aligned MACD output, one slot per input close.
#[derive(Debug, Clone, PartialEq)]
pub struct MacdSeries {
    pub macd: Vec<Option<f64>>,
    pub signal: Vec<Option<f64>>,
    pub histogram: Vec<Option<f64>>,
}

/// Compute the MACD family for `closes`.
///
/// If either EMA period exceeds the history the whole family is `None`.
pub fn calculate_macd(closes: &[f64], fast: usize, slow: usize, signal: usize) -> MacdSeries {
    let fast_ema = calculate_ema(closes, fast);
    let slow_ema = calculate_ema(closes, slow);

    let macd: Vec<Option<f64>> = fast_ema
        .iter()
        .zip(&slow_ema)
        .map(|(f, s)| Some(f.as_ref()? - s.as_ref()?))
        .collect();

    let signal_line = ema_of_series(&macd, signal);

    let histogram = macd
        .iter()
        .zip(&signal_line)
        .map(|(m, s)| Some(m.as_ref()? - s.as_ref()?))
        .collect();

    MacdSeries {
        macd,
        signal: signal_line,
        histogram,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn macd_zero_on_flat_series() {
        let out = calculate_macd(&[50.0; 60], 12, 26, 9);
        for (m, s) in out.macd.iter().zip(&out.signal) {
            assert!(m.unwrap().abs() < 1e-12);
            assert!(s.unwrap().abs() < 1e-12);
        }
    }

    #[test]
    fn macd_positive_in_uptrend() {
        let closes: Vec<f64> = (1..=100).map(|x| x as f64).collect();
        let out = calculate_macd(&closes, 12, 26, 9);
        let m = out.macd.last().copied().flatten().unwrap();
        let s = out.signal.last().copied().flatten().unwrap();
        assert!(m > 0.0);
        // In a steady uptrend the MACD line leads its own signal line.
        assert!(m > s);
        let h = out.histogram.last().copied().flatten().unwrap();
        assert!((h - (m - s)).abs() < 1e-12);
    }

    #[test]
    fn macd_matches_component_emas() {
        let closes: Vec<f64> = (0..40).map(|x| 100.0 + (x as f64 * 0.3).cos() * 5.0).collect();
        let out = calculate_macd(&closes, 12, 26, 9);
        let fast = calculate_ema(&closes, 12);
        let slow = calculate_ema(&closes, 26);
        for i in 0..closes.len() {
            let expected = fast[i].unwrap() - slow[i].unwrap();
            assert!((out.macd[i].unwrap() - expected).abs() < 1e-12);
        }
    }

    #[test]
    fn macd_undefined_when_slow_exceeds_history() {
        let closes: Vec<f64> = (1..=20).map(|x| x as f64).collect();
        let out = calculate_macd(&closes, 12, 26, 9);
        assert_eq!(out.macd.len(), 20);
        assert!(out.macd.iter().all(Option::is_none));
        assert!(out.signal.iter().all(Option::is_none));
        assert!(out.histogram.iter().all(Option::is_none));
    }
}
