/// Relative Strength Index with Wilder's smoothing
///
/// The seed average gain/loss is a simple mean over the first `period`
/// deltas; every later value uses the exponential recurrence
/// `avg = (avg_prev * (period - 1) + current) / period`.
/// RSI = 100 - 100 / (1 + RS).
///
/// Returns `None` until `period + 1` closes are available. A zero average
/// loss yields RSI 100 rather than a division error.
pub fn wilder_rsi(closes: &[f64], period: usize) -> Option<f64> {
    wilder_rsi_series(closes, period).last().copied()
}

/// Full RSI series for the given closes
///
/// History is truncated to the most recent `3 * period` closes (at most
/// `2 * period` RSI values); older closes have no measurable effect on the
/// smoothed averages.
pub fn wilder_rsi_series(closes: &[f64], period: usize) -> Vec<f64> {
    wilder_rsi_series_capped(closes, period, 2 * period)
}

/// RSI series capped at the most recent `max_values` values (used by
/// StochRSI, whose smoothing passes can need more than `2 * period`)
pub fn wilder_rsi_series_capped(closes: &[f64], period: usize, max_values: usize) -> Vec<f64> {
    if period == 0 || max_values == 0 || closes.len() < period + 1 {
        return Vec::new();
    }

    let keep = period + max_values;
    let closes = if closes.len() > keep {
        &closes[closes.len() - keep..]
    } else {
        closes
    };

    let mut gains = Vec::with_capacity(closes.len() - 1);
    let mut losses = Vec::with_capacity(closes.len() - 1);
    for pair in closes.windows(2) {
        let delta = pair[1] - pair[0];
        if delta >= 0.0 {
            gains.push(delta);
            losses.push(0.0);
        } else {
            gains.push(0.0);
            losses.push(-delta);
        }
    }

    let mut avg_gain: f64 = gains[..period].iter().sum::<f64>() / period as f64;
    let mut avg_loss: f64 = losses[..period].iter().sum::<f64>() / period as f64;

    let mut series = vec![rsi_value(avg_gain, avg_loss)];
    for i in period..gains.len() {
        avg_gain = (avg_gain * (period as f64 - 1.0) + gains[i]) / period as f64;
        avg_loss = (avg_loss * (period as f64 - 1.0) + losses[i]) / period as f64;
        series.push(rsi_value(avg_gain, avg_loss));
    }

    series
}

fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss == 0.0 {
        return 100.0;
    }
    let rs = avg_gain / avg_loss;
    100.0 - (100.0 / (1.0 + rs))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rsi_insufficient_data() {
        // One full period of closes still gives no deltas to smooth over
        let closes = vec![2385.66, 2390.42, 2383.49, 2380.64, 2380.16, 2377.89];
        assert!(wilder_rsi(&closes, 6).is_none());
    }

    #[test]
    fn test_rsi_first_value_after_one_full_period() {
        let closes = vec![
            2385.66, 2390.42, 2383.49, 2380.64, 2380.16, 2377.89, 2388.82,
        ];
        let rsi = wilder_rsi(&closes, 6);
        assert!(rsi.is_some());
        let value = rsi.unwrap();
        assert!(value > 0.0 && value < 100.0);
    }

    #[test]
    fn test_rsi_all_gains() {
        let closes = vec![100.0, 101.0, 102.0, 103.0, 104.0, 105.0];
        assert_eq!(wilder_rsi(&closes, 5), Some(100.0));
    }

    #[test]
    fn test_rsi_bounded() {
        let closes = vec![
            44.0, 44.25, 44.5, 43.75, 44.0, 44.5, 45.0, 45.5, 45.25, 45.5, 46.0, 46.5, 46.25,
            46.0, 46.5,
        ];
        let rsi = wilder_rsi(&closes, 14).unwrap();
        assert!(rsi > 0.0 && rsi < 100.0);
    }

    #[test]
    fn test_rsi_series_grows_with_data() {
        let closes: Vec<f64> = (0..12).map(|i| 100.0 + (i % 3) as f64).collect();
        let series = wilder_rsi_series(&closes, 6);
        // 11 deltas, first RSI at delta index 5
        assert_eq!(series.len(), 6);
    }

    #[test]
    fn test_rsi_series_cap_honors_larger_requests() {
        let closes: Vec<f64> = (0..100).map(|i| 100.0 + (i % 3) as f64).collect();
        assert_eq!(wilder_rsi_series(&closes, 6).len(), 12);
        assert_eq!(wilder_rsi_series_capped(&closes, 6, 20).len(), 20);
    }

    #[test]
    fn test_rsi_truncates_long_history() {
        // A huge spike far in the past must not dominate current values
        let mut closes = vec![1.0e6];
        closes.extend((0..40).map(|i| 100.0 + (i % 5) as f64));
        let rsi = wilder_rsi(&closes, 6).unwrap();
        assert!(rsi > 0.0 && rsi <= 100.0);
    }
}
