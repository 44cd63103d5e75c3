/// Average True Range
///
/// True Range is the greatest of:
/// - Current High - Current Low
/// - Abs(Current High - Previous Close)
/// - Abs(Current Low - Previous Close)
///
/// Returns the simple mean of the most recent `period` true ranges, or
/// `None` when fewer than `period + 1` samples exist (the first true range
/// needs a previous close).
pub fn average_true_range(
    closes: &[f64],
    lows: &[f64],
    highs: &[f64],
    period: usize,
) -> Option<f64> {
    let len = closes.len();
    if period == 0 || len < period + 1 || lows.len() < len || highs.len() < len {
        return None;
    }

    let mut sum = 0.0;
    for i in len - period..len {
        sum += true_range(highs[i], lows[i], closes[i - 1]);
    }

    Some(sum / period as f64)
}

fn true_range(high: f64, low: f64, prev_close: f64) -> f64 {
    (high - low)
        .max((high - prev_close).abs())
        .max((low - prev_close).abs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_atr_insufficient_data() {
        let prices = vec![100.0; 5];
        assert!(average_true_range(&prices, &prices, &prices, 5).is_none());
    }

    #[test]
    fn test_atr_flat_market_is_zero() {
        let closes = vec![100.0; 8];
        let lows = vec![100.0; 8];
        let highs = vec![100.0; 8];
        assert_relative_eq!(average_true_range(&closes, &lows, &highs, 5).unwrap(), 0.0);
    }

    #[test]
    fn test_atr_constant_range() {
        // Every candle spans exactly 2.0 around an unchanged close
        let closes = vec![100.0; 8];
        let lows = vec![99.0; 8];
        let highs = vec![101.0; 8];
        assert_relative_eq!(average_true_range(&closes, &lows, &highs, 5).unwrap(), 2.0);
    }

    #[test]
    fn test_atr_gap_dominates_range() {
        // Previous close far below the candle makes the gap the true range
        let closes = vec![50.0, 50.0, 100.0];
        let lows = vec![49.0, 49.0, 99.0];
        let highs = vec![51.0, 51.0, 101.0];
        let atr = average_true_range(&closes, &lows, &highs, 2).unwrap();
        // TR1 = max(2, |51-50|, |49-50|) = 2, TR2 = max(2, |101-50|, |99-50|) = 51
        assert_relative_eq!(atr, (2.0 + 51.0) / 2.0);
    }
}
