/// Simple Moving Average over the most recent `period` prices
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    let sum: f64 = prices.iter().rev().take(period).sum();
    Some(sum / period as f64)
}

/// Exponential Moving Average, seeded by the SMA of the first `period`
/// prices, then smoothed with factor `2 / (period + 1)`
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let seed: f64 = prices[..period].iter().sum::<f64>() / period as f64;

    let mut value = seed;
    for price in &prices[period..] {
        value = (price - value) * multiplier + value;
    }

    Some(value)
}

/// Sample standard deviation (ddof = 1) over the most recent `period` prices
pub fn sample_std(prices: &[f64], period: usize) -> Option<f64> {
    if period < 2 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let mean = window.iter().sum::<f64>() / period as f64;
    let variance =
        window.iter().map(|p| (p - mean) * (p - mean)).sum::<f64>() / (period as f64 - 1.0);

    Some(variance.sqrt())
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_sma() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0];
        assert_eq!(sma(&prices, 5), Some(104.0));
    }

    #[test]
    fn test_sma_uses_most_recent_window() {
        let prices = vec![1.0, 100.0, 102.0, 104.0];
        assert_eq!(sma(&prices, 3), Some(102.0));
    }

    #[test]
    fn test_sma_insufficient_data() {
        assert!(sma(&[100.0, 102.0], 5).is_none());
    }

    #[test]
    fn test_ema_tracks_above_seed_in_uptrend() {
        let prices = vec![100.0, 102.0, 104.0, 106.0, 108.0, 110.0];
        let value = ema(&prices, 5).unwrap();
        assert!(value > 104.0);
    }

    #[test]
    fn test_ema_of_constant_prices_is_the_price() {
        let prices = vec![50.0; 12];
        assert_relative_eq!(ema(&prices, 5).unwrap(), 50.0);
    }

    #[test]
    fn test_sample_std_zero_for_constant_prices() {
        let prices = vec![10.0; 25];
        assert_relative_eq!(sample_std(&prices, 20).unwrap(), 0.0);
    }

    #[test]
    fn test_sample_std_known_value() {
        // [2, 4, 4, 4, 5, 5, 7, 9]: sample variance = 32/7
        let prices = vec![2.0, 4.0, 4.0, 4.0, 5.0, 5.0, 7.0, 9.0];
        let std = sample_std(&prices, 8).unwrap();
        assert_relative_eq!(std, (32.0f64 / 7.0).sqrt(), max_relative = 1e-12);
    }
}
