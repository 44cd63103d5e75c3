use serde::Deserialize;

use crate::execution::price_window::WindowSnapshot;
use crate::indicators::wilder_rsi_series_capped;
use crate::models::{Decision, Verdict};
use crate::strategy::Strategy;

/// Stochastic RSI: the RSI series normalized against its own rolling
/// min/max over the period, scaled to 0-100, then smoothed twice (a K line
/// of `smooth_k` samples, a D line of `smooth_d` K values). Thresholds are
/// applied to the D line.
///
/// A zero min/max range in a needed window (flat RSI) degrades to the
/// neutral verdict.
#[derive(Debug, Clone)]
pub struct StochRsiStrategy {
    config: StochRsiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct StochRsiConfig {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
    pub smooth_k: usize,
    pub smooth_d: usize,
}

impl Default for StochRsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 80.0,
            oversold: 20.0,
            smooth_k: 3,
            smooth_d: 3,
        }
    }
}

impl StochRsiStrategy {
    pub fn new(config: StochRsiConfig) -> Self {
        Self { config }
    }
}

impl Strategy for StochRsiStrategy {
    fn name(&self) -> &'static str {
        "StochRSI"
    }

    fn columns(&self) -> &'static [&'static str] {
        &["StochRSI Value", "StochRSI Decision"]
    }

    fn required_samples(&self) -> usize {
        // Enough closes for an RSI series covering one normalization window
        // plus both smoothing passes
        2 * self.config.period + self.config.smooth_k + self.config.smooth_d - 2
    }

    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict {
        if window.len() < self.required_samples() {
            return Verdict::hold_empty();
        }

        let period = self.config.period;
        let needed_stoch = self.config.smooth_k + self.config.smooth_d - 1;
        // the oldest normalization window still needs a full period of RSI
        // values, even when the smoothing passes outnumber the period
        let rsi_series = wilder_rsi_series_capped(
            &window.closes,
            period,
            (period + needed_stoch - 1).max(2 * period),
        );
        if rsi_series.len() < period + needed_stoch - 1 {
            return Verdict::hold_empty();
        }

        // Normalize only the windows the smoothing passes will consume
        let mut stoch = Vec::with_capacity(needed_stoch);
        for end in rsi_series.len() - needed_stoch..rsi_series.len() {
            let slice = &rsi_series[end + 1 - period..=end];
            let min = slice.iter().copied().fold(f64::INFINITY, f64::min);
            let max = slice.iter().copied().fold(f64::NEG_INFINITY, f64::max);
            if max - min == 0.0 {
                return Verdict::hold_empty();
            }
            stoch.push((slice[slice.len() - 1] - min) / (max - min) * 100.0);
        }

        let k_line: Vec<f64> = stoch
            .windows(self.config.smooth_k)
            .map(|w| w.iter().sum::<f64>() / w.len() as f64)
            .collect();
        let Some(value) = k_line
            .windows(self.config.smooth_d)
            .map(|w| w.iter().sum::<f64>() / w.len() as f64)
            .last()
        else {
            return Verdict::hold_empty();
        };

        tracing::debug!(stoch_rsi = value, "StochRSI D line");

        let decision = if value >= self.config.overbought && owns_position {
            Decision::Sell
        } else if value <= self.config.oversold && !owns_position {
            Decision::Buy
        } else {
            Decision::Hold
        };

        Verdict::new(
            decision,
            vec![
                ("StochRSI Value", format!("{value}")),
                ("StochRSI Decision", decision.as_i8().to_string()),
            ],
        )
    }
}
