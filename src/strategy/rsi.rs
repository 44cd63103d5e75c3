use serde::Deserialize;

use crate::indicators::wilder_rsi;
use crate::execution::price_window::WindowSnapshot;
use crate::models::{Decision, Verdict};
use crate::strategy::Strategy;

/// Momentum oscillator over Wilder-smoothed average gain/loss
///
/// BUY when the RSI drops to the oversold threshold and no position is
/// held; SELL when it reaches the overbought threshold while holding.
#[derive(Debug, Clone)]
pub struct RsiStrategy {
    config: RsiConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct RsiConfig {
    pub period: usize,
    pub overbought: f64,
    pub oversold: f64,
}

impl Default for RsiConfig {
    fn default() -> Self {
        Self {
            period: 14,
            overbought: 70.0,
            oversold: 30.0,
        }
    }
}

impl RsiStrategy {
    pub fn new(config: RsiConfig) -> Self {
        Self { config }
    }
}

impl Strategy for RsiStrategy {
    fn name(&self) -> &'static str {
        "RSI"
    }

    fn columns(&self) -> &'static [&'static str] {
        &["RSI Value", "RSI Decision"]
    }

    fn required_samples(&self) -> usize {
        // One full period of deltas
        self.config.period + 1
    }

    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict {
        let Some(rsi) = wilder_rsi(&window.closes, self.config.period) else {
            return Verdict::hold_empty();
        };

        let decision = if rsi >= self.config.overbought && owns_position {
            Decision::Sell
        } else if rsi <= self.config.oversold && !owns_position {
            Decision::Buy
        } else {
            Decision::Hold
        };

        tracing::debug!(rsi, ?decision, "RSI verdict");

        Verdict::new(
            decision,
            vec![
                ("RSI Value", format!("{rsi}")),
                ("RSI Decision", decision.as_i8().to_string()),
            ],
        )
    }
}
