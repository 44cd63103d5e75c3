use serde::Deserialize;

use crate::execution::price_window::WindowSnapshot;
use crate::indicators::{sample_std, sma};
use crate::models::{Decision, Verdict};
use crate::strategy::Strategy;

/// Volatility bands around a simple moving average
///
/// Upper band = SMA + 2σ, lower band = SMA - 2σ over the configured period.
/// SELL when the close breaks above the upper band (scaled by
/// `upper_margin`) while holding; BUY when it breaks below the lower band
/// while flat. With zero variance the bands collapse to the price and no
/// breakout is possible.
#[derive(Debug, Clone)]
pub struct BollingerStrategy {
    config: BollingerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct BollingerConfig {
    pub period: usize,
    pub upper_margin: f64,
}

impl Default for BollingerConfig {
    fn default() -> Self {
        Self {
            period: 20,
            upper_margin: 1.0,
        }
    }
}

impl BollingerStrategy {
    pub fn new(config: BollingerConfig) -> Self {
        Self { config }
    }
}

impl Strategy for BollingerStrategy {
    fn name(&self) -> &'static str {
        "Bollinger"
    }

    fn columns(&self) -> &'static [&'static str] {
        &["Bollinger High", "Bollinger Low", "Bollinger Decision"]
    }

    fn required_samples(&self) -> usize {
        self.config.period + 1
    }

    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict {
        if window.len() < self.required_samples() {
            return Verdict::hold_empty();
        }

        let period = self.config.period;
        let (Some(mean), Some(std), Some(close)) = (
            sma(&window.closes, period),
            sample_std(&window.closes, period),
            window.last_close(),
        ) else {
            return Verdict::hold_empty();
        };

        let upper = mean + 2.0 * std;
        let lower = mean - 2.0 * std;

        tracing::debug!(upper, lower, close, "Bollinger bands");

        let decision = if close > upper * self.config.upper_margin && owns_position {
            Decision::Sell
        } else if close < lower && !owns_position {
            Decision::Buy
        } else {
            Decision::Hold
        };

        Verdict::new(
            decision,
            vec![
                ("Bollinger High", format!("{upper}")),
                ("Bollinger Low", format!("{lower}")),
                ("Bollinger Decision", decision.as_i8().to_string()),
            ],
        )
    }
}
