use serde::Deserialize;

use crate::execution::price_window::WindowSnapshot;
use crate::indicators::{average_true_range, ema};
use crate::models::{Decision, Verdict};
use crate::strategy::Strategy;

/// Keltner channel breakout
///
/// Middle line = EMA(close); bands = middle ± multiplier × ATR. BUY when
/// the close reaches the lower band while flat, SELL when it reaches the
/// upper band while holding.
#[derive(Debug, Clone)]
pub struct KeltnerStrategy {
    config: KeltnerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct KeltnerConfig {
    pub ema_period: usize,
    pub atr_period: usize,
    pub atr_multiplier: f64,
}

impl Default for KeltnerConfig {
    fn default() -> Self {
        Self {
            ema_period: 20,
            atr_period: 10,
            atr_multiplier: 2.0,
        }
    }
}

impl KeltnerStrategy {
    pub fn new(config: KeltnerConfig) -> Self {
        Self { config }
    }
}

impl Strategy for KeltnerStrategy {
    fn name(&self) -> &'static str {
        "Keltner"
    }

    fn columns(&self) -> &'static [&'static str] {
        &[
            "Keltner Middle",
            "Keltner Upper",
            "Keltner Lower",
            "Keltner Decision",
        ]
    }

    fn required_samples(&self) -> usize {
        self.config.ema_period.max(self.config.atr_period) + 1
    }

    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict {
        if window.len() < self.required_samples() {
            return Verdict::hold_empty();
        }

        let (Some(middle), Some(atr), Some(close)) = (
            ema(&window.closes, self.config.ema_period),
            average_true_range(
                &window.closes,
                &window.lows,
                &window.highs,
                self.config.atr_period,
            ),
            window.last_close(),
        ) else {
            return Verdict::hold_empty();
        };

        let upper = middle + self.config.atr_multiplier * atr;
        let lower = middle - self.config.atr_multiplier * atr;

        tracing::debug!(middle, upper, lower, close, "Keltner channel");

        let decision = if owns_position && close >= upper {
            Decision::Sell
        } else if !owns_position && close <= lower {
            Decision::Buy
        } else {
            Decision::Hold
        };

        Verdict::new(
            decision,
            vec![
                ("Keltner Middle", format!("{middle}")),
                ("Keltner Upper", format!("{upper}")),
                ("Keltner Lower", format!("{lower}")),
                ("Keltner Decision", decision.as_i8().to_string()),
            ],
        )
    }
}
