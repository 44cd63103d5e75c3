use serde::Deserialize;

use crate::execution::price_window::WindowSnapshot;
use crate::indicators::ema;
use crate::models::{Decision, Verdict};
use crate::strategy::Strategy;

/// Trend-following pairwise EMA comparison (e.g. 50-period vs 100-period)
///
/// While flat, BUY when the short EMA sits at or above the long EMA.
/// While holding, SELL once the short EMA drops below the long EMA.
#[derive(Debug, Clone)]
pub struct EmaCrossStrategy {
    config: EmaCrossConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct EmaCrossConfig {
    pub short_period: usize,
    pub long_period: usize,
}

impl Default for EmaCrossConfig {
    fn default() -> Self {
        Self {
            short_period: 50,
            long_period: 100,
        }
    }
}

impl EmaCrossStrategy {
    pub fn new(config: EmaCrossConfig) -> Self {
        Self { config }
    }
}

impl Strategy for EmaCrossStrategy {
    fn name(&self) -> &'static str {
        "EMA Cross"
    }

    fn columns(&self) -> &'static [&'static str] {
        &["EMA Short", "EMA Long", "EMA Decision"]
    }

    fn required_samples(&self) -> usize {
        self.config.long_period + 1
    }

    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict {
        if window.len() < self.required_samples() {
            return Verdict::hold_empty();
        }

        let (Some(short), Some(long)) = (
            ema(&window.closes, self.config.short_period),
            ema(&window.closes, self.config.long_period),
        ) else {
            return Verdict::hold_empty();
        };

        tracing::debug!(short, long, "EMA cross");

        let decision = if !owns_position && short >= long {
            Decision::Buy
        } else if owns_position && short < long {
            Decision::Sell
        } else {
            Decision::Hold
        };

        Verdict::new(
            decision,
            vec![
                ("EMA Short", format!("{short}")),
                ("EMA Long", format!("{long}")),
                ("EMA Decision", decision.as_i8().to_string()),
            ],
        )
    }
}
