// Indicator strategy framework
pub mod aggregator;
pub mod bollinger;
pub mod ema_cross;
pub mod keltner;
pub mod rsi;
pub mod stoch_rsi;

use serde::{Deserialize, Serialize};

use crate::config::StrategiesConfig;
use crate::execution::price_window::WindowSnapshot;
use crate::models::Verdict;

pub use aggregator::aggregate;
pub use bollinger::{BollingerConfig, BollingerStrategy};
pub use ema_cross::{EmaCrossConfig, EmaCrossStrategy};
pub use keltner::{KeltnerConfig, KeltnerStrategy};
pub use rsi::{RsiConfig, RsiStrategy};
pub use stoch_rsi::{StochRsiConfig, StochRsiStrategy};

/// Base trait for all indicator strategies
///
/// `evaluate` must be side-effect-free apart from tracing. With fewer
/// samples than the strategy requires it returns HOLD with empty metrics;
/// that edge-case policy is universal across variants.
pub trait Strategy: Send + Sync {
    /// Strategy name for logging
    fn name(&self) -> &'static str;

    /// Dataset header cells, in the order the verdict metrics are emitted
    fn columns(&self) -> &'static [&'static str];

    /// Minimum window length before a non-empty verdict is possible
    fn required_samples(&self) -> usize;

    /// Produce a verdict for the current window
    fn evaluate(&self, window: &WindowSnapshot, owns_position: bool) -> Verdict;
}

/// Closed set of strategy variants, dispatched by enum rather than by name
/// lookup
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StrategyKind {
    Rsi,
    Bollinger,
    EmaCross,
    Keltner,
    StochRsi,
}

impl StrategyKind {
    pub fn build(&self, config: &StrategiesConfig) -> Box<dyn Strategy> {
        match self {
            StrategyKind::Rsi => Box::new(RsiStrategy::new(config.rsi.clone())),
            StrategyKind::Bollinger => Box::new(BollingerStrategy::new(config.bollinger.clone())),
            StrategyKind::EmaCross => Box::new(EmaCrossStrategy::new(config.ema_cross.clone())),
            StrategyKind::Keltner => Box::new(KeltnerStrategy::new(config.keltner.clone())),
            StrategyKind::StochRsi => Box::new(StochRsiStrategy::new(config.stoch_rsi.clone())),
        }
    }
}

/// Instantiate every active strategy from the validated configuration
pub fn build_active(config: &StrategiesConfig) -> Vec<Box<dyn Strategy>> {
    config
        .active
        .iter()
        .map(|kind| kind.build(config))
        .collect()
}
