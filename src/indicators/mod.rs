// Technical indicator primitives shared by the strategies
pub mod atr;
pub mod moving_average;
pub mod rsi;

pub use atr::average_true_range;
pub use moving_average::{ema, sample_std, sma};
pub use rsi::{wilder_rsi, wilder_rsi_series, wilder_rsi_series_capped};
