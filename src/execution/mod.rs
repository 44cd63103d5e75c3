pub mod dataset;
pub mod price_window;
pub mod trader;

pub use dataset::DatasetWriter;
pub use price_window::{PriceWindow, WindowSnapshot};
pub use trader::{InstrumentTrader, Position, TradingState};
