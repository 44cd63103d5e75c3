pub mod api;
pub mod cooldown;
pub mod gateway;

pub use api::{ApiError, BinanceClient, ExchangeApi};
pub use cooldown::CooldownGate;
pub use gateway::{normalize_quantity, ExchangeGateway};
