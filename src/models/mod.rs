use std::fmt;

use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One OHLC price sample from the market feed
///
/// Only candles with `is_closed = true` advance the price window and
/// trigger a decision cycle.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Candle {
    pub close: f64,
    pub low: f64,
    pub high: f64,
    pub is_closed: bool,
    pub timestamp: DateTime<Utc>,
}

/// Per-strategy vote for a single tick
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Decision {
    Buy,
    Hold,
    Sell,
}

impl Decision {
    /// Numeric form used in the dataset log (1 = buy, 0 = hold, -1 = sell)
    pub fn as_i8(&self) -> i8 {
        match self {
            Decision::Buy => 1,
            Decision::Hold => 0,
            Decision::Sell => -1,
        }
    }
}

/// Aggregated action across the active strategy set
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Action {
    Buy,
    Sell,
    None,
}

/// Immutable result of one strategy evaluation
///
/// Metrics carry printable indicator values in dataset column order. A
/// strategy with insufficient history returns `hold_empty()`.
#[derive(Debug, Clone, PartialEq)]
pub struct Verdict {
    pub decision: Decision,
    pub metrics: Vec<(&'static str, String)>,
}

impl Verdict {
    pub fn new(decision: Decision, metrics: Vec<(&'static str, String)>) -> Self {
        Self { decision, metrics }
    }

    /// Neutral verdict for the universal insufficient-history policy
    pub fn hold_empty() -> Self {
        Self {
            decision: Decision::Hold,
            metrics: Vec::new(),
        }
    }
}

/// Order side
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Buy,
    Sell,
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Market order request as handed to the exchange gateway
#[derive(Debug, Clone)]
pub struct OrderRequest {
    pub side: Side,
    pub symbol: String,
    pub quantity: Decimal,
    pub dry_run: bool,
    pub client_order_id: Uuid,
}

impl OrderRequest {
    pub fn market(side: Side, symbol: impl Into<String>, quantity: Decimal, dry_run: bool) -> Self {
        Self {
            side,
            symbol: symbol.into(),
            quantity,
            dry_run,
            client_order_id: Uuid::new_v4(),
        }
    }
}

/// Structured result of an order dispatch
///
/// Exchange-call failures never propagate past the gateway; they land here
/// so the caller can decide whether to retry, hold state, or log-and-continue.
#[derive(Debug, Clone)]
pub struct OrderOutcome {
    pub success: bool,
    pub filled_quantity: Option<Decimal>,
    pub failure: Option<OrderFailure>,
}

impl OrderOutcome {
    pub fn filled(quantity: Decimal) -> Self {
        Self {
            success: true,
            filled_quantity: Some(quantity),
            failure: None,
        }
    }

    pub fn failed(failure: OrderFailure) -> Self {
        Self {
            success: false,
            filled_quantity: None,
            failure: Some(failure),
        }
    }
}

/// Detail for a failed order dispatch
///
/// `should_retry` flags soft failures (rate-limit deferrals) where the caller
/// is expected to try again on the next tick.
#[derive(Debug, Clone)]
pub struct OrderFailure {
    pub side: Side,
    pub quantity: Decimal,
    pub detail: String,
    pub should_retry: bool,
}

/// Exchange trading rules for one symbol
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SymbolRules {
    pub lot_step: Decimal,
    pub min_quantity: Decimal,
    pub quote_precision: u32,
}
