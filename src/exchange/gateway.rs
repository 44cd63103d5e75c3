use std::collections::HashMap;
use std::future::Future;

use rust_decimal::Decimal;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::exchange::api::{ApiError, ExchangeApi};
use crate::exchange::cooldown::CooldownGate;
use crate::models::{Candle, OrderFailure, OrderOutcome, OrderRequest, SymbolRules};

/// Order dispatch front-end shared by all traders
///
/// Wraps the raw client with the process-wide throttle gate, symbol-rule
/// caching, and quantity normalization. Exchange failures are converted to
/// `OrderOutcome` soft/hard failures instead of propagating.
pub struct ExchangeGateway<C: ExchangeApi> {
    pub(crate) client: C,
    gate: CooldownGate,
    rules_cache: RwLock<HashMap<String, SymbolRules>>,
}

impl<C: ExchangeApi> ExchangeGateway<C> {
    pub fn new(client: C, gate: CooldownGate) -> Self {
        Self {
            client,
            gate,
            rules_cache: RwLock::new(HashMap::new()),
        }
    }

    /// Rate-limit protocol applied to every exchange call
    ///
    /// An active cool-down is waited out and the call soft-aborted as
    /// `Throttled` without touching the exchange; a throttle response trips
    /// the shared gate before propagating. The inner future is only polled
    /// when the gate is clear.
    async fn guarded<T>(
        &self,
        what: &'static str,
        call: impl Future<Output = Result<T, ApiError>>,
    ) -> Result<T, ApiError> {
        if let Some(wait) = self.gate.deferral().await {
            warn!(
                call = what,
                wait_secs = wait.as_secs(),
                "call deferred by exchange cool-down"
            );
            tokio::time::sleep(wait).await;
            return Err(ApiError::Throttled { retry_after: wait });
        }

        match call.await {
            Err(ApiError::Throttled { retry_after }) => {
                warn!(
                    call = what,
                    retry_after_secs = retry_after.as_secs(),
                    "exchange throttled, tripping cool-down gate"
                );
                self.gate.trip(retry_after).await;
                Err(ApiError::Throttled { retry_after })
            }
            other => other,
        }
    }

    /// Dispatch a market order
    ///
    /// Throttle signals (including an active cool-down) come back as a
    /// retryable failure; the caller re-evaluates on its next tick rather
    /// than firing a stale order.
    pub async fn place_order(&self, request: &OrderRequest) -> OrderOutcome {
        match self.guarded("order", self.client.place_order(request)).await {
            Ok(filled) => {
                info!(
                    symbol = %request.symbol,
                    side = %request.side,
                    quantity = %request.quantity,
                    filled = %filled,
                    dry_run = request.dry_run,
                    "order executed"
                );
                OrderOutcome::filled(filled)
            }
            Err(ApiError::Throttled { retry_after }) => OrderOutcome::failed(OrderFailure {
                side: request.side,
                quantity: request.quantity,
                detail: format!("throttled for {}s", retry_after.as_secs()),
                should_retry: true,
            }),
            Err(err) => {
                warn!(
                    symbol = %request.symbol,
                    side = %request.side,
                    error = %err,
                    "order failed"
                );
                OrderOutcome::failed(OrderFailure {
                    side: request.side,
                    quantity: request.quantity,
                    detail: err.to_string(),
                    should_retry: false,
                })
            }
        }
    }

    pub async fn balance(&self, asset: &str) -> Result<f64, ApiError> {
        self.guarded("balance", self.client.asset_balance(asset)).await
    }

    pub async fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> Result<Vec<Candle>, ApiError> {
        self.guarded("klines", self.client.klines(symbol, interval, limit))
            .await
    }

    /// Trading rules for a symbol, fetched once and cached
    pub async fn rules(&self, symbol: &str) -> Result<SymbolRules, ApiError> {
        if let Some(rules) = self.rules_cache.read().await.get(symbol) {
            return Ok(rules.clone());
        }
        let rules = self
            .guarded("exchange info", self.client.symbol_rules(symbol))
            .await?;
        debug!(symbol, ?rules, "cached trading rules");
        self.rules_cache
            .write()
            .await
            .insert(symbol.to_string(), rules.clone());
        Ok(rules)
    }

    /// Normalize a raw quantity against the symbol's trading rules
    ///
    /// `None` means the quantity is too small to trade.
    pub async fn normalize(
        &self,
        symbol: &str,
        quantity: Decimal,
    ) -> Result<Option<Decimal>, ApiError> {
        let rules = self.rules(symbol).await?;
        Ok(normalize_quantity(quantity, &rules))
    }

    /// Whether the free balance of `asset` amounts to a tradable position
    pub async fn has_tradable_balance(&self, asset: &str, symbol: &str) -> Result<bool, ApiError> {
        let balance = self.balance(asset).await?;
        let quantity = Decimal::from_f64_retain(balance).unwrap_or_default();
        Ok(self.normalize(symbol, quantity).await?.is_some())
    }
}

/// Floor a quantity to the symbol's lot step, then round down to the quote
/// precision. Quantities below the exchange minimum are untradable.
///
/// The result is a fixed point: normalizing it again returns it unchanged.
pub fn normalize_quantity(quantity: Decimal, rules: &SymbolRules) -> Option<Decimal> {
    if rules.lot_step.is_zero() || quantity <= Decimal::ZERO {
        return None;
    }
    let steps = (quantity / rules.lot_step).floor();
    let stepped = (steps * rules.lot_step).trunc_with_scale(rules.quote_precision);
    if stepped < rules.min_quantity || stepped.is_zero() {
        return None;
    }
    Some(stepped.normalize())
}
