use std::sync::Arc;

use anyhow::{anyhow, Context, Result};
use rust_decimal::Decimal;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::{BuyMode, Config};
use crate::exchange::{ApiError, ExchangeApi, ExchangeGateway};
use crate::execution::dataset::DatasetWriter;
use crate::execution::price_window::PriceWindow;
use crate::models::{Action, Candle, OrderRequest, Side, Verdict};
use crate::strategy::{aggregate, build_active, Strategy};

/// Where the trader stands for its instrument
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Position {
    Flat,
    Holding,
    StopLossCooldown,
}

/// Mutable trading state for one instrument
///
/// Invariant: `purchase_price != 0.0` exactly while `position == Holding`.
#[derive(Debug, Clone)]
pub struct TradingState {
    pub position: Position,
    pub purchase_price: f64,
    pub stop_loss_multiplier: f64,
}

impl TradingState {
    fn new(stop_loss_percent: f64) -> Self {
        Self {
            position: Position::Flat,
            purchase_price: 0.0,
            stop_loss_multiplier: (100.0 - stop_loss_percent) / 100.0,
        }
    }

    /// Price floor below which a held position is force-sold
    fn stop_loss_floor(&self) -> f64 {
        self.purchase_price * self.stop_loss_multiplier
    }
}

/// Decision loop for a single trading symbol
///
/// Consumes closed candles from its feed, evaluates the active strategies
/// over the rolling window, and drives the Flat / Holding / StopLossCooldown
/// state machine. Every exchange effect goes through the shared gateway.
pub struct InstrumentTrader<C: ExchangeApi> {
    symbol: String,
    base_asset: String,
    quote_asset: String,
    gateway: Arc<ExchangeGateway<C>>,
    strategies: Vec<Box<dyn Strategy>>,
    window: PriceWindow,
    state: TradingState,
    dataset: DatasetWriter,
    buy_mode: BuyMode,
    flat_amount: f64,
    balance_percent: f64,
    buy_after_stop_loss: bool,
    test_mode: bool,
    interval: String,
    window_size: usize,
    // dry-run fills never reach the real balance, so remember the size
    held_quantity: Option<Decimal>,
}

impl<C: ExchangeApi> InstrumentTrader<C> {
    pub fn new(
        symbol: impl Into<String>,
        config: &Config,
        gateway: Arc<ExchangeGateway<C>>,
    ) -> Result<Self> {
        let symbol = symbol.into();
        let (base, quote) = config
            .split_symbol(&symbol)
            .ok_or_else(|| anyhow!("symbol {symbol} has no configured trade currency suffix"))?;
        let (base_asset, quote_asset) = (base.to_string(), quote.to_string());

        let strategies = build_active(&config.strategies);
        let dataset = if config.test_mode {
            DatasetWriter::disabled(&strategies)
        } else {
            DatasetWriter::create(&config.dataset_dir, &symbol, &strategies)?
        };

        Ok(Self {
            symbol,
            base_asset,
            quote_asset,
            gateway,
            strategies,
            window: PriceWindow::new(config.closes_array_size),
            state: TradingState::new(config.stop_loss_percent),
            dataset,
            buy_mode: config.buy.mode,
            flat_amount: config.buy.flat_amount,
            balance_percent: config.buy.balance_percent,
            buy_after_stop_loss: config.buy_after_stop_loss,
            test_mode: config.test_mode,
            interval: config.interval.clone(),
            window_size: config.closes_array_size,
            held_quantity: None,
        })
    }

    /// Backfill the window from historical klines and pick up any position
    /// already sitting on the exchange
    pub async fn initialize(&mut self) -> Result<()> {
        let limit = self.window_size.min(1000) as u32;
        let candles = self
            .gateway
            .klines(&self.symbol, &self.interval, limit)
            .await
            .context("backfilling candle window")?;
        for candle in &candles {
            self.window.push(candle.close, candle.low, candle.high);
        }
        info!(
            symbol = %self.symbol,
            backfilled = candles.len(),
            "candle window backfilled"
        );

        if self
            .gateway
            .has_tradable_balance(&self.base_asset, &self.symbol)
            .await
            .context("querying startup holdings")?
        {
            match self.window.snapshot().last_close() {
                Some(close) => {
                    self.state.position = Position::Holding;
                    self.state.purchase_price = close;
                    info!(
                        symbol = %self.symbol,
                        purchase_price = close,
                        "existing holdings detected, starting in Holding"
                    );
                }
                None => warn!(
                    symbol = %self.symbol,
                    "holdings detected but no backfilled closes, starting Flat"
                ),
            }
        }
        Ok(())
    }

    /// Consume candles until shutdown or the feed closes
    pub async fn run(mut self, mut candles: mpsc::Receiver<Candle>, mut shutdown: watch::Receiver<bool>) {
        loop {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        break;
                    }
                }
                received = candles.recv() => {
                    match received {
                        Some(candle) => self.on_candle(candle).await,
                        None => {
                            warn!(symbol = %self.symbol, "candle feed closed");
                            break;
                        }
                    }
                }
            }
        }
        if let Err(err) = self.dataset.flush() {
            error!(symbol = %self.symbol, error = %err, "dataset flush failed");
        }
        info!(symbol = %self.symbol, "trader stopped");
    }

    /// One tick, with a hard error boundary: a failed tick is logged and
    /// the next candle proceeds against intact window state. A throttle
    /// signal is a soft abort, not an error.
    pub async fn on_candle(&mut self, candle: Candle) {
        if let Err(err) = self.tick(&candle).await {
            if let Some(ApiError::Throttled { .. }) = err.downcast_ref::<ApiError>() {
                warn!(
                    symbol = %self.symbol,
                    close = candle.close,
                    "tick skipped during exchange cool-down"
                );
            } else {
                error!(
                    symbol = %self.symbol,
                    close = candle.close,
                    error = ?err,
                    "tick failed"
                );
            }
        }
    }

    async fn tick(&mut self, candle: &Candle) -> Result<()> {
        self.window.push(candle.close, candle.low, candle.high);
        let snapshot = self.window.snapshot();
        let owns = self.state.position == Position::Holding;

        let verdicts: Vec<Verdict> = self
            .strategies
            .iter()
            .map(|s| s.evaluate(&snapshot, owns))
            .collect();
        let action = aggregate(&verdicts);
        debug!(
            symbol = %self.symbol,
            close = candle.close,
            ?action,
            position = ?self.state.position,
            "tick evaluated"
        );

        self.transition(action, candle.close).await?;
        self.dataset.record(candle.timestamp, candle.close, &verdicts)?;
        Ok(())
    }

    /// State transitions in priority order: buy, sell, stop-loss,
    /// cool-down release
    async fn transition(&mut self, action: Action, close: f64) -> Result<()> {
        match (self.state.position, action) {
            (Position::Flat, Action::Buy) => self.execute_buy(close).await,
            (Position::Holding, Action::Sell) => self.execute_sell(close, false).await,
            (Position::Holding, _) if close <= self.state.stop_loss_floor() => {
                warn!(
                    symbol = %self.symbol,
                    close,
                    purchase_price = self.state.purchase_price,
                    floor = self.state.stop_loss_floor(),
                    "stop-loss triggered"
                );
                self.execute_sell(close, true).await
            }
            (Position::StopLossCooldown, _) => {
                let Some(previous) = self.window.previous_close() else {
                    return Ok(());
                };
                if close >= previous {
                    self.state.position = Position::Flat;
                    info!(symbol = %self.symbol, close, "stop-loss cool-down released");
                    if self.buy_after_stop_loss {
                        return self.execute_buy(close).await;
                    }
                }
                Ok(())
            }
            _ => Ok(()),
        }
    }

    async fn execute_buy(&mut self, close: f64) -> Result<()> {
        let raw = self.buy_quantity(close).await?;
        let raw = Decimal::from_f64_retain(raw).unwrap_or_default();
        let Some(quantity) = self.gateway.normalize(&self.symbol, raw).await? else {
            warn!(symbol = %self.symbol, raw = %raw, "buy quantity below tradable minimum");
            return Ok(());
        };

        let request = OrderRequest::market(Side::Buy, &self.symbol, quantity, self.test_mode);
        let outcome = self.gateway.place_order(&request).await;
        if outcome.success {
            self.state.position = Position::Holding;
            self.state.purchase_price = close;
            self.held_quantity = outcome.filled_quantity.or(Some(quantity));
            info!(
                symbol = %self.symbol,
                close,
                quantity = %quantity,
                "position opened"
            );
        } else if let Some(failure) = outcome.failure {
            warn!(
                symbol = %self.symbol,
                detail = %failure.detail,
                retryable = failure.should_retry,
                "buy failed, staying flat"
            );
        }
        Ok(())
    }

    async fn execute_sell(&mut self, close: f64, stop_loss: bool) -> Result<()> {
        let Some(quantity) = self.sell_quantity().await? else {
            warn!(symbol = %self.symbol, "no tradable balance to sell");
            return Ok(());
        };

        let request = OrderRequest::market(Side::Sell, &self.symbol, quantity, self.test_mode);
        let outcome = self.gateway.place_order(&request).await;
        if outcome.success {
            self.state.position = if stop_loss {
                Position::StopLossCooldown
            } else {
                Position::Flat
            };
            self.state.purchase_price = 0.0;
            self.held_quantity = None;
            info!(
                symbol = %self.symbol,
                close,
                quantity = %quantity,
                stop_loss,
                "position closed"
            );
        } else if let Some(failure) = outcome.failure {
            warn!(
                symbol = %self.symbol,
                detail = %failure.detail,
                retryable = failure.should_retry,
                "sell failed, still holding"
            );
        }
        Ok(())
    }

    /// Raw (pre-normalization) buy quantity per the configured sizing policy
    async fn buy_quantity(&self, close: f64) -> Result<f64> {
        let quantity = match self.buy_mode {
            BuyMode::FlatAmount => self.flat_amount / close,
            BuyMode::BalancePercent => {
                let balance = self
                    .gateway
                    .balance(&self.quote_asset)
                    .await
                    .context("querying quote balance")?;
                balance * self.balance_percent / 100.0 / close
            }
        };
        Ok(quantity)
    }

    /// Entire sellable base balance; dry-run fills fall back to the
    /// remembered position size
    async fn sell_quantity(&self) -> Result<Option<Decimal>> {
        let balance = self
            .gateway
            .balance(&self.base_asset)
            .await
            .context("querying base balance")?;
        let raw = Decimal::from_f64_retain(balance).unwrap_or_default();
        if let Some(quantity) = self.gateway.normalize(&self.symbol, raw).await? {
            return Ok(Some(quantity));
        }
        if self.test_mode {
            return Ok(self.held_quantity);
        }
        Ok(None)
    }

    #[cfg(test)]
    fn state(&self) -> &TradingState {
        &self.state
    }
}
