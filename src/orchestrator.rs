use std::sync::Arc;

use anyhow::{bail, Result};
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tracing::{error, info, warn};

use crate::config::Config;
use crate::exchange::{BinanceClient, CooldownGate, ExchangeApi, ExchangeGateway};
use crate::execution::InstrumentTrader;
use crate::feed::spawn_kline_feed;

const CANDLE_CHANNEL_CAPACITY: usize = 64;

/// Build the shared exchange stack and run one feed + trader pair per symbol
pub async fn run(config: Config, shutdown: watch::Receiver<bool>) -> Result<()> {
    let client = BinanceClient::new(
        Some(config.exchange.rest_url.clone()),
        config.exchange.api_key.clone(),
    );
    let gateway = Arc::new(ExchangeGateway::new(client, CooldownGate::default()));
    run_with_gateway(config, gateway, shutdown).await
}

/// Orchestrate traders against an already-built gateway
///
/// Symbols beyond `max_symbols` are dropped; each instrument's startup is
/// staggered so the backfill requests do not land on the exchange at once.
/// A symbol that fails to initialize is skipped, not fatal.
pub async fn run_with_gateway<C: ExchangeApi + 'static>(
    config: Config,
    gateway: Arc<ExchangeGateway<C>>,
    mut shutdown: watch::Receiver<bool>,
) -> Result<()> {
    let symbols: Vec<String> = config
        .symbols
        .iter()
        .take(config.max_symbols)
        .cloned()
        .collect();
    if symbols.len() < config.symbols.len() {
        warn!(
            configured = config.symbols.len(),
            max = config.max_symbols,
            "symbol list capped"
        );
    }

    let stagger = Duration::from_secs(config.startup_stagger_secs);
    let reconnect_delay = Duration::from_secs(config.reconnect_delay_secs);

    let mut tasks = Vec::new();
    for (index, symbol) in symbols.iter().enumerate() {
        if index > 0 {
            tokio::select! {
                biased;
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
                _ = tokio::time::sleep(stagger) => {}
            }
        }
        if *shutdown.borrow() {
            info!(started = tasks.len(), "shutdown requested during startup");
            break;
        }

        let mut trader = InstrumentTrader::new(symbol.as_str(), &config, gateway.clone())?;
        if let Err(err) = trader.initialize().await {
            error!(symbol = %symbol, error = ?err, "initialization failed, skipping symbol");
            continue;
        }

        let (candle_tx, candle_rx) = mpsc::channel(CANDLE_CHANNEL_CAPACITY);
        let feed_task = spawn_kline_feed(
            config.exchange.ws_url.clone(),
            symbol.clone(),
            config.interval.clone(),
            reconnect_delay,
            candle_tx,
            shutdown.clone(),
        );
        let trader_task = tokio::spawn(trader.run(candle_rx, shutdown.clone()));

        info!(symbol = %symbol, "instrument started");
        tasks.push((feed_task, trader_task));
    }

    if tasks.is_empty() {
        if *shutdown.borrow() {
            return Ok(());
        }
        bail!("no instruments started");
    }
    info!(instruments = tasks.len(), "orchestrator running");

    for (feed_task, trader_task) in tasks {
        let (feed_result, trader_result) = tokio::join!(feed_task, trader_task);
        if let Err(err) = feed_result {
            error!(error = %err, "feed task panicked");
        }
        if let Err(err) = trader_result {
            error!(error = %err, "trader task panicked");
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::exchange::ApiError;
    use crate::models::{Candle, OrderRequest, SymbolRules};
    use rust_decimal::Decimal;
    use std::future::Future;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingApi {
        klines_calls: AtomicUsize,
    }

    impl ExchangeApi for CountingApi {
        fn place_order(
            &self,
            request: &OrderRequest,
        ) -> impl Future<Output = Result<Decimal, ApiError>> + Send {
            let quantity = request.quantity;
            async move { Ok(quantity) }
        }

        fn asset_balance(&self, _asset: &str) -> impl Future<Output = Result<f64, ApiError>> + Send {
            async move { Ok(0.0) }
        }

        fn symbol_rules(
            &self,
            _symbol: &str,
        ) -> impl Future<Output = Result<SymbolRules, ApiError>> + Send {
            async move {
                Ok(SymbolRules {
                    lot_step: Decimal::ONE,
                    min_quantity: Decimal::ONE,
                    quote_precision: 8,
                })
            }
        }

        fn klines(
            &self,
            _symbol: &str,
            _interval: &str,
            _limit: u32,
        ) -> impl Future<Output = Result<Vec<Candle>, ApiError>> + Send {
            async move {
                self.klines_calls.fetch_add(1, Ordering::SeqCst);
                Ok(Vec::new())
            }
        }
    }

    #[tokio::test]
    async fn test_shutdown_before_startup_spawns_no_instruments() {
        let config = Config {
            test_mode: true,
            symbols: vec![
                "ETHGBP".to_string(),
                "SOLGBP".to_string(),
                "ADAGBP".to_string(),
            ],
            startup_stagger_secs: 60,
            ..Config::default()
        };
        let gateway = Arc::new(ExchangeGateway::new(
            CountingApi::default(),
            CooldownGate::default(),
        ));

        let (shutdown_tx, shutdown_rx) = watch::channel(false);
        shutdown_tx.send(true).unwrap();

        run_with_gateway(config, gateway.clone(), shutdown_rx)
            .await
            .unwrap();

        // no backfill ever hit the exchange
        assert_eq!(gateway.client.klines_calls.load(Ordering::SeqCst), 0);
    }
}
