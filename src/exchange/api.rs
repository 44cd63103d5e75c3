use std::future::Future;
use std::num::NonZeroU32;
use std::sync::Arc;

use chrono::{TimeZone, Utc};
use governor::{Quota, RateLimiter};
use reqwest::{Client, Response, StatusCode};
use rust_decimal::Decimal;
use serde::Deserialize;
use thiserror::Error;
use tokio::time::Duration;

use crate::models::{Candle, OrderRequest, Side, SymbolRules};

const DEFAULT_REST_URL: &str = "https://api.binance.com";
const RATE_LIMIT_RPM: u32 = 1100; // spot REST weight budget, with headroom
const DEFAULT_RETRY_AFTER_SECS: u64 = 60;

// Type alias for the rate limiter to simplify signatures
type DirectRateLimiter = RateLimiter<
    governor::state::direct::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Failures surfaced by the raw exchange client
///
/// Throttling is its own variant so the gateway can trip the shared
/// cool-down instead of treating it as an ordinary error.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("exchange signalled throttling, retry after {retry_after:?}")]
    Throttled { retry_after: Duration },
    #[error("exchange rejected the request: {reason}")]
    Rejected { reason: String },
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("malformed exchange payload: {0}")]
    Payload(String),
}

/// Raw exchange trading API
///
/// The boundary the gateway builds on; test doubles stand in for the HTTP
/// client here. Futures are `Send` so traders can run on spawned tasks.
pub trait ExchangeApi: Send + Sync {
    /// Place a market order; returns the executed quantity
    fn place_order(
        &self,
        request: &OrderRequest,
    ) -> impl Future<Output = Result<Decimal, ApiError>> + Send;

    /// Free balance for one asset
    fn asset_balance(&self, asset: &str) -> impl Future<Output = Result<f64, ApiError>> + Send;

    /// Trading rules (lot step, minimum quantity, quote precision)
    fn symbol_rules(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<SymbolRules, ApiError>> + Send;

    /// Most recent closed candles, oldest first
    fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Candle>, ApiError>> + Send;
}

/// Binance-style spot REST client
///
/// This struct is cloneable to allow sharing across async tasks; all clones
/// share the same client-side rate limiter.
#[derive(Clone)]
pub struct BinanceClient {
    client: Client,
    base_url: String,
    api_key: String,
    rate_limiter: Arc<DirectRateLimiter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderAck {
    client_order_id: Option<String>,
    executed_qty: Option<String>,
}

#[derive(Debug, Deserialize)]
struct AccountInfo {
    balances: Vec<AccountBalance>,
}

#[derive(Debug, Deserialize)]
struct AccountBalance {
    asset: String,
    free: String,
}

#[derive(Debug, Deserialize)]
struct ExchangeInfo {
    symbols: Vec<SymbolInfo>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolInfo {
    quote_precision: u32,
    filters: Vec<SymbolFilter>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SymbolFilter {
    filter_type: String,
    step_size: Option<String>,
    min_qty: Option<String>,
}

impl BinanceClient {
    pub fn new(base_url: Option<String>, api_key: String) -> Self {
        let quota = Quota::per_minute(NonZeroU32::new(RATE_LIMIT_RPM).expect("nonzero quota"));
        Self {
            client: Client::new(),
            base_url: base_url.unwrap_or_else(|| DEFAULT_REST_URL.to_string()),
            api_key,
            rate_limiter: Arc::new(RateLimiter::direct(quota)),
        }
    }

    async fn get(&self, path_and_query: &str) -> Result<Response, ApiError> {
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .get(format!("{}{}", self.base_url, path_and_query))
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::check_status(response).await
    }

    async fn post(&self, path_and_query: &str) -> Result<Response, ApiError> {
        self.rate_limiter.until_ready().await;
        let response = self
            .client
            .post(format!("{}{}", self.base_url, path_and_query))
            .header("X-MBX-APIKEY", &self.api_key)
            .send()
            .await?;
        Self::check_status(response).await
    }

    /// Map throttle statuses to `Throttled` (with the signalled delay) and
    /// any other non-success status to `Rejected`
    async fn check_status(response: Response) -> Result<Response, ApiError> {
        let status = response.status();
        if status == StatusCode::TOO_MANY_REQUESTS || status == StatusCode::IM_A_TEAPOT {
            let retry_after = response
                .headers()
                .get("Retry-After")
                .and_then(|v| v.to_str().ok())
                .and_then(|v| v.parse::<u64>().ok())
                .unwrap_or(DEFAULT_RETRY_AFTER_SECS);
            return Err(ApiError::Throttled {
                retry_after: Duration::from_secs(retry_after),
            });
        }
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ApiError::Rejected {
                reason: format!("{status}: {body}"),
            });
        }
        Ok(response)
    }
}

impl ExchangeApi for BinanceClient {
    fn place_order(
        &self,
        request: &OrderRequest,
    ) -> impl Future<Output = Result<Decimal, ApiError>> + Send {
        async move {
            let side = match request.side {
                Side::Buy => "BUY",
                Side::Sell => "SELL",
            };
            let endpoint = if request.dry_run {
                "/api/v3/order/test"
            } else {
                "/api/v3/order"
            };
            let path = format!(
                "{}?symbol={}&side={}&type=MARKET&quantity={}&newClientOrderId={}",
                endpoint, request.symbol, side, request.quantity, request.client_order_id
            );

            let response = self.post(&path).await?;

            // The test-order endpoint acknowledges with an empty body; the
            // requested quantity is assumed filled.
            if request.dry_run {
                return Ok(request.quantity);
            }

            let ack: OrderAck = response
                .json()
                .await
                .map_err(|e| ApiError::Payload(e.to_string()))?;
            if ack.client_order_id.is_none() {
                return Err(ApiError::Rejected {
                    reason: "order not acknowledged".to_string(),
                });
            }

            let executed = ack
                .executed_qty
                .as_deref()
                .unwrap_or_default()
                .parse::<Decimal>()
                .unwrap_or(request.quantity);
            Ok(executed)
        }
    }

    fn asset_balance(&self, asset: &str) -> impl Future<Output = Result<f64, ApiError>> + Send {
        async move {
            let response = self.get("/api/v3/account").await?;
            let info: AccountInfo = response
                .json()
                .await
                .map_err(|e| ApiError::Payload(e.to_string()))?;

            let balance = info
                .balances
                .iter()
                .find(|b| b.asset == asset)
                .map(|b| b.free.parse::<f64>())
                .transpose()
                .map_err(|e| ApiError::Payload(format!("balance for {asset}: {e}")))?
                .unwrap_or(0.0);
            Ok(balance)
        }
    }

    fn symbol_rules(
        &self,
        symbol: &str,
    ) -> impl Future<Output = Result<SymbolRules, ApiError>> + Send {
        async move {
            let response = self
                .get(&format!("/api/v3/exchangeInfo?symbol={symbol}"))
                .await?;
            let info: ExchangeInfo = response
                .json()
                .await
                .map_err(|e| ApiError::Payload(e.to_string()))?;

            let symbol_info = info
                .symbols
                .into_iter()
                .next()
                .ok_or_else(|| ApiError::Payload(format!("no trading rules for {symbol}")))?;

            let lot_filter = symbol_info
                .filters
                .iter()
                .find(|f| f.filter_type == "LOT_SIZE")
                .ok_or_else(|| ApiError::Payload(format!("no LOT_SIZE filter for {symbol}")))?;

            let lot_step = lot_filter
                .step_size
                .as_deref()
                .unwrap_or_default()
                .parse::<Decimal>()
                .map_err(|e| ApiError::Payload(format!("stepSize: {e}")))?;
            let min_quantity = lot_filter
                .min_qty
                .as_deref()
                .unwrap_or_default()
                .parse::<Decimal>()
                .map_err(|e| ApiError::Payload(format!("minQty: {e}")))?;

            Ok(SymbolRules {
                lot_step,
                min_quantity,
                quote_precision: symbol_info.quote_precision,
            })
        }
    }

    fn klines(
        &self,
        symbol: &str,
        interval: &str,
        limit: u32,
    ) -> impl Future<Output = Result<Vec<Candle>, ApiError>> + Send {
        async move {
            let response = self
                .get(&format!(
                    "/api/v3/klines?symbol={symbol}&interval={interval}&limit={limit}"
                ))
                .await?;

            // Klines come back as mixed-type arrays:
            // [openTime, open, high, low, close, volume, closeTime, ...]
            let rows: Vec<Vec<serde_json::Value>> = response
                .json()
                .await
                .map_err(|e| ApiError::Payload(e.to_string()))?;

            rows.iter()
                .map(|row| {
                    let field = |i: usize| -> Result<f64, ApiError> {
                        row.get(i)
                            .and_then(|v| v.as_str())
                            .and_then(|s| s.parse::<f64>().ok())
                            .ok_or_else(|| {
                                ApiError::Payload(format!("kline field {i} missing or non-numeric"))
                            })
                    };
                    let close_time = row
                        .get(6)
                        .and_then(|v| v.as_i64())
                        .ok_or_else(|| ApiError::Payload("kline close time missing".to_string()))?;

                    Ok(Candle {
                        high: field(2)?,
                        low: field(3)?,
                        close: field(4)?,
                        is_closed: true,
                        timestamp: Utc
                            .timestamp_millis_opt(close_time)
                            .single()
                            .ok_or_else(|| {
                                ApiError::Payload("kline close time out of range".to_string())
                            })?,
                    })
                })
                .collect()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn client(server: &mockito::ServerGuard) -> BinanceClient {
        BinanceClient::new(Some(server.url()), "test-key".to_string())
    }

    #[tokio::test]
    async fn test_asset_balance_parses_free_amount() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/account")
            .with_body(
                r#"{"balances":[{"asset":"GBP","free":"100.5","locked":"0"},
                               {"asset":"ETH","free":"0.25","locked":"0"}]}"#,
            )
            .create_async()
            .await;

        let balance = client(&server).asset_balance("GBP").await.unwrap();
        assert_eq!(balance, 100.5);
    }

    #[tokio::test]
    async fn test_asset_balance_missing_asset_is_zero() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/account")
            .with_body(r#"{"balances":[]}"#)
            .create_async()
            .await;

        let balance = client(&server).asset_balance("ETH").await.unwrap();
        assert_eq!(balance, 0.0);
    }

    #[tokio::test]
    async fn test_symbol_rules_parse_lot_size_filter() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/exchangeInfo")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"{"symbols":[{"symbol":"ETHGBP","quotePrecision":8,
                    "filters":[{"filterType":"PRICE_FILTER","minPrice":"0.01"},
                               {"filterType":"LOT_SIZE","stepSize":"0.0001","minQty":"0.0001"}]}]}"#,
            )
            .create_async()
            .await;

        let rules = client(&server).symbol_rules("ETHGBP").await.unwrap();
        assert_eq!(rules.lot_step, "0.0001".parse::<Decimal>().unwrap());
        assert_eq!(rules.min_quantity, "0.0001".parse::<Decimal>().unwrap());
        assert_eq!(rules.quote_precision, 8);
    }

    #[tokio::test]
    async fn test_throttle_status_maps_to_throttled() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/account")
            .with_status(429)
            .with_header("Retry-After", "17")
            .create_async()
            .await;

        let err = client(&server).asset_balance("GBP").await.unwrap_err();
        match err {
            ApiError::Throttled { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(17));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_throttle_without_header_uses_default_delay() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/account")
            .with_status(429)
            .create_async()
            .await;

        let err = client(&server).asset_balance("GBP").await.unwrap_err();
        match err {
            ApiError::Throttled { retry_after } => {
                assert_eq!(retry_after, Duration::from_secs(DEFAULT_RETRY_AFTER_SECS));
            }
            other => panic!("expected Throttled, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_dry_run_order_uses_test_endpoint() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("POST", "/api/v3/order/test")
            .match_query(mockito::Matcher::Any)
            .with_body("{}")
            .create_async()
            .await;

        let request = OrderRequest::market(
            Side::Buy,
            "ETHGBP",
            "0.5".parse::<Decimal>().unwrap(),
            true,
        );
        let filled = client(&server).place_order(&request).await.unwrap();

        assert_eq!(filled, "0.5".parse::<Decimal>().unwrap());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_live_order_parses_executed_quantity() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v3/order")
            .match_query(mockito::Matcher::Any)
            .with_body(r#"{"clientOrderId":"abc123","executedQty":"0.4990"}"#)
            .create_async()
            .await;

        let request = OrderRequest::market(
            Side::Buy,
            "ETHGBP",
            "0.5".parse::<Decimal>().unwrap(),
            false,
        );
        let filled = client(&server).place_order(&request).await.unwrap();
        assert_eq!(filled, "0.4990".parse::<Decimal>().unwrap());
    }

    #[tokio::test]
    async fn test_rejected_order_surfaces_reason() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("POST", "/api/v3/order")
            .match_query(mockito::Matcher::Any)
            .with_status(400)
            .with_body(r#"{"code":-1013,"msg":"Filter failure: LOT_SIZE"}"#)
            .create_async()
            .await;

        let request = OrderRequest::market(
            Side::Sell,
            "ETHGBP",
            "0.5".parse::<Decimal>().unwrap(),
            false,
        );
        let err = client(&server).place_order(&request).await.unwrap_err();
        match err {
            ApiError::Rejected { reason } => assert!(reason.contains("LOT_SIZE")),
            other => panic!("expected Rejected, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_klines_parse_mixed_type_rows() {
        let mut server = mockito::Server::new_async().await;
        let _m = server
            .mock("GET", "/api/v3/klines")
            .match_query(mockito::Matcher::Any)
            .with_body(
                r#"[[1700000000000,"100.0","101.0","99.0","100.5","12.0",1700000059999,"0",0,"0","0","0"],
                    [1700000060000,"100.5","102.0","100.0","101.5","10.0",1700000119999,"0",0,"0","0","0"]]"#,
            )
            .create_async()
            .await;

        let candles = client(&server).klines("ETHGBP", "1m", 2).await.unwrap();
        assert_eq!(candles.len(), 2);
        assert_eq!(candles[0].close, 100.5);
        assert_eq!(candles[0].high, 101.0);
        assert_eq!(candles[0].low, 99.0);
        assert!(candles[1].is_closed);
    }
}
