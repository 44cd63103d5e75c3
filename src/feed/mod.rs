use chrono::{TimeZone, Utc};
use futures::StreamExt;
use serde::Deserialize;
use tokio::sync::{mpsc, watch};
use tokio::time::Duration;
use tokio_tungstenite::connect_async;
use tokio_tungstenite::tungstenite::Message;
use tracing::{info, warn};

use crate::models::Candle;

/// Kline stream event; only the nested payload matters
#[derive(Debug, Deserialize)]
struct KlineEvent {
    k: KlinePayload,
}

#[derive(Debug, Deserialize)]
struct KlinePayload {
    #[serde(rename = "c")]
    close: String,
    #[serde(rename = "l")]
    low: String,
    #[serde(rename = "h")]
    high: String,
    #[serde(rename = "x")]
    is_closed: bool,
    #[serde(rename = "T")]
    close_time_ms: i64,
}

/// Parse a raw stream message into a candle
///
/// `Ok(None)` means the message was well-formed but the candle is still
/// open; only closed candles drive trading decisions.
pub fn parse_kline(text: &str) -> Result<Option<Candle>, serde_json::Error> {
    let event: KlineEvent = serde_json::from_str(text)?;
    if !event.k.is_closed {
        return Ok(None);
    }

    let parse = |field: &str, name: &'static str| -> Result<f64, serde_json::Error> {
        field.parse::<f64>().map_err(|_| {
            serde::de::Error::custom(format!("non-numeric kline field {name}: {field}"))
        })
    };
    Ok(Some(Candle {
        close: parse(&event.k.close, "c")?,
        low: parse(&event.k.low, "l")?,
        high: parse(&event.k.high, "h")?,
        is_closed: true,
        timestamp: Utc
            .timestamp_millis_opt(event.k.close_time_ms)
            .single()
            .unwrap_or_else(Utc::now),
    }))
}

/// Spawn the per-instrument kline feed task
///
/// Connects to `{ws_url}/ws/{symbol}@kline_{interval}` and forwards closed
/// candles to the trader. Any disconnect or connect failure is retried after
/// a fixed delay; the trader's window survives the gap. Malformed messages
/// are logged and skipped.
pub fn spawn_kline_feed(
    ws_url: String,
    symbol: String,
    interval: String,
    reconnect_delay: Duration,
    candles: mpsc::Sender<Candle>,
    mut shutdown: watch::Receiver<bool>,
) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let stream_url = format!("{ws_url}/ws/{}@kline_{interval}", symbol.to_lowercase());
        loop {
            if *shutdown.borrow() {
                return;
            }
            match connect_async(&stream_url).await {
                Ok((mut socket, _)) => {
                    info!(symbol = %symbol, url = %stream_url, "kline feed connected");
                    loop {
                        tokio::select! {
                            biased;
                            changed = shutdown.changed() => {
                                if changed.is_err() || *shutdown.borrow() {
                                    return;
                                }
                            }
                            message = socket.next() => {
                                match message {
                                    Some(Ok(Message::Text(text))) => {
                                        match parse_kline(text.as_str()) {
                                            Ok(Some(candle)) => {
                                                if candles.send(candle).await.is_err() {
                                                    // trader gone, nothing to feed
                                                    return;
                                                }
                                            }
                                            Ok(None) => {}
                                            Err(err) => warn!(
                                                symbol = %symbol,
                                                error = %err,
                                                "skipping malformed feed message"
                                            ),
                                        }
                                    }
                                    Some(Ok(_)) => {}
                                    Some(Err(err)) => {
                                        warn!(symbol = %symbol, error = %err, "kline stream error");
                                        break;
                                    }
                                    None => {
                                        warn!(symbol = %symbol, "kline stream closed");
                                        break;
                                    }
                                }
                            }
                        }
                    }
                }
                Err(err) => warn!(symbol = %symbol, error = %err, "kline feed connect failed"),
            }
            tokio::time::sleep(reconnect_delay).await;
        }
    })
}
