//! Direct spot-exchange trade stream.
//!
//! Subscribes to the exchange's `@trade` streams and emits `SpotTrade`s.
//! Ping/pong is library-driven: the exchange pings and tungstenite's
//! frames are answered here.

use crate::error::{StreamError, StreamResult};
use crate::health::StreamHealth;
use futures_util::{SinkExt, StreamExt};
use lagbot_core::SpotTrade;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Spot trade stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SpotStreamConfig {
    /// WebSocket base URL.
    #[serde(default = "default_spot_url")]
    pub url: String,
    /// Trading pairs to subscribe (e.g., `["BTCUSDT"]`).
    pub symbols: Vec<String>,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_spot_url() -> String {
    "wss://stream.binance.com:9443".to_string()
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl SpotStreamConfig {
    /// Stream endpoint: single-stream path for one symbol, combined
    /// stream for several.
    #[must_use]
    pub fn endpoint(&self) -> String {
        let streams: Vec<String> = self
            .symbols
            .iter()
            .map(|s| format!("{}@trade", s.to_lowercase()))
            .collect();
        if streams.len() == 1 {
            format!("{}/ws/{}", self.url, streams[0])
        } else {
            format!("{}/stream?streams={}", self.url, streams.join("/"))
        }
    }
}

/// Parse one trade message.
///
/// Combined-stream frames wrap the trade in `{"stream": ..., "data": ...}`.
/// Anything that is not a trade parses to `None`.
#[must_use]
pub fn parse_spot_trade(text: &str) -> Option<SpotTrade> {
    let value: Value = serde_json::from_str(text).ok()?;
    let data = value.get("data").unwrap_or(&value);

    if data.get("e").and_then(Value::as_str) != Some("trade") {
        return None;
    }

    let symbol = data.get("s")?.as_str()?.to_string();
    let price: f64 = data.get("p")?.as_str()?.parse().ok()?;
    let quantity: f64 = data.get("q")?.as_str()?.parse().ok()?;
    let timestamp_ms = data.get("T")?.as_i64()?;
    let is_buyer_maker = data.get("m")?.as_bool()?;
    let trade_id = data.get("t").and_then(Value::as_u64);

    Some(SpotTrade {
        symbol,
        price,
        quantity,
        timestamp_ms,
        is_buyer_maker,
        trade_id,
    })
}

/// Direct spot trade stream adapter.
pub struct SpotTradeStream {
    config: SpotStreamConfig,
    tx: mpsc::Sender<SpotTrade>,
    health: Arc<StreamHealth>,
}

impl SpotTradeStream {
    #[must_use]
    pub fn new(config: SpotStreamConfig, tx: mpsc::Sender<SpotTrade>) -> Self {
        Self {
            config,
            tx,
            health: Arc::new(StreamHealth::new()),
        }
    }

    #[must_use]
    pub fn health(&self) -> Arc<StreamHealth> {
        Arc::clone(&self.health)
    }

    /// Run the adapter until cancelled, reconnecting on any failure.
    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        let endpoint = self.config.endpoint();
        loop {
            match self.run_connection(&endpoint, &cancel).await {
                Ok(()) => {
                    info!(url = %endpoint, "spot stream closed");
                }
                Err(e) => {
                    error!(?e, url = %endpoint, "spot stream error");
                }
            }
            self.health.set_connected(false);

            if cancel.is_cancelled() {
                return;
            }
            self.health.record_reconnect();
            warn!(
                attempt = self.health.reconnect_count(),
                delay_ms = self.config.reconnect_delay_ms,
                "spot stream reconnecting"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)) => {}
            }
        }
    }

    async fn run_connection(
        &self,
        endpoint: &str,
        cancel: &CancellationToken,
    ) -> StreamResult<()> {
        info!(url = %endpoint, "spot stream connecting");
        let (ws_stream, _response) = connect_async(endpoint).await?;
        let (mut write, mut read) = ws_stream.split();
        self.health.set_connected(true);
        info!("spot stream connected");

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        if let Some(trade) = parse_spot_trade(&text) {
                            self.health.record_update(trade.price, trade.timestamp_ms);
                            if self.tx.send(trade).await.is_err() {
                                // Receiver gone: shutdown in progress.
                                return Ok(());
                            }
                        } else {
                            debug!(msg = %truncate(&text), "spot frame dropped");
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
                    // Binary and empty frames are silently dropped.
                    Some(Ok(_)) => {}
                    Some(Err(e)) => return Err(e.into()),
                    None => {
                        return Err(StreamError::ConnectionClosed(
                            "stream ended".to_string(),
                        ))
                    }
                }
            }
        }
    }
}

pub(crate) fn truncate(text: &str) -> &str {
    &text[..text.len().min(120)]
}

#[cfg(test)]
mod tests {
    use super::*;

    const TRADE_MSG: &str = r#"{
        "e": "trade", "E": 1706000000010, "s": "BTCUSDT", "t": 123456789,
        "p": "42150.50", "q": "0.5", "T": 1706000000000, "m": true
    }"#;

    #[test]
    fn test_parse_trade() {
        let trade = parse_spot_trade(TRADE_MSG).expect("valid trade");
        assert_eq!(trade.symbol, "BTCUSDT");
        assert_eq!(trade.price, 42_150.50);
        assert_eq!(trade.quantity, 0.5);
        assert_eq!(trade.timestamp_ms, 1_706_000_000_000);
        assert!(trade.is_buyer_maker);
        assert_eq!(trade.trade_id, Some(123_456_789));
    }

    #[test]
    fn test_parse_combined_stream_wrapper() {
        let wrapped = format!(r#"{{"stream":"btcusdt@trade","data":{TRADE_MSG}}}"#);
        let trade = parse_spot_trade(&wrapped).expect("wrapped trade");
        assert_eq!(trade.symbol, "BTCUSDT");
    }

    #[test]
    fn test_non_trade_messages_dropped() {
        assert!(parse_spot_trade(r#"{"e":"aggTrade","s":"BTCUSDT"}"#).is_none());
        assert!(parse_spot_trade(r#"{"result":null,"id":1}"#).is_none());
        assert!(parse_spot_trade("not json at all").is_none());
        assert!(parse_spot_trade("").is_none());
    }

    #[test]
    fn test_malformed_fields_dropped() {
        // Price not a string number.
        assert!(parse_spot_trade(r#"{"e":"trade","s":"BTCUSDT","p":"abc","q":"1","T":1,"m":false}"#).is_none());
        // Missing quantity.
        assert!(parse_spot_trade(r#"{"e":"trade","s":"BTCUSDT","p":"1.0","T":1,"m":false}"#).is_none());
    }

    #[test]
    fn test_endpoint_single_vs_combined() {
        let single = SpotStreamConfig {
            url: "wss://x".to_string(),
            symbols: vec!["BTCUSDT".to_string()],
            reconnect_delay_ms: 5000,
        };
        assert_eq!(single.endpoint(), "wss://x/ws/btcusdt@trade");

        let multi = SpotStreamConfig {
            url: "wss://x".to_string(),
            symbols: vec!["BTCUSDT".to_string(), "ETHUSDT".to_string()],
            reconnect_delay_ms: 5000,
        };
        assert_eq!(
            multi.endpoint(),
            "wss://x/stream?streams=btcusdt@trade/ethusdt@trade"
        );
    }
}
