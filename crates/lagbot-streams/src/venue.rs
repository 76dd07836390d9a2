//! Venue multiplex stream.
//!
//! One socket carries two topics: the venue's relay of exchange spot
//! prices and its relay of the oracle price. Topics are dispatched
//! separately into `VenueSpot` / `VenueOracle` updates. The venue
//! expects an application-level text ping every 10 seconds.

use crate::error::{StreamError, StreamResult};
use crate::health::StreamHealth;
use crate::spot::truncate;
use futures_util::{SinkExt, StreamExt};
use lagbot_core::{PriceUpdate, StreamSource};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

const SPOT_TOPIC: &str = "crypto_prices";
const ORACLE_TOPIC: &str = "crypto_prices_chainlink";

/// Venue stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VenueStreamConfig {
    #[serde(default = "default_venue_url")]
    pub url: String,
    /// Spot-topic symbol filter (the feed sends all symbols).
    #[serde(default = "default_spot_symbol")]
    pub spot_symbol: String,
    /// Oracle-topic symbol filter.
    #[serde(default = "default_oracle_symbol")]
    pub oracle_symbol: String,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_venue_url() -> String {
    "wss://ws-live-data.polymarket.com".to_string()
}

fn default_spot_symbol() -> String {
    "btcusdt".to_string()
}

fn default_oracle_symbol() -> String {
    "btc/usd".to_string()
}

fn default_ping_interval_ms() -> u64 {
    10_000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for VenueStreamConfig {
    fn default() -> Self {
        Self {
            url: default_venue_url(),
            spot_symbol: default_spot_symbol(),
            oracle_symbol: default_oracle_symbol(),
            ping_interval_ms: default_ping_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Parse one venue message into a price update.
///
/// Expected shape: `{"topic": ..., "payload": {"symbol", "value",
/// "timestamp"}}`. Non-matching topics and symbols parse to `None`.
#[must_use]
pub fn parse_venue_message(
    text: &str,
    spot_symbol: &str,
    oracle_symbol: &str,
) -> Option<PriceUpdate> {
    let value: Value = serde_json::from_str(text).ok()?;
    let topic = value.get("topic")?.as_str()?;
    let payload = value.get("payload")?;

    let (source, expected_symbol, out_symbol) = match topic {
        SPOT_TOPIC => (
            StreamSource::VenueSpot,
            spot_symbol,
            spot_symbol.to_uppercase(),
        ),
        ORACLE_TOPIC => (
            StreamSource::VenueOracle,
            oracle_symbol,
            oracle_symbol.replace('/', "").to_uppercase(),
        ),
        _ => return None,
    };

    let symbol = payload.get("symbol")?.as_str()?;
    if !symbol.eq_ignore_ascii_case(expected_symbol) {
        return None;
    }

    let price = payload.get("value")?.as_f64()?;
    let timestamp_ms = payload.get("timestamp")?.as_i64()?;

    Some(PriceUpdate::new(source, &out_symbol, price, timestamp_ms))
}

/// Venue multiplex stream adapter.
pub struct VenueStream {
    config: VenueStreamConfig,
    tx: mpsc::Sender<PriceUpdate>,
    health: Arc<StreamHealth>,
}

impl VenueStream {
    #[must_use]
    pub fn new(config: VenueStreamConfig, tx: mpsc::Sender<PriceUpdate>) -> Self {
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

    pub fn spawn(self, cancel: CancellationToken) -> JoinHandle<()> {
        tokio::spawn(async move { self.run(cancel).await })
    }

    async fn run(self, cancel: CancellationToken) {
        loop {
            match self.run_connection(&cancel).await {
                Ok(()) => info!("venue stream closed"),
                Err(e) => error!(?e, "venue stream error"),
            }
            self.health.set_connected(false);

            if cancel.is_cancelled() {
                return;
            }
            self.health.record_reconnect();
            warn!(
                attempt = self.health.reconnect_count(),
                delay_ms = self.config.reconnect_delay_ms,
                "venue stream reconnecting"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)) => {}
            }
        }
    }

    async fn run_connection(&self, cancel: &CancellationToken) -> StreamResult<()> {
        info!(url = %self.config.url, "venue stream connecting");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        // Subscribe both topics. Filters are applied client-side; the
        // subscription must omit them or the venue rejects it.
        let subscribe = json!({
            "action": "subscribe",
            "subscriptions": [
                {"topic": SPOT_TOPIC, "type": "update"},
                {"topic": ORACLE_TOPIC, "type": "*"},
            ],
        });
        write.send(Message::Text(subscribe.to_string())).await?;
        self.health.set_connected(true);
        info!(
            spot_symbol = %self.config.spot_symbol,
            oracle_symbol = %self.config.oracle_symbol,
            "venue stream subscribed"
        );

        let mut ping_interval =
            tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        // The interval fires immediately; skip that first tick.
        ping_interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ping_interval.tick() => {
                    let ping = json!({"action": "ping"});
                    write.send(Message::Text(ping.to_string())).await?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        match parse_venue_message(
                            &text,
                            &self.config.spot_symbol,
                            &self.config.oracle_symbol,
                        ) {
                            Some(update) => {
                                self.health.record_update(update.price, update.timestamp_ms);
                                if self.tx.send(update).await.is_err() {
                                    return Ok(());
                                }
                            }
                            None => debug!(msg = %truncate(&text), "venue frame dropped"),
                        }
                    }
                    Some(Ok(Message::Ping(data))) => {
                        write.send(Message::Pong(data)).await?;
                    }
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
