//! Order-book subscriber.
//!
//! One socket covers every outcome token in the working set. The venue
//! sends full book snapshots on subscribe and `price_change` deltas
//! afterwards; deltas omit the level sizes, so the last known size per
//! (token, side) is retained.

use crate::error::{StreamError, StreamResult};
use crate::health::StreamHealth;
use crate::spot::truncate;
use chrono::Utc;
use futures_util::{SinkExt, StreamExt};
use lagbot_core::{OrderBookUpdate, Price, Size, TokenId};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// Book stream configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BookStreamConfig {
    #[serde(default = "default_book_url")]
    pub url: String,
    #[serde(default = "default_ping_interval_ms")]
    pub ping_interval_ms: u64,
    #[serde(default = "default_reconnect_delay_ms")]
    pub reconnect_delay_ms: u64,
}

fn default_book_url() -> String {
    "wss://ws-subscriptions-clob.polymarket.com/ws/market".to_string()
}

fn default_ping_interval_ms() -> u64 {
    5000
}

fn default_reconnect_delay_ms() -> u64 {
    5000
}

impl Default for BookStreamConfig {
    fn default() -> Self {
        Self {
            url: default_book_url(),
            ping_interval_ms: default_ping_interval_ms(),
            reconnect_delay_ms: default_reconnect_delay_ms(),
        }
    }
}

/// Normalizes book messages into `OrderBookUpdate`s.
///
/// Pure state machine over the wire shapes; holds the latest book per
/// token so that size-less price changes keep their sizes.
#[derive(Debug, Default)]
pub struct BookState {
    latest: HashMap<TokenId, OrderBookUpdate>,
}

impl BookState {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn get(&self, token: &TokenId) -> Option<&OrderBookUpdate> {
        self.latest.get(token)
    }

    /// Apply one message (single event or batched array) and return the
    /// resulting updates in arrival order.
    pub fn apply_message(&mut self, text: &str, timestamp_ms: i64) -> Vec<OrderBookUpdate> {
        let Ok(value) = serde_json::from_str::<Value>(text) else {
            debug!(msg = %truncate(text), "book frame dropped");
            return Vec::new();
        };

        let events = match value {
            Value::Array(items) => items,
            other => vec![other],
        };

        let mut updates = Vec::new();
        for event in &events {
            match event.get("event_type").and_then(Value::as_str) {
                Some("book") => {
                    if let Some(update) = self.apply_book(event, timestamp_ms) {
                        updates.push(update);
                    }
                }
                Some("price_change") => {
                    updates.extend(self.apply_price_change(event, timestamp_ms));
                }
                // last_trade_price and friends carry nothing we track.
                _ => {}
            }
        }
        updates
    }

    fn apply_book(&mut self, event: &Value, timestamp_ms: i64) -> Option<OrderBookUpdate> {
        let token = TokenId::new(event.get("asset_id")?.as_str()?);

        let (best_bid, bid_size) = top_level(event.get("bids"));
        let (best_ask, ask_size) = top_level(event.get("asks"));

        let update = OrderBookUpdate {
            token: token.clone(),
            best_bid,
            best_ask,
            bid_size,
            ask_size,
            timestamp_ms,
        };
        self.latest.insert(token, update.clone());
        Some(update)
    }

    fn apply_price_change(&mut self, event: &Value, timestamp_ms: i64) -> Vec<OrderBookUpdate> {
        let Some(changes) = event.get("price_changes").and_then(Value::as_array) else {
            return Vec::new();
        };

        let mut updates = Vec::new();
        for change in changes {
            let Some(token) = change
                .get("asset_id")
                .and_then(Value::as_str)
                .map(TokenId::new)
            else {
                continue;
            };
            let best_bid = decimal_field(change, "best_bid");
            let best_ask = decimal_field(change, "best_ask");
            let (Some(best_bid), Some(best_ask)) = (best_bid, best_ask) else {
                continue;
            };
            if !best_bid.is_positive() || !best_ask.is_positive() {
                continue;
            }

            // Deltas omit sizes: carry the last known size per side.
            let (bid_size, ask_size) = self
                .latest
                .get(&token)
                .map_or((Size::ZERO, Size::ZERO), |prev| {
                    (prev.bid_size, prev.ask_size)
                });

            let update = OrderBookUpdate {
                token: token.clone(),
                best_bid,
                best_ask,
                bid_size,
                ask_size,
                timestamp_ms,
            };
            self.latest.insert(token, update.clone());
            updates.push(update);
        }
        updates
    }
}

/// Best level of one side: `[{"price": "0.48", "size": "30"}, ...]`.
fn top_level(side: Option<&Value>) -> (Price, Size) {
    let Some(levels) = side.and_then(Value::as_array) else {
        return (Price::ZERO, Size::ZERO);
    };
    let Some(level) = levels.first() else {
        return (Price::ZERO, Size::ZERO);
    };
    let price = decimal_field(level, "price").unwrap_or(Price::ZERO);
    let size = level
        .get("size")
        .and_then(Value::as_str)
        .and_then(|s| Size::from_str(s).ok())
        .unwrap_or(Size::ZERO);
    (price, size)
}

fn decimal_field(value: &Value, field: &str) -> Option<Price> {
    value
        .get(field)
        .and_then(Value::as_str)
        .and_then(|s| Price::from_str(s).ok())
}

/// Order-book subscriber adapter.
pub struct BookStream {
    config: BookStreamConfig,
    token_ids: Vec<TokenId>,
    tx: mpsc::Sender<OrderBookUpdate>,
    health: Arc<StreamHealth>,
}

impl BookStream {
    #[must_use]
    pub fn new(
        config: BookStreamConfig,
        token_ids: Vec<TokenId>,
        tx: mpsc::Sender<OrderBookUpdate>,
    ) -> Self {
        Self {
            config,
            token_ids,
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
        let mut state = BookState::new();
        loop {
            match self.run_connection(&mut state, &cancel).await {
                Ok(()) => info!("book stream closed"),
                Err(e) => error!(?e, "book stream error"),
            }
            self.health.set_connected(false);

            if cancel.is_cancelled() {
                return;
            }
            self.health.record_reconnect();
            warn!(
                attempt = self.health.reconnect_count(),
                delay_ms = self.config.reconnect_delay_ms,
                "book stream reconnecting"
            );
            tokio::select! {
                _ = cancel.cancelled() => return,
                _ = tokio::time::sleep(Duration::from_millis(self.config.reconnect_delay_ms)) => {}
            }
        }
    }

    async fn run_connection(
        &self,
        state: &mut BookState,
        cancel: &CancellationToken,
    ) -> StreamResult<()> {
        info!(url = %self.config.url, tokens = self.token_ids.len(), "book stream connecting");
        let (ws_stream, _response) = connect_async(&self.config.url).await?;
        let (mut write, mut read) = ws_stream.split();

        let assets: Vec<&str> = self.token_ids.iter().map(TokenId::as_str).collect();
        let subscribe = json!({"assets_ids": assets, "type": "MARKET"});
        write.send(Message::Text(subscribe.to_string())).await?;
        self.health.set_connected(true);
        info!(tokens = assets.len(), "book stream subscribed");

        let mut ping_interval =
            tokio::time::interval(Duration::from_millis(self.config.ping_interval_ms));
        ping_interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        ping_interval.tick().await;

        loop {
            tokio::select! {
                _ = cancel.cancelled() => return Ok(()),
                _ = ping_interval.tick() => {
                    write.send(Message::Text("ping".to_string())).await?;
                }
                msg = read.next() => match msg {
                    Some(Ok(Message::Text(text))) => {
                        let now_ms = Utc::now().timestamp_millis();
                        for update in state.apply_message(&text, now_ms) {
                            self.health
                                .record_update(update.mid_price().to_f64(), update.timestamp_ms);
                            if self.tx.send(update).await.is_err() {
                                return Ok(());
                            }
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

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    const BOOK_MSG: &str = r#"{
        "event_type": "book",
        "asset_id": "0xtokenup",
        "bids": [{"price": "0.48", "size": "30"}, {"price": "0.47", "size": "55"}],
        "asks": [{"price": "0.52", "size": "25"}]
    }"#;

    #[test]
    fn test_book_snapshot_normalized() {
        let mut state = BookState::new();
        let updates = state.apply_message(BOOK_MSG, 1000);

        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.best_bid, Price::new(dec!(0.48)));
        assert_eq!(update.best_ask, Price::new(dec!(0.52)));
        assert_eq!(update.bid_size, Size::new(dec!(30)));
        assert_eq!(update.ask_size, Size::new(dec!(25)));
    }

    #[test]
    fn test_price_change_retains_sizes() {
        let mut state = BookState::new();
        state.apply_message(BOOK_MSG, 1000);

        let delta = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "0xtokenup", "best_bid": "0.49", "best_ask": "0.53", "side": "BUY"}
            ]
        }"#;
        let updates = state.apply_message(delta, 2000);

        assert_eq!(updates.len(), 1);
        let update = &updates[0];
        assert_eq!(update.best_bid, Price::new(dec!(0.49)));
        assert_eq!(update.best_ask, Price::new(dec!(0.53)));
        // Sizes carried over from the snapshot.
        assert_eq!(update.bid_size, Size::new(dec!(30)));
        assert_eq!(update.ask_size, Size::new(dec!(25)));
    }

    #[test]
    fn test_identical_delta_leaves_book_unchanged() {
        let mut state = BookState::new();
        state.apply_message(BOOK_MSG, 1000);
        let before = state.get(&TokenId::new("0xtokenup")).unwrap().clone();

        // A delta repeating the snapshot's top of book.
        let delta = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "0xtokenup", "best_bid": "0.48", "best_ask": "0.52", "side": "SELL"}
            ]
        }"#;
        state.apply_message(delta, 1000);
        let after = state.get(&TokenId::new("0xtokenup")).unwrap();

        assert_eq!(after.best_bid, before.best_bid);
        assert_eq!(after.best_ask, before.best_ask);
        assert_eq!(after.bid_size, before.bid_size);
        assert_eq!(after.ask_size, before.ask_size);
    }

    #[test]
    fn test_price_change_without_prior_book_defaults_zero_sizes() {
        let mut state = BookState::new();
        let delta = r#"{
            "event_type": "price_change",
            "price_changes": [
                {"asset_id": "0xfresh", "best_bid": "0.40", "best_ask": "0.60"}
            ]
        }"#;
        let updates = state.apply_message(delta, 1000);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].bid_size.is_zero());
        assert!(updates[0].ask_size.is_zero());
    }

    #[test]
    fn test_batched_events() {
        let mut state = BookState::new();
        let batch = format!(
            r#"[{BOOK_MSG}, {{"event_type": "last_trade_price", "asset_id": "0xtokenup", "price": "0.5"}}]"#
        );
        let updates = state.apply_message(&batch, 1000);
        assert_eq!(updates.len(), 1);
    }

    #[test]
    fn test_garbage_and_empty_sides() {
        let mut state = BookState::new();
        assert!(state.apply_message("pong", 0).is_empty());
        assert!(state.apply_message("", 0).is_empty());

        // One-sided book still normalizes; missing side is zero.
        let one_sided = r#"{
            "event_type": "book",
            "asset_id": "0xthin",
            "bids": [],
            "asks": [{"price": "0.52", "size": "25"}]
        }"#;
        let updates = state.apply_message(one_sided, 0);
        assert_eq!(updates.len(), 1);
        assert!(updates[0].best_bid.is_zero());
        assert_eq!(updates[0].mid_price(), Price::new(dec!(0.52)));
    }
}
