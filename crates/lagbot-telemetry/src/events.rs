//! Engine event channel.
//!
//! All user-visible engine behavior is emitted as structured events on a
//! single bounded broadcast channel. Subscriber lag drops old events for
//! that subscriber only; the engine never blocks on emission.

use lagbot_core::{Direction, MarketId, SignalTier};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tracing::debug;

/// Structured event record emitted by the engine.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum EngineEvent {
    SignalDetected {
        tier: SignalTier,
        direction: Direction,
        symbol: String,
        market_id: Option<MarketId>,
        expected_edge: f64,
        confidence: f64,
        timestamp_ms: i64,
    },
    PositionOpened {
        market_id: MarketId,
        slug: String,
        tier: SignalTier,
        cost: Decimal,
        up_shares: Decimal,
        down_shares: Decimal,
        timestamp_ms: i64,
    },
    PositionClosed {
        market_id: MarketId,
        slug: String,
        reason: String,
        realized_pnl: Decimal,
        timestamp_ms: i64,
    },
    PartialExit {
        market_id: MarketId,
        slug: String,
        side: Direction,
        leg_pnl: Decimal,
        timestamp_ms: i64,
    },
    EntryBlocked {
        market_id: MarketId,
        reason: String,
        timestamp_ms: i64,
    },
    EntryFailed {
        market_id: MarketId,
        error: String,
        timestamp_ms: i64,
    },
}

/// Bounded broadcast bus for engine events.
///
/// Constructor-injected into the engine; emission never fails and never
/// blocks.
#[derive(Clone)]
pub struct EventBus {
    tx: broadcast::Sender<EngineEvent>,
}

impl EventBus {
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    /// Emit an event to all current subscribers.
    pub fn emit(&self, event: EngineEvent) {
        // Err only means there are no subscribers right now.
        if self.tx.send(event.clone()).is_err() {
            debug!(?event, "event emitted with no subscribers");
        }
    }

    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.tx.subscribe()
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new(256)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_subscribers_receive_events() {
        let bus = EventBus::new(8);
        let mut rx = bus.subscribe();

        bus.emit(EngineEvent::EntryBlocked {
            market_id: MarketId::new("0xm"),
            reason: "paused".to_string(),
            timestamp_ms: 1,
        });

        let event = rx.recv().await.unwrap();
        assert!(matches!(event, EngineEvent::EntryBlocked { .. }));
    }

    #[test]
    fn test_emit_without_subscribers_is_fine() {
        let bus = EventBus::new(8);
        bus.emit(EngineEvent::PositionClosed {
            market_id: MarketId::new("0xm"),
            slug: "btc-updown-1h".to_string(),
            reason: "deadline".to_string(),
            realized_pnl: dec!(1.5),
            timestamp_ms: 1,
        });
        assert_eq!(bus.subscriber_count(), 0);
    }

    #[test]
    fn test_event_serializes_with_tag() {
        let event = EngineEvent::SignalDetected {
            tier: SignalTier::DutchBook,
            direction: Direction::Up,
            symbol: "BTCUSDT".to_string(),
            market_id: None,
            expected_edge: 0.02,
            confidence: 1.0,
            timestamp_ms: 1,
        };
        let json = serde_json::to_string(&event).unwrap();
        assert!(json.contains("\"event\":\"signal_detected\""));
    }
}
