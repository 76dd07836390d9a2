//! Feed data types.
//!
//! Contains the immutable updates emitted by stream adapters and the
//! aligned snapshot produced by the synchronizer.

use crate::decimal::{Price, Size};
use crate::market::TokenId;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Source of a price update.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StreamSource {
    /// Direct spot-exchange trade stream.
    SpotDirect,
    /// Spot price relayed through the venue's real-time data stream.
    VenueSpot,
    /// Oracle price relayed through the venue's real-time data stream.
    VenueOracle,
    /// Oracle price read from the on-chain aggregator.
    ChainOracle,
}

impl std::fmt::Display for StreamSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SpotDirect => write!(f, "spot_direct"),
            Self::VenueSpot => write!(f, "venue_spot"),
            Self::VenueOracle => write!(f, "venue_oracle"),
            Self::ChainOracle => write!(f, "chain_oracle"),
        }
    }
}

/// Immutable price update from any source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceUpdate {
    pub source: StreamSource,
    /// Trading pair (e.g., "BTCUSDT").
    pub symbol: String,
    pub price: f64,
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// Trade id or aggregator round id, where the source provides one.
    pub sequence: Option<u64>,
}

impl PriceUpdate {
    #[must_use]
    pub fn new(source: StreamSource, symbol: &str, price: f64, timestamp_ms: i64) -> Self {
        Self {
            source,
            symbol: symbol.to_string(),
            price,
            timestamp_ms,
            sequence: None,
        }
    }

    #[must_use]
    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = Some(sequence);
        self
    }
}

/// A single spot-exchange trade.
///
/// Carries the taker side and quantity needed by the price tracker's
/// volume-fraction confidence.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SpotTrade {
    pub symbol: String,
    pub price: f64,
    pub quantity: f64,
    /// Trade time in milliseconds.
    pub timestamp_ms: i64,
    /// True when the buyer was the resting order (i.e. the taker sold).
    pub is_buyer_maker: bool,
    pub trade_id: Option<u64>,
}

impl SpotTrade {
    /// View this trade as a price update for the synchronizer.
    #[must_use]
    pub fn to_price_update(&self) -> PriceUpdate {
        let mut update = PriceUpdate::new(
            StreamSource::SpotDirect,
            &self.symbol,
            self.price,
            self.timestamp_ms,
        );
        update.sequence = self.trade_id;
        update
    }
}

/// Immutable top-of-book update for one outcome token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderBookUpdate {
    pub token: TokenId,
    pub best_bid: Price,
    pub best_ask: Price,
    pub bid_size: Size,
    pub ask_size: Size,
    pub timestamp_ms: i64,
}

impl OrderBookUpdate {
    /// Mid-market price. Falls back to the present side when one is absent.
    #[must_use]
    pub fn mid_price(&self) -> Price {
        if self.best_bid.is_positive() && self.best_ask.is_positive() {
            Price::new((self.best_bid.inner() + self.best_ask.inner()) / rust_decimal::Decimal::TWO)
        } else if self.best_ask.is_positive() {
            self.best_ask
        } else {
            self.best_bid
        }
    }

    /// Bid-ask spread. Zero when one side is absent.
    #[must_use]
    pub fn spread(&self) -> Price {
        if self.best_bid.is_positive() && self.best_ask.is_positive() {
            self.best_ask - self.best_bid
        } else {
            Price::ZERO
        }
    }
}

/// Aligned snapshot of all data sources at a point in time.
///
/// Produced by the synchronizer at a fixed cadence. Each slot holds the
/// latest observation from that source; slots are observed, not reconciled.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SynchronizedSnapshot {
    pub timestamp_ms: i64,
    pub spot_direct: Option<PriceUpdate>,
    pub venue_spot: Option<PriceUpdate>,
    pub venue_oracle: Option<PriceUpdate>,
    pub chain_oracle: Option<PriceUpdate>,
    /// Latest book per outcome token.
    pub books: HashMap<TokenId, OrderBookUpdate>,
}

impl SynchronizedSnapshot {
    /// Best available spot price: direct feed preferred over venue relay.
    #[must_use]
    pub fn spot_price(&self) -> Option<f64> {
        self.spot_direct
            .as_ref()
            .or(self.venue_spot.as_ref())
            .map(|u| u.price)
    }

    /// Best available oracle price: venue relay preferred over on-chain.
    #[must_use]
    pub fn oracle_price(&self) -> Option<f64> {
        self.venue_oracle
            .as_ref()
            .or(self.chain_oracle.as_ref())
            .map(|u| u.price)
    }

    /// Spot-to-oracle lag: spot timestamp minus oracle timestamp, using the
    /// same source preference as the derived prices.
    #[must_use]
    pub fn lag_ms(&self) -> Option<i64> {
        let spot_ts = self
            .spot_direct
            .as_ref()
            .or(self.venue_spot.as_ref())
            .map(|u| u.timestamp_ms)?;
        let oracle_ts = self
            .venue_oracle
            .as_ref()
            .or(self.chain_oracle.as_ref())
            .map(|u| u.timestamp_ms)?;
        Some(spot_ts - oracle_ts)
    }

    /// Percentage divergence of spot from oracle.
    #[must_use]
    pub fn divergence_pct(&self) -> Option<f64> {
        let spot = self.spot_price()?;
        let oracle = self.oracle_price()?;
        if oracle <= 0.0 {
            return None;
        }
        Some((spot - oracle) / oracle * 100.0)
    }

    #[must_use]
    pub fn book(&self, token: &TokenId) -> Option<&OrderBookUpdate> {
        self.books.get(token)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn book(bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> OrderBookUpdate {
        OrderBookUpdate {
            token: TokenId::new("tok"),
            best_bid: Price::new(bid),
            best_ask: Price::new(ask),
            bid_size: Size::new(dec!(100)),
            ask_size: Size::new(dec!(100)),
            timestamp_ms: 1_700_000_000_000,
        }
    }

    #[test]
    fn test_mid_price_both_sides() {
        let b = book(dec!(0.48), dec!(0.52));
        assert_eq!(b.mid_price(), Price::new(dec!(0.50)));
        assert_eq!(b.spread(), Price::new(dec!(0.04)));
    }

    #[test]
    fn test_mid_price_falls_back_to_present_side() {
        let no_bid = book(dec!(0), dec!(0.52));
        assert_eq!(no_bid.mid_price(), Price::new(dec!(0.52)));

        let no_ask = book(dec!(0.48), dec!(0));
        assert_eq!(no_ask.mid_price(), Price::new(dec!(0.48)));
    }

    fn update(source: StreamSource, price: f64, ts: i64) -> PriceUpdate {
        PriceUpdate::new(source, "BTCUSDT", price, ts)
    }

    #[test]
    fn test_source_preference() {
        let snap = SynchronizedSnapshot {
            timestamp_ms: 3000,
            spot_direct: Some(update(StreamSource::SpotDirect, 50_100.0, 2900)),
            venue_spot: Some(update(StreamSource::VenueSpot, 50_050.0, 2800)),
            venue_oracle: Some(update(StreamSource::VenueOracle, 50_000.0, 2000)),
            chain_oracle: Some(update(StreamSource::ChainOracle, 49_990.0, 1500)),
            books: HashMap::new(),
        };

        assert_eq!(snap.spot_price(), Some(50_100.0));
        assert_eq!(snap.oracle_price(), Some(50_000.0));
        // Lag uses the preferred sources: 2900 - 2000.
        assert_eq!(snap.lag_ms(), Some(900));
    }

    #[test]
    fn test_lag_follows_fallback_sources() {
        let snap = SynchronizedSnapshot {
            timestamp_ms: 3000,
            spot_direct: None,
            venue_spot: Some(update(StreamSource::VenueSpot, 50_050.0, 2800)),
            venue_oracle: None,
            chain_oracle: Some(update(StreamSource::ChainOracle, 49_990.0, 1500)),
            books: HashMap::new(),
        };
        assert_eq!(snap.lag_ms(), Some(1300));
    }

    #[test]
    fn test_lag_requires_both_sides() {
        let snap = SynchronizedSnapshot {
            timestamp_ms: 3000,
            spot_direct: Some(update(StreamSource::SpotDirect, 50_100.0, 2900)),
            ..Default::default()
        };
        assert_eq!(snap.lag_ms(), None);
        assert_eq!(snap.divergence_pct(), None);
    }

    #[test]
    fn test_divergence_pct() {
        let snap = SynchronizedSnapshot {
            timestamp_ms: 3000,
            spot_direct: Some(update(StreamSource::SpotDirect, 50_500.0, 2900)),
            venue_oracle: Some(update(StreamSource::VenueOracle, 50_000.0, 2000)),
            ..Default::default()
        };
        let div = snap.divergence_pct().unwrap();
        assert!((div - 1.0).abs() < 1e-9);
    }
}
