//! Market identifiers and per-market context.

use crate::decimal::Price;
use crate::error::CoreError;
use crate::session::TradingSession;
use serde::{Deserialize, Serialize};

/// Venue-assigned identifier of one outcome token.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TokenId(pub String);

impl TokenId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short prefix for logging (token ids are long hex strings).
    #[must_use]
    pub fn short(&self) -> &str {
        let end = self.0.len().min(12);
        &self.0[..end]
    }
}

impl std::fmt::Display for TokenId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.short())
    }
}

/// Venue-assigned identifier of one prediction market (condition id).
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct MarketId(pub String);

impl MarketId {
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for MarketId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// One up/down interval market in the working set.
///
/// The market resolves on whether the reference asset closed above its
/// interval-open price. Resolution boundaries are aligned to
/// `interval_sec` on the UTC clock.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpDownMarket {
    pub market_id: MarketId,
    /// Human-readable market slug, used in logs.
    pub slug: String,
    /// Reference asset trading pair (e.g., "BTCUSDT").
    pub symbol: String,
    pub up_token: TokenId,
    pub down_token: TokenId,
    /// Interval length in seconds (3600 for hourly markets).
    pub interval_sec: u32,
}

impl UpDownMarket {
    /// Validate the market definition.
    pub fn validate(&self) -> Result<(), CoreError> {
        if self.interval_sec == 0 {
            return Err(CoreError::InvalidMarket(format!(
                "{}: interval_sec must be positive",
                self.slug
            )));
        }
        if self.up_token == self.down_token {
            return Err(CoreError::InvalidMarket(format!(
                "{}: up and down tokens are identical",
                self.slug
            )));
        }
        Ok(())
    }

    /// End of the interval containing `now_ms`, in milliseconds.
    #[must_use]
    pub fn interval_end_ms(&self, now_ms: i64) -> i64 {
        let interval_ms = i64::from(self.interval_sec) * 1000;
        (now_ms / interval_ms + 1) * interval_ms
    }

    /// Seconds until the market containing `now_ms` resolves.
    #[must_use]
    pub fn time_remaining_sec(&self, now_ms: i64) -> u32 {
        let remaining_ms = self.interval_end_ms(now_ms) - now_ms;
        (remaining_ms / 1000).max(0) as u32
    }
}

/// Market state snapshot at signal time.
///
/// Captures both outcome tokens' top-of-book prices plus timing.
/// Invariant: `combined_ask >= combined_bid`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarketContext {
    pub timestamp_ms: i64,
    /// Best ask for the UP token.
    pub up_ask: Price,
    /// Best ask for the DOWN token.
    pub down_ask: Price,
    pub up_bid: Price,
    pub down_bid: Price,
    /// `up_ask + down_ask`.
    pub combined_ask: Price,
    /// `up_bid + down_bid`.
    pub combined_bid: Price,
    /// Seconds until market resolution.
    pub time_remaining_sec: u32,
    pub session: TradingSession,
}

impl MarketContext {
    #[must_use]
    pub fn new(
        timestamp_ms: i64,
        up_ask: Price,
        down_ask: Price,
        up_bid: Price,
        down_bid: Price,
        time_remaining_sec: u32,
        session: TradingSession,
    ) -> Self {
        Self {
            timestamp_ms,
            up_ask,
            down_ask,
            up_bid,
            down_bid,
            combined_ask: up_ask + down_ask,
            combined_bid: up_bid + down_bid,
            time_remaining_sec,
            session,
        }
    }

    /// Spread between combined ask and combined bid.
    #[must_use]
    pub fn spread(&self) -> Price {
        self.combined_ask - self.combined_bid
    }

    /// True when buying both sides locks in a risk-free payout.
    #[must_use]
    pub fn is_dutch_book(&self) -> bool {
        self.combined_ask < Price::ONE
    }
}
