//! Core domain types for the up/down prediction-market trading engine.
//!
//! This crate provides the fundamental types shared across the system:
//! - `Price`, `Size`: precision-safe numeric types for venue quotes and shares
//! - `PriceUpdate`, `OrderBookUpdate`, `SynchronizedSnapshot`: feed data
//! - `Direction`, `SignalTier`: signal classification
//! - `MarketContext`, `UpDownMarket`: per-market state
//! - `TradingSession`, `VolRegime`: surface stratification tags

pub mod decimal;
pub mod error;
pub mod market;
pub mod order;
pub mod session;
pub mod signal;
pub mod types;

pub use decimal::{Price, Size};
pub use error::{CoreError, Result};
pub use market::{MarketContext, MarketId, TokenId, UpDownMarket};
pub use order::{OrderResult, OrderSide, OrderStatus};
pub use session::{session_at, TradingSession, VolRegime};
pub use signal::{Direction, SignalTier};
pub use types::{
    OrderBookUpdate, PriceUpdate, SpotTrade, StreamSource, SynchronizedSnapshot,
};
