//! Market-data derivation on top of the raw feeds.
//!
//! - `PriceTracker`: per-symbol interval candle plus a rolling trade
//!   window, emitting `DirectionSignal`s on significant moves
//! - `WorkingSet`: the engine's market list with token routing and
//!   `MarketContext` construction from synchronized books

pub mod error;
pub mod market_state;
pub mod tracker;

pub use error::{FeedError, FeedResult};
pub use market_state::WorkingSet;
pub use tracker::{DirectionSignal, PriceTracker, SymbolTracker, TrackerConfig};
