//! Position tracking errors.

use lagbot_core::MarketId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum PositionError {
    #[error("market {0} already has an open position")]
    AlreadyOpen(MarketId),

    #[error("no open position for market {0}")]
    NotFound(MarketId),

    #[error("the {side} leg of market {market} has already been exited")]
    LegAlreadyExited { market: MarketId, side: &'static str },
}

pub type PositionResult<T> = std::result::Result<T, PositionError>;
