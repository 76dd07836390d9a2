//! Paired-token position tracking.
//!
//! A position holds both outcome tokens of one up/down market. Exits may
//! be partial (one leg) or full (both legs); realized P&L accrues per leg
//! and the position stays open until its last leg is sold or resolves.

pub mod error;
pub mod manager;

pub use error::{PositionError, PositionResult};
pub use manager::{Position, PositionManager, PositionStatus};
