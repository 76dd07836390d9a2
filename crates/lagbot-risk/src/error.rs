//! Risk gate errors and block reasons.

use rust_decimal::Decimal;
use thiserror::Error;

/// Why an entry was blocked. Blocks are named so the engine can emit
/// them as structured events.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum RiskBlock {
    #[error("trading paused: {reason}")]
    Paused { reason: String },

    #[error("exposure limit: {proposed_total} > {max_total_exposure}")]
    ExposureLimit {
        proposed_total: Decimal,
        max_total_exposure: Decimal,
    },
}

#[derive(Debug, Error)]
pub enum RiskError {
    #[error("invalid risk config: {0}")]
    ConfigError(String),
}

pub type RiskResult<T> = std::result::Result<T, RiskError>;
