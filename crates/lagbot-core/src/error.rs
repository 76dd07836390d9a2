//! Core error types.

use thiserror::Error;

/// Errors from core type parsing and validation.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("unknown trading session: {0}")]
    UnknownSession(String),

    #[error("unknown volatility regime: {0}")]
    UnknownVolRegime(String),

    #[error("invalid market definition: {0}")]
    InvalidMarket(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
