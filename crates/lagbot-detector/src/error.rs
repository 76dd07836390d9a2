//! Detector error types.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum DetectorError {
    #[error("invalid evaluator config: {0}")]
    ConfigError(String),
}

pub type DetectorResult<T> = std::result::Result<T, DetectorError>;
