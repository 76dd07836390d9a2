//! Model error types.

use thiserror::Error;

/// Errors from surface loading and model evaluation.
#[derive(Debug, Error)]
pub enum ModelError {
    #[error("surface file io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("surface file parse error: {0}")]
    Parse(#[from] serde_json::Error),

    #[error("invalid bucket key '{key}': {reason}")]
    InvalidKey { key: String, reason: String },

    #[error("invalid surface config: {0}")]
    InvalidConfig(String),

    #[error(transparent)]
    Core(#[from] lagbot_core::CoreError),
}

pub type ModelResult<T> = std::result::Result<T, ModelError>;
