//! Persistence errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PersistenceError {
    #[error("spool io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("spool serialization error: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type PersistenceResult<T> = std::result::Result<T, PersistenceError>;
