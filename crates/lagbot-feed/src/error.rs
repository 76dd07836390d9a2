//! Feed errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FeedError {
    #[error("token {0} is mapped by more than one market")]
    DuplicateToken(String),

    #[error(transparent)]
    Core(#[from] lagbot_core::CoreError),
}

pub type FeedResult<T> = std::result::Result<T, FeedError>;
