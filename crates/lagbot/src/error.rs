//! Application-level errors.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum AppError {
    #[error("config error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("invalid config: {0}")]
    InvalidConfig(String),

    /// Surface load failure is the one fatal startup path.
    #[error("model error: {0}")]
    Model(#[from] lagbot_model::ModelError),

    #[error("detector error: {0}")]
    Detector(#[from] lagbot_detector::DetectorError),

    #[error("feed error: {0}")]
    Feed(#[from] lagbot_feed::FeedError),

    #[error("risk error: {0}")]
    Risk(#[from] lagbot_risk::RiskError),
}

pub type AppResult<T> = std::result::Result<T, AppError>;
