//! Probability model for up/down interval markets.
//!
//! The surface is fitted offline from historical candles and loaded here
//! from its frozen JSON representation. At runtime it is read-only:
//! - `ProbabilitySurface`: empirical P(UP) lookup with fallback chain
//! - `EdgeCalculator`: edge vs. market-implied probability, Kelly sizing
//! - `ModelBridge`: safe evaluation front returning `Option<ModelOutput>`

pub mod bridge;
pub mod edge;
pub mod error;
pub mod surface;

pub use bridge::{ModelBridge, ModelConfig, ModelOutput};
pub use edge::{EdgeCalculator, EdgeConfig, TradingOpportunity, KELLY_CAP};
pub use error::{ModelError, ModelResult};
pub use surface::{ProbabilityBucket, ProbabilitySurface, SurfaceEstimate};
