//! Tiered signal detection.
//!
//! Evaluates market conditions across four tiers and returns all
//! triggered signals sorted by priority:
//! 1. `DutchBook`: zero-risk arbitrage (combined ask below 1.0)
//! 2. `LagArb`: momentum-based lag arbitrage
//! 3. `Momentum`: model-confirmed directional signals
//! 4. `FlashCrash`: contrarian reversion signals

pub mod config;
pub mod error;
pub mod evaluator;
pub mod signal;

pub use config::EvaluatorConfig;
pub use error::{DetectorError, DetectorResult};
pub use evaluator::{EvalInput, SignalEvaluator};
pub use signal::{SignalMeta, UnifiedSignal};
