//! Risk circuit breakers.
//!
//! Gates every entry on consecutive losses, daily loss, and total
//! exposure; trips pause timers that lift automatically on expiry.

pub mod error;
pub mod manager;

pub use error::{RiskBlock, RiskError, RiskResult};
pub use manager::{RiskConfig, RiskManager, RiskState};
