//! Signal evaluator configuration.

use crate::error::DetectorError;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};

/// Thresholds for each signal tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EvaluatorConfig {
    /// Tier 1: combined ask below this is a Dutch book.
    #[serde(default = "default_dutch_book_threshold")]
    pub dutch_book_threshold: Decimal,

    /// Tier 2: minimum |momentum| to consider lag arbitrage.
    #[serde(default = "default_momentum_trigger_threshold")]
    pub momentum_trigger_threshold: f64,
    /// Tier 2: maximum combined ask for a lag-arb entry. Tuned to
    /// zero-fee intervals.
    #[serde(default = "default_max_combined_price")]
    pub max_combined_price: Decimal,
    /// Tier 2: expected venue repricing lag.
    #[serde(default = "default_expected_lag_ms")]
    pub expected_lag_ms: u64,
    /// Tier 2: maximum window to wait for repricing.
    #[serde(default = "default_max_lag_window_ms")]
    pub max_lag_window_ms: u64,

    /// Tiers 2 and 3: minimum expected edge.
    #[serde(default = "default_momentum_min_edge")]
    pub momentum_min_edge: f64,
    /// Tier 3: minimum model confidence score.
    #[serde(default = "default_momentum_min_confidence")]
    pub momentum_min_confidence: f64,

    /// Tier 4: |deviation| beyond this arms the contrarian signal.
    #[serde(default = "default_flash_crash_threshold")]
    pub flash_crash_threshold: f64,
    /// Tier 4: fraction of the move expected to revert.
    #[serde(default = "default_flash_crash_reversion_target")]
    pub flash_crash_reversion_target: f64,

    /// Tier 3: minimum seconds to resolution.
    #[serde(default = "default_min_time_remaining_sec")]
    pub min_time_remaining_sec: u32,
}

fn default_dutch_book_threshold() -> Decimal {
    dec!(0.99)
}

fn default_momentum_trigger_threshold() -> f64 {
    0.001
}

fn default_max_combined_price() -> Decimal {
    dec!(0.995)
}

fn default_expected_lag_ms() -> u64 {
    2000
}

fn default_max_lag_window_ms() -> u64 {
    5000
}

fn default_momentum_min_edge() -> f64 {
    0.03
}

fn default_momentum_min_confidence() -> f64 {
    0.5
}

fn default_flash_crash_threshold() -> f64 {
    0.05
}

fn default_flash_crash_reversion_target() -> f64 {
    0.5
}

fn default_min_time_remaining_sec() -> u32 {
    300
}

impl Default for EvaluatorConfig {
    fn default() -> Self {
        Self {
            dutch_book_threshold: default_dutch_book_threshold(),
            momentum_trigger_threshold: default_momentum_trigger_threshold(),
            max_combined_price: default_max_combined_price(),
            expected_lag_ms: default_expected_lag_ms(),
            max_lag_window_ms: default_max_lag_window_ms(),
            momentum_min_edge: default_momentum_min_edge(),
            momentum_min_confidence: default_momentum_min_confidence(),
            flash_crash_threshold: default_flash_crash_threshold(),
            flash_crash_reversion_target: default_flash_crash_reversion_target(),
            min_time_remaining_sec: default_min_time_remaining_sec(),
        }
    }
}

impl EvaluatorConfig {
    /// Validate threshold sanity.
    pub fn validate(&self) -> Result<(), DetectorError> {
        if self.dutch_book_threshold <= Decimal::ZERO || self.dutch_book_threshold > Decimal::ONE {
            return Err(DetectorError::ConfigError(format!(
                "dutch_book_threshold must be in (0, 1], got {}",
                self.dutch_book_threshold
            )));
        }
        if self.momentum_trigger_threshold <= 0.0 {
            return Err(DetectorError::ConfigError(
                "momentum_trigger_threshold must be positive".to_string(),
            ));
        }
        if self.flash_crash_threshold <= 0.0 {
            return Err(DetectorError::ConfigError(
                "flash_crash_threshold must be positive".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&self.momentum_min_confidence) {
            return Err(DetectorError::ConfigError(format!(
                "momentum_min_confidence must be in [0, 1], got {}",
                self.momentum_min_confidence
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_are_valid() {
        assert!(EvaluatorConfig::default().validate().is_ok());
    }

    #[test]
    fn test_invalid_thresholds_rejected() {
        let config = EvaluatorConfig {
            dutch_book_threshold: dec!(1.5),
            ..EvaluatorConfig::default()
        };
        assert!(config.validate().is_err());

        let config = EvaluatorConfig {
            momentum_trigger_threshold: 0.0,
            ..EvaluatorConfig::default()
        };
        assert!(config.validate().is_err());
    }
}
