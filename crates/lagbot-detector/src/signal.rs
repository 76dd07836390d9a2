//! Unified signal type produced by the evaluator.

use lagbot_core::{Direction, MarketContext, MarketId, Price, SignalTier, VolRegime};
use lagbot_model::ModelOutput;
use serde::{Deserialize, Serialize};

/// Per-tier signal metadata.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SignalMeta {
    DutchBook {
        /// Guaranteed profit as a fraction of entry cost.
        profit_pct: f64,
        combined_ask: Price,
        up_ask: Price,
        down_ask: Price,
    },
    LagArb {
        momentum: f64,
        deviation_pct: f64,
        expected_lag_ms: u64,
        max_lag_window_ms: u64,
    },
    Momentum {
        prob_up: f64,
        kelly_fraction: f64,
        is_reliable: bool,
        vol_regime: VolRegime,
    },
    FlashCrash {
        deviation_pct: f64,
        reversion_target: f64,
    },
}

/// A triggered signal, combining momentum, market, and model data.
///
/// The momentum fields are always present; market context and model
/// output depend on what was available at evaluation time.
#[derive(Debug, Clone)]
pub struct UnifiedSignal {
    pub tier: SignalTier,
    pub direction: Direction,
    /// Reference asset pair (e.g., "BTCUSDT").
    pub symbol: String,
    pub market_id: Option<MarketId>,
    pub timestamp_ms: i64,

    // Momentum data from the price tracker.
    pub momentum: f64,
    pub candle_open: f64,
    pub spot_price: f64,
    pub move_from_open: f64,

    pub market: Option<MarketContext>,
    pub model: Option<ModelOutput>,

    pub expected_edge: f64,
    pub confidence: f64,
    pub meta: SignalMeta,
}

impl UnifiedSignal {
    /// True if this signal should be acted upon: non-neutral direction,
    /// confidence at least 0.4, and positive expected edge.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.direction != Direction::Neutral
            && self.confidence >= 0.4
            && self.expected_edge > 0.0
    }

    /// True for zero-risk opportunities.
    #[must_use]
    pub fn is_dutch_book(&self) -> bool {
        self.tier == SignalTier::DutchBook
    }

    /// Numeric priority (lower = higher priority).
    #[must_use]
    pub fn priority(&self) -> u8 {
        self.tier.priority()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn base_signal() -> UnifiedSignal {
        UnifiedSignal {
            tier: SignalTier::LagArb,
            direction: Direction::Up,
            symbol: "BTCUSDT".to_string(),
            market_id: None,
            timestamp_ms: 0,
            momentum: 0.002,
            candle_open: 50_000.0,
            spot_price: 50_100.0,
            move_from_open: 0.002,
            market: None,
            model: None,
            expected_edge: 0.05,
            confidence: 0.7,
            meta: SignalMeta::LagArb {
                momentum: 0.002,
                deviation_pct: 0.002,
                expected_lag_ms: 2000,
                max_lag_window_ms: 5000,
            },
        }
    }

    #[test]
    fn test_actionable_requires_all_three() {
        let signal = base_signal();
        assert!(signal.is_actionable());

        let mut neutral = base_signal();
        neutral.direction = Direction::Neutral;
        assert!(!neutral.is_actionable());

        let mut low_confidence = base_signal();
        low_confidence.confidence = 0.39;
        assert!(!low_confidence.is_actionable());

        let mut no_edge = base_signal();
        no_edge.expected_edge = 0.0;
        assert!(!no_edge.is_actionable());
    }

    #[test]
    fn test_confidence_boundary_is_inclusive() {
        let mut signal = base_signal();
        signal.confidence = 0.4;
        assert!(signal.is_actionable());
    }
}
