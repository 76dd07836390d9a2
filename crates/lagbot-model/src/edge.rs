//! Edge calculation against market-implied probability.
//!
//! Compares the surface's P(UP) to the probability implied by the two
//! outcome-token asks, nets out round-trip fees, and produces Kelly
//! position sizing with a confidence score.

use crate::surface::ProbabilitySurface;
use lagbot_core::{Direction, TradingSession, VolRegime};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Kelly fraction safety cap (fraction of bankroll).
pub const KELLY_CAP: f64 = 0.25;

/// Edge calculator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EdgeConfig {
    /// Trading fee rate per fill (0.0 for hourly markets).
    #[serde(default)]
    pub fee_rate: f64,
    /// Minimum effective edge to consider tradeable.
    #[serde(default = "default_min_edge_threshold")]
    pub min_edge_threshold: f64,
    /// Minimum confidence score to consider tradeable.
    #[serde(default = "default_min_confidence_score")]
    pub min_confidence_score: f64,
    /// Only trade on reliable buckets (n >= 30).
    #[serde(default = "default_require_reliable")]
    pub require_reliable: bool,
    /// Use the CI bound on the chosen side instead of the point estimate.
    #[serde(default = "default_use_conservative_edge")]
    pub use_conservative_edge: bool,
}

fn default_min_edge_threshold() -> f64 {
    0.03
}

fn default_min_confidence_score() -> f64 {
    0.5
}

fn default_require_reliable() -> bool {
    true
}

fn default_use_conservative_edge() -> bool {
    true
}

impl Default for EdgeConfig {
    fn default() -> Self {
        Self {
            fee_rate: 0.0,
            min_edge_threshold: default_min_edge_threshold(),
            min_confidence_score: default_min_confidence_score(),
            require_reliable: default_require_reliable(),
            use_conservative_edge: default_use_conservative_edge(),
        }
    }
}

/// A potential trading opportunity identified by edge analysis.
#[derive(Debug, Clone)]
pub struct TradingOpportunity {
    // Context
    pub deviation_pct: f64,
    pub time_remaining_min: u32,
    pub vol_regime: VolRegime,
    pub session: TradingSession,

    // Model estimates
    pub prob_up: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub is_reliable: bool,
    pub sample_size: u32,

    // Market prices
    pub market_price_up: f64,
    pub market_price_down: f64,

    // Edge analysis
    pub direction: Direction,
    /// Point-estimate edge on the chosen side.
    pub raw_edge: f64,
    /// Point-estimate edge minus round-trip fee drag.
    pub edge_after_fees: f64,
    /// CI-bound edge on the chosen side.
    pub conservative_edge: f64,
    /// Edge used for gating: conservative or raw per config, net of fees.
    pub effective_edge: f64,
    pub expected_value: f64,
    pub kelly_fraction: f64,
    pub confidence_score: f64,

    pub is_tradeable: bool,
    pub reject_reason: Option<String>,
}

/// Calculates trading edge from the probability surface and market prices.
pub struct EdgeCalculator {
    surface: Arc<ProbabilitySurface>,
    config: EdgeConfig,
}

impl EdgeCalculator {
    #[must_use]
    pub fn new(surface: Arc<ProbabilitySurface>, config: EdgeConfig) -> Self {
        Self { surface, config }
    }

    #[must_use]
    pub fn config(&self) -> &EdgeConfig {
        &self.config
    }

    /// Confidence score from sample size and CI width.
    ///
    /// `0.6 * (1 - e^(-n/30)) + 0.4 * max(0, 1 - ci_width)`
    #[must_use]
    pub fn confidence_score(sample_size: u32, ci_width: f64) -> f64 {
        let size_score = 1.0 - (-f64::from(sample_size) / 30.0).exp();
        let ci_score = (1.0 - ci_width.min(1.0)).max(0.0);
        0.6 * size_score + 0.4 * ci_score
    }

    /// Kelly fraction for a binary payout.
    ///
    /// `b = (1 - price) * (1 - fee) / price`, `kelly = (p*b - (1-p)) / b`,
    /// clamped to `[0, 0.25]`.
    #[must_use]
    pub fn kelly_fraction(win_prob: f64, market_price: f64, fee_rate: f64) -> f64 {
        if market_price <= 0.0 || market_price >= 1.0 {
            return 0.0;
        }
        let b = (1.0 - market_price) * (1.0 - fee_rate) / market_price;
        if b <= 0.0 {
            return 0.0;
        }
        let kelly = (win_prob * b - (1.0 - win_prob)) / b;
        kelly.clamp(0.0, KELLY_CAP)
    }

    /// Calculate trading edge for current market conditions.
    ///
    /// `time_remaining_min` is in the surface's minute bins; the caller
    /// converts from seconds.
    #[must_use]
    pub fn calculate_edge(
        &self,
        deviation_pct: f64,
        time_remaining_min: u32,
        market_price_up: f64,
        market_price_down: f64,
        vol_regime: VolRegime,
        session: TradingSession,
    ) -> TradingOpportunity {
        let estimate =
            self.surface
                .get_probability(deviation_pct, time_remaining_min, vol_regime, session);
        let prob_up = estimate.win_rate;
        let confidence_score = Self::confidence_score(estimate.sample_size, estimate.ci_width());

        // Market-implied probability of UP. An efficient market sums to ~1.
        let market_total = market_price_up + market_price_down;
        let implied_prob_up = if market_total > 0.0 {
            market_price_up / market_total
        } else {
            0.5
        };

        let raw_edge_up = prob_up - implied_prob_up;
        let raw_edge_down = (1.0 - prob_up) - (1.0 - implied_prob_up);

        // Direction: the positive edge with the larger magnitude; a
        // magnitude tie goes to the UP side.
        let (direction, raw_edge, market_price, conservative_edge) =
            if raw_edge_up.abs() >= raw_edge_down.abs() && raw_edge_up > 0.0 {
                (
                    Direction::Up,
                    raw_edge_up,
                    market_price_up,
                    estimate.ci_lower - implied_prob_up,
                )
            } else if raw_edge_down > 0.0 {
                (
                    Direction::Down,
                    raw_edge_down,
                    market_price_down,
                    (1.0 - estimate.ci_upper) - (1.0 - implied_prob_up),
                )
            } else {
                (Direction::Neutral, 0.0, 0.5, 0.0)
            };

        // Fee applies on entry and, worst case, again on exit.
        let fee_drag = self.config.fee_rate * 2.0;
        let edge_after_fees = raw_edge - fee_drag;
        let effective_edge = if self.config.use_conservative_edge {
            conservative_edge - fee_drag
        } else {
            edge_after_fees
        };

        let kelly_fraction = if direction != Direction::Neutral && effective_edge > 0.0 {
            let win_prob = match direction {
                Direction::Up => prob_up,
                _ => 1.0 - prob_up,
            };
            Self::kelly_fraction(win_prob, market_price, self.config.fee_rate)
        } else {
            0.0
        };

        let expected_value = effective_edge.max(0.0);

        let (is_tradeable, reject_reason) = if direction == Direction::Neutral {
            (false, Some("no positive edge found".to_string()))
        } else if self.config.require_reliable && !estimate.is_reliable {
            (
                false,
                Some(format!(
                    "insufficient samples ({} < {})",
                    estimate.sample_size,
                    crate::surface::MIN_SAMPLES_RELIABLE
                )),
            )
        } else if confidence_score < self.config.min_confidence_score {
            (
                false,
                Some(format!(
                    "low confidence ({:.2} < {:.2})",
                    confidence_score, self.config.min_confidence_score
                )),
            )
        } else if effective_edge < self.config.min_edge_threshold {
            (
                false,
                Some(format!(
                    "edge too small ({:.3} < {:.3})",
                    effective_edge, self.config.min_edge_threshold
                )),
            )
        } else {
            (true, None)
        };

        TradingOpportunity {
            deviation_pct,
            time_remaining_min,
            vol_regime,
            session,
            prob_up,
            ci_lower: estimate.ci_lower,
            ci_upper: estimate.ci_upper,
            is_reliable: estimate.is_reliable,
            sample_size: estimate.sample_size,
            market_price_up,
            market_price_down,
            direction,
            raw_edge,
            edge_after_fees,
            conservative_edge,
            effective_edge,
            expected_value,
            kelly_fraction,
            confidence_score,
            is_tradeable,
            reject_reason,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn surface_with_bucket(win_rate: f64, n: u32) -> Arc<ProbabilitySurface> {
        let wins = (win_rate * f64::from(n)).round() as u32;
        Arc::new(
            ProbabilitySurface::from_json(json!({
                "config": {
                    "deviation_step": 0.001,
                    "deviation_range": [-0.02, 0.02],
                    "confidence_level": 0.95,
                },
                "deviation_bins": [],
                "time_bins": [10],
                "vol_regimes": ["low", "medium", "high", "all"],
                "sessions": ["asia", "europe", "us_eu_overlap", "us", "late_us", "all"],
                "buckets": {
                    "0.002|0.003|10|all|all": {
                        "sample_size": n,
                        "win_count": wins,
                        "win_rate": win_rate,
                        "ci_lower": win_rate - 0.05,
                        "ci_upper": win_rate + 0.05,
                        "ci_width": 0.1,
                        "is_reliable": n >= 30,
                        "is_usable": n >= 10,
                    }
                }
            }))
            .unwrap(),
        )
    }

    #[test]
    fn test_up_edge_detected() {
        let surface = surface_with_bucket(0.65, 100);
        let calc = EdgeCalculator::new(
            surface,
            EdgeConfig {
                use_conservative_edge: false,
                ..EdgeConfig::default()
            },
        );

        // Market prices UP at 52%, model says 65%.
        let opp =
            calc.calculate_edge(0.0025, 10, 0.52, 0.48, VolRegime::All, TradingSession::All);

        assert_eq!(opp.direction, Direction::Up);
        assert!((opp.raw_edge - 0.13).abs() < 1e-9);
        assert!(opp.is_tradeable, "reject: {:?}", opp.reject_reason);
        assert!(opp.kelly_fraction > 0.0);
        assert!(opp.kelly_fraction <= KELLY_CAP);
    }

    #[test]
    fn test_down_edge_detected() {
        let surface = surface_with_bucket(0.35, 100);
        let calc = EdgeCalculator::new(
            surface,
            EdgeConfig {
                use_conservative_edge: false,
                ..EdgeConfig::default()
            },
        );

        let opp =
            calc.calculate_edge(0.0025, 10, 0.50, 0.50, VolRegime::All, TradingSession::All);

        assert_eq!(opp.direction, Direction::Down);
        assert!((opp.raw_edge - 0.15).abs() < 1e-9);
    }

    #[test]
    fn test_no_edge_is_neutral() {
        let surface = surface_with_bucket(0.50, 100);
        let calc = EdgeCalculator::new(surface, EdgeConfig::default());

        let opp =
            calc.calculate_edge(0.0025, 10, 0.50, 0.50, VolRegime::All, TradingSession::All);

        assert_eq!(opp.direction, Direction::Neutral);
        assert!(!opp.is_tradeable);
        assert_eq!(opp.kelly_fraction, 0.0);
    }

    #[test]
    fn test_fee_drag_applied_twice() {
        let surface = surface_with_bucket(0.65, 100);
        let calc = EdgeCalculator::new(
            surface,
            EdgeConfig {
                fee_rate: 0.03,
                use_conservative_edge: false,
                ..EdgeConfig::default()
            },
        );

        let opp =
            calc.calculate_edge(0.0025, 10, 0.52, 0.48, VolRegime::All, TradingSession::All);

        // raw 0.13, drag 0.06.
        assert!((opp.edge_after_fees - 0.07).abs() < 1e-9);
    }

    #[test]
    fn test_unreliable_bucket_rejected() {
        let surface = surface_with_bucket(0.70, 12);
        let calc = EdgeCalculator::new(surface, EdgeConfig::default());

        let opp =
            calc.calculate_edge(0.0025, 10, 0.50, 0.50, VolRegime::All, TradingSession::All);

        assert!(!opp.is_tradeable);
        assert!(opp
            .reject_reason
            .as_deref()
            .unwrap()
            .contains("insufficient samples"));
    }

    #[test]
    fn test_prior_has_no_edge() {
        let surface = surface_with_bucket(0.65, 100);
        let calc = EdgeCalculator::new(surface, EdgeConfig::default());

        // Query far from the only bucket: uniform prior, no direction.
        let opp =
            calc.calculate_edge(-0.015, 10, 0.50, 0.50, VolRegime::All, TradingSession::All);

        assert_eq!(opp.direction, Direction::Neutral);
        assert!(!opp.is_tradeable);
    }

    #[test]
    fn test_confidence_score_shape() {
        // Zero samples: only the CI term can contribute.
        assert!(EdgeCalculator::confidence_score(0, 1.0) < 1e-9);
        // Large n, tight CI: approaches 1.
        assert!(EdgeCalculator::confidence_score(300, 0.05) > 0.9);
        // Monotone in n.
        assert!(
            EdgeCalculator::confidence_score(60, 0.2)
                > EdgeCalculator::confidence_score(10, 0.2)
        );
    }

    #[test]
    fn test_kelly_cap() {
        // Overwhelming edge still capped at 25%.
        let kelly = EdgeCalculator::kelly_fraction(0.95, 0.50, 0.0);
        assert_eq!(kelly, KELLY_CAP);
        // Negative edge floors at zero.
        let kelly = EdgeCalculator::kelly_fraction(0.30, 0.50, 0.0);
        assert_eq!(kelly, 0.0);
        // Degenerate prices yield zero.
        assert_eq!(EdgeCalculator::kelly_fraction(0.6, 0.0, 0.0), 0.0);
        assert_eq!(EdgeCalculator::kelly_fraction(0.6, 1.0, 0.0), 0.0);
    }
}
