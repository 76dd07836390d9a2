//! Safe evaluation front over the surface and edge calculator.
//!
//! The engine talks to the model exclusively through `ModelBridge`:
//! surface load failure is fatal at startup, but every runtime evaluation
//! degrades to `None` so the evaluator can fall back to non-model tiers.

use crate::edge::{EdgeCalculator, EdgeConfig};
use crate::error::ModelResult;
use crate::surface::ProbabilitySurface;
use lagbot_core::{Direction, TradingSession, VolRegime};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, warn};

/// Model configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Path to the frozen probability surface JSON.
    pub surface_path: PathBuf,
    /// Edge calculation parameters.
    #[serde(flatten)]
    pub edge: EdgeConfig,
    /// Volatility regime passed to lookups. The engine does not estimate
    /// realized volatility live; `all` uses the aggregate buckets.
    #[serde(default = "default_vol_regime")]
    pub vol_regime: VolRegime,
}

fn default_vol_regime() -> VolRegime {
    VolRegime::All
}

/// Direction-aware model evaluation consumed by the signal evaluator.
#[derive(Debug, Clone, PartialEq)]
pub struct ModelOutput {
    pub prob_up: f64,
    pub ci_lower: f64,
    pub ci_upper: f64,
    pub is_reliable: bool,
    /// Point-estimate edge net of round-trip fees.
    pub edge_after_fees: f64,
    /// Confidence score in [0, 1].
    pub confidence_score: f64,
    /// Kelly fraction in [0, 0.25].
    pub kelly_fraction: f64,
    pub direction: Direction,
    pub deviation_pct: f64,
    pub vol_regime: VolRegime,
}

impl ModelOutput {
    /// True when the model indicates a positive, reliable edge.
    #[must_use]
    pub fn has_edge(&self) -> bool {
        self.edge_after_fees > 0.0 && self.is_reliable
    }
}

/// Bridge between the frozen model and the trading engine.
pub struct ModelBridge {
    surface: Arc<ProbabilitySurface>,
    calculator: EdgeCalculator,
    vol_regime: VolRegime,
}

impl ModelBridge {
    /// Load the surface and build the calculator. Errors here abort
    /// engine startup.
    pub fn load(config: &ModelConfig) -> ModelResult<Self> {
        let surface = Arc::new(ProbabilitySurface::load(&config.surface_path)?);
        info!(
            buckets = surface.bucket_count(),
            vol_regime = %config.vol_regime,
            "model bridge ready"
        );
        Ok(Self {
            calculator: EdgeCalculator::new(surface.clone(), config.edge.clone()),
            surface,
            vol_regime: config.vol_regime,
        })
    }

    /// Build a bridge from an already-loaded surface (tests, tooling).
    #[must_use]
    pub fn from_surface(surface: Arc<ProbabilitySurface>, edge: EdgeConfig, vol: VolRegime) -> Self {
        Self {
            calculator: EdgeCalculator::new(surface.clone(), edge),
            surface,
            vol_regime: vol,
        }
    }

    #[must_use]
    pub fn surface(&self) -> &ProbabilitySurface {
        &self.surface
    }

    /// Evaluate the model for current market conditions.
    ///
    /// `market_asks` is `(up_ask, down_ask)`; without it only the
    /// probability estimate is returned (zero edge, Neutral direction).
    /// Degenerate inputs are logged and demoted to `None`.
    #[must_use]
    pub fn evaluate(
        &self,
        deviation_pct: f64,
        time_remaining_sec: u32,
        session: TradingSession,
        market_asks: Option<(f64, f64)>,
    ) -> Option<ModelOutput> {
        if !deviation_pct.is_finite() {
            warn!(deviation_pct, "model evaluation skipped: bad deviation");
            return None;
        }

        // The surface bins time remaining in minutes.
        let time_remaining_min = time_remaining_sec / 60;

        let Some((up_ask, down_ask)) = market_asks else {
            let estimate = self.surface.get_probability(
                deviation_pct,
                time_remaining_min,
                self.vol_regime,
                session,
            );
            return Some(ModelOutput {
                prob_up: estimate.win_rate,
                ci_lower: estimate.ci_lower,
                ci_upper: estimate.ci_upper,
                is_reliable: estimate.is_reliable,
                edge_after_fees: 0.0,
                confidence_score: 0.0,
                kelly_fraction: 0.0,
                direction: Direction::Neutral,
                deviation_pct,
                vol_regime: self.vol_regime,
            });
        };

        if !(up_ask.is_finite() && down_ask.is_finite()) || up_ask <= 0.0 || down_ask <= 0.0 {
            warn!(up_ask, down_ask, "model evaluation skipped: bad market prices");
            return None;
        }

        let opp = self.calculator.calculate_edge(
            deviation_pct,
            time_remaining_min,
            up_ask,
            down_ask,
            self.vol_regime,
            session,
        );

        Some(ModelOutput {
            prob_up: opp.prob_up,
            ci_lower: opp.ci_lower,
            ci_upper: opp.ci_upper,
            is_reliable: opp.is_reliable,
            edge_after_fees: opp.edge_after_fees,
            confidence_score: opp.confidence_score,
            kelly_fraction: opp.kelly_fraction,
            direction: opp.direction,
            deviation_pct,
            vol_regime: opp.vol_regime,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn test_bridge() -> ModelBridge {
        let surface = Arc::new(
            ProbabilitySurface::from_json(json!({
                "config": {
                    "deviation_step": 0.001,
                    "deviation_range": [-0.02, 0.02],
                    "confidence_level": 0.95,
                },
                "deviation_bins": [],
                "time_bins": [10, 50],
                "vol_regimes": ["low", "medium", "high", "all"],
                "sessions": ["asia", "europe", "us_eu_overlap", "us", "late_us", "all"],
                "buckets": {
                    "0.002|0.003|50|all|all": {
                        "sample_size": 120,
                        "win_count": 78,
                        "win_rate": 0.65,
                        "ci_lower": 0.60,
                        "ci_upper": 0.70,
                        "ci_width": 0.1,
                        "is_reliable": true,
                        "is_usable": true,
                    }
                }
            }))
            .unwrap(),
        );
        ModelBridge::from_surface(
            surface,
            EdgeConfig {
                use_conservative_edge: false,
                ..EdgeConfig::default()
            },
            VolRegime::All,
        )
    }

    #[test]
    fn test_evaluate_with_market() {
        let bridge = test_bridge();
        // 3000 sec = 50 min bin.
        let output = bridge
            .evaluate(0.0025, 3000, TradingSession::All, Some((0.52, 0.48)))
            .unwrap();

        assert_eq!(output.direction, Direction::Up);
        assert!(output.has_edge());
        assert!(output.kelly_fraction > 0.0);
    }

    #[test]
    fn test_evaluate_probability_only() {
        let bridge = test_bridge();
        let output = bridge
            .evaluate(0.0025, 3000, TradingSession::All, None)
            .unwrap();

        assert_eq!(output.direction, Direction::Neutral);
        assert!((output.prob_up - 0.65).abs() < 1e-9);
        assert_eq!(output.edge_after_fees, 0.0);
        assert!(!output.has_edge());
    }

    #[test]
    fn test_bad_inputs_demote_to_none() {
        let bridge = test_bridge();
        assert!(bridge
            .evaluate(f64::NAN, 3000, TradingSession::All, Some((0.52, 0.48)))
            .is_none());
        assert!(bridge
            .evaluate(0.0025, 3000, TradingSession::All, Some((0.0, 0.48)))
            .is_none());
    }
}
