//! Stateless multi-tier signal evaluator.
//!
//! Each invocation checks the four tiers in priority order and returns
//! every triggered signal, sorted by tier. Evaluation is a pure function
//! of its inputs and the frozen surface behind the model bridge: same
//! inputs produce the same signal list in the same order.

use crate::config::EvaluatorConfig;
use crate::error::DetectorResult;
use crate::signal::{SignalMeta, UnifiedSignal};
use lagbot_core::{Direction, MarketContext, MarketId, SignalTier};
use lagbot_model::{ModelBridge, ModelOutput};
use std::sync::Arc;
use tracing::debug;

/// Inputs to one evaluation pass.
#[derive(Debug, Clone, Copy)]
pub struct EvalInput<'a> {
    pub symbol: &'a str,
    pub market_id: Option<&'a MarketId>,
    /// Evaluation timestamp; threaded through so the pass stays pure.
    pub timestamp_ms: i64,
    /// Rolling-window momentum from the price tracker.
    pub momentum: f64,
    /// Deviation of spot from the interval open.
    pub deviation_pct: f64,
    pub spot_price: f64,
    pub candle_open: f64,
    pub market: Option<&'a MarketContext>,
    pub time_remaining_sec: u32,
}

/// Stateless multi-tier signal evaluator.
///
/// Reentrant: holds only the config and a shared handle to the frozen
/// model, so concurrent evaluations are safe.
pub struct SignalEvaluator {
    config: EvaluatorConfig,
    bridge: Option<Arc<ModelBridge>>,
}

impl SignalEvaluator {
    /// Create an evaluator. The model bridge is optional; without it the
    /// model-confirmed tier never fires and lag arbitrage falls back to
    /// its momentum heuristic.
    pub fn new(
        config: EvaluatorConfig,
        bridge: Option<Arc<ModelBridge>>,
    ) -> DetectorResult<Self> {
        config.validate()?;
        Ok(Self { config, bridge })
    }

    #[must_use]
    pub fn config(&self) -> &EvaluatorConfig {
        &self.config
    }

    /// Replace the configuration (hot-reload support).
    pub fn update_config(&mut self, config: EvaluatorConfig) -> DetectorResult<()> {
        config.validate()?;
        debug!(
            dutch_book_threshold = %config.dutch_book_threshold,
            momentum_trigger = config.momentum_trigger_threshold,
            "evaluator config updated"
        );
        self.config = config;
        Ok(())
    }

    /// Evaluate all tiers and return triggered signals sorted by priority.
    #[must_use]
    pub fn evaluate(&self, input: &EvalInput<'_>) -> Vec<UnifiedSignal> {
        let mut signals = Vec::new();

        let model_output = match (&self.bridge, input.market) {
            (Some(bridge), Some(market)) => bridge.evaluate(
                input.deviation_pct,
                input.time_remaining_sec,
                market.session,
                Some((market.up_ask.to_f64(), market.down_ask.to_f64())),
            ),
            _ => None,
        };

        // Tier 1: Dutch book (zero risk).
        if let Some(market) = input.market {
            if market.combined_ask.inner() < self.config.dutch_book_threshold {
                if let Some(signal) = self.dutch_book_signal(input, market) {
                    signals.push(signal);
                }
            }
        }

        // Tier 2: lag arbitrage (momentum-based).
        if input.momentum.abs() >= self.config.momentum_trigger_threshold {
            if let Some(market) = input.market {
                if market.combined_ask.inner() < self.config.max_combined_price {
                    if let Some(signal) =
                        self.lag_arb_signal(input, market, model_output.as_ref())
                    {
                        signals.push(signal);
                    }
                }
            }
        }

        // Tier 3: model-confirmed momentum.
        if let Some(model) = model_output.as_ref() {
            if model.has_edge()
                && model.edge_after_fees >= self.config.momentum_min_edge
                && model.confidence_score >= self.config.momentum_min_confidence
            {
                if let Some(signal) = self.momentum_signal(input, model) {
                    signals.push(signal);
                }
            }
        }

        // Tier 4: flash crash (contrarian reversion).
        if input.deviation_pct.abs() >= self.config.flash_crash_threshold {
            if let Some(signal) = self.flash_crash_signal(input) {
                signals.push(signal);
            }
        }

        // Stable sort: ties retain construction order.
        signals.sort_by_key(UnifiedSignal::priority);
        signals
    }

    fn dutch_book_signal(
        &self,
        input: &EvalInput<'_>,
        market: &MarketContext,
    ) -> Option<UnifiedSignal> {
        if market.combined_ask >= lagbot_core::Price::ONE {
            return None;
        }

        // Buying both sides locks in 1.0 at resolution.
        let profit = (lagbot_core::Price::ONE - market.combined_ask).to_f64();
        let combined = market.combined_ask.to_f64();
        let profit_pct = if combined > 0.0 { profit / combined } else { 0.0 };

        // Direction flags the cheaper side; a tie goes to UP.
        let direction = if market.up_ask <= market.down_ask {
            Direction::Up
        } else {
            Direction::Down
        };

        Some(UnifiedSignal {
            tier: SignalTier::DutchBook,
            direction,
            symbol: input.symbol.to_string(),
            market_id: input.market_id.cloned(),
            timestamp_ms: input.timestamp_ms,
            momentum: 0.0, // not examined for this tier
            candle_open: input.candle_open,
            spot_price: input.spot_price,
            move_from_open: input.deviation_pct,
            market: Some(market.clone()),
            model: None,
            expected_edge: profit,
            confidence: 1.0,
            meta: SignalMeta::DutchBook {
                profit_pct,
                combined_ask: market.combined_ask,
                up_ask: market.up_ask,
                down_ask: market.down_ask,
            },
        })
    }

    fn lag_arb_signal(
        &self,
        input: &EvalInput<'_>,
        market: &MarketContext,
        model: Option<&ModelOutput>,
    ) -> Option<UnifiedSignal> {
        let direction = if input.momentum > 0.0 {
            Direction::Up
        } else {
            Direction::Down
        };

        // Prefer the model's edge; otherwise estimate from momentum
        // strength with medium confidence.
        let (expected_edge, confidence) = match model {
            Some(m) if m.has_edge() => (m.edge_after_fees, m.confidence_score),
            _ => (input.momentum.abs() * 2.0, 0.7),
        };

        if expected_edge < self.config.momentum_min_edge {
            return None;
        }

        Some(UnifiedSignal {
            tier: SignalTier::LagArb,
            direction,
            symbol: input.symbol.to_string(),
            market_id: input.market_id.cloned(),
            timestamp_ms: input.timestamp_ms,
            momentum: input.momentum,
            candle_open: input.candle_open,
            spot_price: input.spot_price,
            move_from_open: input.deviation_pct,
            market: Some(market.clone()),
            model: model.cloned(),
            expected_edge,
            confidence,
            meta: SignalMeta::LagArb {
                momentum: input.momentum,
                deviation_pct: input.deviation_pct,
                expected_lag_ms: self.config.expected_lag_ms,
                max_lag_window_ms: self.config.max_lag_window_ms,
            },
        })
    }

    fn momentum_signal(
        &self,
        input: &EvalInput<'_>,
        model: &ModelOutput,
    ) -> Option<UnifiedSignal> {
        if input.time_remaining_sec < self.config.min_time_remaining_sec {
            return None;
        }

        Some(UnifiedSignal {
            tier: SignalTier::Momentum,
            direction: model.direction,
            symbol: input.symbol.to_string(),
            market_id: input.market_id.cloned(),
            timestamp_ms: input.timestamp_ms,
            momentum: input.momentum,
            candle_open: input.candle_open,
            spot_price: input.spot_price,
            move_from_open: input.deviation_pct,
            market: input.market.cloned(),
            model: Some(model.clone()),
            expected_edge: model.edge_after_fees,
            confidence: model.confidence_score,
            meta: SignalMeta::Momentum {
                prob_up: model.prob_up,
                kelly_fraction: model.kelly_fraction,
                is_reliable: model.is_reliable,
                vol_regime: model.vol_regime,
            },
        })
    }

    fn flash_crash_signal(&self, input: &EvalInput<'_>) -> Option<UnifiedSignal> {
        // Contrarian: fade the move, expecting partial reversion. The
        // comparisons are strict, so a deviation exactly at the threshold
        // does not trigger.
        let direction = if input.deviation_pct < -self.config.flash_crash_threshold {
            Direction::Up
        } else if input.deviation_pct > self.config.flash_crash_threshold {
            Direction::Down
        } else {
            return None;
        };

        let expected_reversion =
            input.deviation_pct.abs() * self.config.flash_crash_reversion_target;

        Some(UnifiedSignal {
            tier: SignalTier::FlashCrash,
            direction,
            symbol: input.symbol.to_string(),
            market_id: input.market_id.cloned(),
            timestamp_ms: input.timestamp_ms,
            momentum: input.momentum,
            candle_open: input.candle_open,
            spot_price: input.spot_price,
            move_from_open: input.deviation_pct,
            market: input.market.cloned(),
            model: None,
            expected_edge: expected_reversion,
            confidence: 0.4,
            meta: SignalMeta::FlashCrash {
                deviation_pct: input.deviation_pct,
                reversion_target: self.config.flash_crash_reversion_target,
            },
        })
    }
}
