//! Risk state and circuit-breaker logic.

use crate::error::{RiskBlock, RiskError};
use chrono::{DateTime, Duration, Utc};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

/// Pause length after the daily loss limit trips.
const DAILY_LOSS_PAUSE_SEC: i64 = 86_400;

/// Risk limits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RiskConfig {
    /// Consecutive losing closes before a cooldown pause.
    #[serde(default = "default_max_consecutive_losses")]
    pub max_consecutive_losses: u32,
    /// Cooldown length after a loss streak, in seconds.
    #[serde(default = "default_cooldown_after_loss_sec")]
    pub cooldown_after_loss_sec: i64,
    /// Daily loss (positive number) that pauses trading for 24 h.
    #[serde(default = "default_max_daily_loss")]
    pub max_daily_loss: Decimal,
    /// Cap on total entry cost across open positions.
    #[serde(default = "default_max_total_exposure")]
    pub max_total_exposure: Decimal,
}

fn default_max_consecutive_losses() -> u32 {
    3
}

fn default_cooldown_after_loss_sec() -> i64 {
    300
}

fn default_max_daily_loss() -> Decimal {
    dec!(50)
}

fn default_max_total_exposure() -> Decimal {
    dec!(500)
}

impl Default for RiskConfig {
    fn default() -> Self {
        Self {
            max_consecutive_losses: default_max_consecutive_losses(),
            cooldown_after_loss_sec: default_cooldown_after_loss_sec(),
            max_daily_loss: default_max_daily_loss(),
            max_total_exposure: default_max_total_exposure(),
        }
    }
}

impl RiskConfig {
    pub fn validate(&self) -> Result<(), RiskError> {
        if self.max_consecutive_losses == 0 {
            return Err(RiskError::ConfigError(
                "max_consecutive_losses must be positive".to_string(),
            ));
        }
        if self.cooldown_after_loss_sec <= 0 {
            return Err(RiskError::ConfigError(
                "cooldown_after_loss_sec must be positive".to_string(),
            ));
        }
        if self.max_total_exposure <= Decimal::ZERO {
            return Err(RiskError::ConfigError(
                "max_total_exposure must be positive".to_string(),
            ));
        }
        Ok(())
    }
}

/// Current risk state.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RiskState {
    pub consecutive_losses: u32,
    pub daily_pnl: Decimal,
    pub last_loss_at: Option<DateTime<Utc>>,
    pub is_paused: bool,
    pub pause_reason: Option<String>,
    pub pause_until: Option<DateTime<Utc>>,
}

/// Circuit breakers gating every entry.
///
/// Owned and mutated exclusively by the engine task. The `*_at` variants
/// take an explicit clock so cooldown expiry is testable; the plain
/// variants use `Utc::now()`.
pub struct RiskManager {
    config: RiskConfig,
    state: RiskState,
}

impl RiskManager {
    #[must_use]
    pub fn new(config: RiskConfig) -> Self {
        Self {
            config,
            state: RiskState::default(),
        }
    }

    #[must_use]
    pub fn state(&self) -> &RiskState {
        &self.state
    }

    #[must_use]
    pub fn config(&self) -> &RiskConfig {
        &self.config
    }

    /// Record a closed trade's realized P&L.
    pub fn record_trade_result(&mut self, pnl: Decimal) {
        self.record_trade_result_at(pnl, Utc::now());
    }

    pub fn record_trade_result_at(&mut self, pnl: Decimal, now: DateTime<Utc>) {
        self.state.daily_pnl += pnl;

        if pnl < Decimal::ZERO {
            self.state.consecutive_losses += 1;
            self.state.last_loss_at = Some(now);

            if self.state.consecutive_losses >= self.config.max_consecutive_losses {
                self.pause(
                    format!("consecutive_losses={}", self.state.consecutive_losses),
                    self.config.cooldown_after_loss_sec,
                    now,
                );
            }
        } else {
            // A winning close resets the streak.
            self.state.consecutive_losses = 0;
        }

        if self.state.daily_pnl <= -self.config.max_daily_loss {
            self.pause(
                format!("daily_loss={}", self.state.daily_pnl),
                DAILY_LOSS_PAUSE_SEC,
                now,
            );
        }
    }

    fn pause(&mut self, reason: String, seconds: i64, now: DateTime<Utc>) {
        let until = now + Duration::seconds(seconds);
        self.state.is_paused = true;
        self.state.pause_until = Some(until);
        warn!(reason = %reason, %until, "trading paused");
        self.state.pause_reason = Some(reason);
    }

    /// Check whether trading is allowed. An expired pause lifts on read.
    pub fn can_trade(&mut self) -> Result<(), RiskBlock> {
        self.can_trade_at(Utc::now())
    }

    pub fn can_trade_at(&mut self, now: DateTime<Utc>) -> Result<(), RiskBlock> {
        if self.state.is_paused {
            let expired = self.state.pause_until.is_some_and(|until| now >= until);
            if expired {
                info!("trading resumed: pause expired");
                self.state.is_paused = false;
                self.state.pause_reason = None;
                self.state.pause_until = None;
            } else {
                return Err(RiskBlock::Paused {
                    reason: self
                        .state
                        .pause_reason
                        .clone()
                        .unwrap_or_else(|| "unknown".to_string()),
                });
            }
        }
        Ok(())
    }

    /// Check whether adding `proposed_size` of entry cost stays under the
    /// exposure cap.
    pub fn can_increase_exposure(
        &self,
        current_exposure: Decimal,
        proposed_size: Decimal,
    ) -> Result<(), RiskBlock> {
        let proposed_total = current_exposure + proposed_size;
        if proposed_total > self.config.max_total_exposure {
            return Err(RiskBlock::ExposureLimit {
                proposed_total,
                max_total_exposure: self.config.max_total_exposure,
            });
        }
        Ok(())
    }

    /// Reset daily metrics (call at local midnight). The loss streak
    /// persists across days.
    pub fn reset_daily(&mut self) {
        self.state.daily_pnl = Decimal::ZERO;
        info!("daily risk metrics reset");
    }
}
