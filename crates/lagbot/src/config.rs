//! Application configuration.

use crate::error::{AppError, AppResult};
use lagbot_detector::EvaluatorConfig;
use lagbot_feed::TrackerConfig;
use lagbot_model::ModelConfig;
use lagbot_risk::RiskConfig;
use lagbot_streams::{BookStreamConfig, OracleRpcConfig, SpotStreamConfig, VenueStreamConfig};
use lagbot_sync::SyncConfig;
use lagbot_core::UpDownMarket;
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Position sizing and execution mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TradingConfig {
    /// Paper trading: fills are synthesized, nothing reaches the venue.
    #[serde(default = "default_dry_run")]
    pub dry_run: bool,
    /// Entry cost per position before Kelly scaling, in collateral units.
    #[serde(default = "default_base_position_size")]
    pub base_position_size: Decimal,
    /// Kelly sizing floor applied at entry. The model caps at 0.25.
    #[serde(default = "default_kelly_floor")]
    pub kelly_floor: f64,
}

fn default_dry_run() -> bool {
    true
}

fn default_base_position_size() -> Decimal {
    dec!(50)
}

fn default_kelly_floor() -> f64 {
    0.1
}

impl Default for TradingConfig {
    fn default() -> Self {
        Self {
            dry_run: default_dry_run(),
            base_position_size: default_base_position_size(),
            kelly_floor: default_kelly_floor(),
        }
    }
}

/// Exit rule thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExitConfig {
    /// Force a full exit when this close to resolution.
    #[serde(default = "default_deadline_floor_sec")]
    pub deadline_floor_sec: u32,
    /// Full exit when current value exceeds cost by this fraction.
    #[serde(default = "default_profit_take_fraction")]
    pub profit_take_fraction: Decimal,
    /// Partial exit of one leg when its bid exceeds entry by this fraction.
    #[serde(default = "default_leg_profit_fraction")]
    pub leg_profit_fraction: Decimal,
}

fn default_deadline_floor_sec() -> u32 {
    60
}

fn default_profit_take_fraction() -> Decimal {
    dec!(0.02)
}

fn default_leg_profit_fraction() -> Decimal {
    dec!(0.25)
}

impl Default for ExitConfig {
    fn default() -> Self {
        Self {
            deadline_floor_sec: default_deadline_floor_sec(),
            profit_take_fraction: default_profit_take_fraction(),
            leg_profit_fraction: default_leg_profit_fraction(),
        }
    }
}

/// Full application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BotConfig {
    /// Market working set. Discovery happens elsewhere; the engine is
    /// handed this list.
    pub markets: Vec<UpDownMarket>,

    #[serde(default)]
    pub trading: TradingConfig,
    #[serde(default)]
    pub exits: ExitConfig,

    pub spot: SpotStreamConfig,
    #[serde(default)]
    pub venue: VenueStreamConfig,
    #[serde(default)]
    pub book: BookStreamConfig,
    pub oracle: OracleRpcConfig,
    /// REST base for the one-shot candle-open fetch.
    #[serde(default = "default_rest_url")]
    pub rest_url: String,

    #[serde(default)]
    pub tracker: TrackerConfig,
    #[serde(default)]
    pub sync: SyncConfig,
    pub model: ModelConfig,
    #[serde(default)]
    pub evaluator: EvaluatorConfig,
    #[serde(default)]
    pub risk: RiskConfig,

    /// Snapshot spool directory; unset disables spooling.
    #[serde(default)]
    pub spool_dir: Option<PathBuf>,
}

fn default_rest_url() -> String {
    "https://api.binance.com".to_string()
}

impl BotConfig {
    /// Load from a TOML file, with `LAGBOT__`-prefixed environment
    /// overrides.
    pub fn load(path: &Path) -> AppResult<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::from(path))
            .add_source(
                config::Environment::with_prefix("LAGBOT")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: Self = settings.try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> AppResult<()> {
        if self.markets.is_empty() {
            return Err(AppError::InvalidConfig(
                "markets list is empty".to_string(),
            ));
        }
        for market in &self.markets {
            market
                .validate()
                .map_err(|e| AppError::InvalidConfig(e.to_string()))?;
        }
        let interval = self.markets[0].interval_sec;
        if self.markets.iter().any(|m| m.interval_sec != interval) {
            return Err(AppError::InvalidConfig(
                "all markets must share one interval length".to_string(),
            ));
        }
        if self.trading.base_position_size <= Decimal::ZERO {
            return Err(AppError::InvalidConfig(
                "base_position_size must be positive".to_string(),
            ));
        }
        if !(0.0..=0.25).contains(&self.trading.kelly_floor) {
            return Err(AppError::InvalidConfig(format!(
                "kelly_floor must be in [0, 0.25], got {}",
                self.trading.kelly_floor
            )));
        }
        self.evaluator.validate()?;
        self.risk.validate()?;
        if self.oracle.rpc_urls.is_empty() {
            return Err(AppError::InvalidConfig(
                "oracle.rpc_urls must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Interval length shared by the working set.
    #[must_use]
    pub fn interval_sec(&self) -> u32 {
        self.markets.first().map_or(3600, |m| m.interval_sec)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_toml() -> &'static str {
        r#"
            rest_url = "https://api.example.com"

            [[markets]]
            market_id = "0xabc"
            slug = "btc-updown-1h"
            symbol = "BTCUSDT"
            up_token = "0xup"
            down_token = "0xdown"
            interval_sec = 3600

            [spot]
            symbols = ["BTCUSDT"]

            [oracle]
            rpc_urls = ["https://rpc.example.com"]

            [model]
            surface_path = "surface.json"
        "#
    }

    fn parse(toml_str: &str) -> BotConfig {
        let settings = config::Config::builder()
            .add_source(config::File::from_str(
                toml_str,
                config::FileFormat::Toml,
            ))
            .build()
            .unwrap();
        settings.try_deserialize().unwrap()
    }

    #[test]
    fn test_minimal_config_gets_defaults() {
        let cfg = parse(minimal_toml());
        cfg.validate().unwrap();

        assert!(cfg.trading.dry_run);
        assert_eq!(cfg.trading.base_position_size, dec!(50));
        assert_eq!(cfg.exits.deadline_floor_sec, 60);
        assert_eq!(cfg.sync.snapshot_interval_ms, 100);
        assert_eq!(cfg.sync.ring_capacity, 10_000);
        assert_eq!(cfg.oracle.poll_interval_ms, 2000);
        assert_eq!(cfg.tracker.window_sec, 10.0);
        assert_eq!(cfg.interval_sec(), 3600);
        assert!(cfg.spool_dir.is_none());
    }

    #[test]
    fn test_mixed_intervals_rejected() {
        let mut cfg = parse(minimal_toml());
        let mut second = cfg.markets[0].clone();
        second.market_id = lagbot_core::MarketId::new("0xdef");
        second.up_token = lagbot_core::TokenId::new("0xup2");
        second.down_token = lagbot_core::TokenId::new("0xdown2");
        second.interval_sec = 900;
        cfg.markets.push(second);

        assert!(cfg.validate().is_err());
    }

    #[test]
    fn test_empty_markets_rejected() {
        let mut cfg = parse(minimal_toml());
        cfg.markets.clear();
        assert!(cfg.validate().is_err());
    }
}
