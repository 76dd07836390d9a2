//! Trading session and volatility regime classification.
//!
//! Sessions stratify the probability surface by UTC time of day.
//! The `All` variants are the aggregate fallback keys used when a
//! stratified bucket has too few samples.

use crate::error::CoreError;
use chrono::{DateTime, Timelike, Utc};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

/// Trading session classification by UTC hour.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TradingSession {
    /// 00:00 – 08:00 UTC.
    Asia,
    /// 08:00 – 13:00 UTC.
    Europe,
    /// 13:00 – 17:00 UTC (London afternoon / New York morning).
    UsEuOverlap,
    /// 17:00 – 21:00 UTC.
    Us,
    /// 21:00 – 24:00 UTC.
    LateUs,
    /// Aggregate over all sessions.
    All,
}

impl TradingSession {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Asia => "asia",
            Self::Europe => "europe",
            Self::UsEuOverlap => "us_eu_overlap",
            Self::Us => "us",
            Self::LateUs => "late_us",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for TradingSession {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for TradingSession {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "asia" => Ok(Self::Asia),
            "europe" => Ok(Self::Europe),
            "us_eu_overlap" => Ok(Self::UsEuOverlap),
            "us" => Ok(Self::Us),
            "late_us" => Ok(Self::LateUs),
            "all" => Ok(Self::All),
            other => Err(CoreError::UnknownSession(other.to_string())),
        }
    }
}

/// Get the trading session at a given UTC datetime.
#[must_use]
pub fn session_at(dt: DateTime<Utc>) -> TradingSession {
    match dt.hour() {
        0..=7 => TradingSession::Asia,
        8..=12 => TradingSession::Europe,
        13..=16 => TradingSession::UsEuOverlap,
        17..=20 => TradingSession::Us,
        _ => TradingSession::LateUs,
    }
}

/// Get the current trading session.
#[must_use]
pub fn current_session() -> TradingSession {
    session_at(Utc::now())
}

/// Realized-volatility regime tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VolRegime {
    Low,
    Medium,
    High,
    /// Aggregate over all regimes.
    All,
}

impl VolRegime {
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::All => "all",
        }
    }
}

impl std::fmt::Display for VolRegime {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for VolRegime {
    type Err = CoreError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "all" => Ok(Self::All),
            other => Err(CoreError::UnknownVolRegime(other.to_string())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn utc(hour: u32, min: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 4, hour, min, 0).unwrap()
    }

    #[test]
    fn test_session_boundaries() {
        assert_eq!(session_at(utc(0, 0)), TradingSession::Asia);
        assert_eq!(session_at(utc(7, 59)), TradingSession::Asia);
        assert_eq!(session_at(utc(8, 0)), TradingSession::Europe);
        assert_eq!(session_at(utc(12, 59)), TradingSession::Europe);
        assert_eq!(session_at(utc(13, 0)), TradingSession::UsEuOverlap);
        assert_eq!(session_at(utc(16, 59)), TradingSession::UsEuOverlap);
        assert_eq!(session_at(utc(17, 0)), TradingSession::Us);
        assert_eq!(session_at(utc(20, 59)), TradingSession::Us);
        assert_eq!(session_at(utc(21, 0)), TradingSession::LateUs);
        assert_eq!(session_at(utc(23, 59)), TradingSession::LateUs);
    }

    #[test]
    fn test_session_roundtrip() {
        for s in [
            TradingSession::Asia,
            TradingSession::Europe,
            TradingSession::UsEuOverlap,
            TradingSession::Us,
            TradingSession::LateUs,
            TradingSession::All,
        ] {
            assert_eq!(s.as_str().parse::<TradingSession>().unwrap(), s);
        }
    }

    #[test]
    fn test_vol_regime_roundtrip() {
        for v in [
            VolRegime::Low,
            VolRegime::Medium,
            VolRegime::High,
            VolRegime::All,
        ] {
            assert_eq!(v.as_str().parse::<VolRegime>().unwrap(), v);
        }
    }
}
