//! Signal classification enums.

use serde::{Deserialize, Serialize};

/// Direction of predicted price movement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Up,
    Down,
    Neutral,
}

impl Direction {
    /// The opposite outcome. Neutral maps to itself.
    #[must_use]
    pub fn opposite(&self) -> Self {
        match self {
            Self::Up => Self::Down,
            Self::Down => Self::Up,
            Self::Neutral => Self::Neutral,
        }
    }

    #[must_use]
    pub fn is_neutral(&self) -> bool {
        matches!(self, Self::Neutral)
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Up => write!(f, "UP"),
            Self::Down => write!(f, "DOWN"),
            Self::Neutral => write!(f, "NEUTRAL"),
        }
    }
}

/// Signal priority tiers. Lower numeric value = higher priority.
///
/// - `DutchBook`: zero-risk arbitrage (combined ask < 1.0)
/// - `LagArb`: momentum-based lag arbitrage
/// - `Momentum`: model-confirmed directional signals
/// - `FlashCrash`: contrarian reversion signals
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SignalTier {
    DutchBook = 1,
    LagArb = 2,
    Momentum = 3,
    FlashCrash = 4,
}

impl SignalTier {
    /// Numeric priority (lower = higher priority).
    #[must_use]
    pub fn priority(&self) -> u8 {
        *self as u8
    }
}

impl std::fmt::Display for SignalTier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DutchBook => write!(f, "DUTCH_BOOK"),
            Self::LagArb => write!(f, "LAG_ARB"),
            Self::Momentum => write!(f, "MOMENTUM"),
            Self::FlashCrash => write!(f, "FLASH_CRASH"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tier_priority_order() {
        assert!(SignalTier::DutchBook.priority() < SignalTier::LagArb.priority());
        assert!(SignalTier::LagArb.priority() < SignalTier::Momentum.priority());
        assert!(SignalTier::Momentum.priority() < SignalTier::FlashCrash.priority());
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Up.opposite(), Direction::Down);
        assert_eq!(Direction::Down.opposite(), Direction::Up);
        assert_eq!(Direction::Neutral.opposite(), Direction::Neutral);
    }
}
