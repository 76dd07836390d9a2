//! Order types for the execution interface.

use crate::decimal::{Price, Size};
use serde::{Deserialize, Serialize};

/// Order side.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderSide {
    Buy,
    Sell,
}

impl std::fmt::Display for OrderSide {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Buy => write!(f, "buy"),
            Self::Sell => write!(f, "sell"),
        }
    }
}

/// Venue-reported order status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    #[default]
    Pending,
    Filled,
    Partial,
    Cancelled,
    Failed,
}

/// Result of an order attempt through the execution interface.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderResult {
    pub success: bool,
    pub order_id: Option<String>,
    pub status: OrderStatus,
    pub filled_size: Size,
    pub filled_price: Price,
    pub error: Option<String>,
}

impl OrderResult {
    /// A synthesized fill (dry-run semantics): filled at the requested
    /// price for the requested size.
    #[must_use]
    pub fn filled(price: Price, size: Size) -> Self {
        Self {
            success: true,
            order_id: None,
            status: OrderStatus::Filled,
            filled_size: size,
            filled_price: price,
            error: None,
        }
    }

    #[must_use]
    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            order_id: None,
            status: OrderStatus::Failed,
            filled_size: Size::ZERO,
            filled_price: Price::ZERO,
            error: Some(error.into()),
        }
    }
}
