//! Position lifecycle and aggregate P&L.

use crate::error::{PositionError, PositionResult};
use lagbot_core::{MarketId, Price, Size};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use tracing::{debug, info};

/// Position lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PositionStatus {
    Pending,
    Open,
    Exiting,
    Closed,
}

/// One paired position: both outcome tokens of an up/down market.
///
/// While Open with both legs intact, `up_shares` and `down_shares` are
/// positive. A partial exit zeroes the sold leg's share count and stamps
/// its exit price; the position stays Open until the other leg exits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Position {
    pub market_id: MarketId,
    pub slug: String,
    pub entry_timestamp_ms: i64,

    /// Remaining UP shares (zero after the UP leg exits).
    pub up_shares: Size,
    pub up_entry_price: Price,
    /// Remaining DOWN shares (zero after the DOWN leg exits).
    pub down_shares: Size,
    pub down_entry_price: Price,

    pub status: PositionStatus,

    pub exit_timestamp_ms: Option<i64>,
    pub up_exit_price: Option<Price>,
    pub down_exit_price: Option<Price>,
    pub exit_reason: Option<String>,

    /// P&L realized so far, accrued per exited leg.
    pub realized_pnl: Decimal,
}

impl Position {
    /// Entry cost of the remaining legs.
    #[must_use]
    pub fn total_cost(&self) -> Decimal {
        self.up_shares.notional(self.up_entry_price)
            + self.down_shares.notional(self.down_entry_price)
    }

    /// Minimum payout at resolution: the smaller remaining leg pays 1.0.
    #[must_use]
    pub fn guaranteed_payout(&self) -> Decimal {
        self.up_shares.min(self.down_shares).inner()
    }

    /// Combined entry price of both legs.
    #[must_use]
    pub fn entry_combined_price(&self) -> Price {
        self.up_entry_price + self.down_entry_price
    }

    /// Value of the remaining legs at the given bids.
    #[must_use]
    pub fn current_value(&self, up_bid: Price, down_bid: Price) -> Decimal {
        self.up_shares.notional(up_bid) + self.down_shares.notional(down_bid)
    }

    /// Unrealized P&L of the remaining legs at the given bids.
    #[must_use]
    pub fn unrealized_pnl(&self, up_bid: Price, down_bid: Price) -> Decimal {
        self.current_value(up_bid, down_bid) - self.total_cost()
    }

    #[must_use]
    pub fn is_open(&self) -> bool {
        matches!(self.status, PositionStatus::Open | PositionStatus::Exiting)
    }

    /// True once one leg has been sold while the other is still held.
    #[must_use]
    pub fn is_partially_exited(&self) -> bool {
        self.is_open() && (self.up_shares.is_zero() != self.down_shares.is_zero())
    }

    /// Seconds this position has been held.
    #[must_use]
    pub fn hold_duration_sec(&self, now_ms: i64) -> i64 {
        let end = self.exit_timestamp_ms.unwrap_or(now_ms);
        (end - self.entry_timestamp_ms) / 1000
    }
}

/// Tracks open positions per market plus a history of closed ones.
///
/// Invariant: at most one open position per market; a partial exit
/// preserves it.
#[derive(Debug, Default)]
pub struct PositionManager {
    positions: HashMap<MarketId, Position>,
    closed: Vec<Position>,
}

impl PositionManager {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn has_position(&self, market_id: &MarketId) -> bool {
        self.positions.contains_key(market_id)
    }

    #[must_use]
    pub fn get(&self, market_id: &MarketId) -> Option<&Position> {
        self.positions.get(market_id)
    }

    /// Open a new paired position.
    pub fn open(
        &mut self,
        market_id: MarketId,
        slug: &str,
        up_shares: Size,
        up_entry_price: Price,
        down_shares: Size,
        down_entry_price: Price,
        timestamp_ms: i64,
    ) -> PositionResult<&Position> {
        if self.positions.contains_key(&market_id) {
            return Err(PositionError::AlreadyOpen(market_id));
        }

        let position = Position {
            market_id: market_id.clone(),
            slug: slug.to_string(),
            entry_timestamp_ms: timestamp_ms,
            up_shares,
            up_entry_price,
            down_shares,
            down_entry_price,
            status: PositionStatus::Open,
            exit_timestamp_ms: None,
            up_exit_price: None,
            down_exit_price: None,
            exit_reason: None,
            realized_pnl: Decimal::ZERO,
        };

        info!(
            market = %market_id,
            slug,
            cost = %position.total_cost(),
            "position opened"
        );

        Ok(self.positions.entry(market_id).or_insert(position))
    }

    /// Sell one leg while keeping the other. Returns the leg's realized
    /// P&L. The position stays Open.
    pub fn partial_exit_up(
        &mut self,
        market_id: &MarketId,
        exit_price: Price,
    ) -> PositionResult<Decimal> {
        let position = self
            .positions
            .get_mut(market_id)
            .ok_or_else(|| PositionError::NotFound(market_id.clone()))?;

        if position.up_shares.is_zero() {
            return Err(PositionError::LegAlreadyExited {
                market: market_id.clone(),
                side: "up",
            });
        }

        let shares_sold = position.up_shares;
        let leg_pnl =
            shares_sold.notional(exit_price) - shares_sold.notional(position.up_entry_price);

        position.up_shares = Size::ZERO;
        position.up_exit_price = Some(exit_price);
        position.realized_pnl += leg_pnl;

        debug!(
            market = %market_id,
            side = "up",
            shares = %shares_sold,
            exit_price = %exit_price,
            leg_pnl = %leg_pnl,
            "partial exit"
        );

        Ok(leg_pnl)
    }

    /// Sell the DOWN leg while keeping the UP leg.
    pub fn partial_exit_down(
        &mut self,
        market_id: &MarketId,
        exit_price: Price,
    ) -> PositionResult<Decimal> {
        let position = self
            .positions
            .get_mut(market_id)
            .ok_or_else(|| PositionError::NotFound(market_id.clone()))?;

        if position.down_shares.is_zero() {
            return Err(PositionError::LegAlreadyExited {
                market: market_id.clone(),
                side: "down",
            });
        }

        let shares_sold = position.down_shares;
        let leg_pnl =
            shares_sold.notional(exit_price) - shares_sold.notional(position.down_entry_price);

        position.down_shares = Size::ZERO;
        position.down_exit_price = Some(exit_price);
        position.realized_pnl += leg_pnl;

        debug!(
            market = %market_id,
            side = "down",
            shares = %shares_sold,
            exit_price = %exit_price,
            leg_pnl = %leg_pnl,
            "partial exit"
        );

        Ok(leg_pnl)
    }

    /// Close a position: sell every remaining leg at the given bids, move
    /// it to history, and return it. The total realized P&L includes any
    /// prior partial exits.
    pub fn close(
        &mut self,
        market_id: &MarketId,
        up_exit_price: Price,
        down_exit_price: Price,
        reason: &str,
        timestamp_ms: i64,
    ) -> PositionResult<Position> {
        let mut position = self
            .positions
            .remove(market_id)
            .ok_or_else(|| PositionError::NotFound(market_id.clone()))?;

        if !position.up_shares.is_zero() {
            let leg_pnl = position.up_shares.notional(up_exit_price)
                - position.up_shares.notional(position.up_entry_price);
            position.realized_pnl += leg_pnl;
            position.up_exit_price = Some(up_exit_price);
            position.up_shares = Size::ZERO;
        }
        if !position.down_shares.is_zero() {
            let leg_pnl = position.down_shares.notional(down_exit_price)
                - position.down_shares.notional(position.down_entry_price);
            position.realized_pnl += leg_pnl;
            position.down_exit_price = Some(down_exit_price);
            position.down_shares = Size::ZERO;
        }

        position.status = PositionStatus::Closed;
        position.exit_timestamp_ms = Some(timestamp_ms);
        position.exit_reason = Some(reason.to_string());

        info!(
            market = %market_id,
            reason,
            realized_pnl = %position.realized_pnl,
            "position closed"
        );

        self.closed.push(position.clone());
        Ok(position)
    }

    #[must_use]
    pub fn open_positions(&self) -> Vec<&Position> {
        self.positions.values().collect()
    }

    #[must_use]
    pub fn open_count(&self) -> usize {
        self.positions.len()
    }

    #[must_use]
    pub fn closed_positions(&self) -> &[Position] {
        &self.closed
    }

    /// Entry cost currently at risk across open positions.
    #[must_use]
    pub fn total_exposure(&self) -> Decimal {
        self.positions.values().map(Position::total_cost).sum()
    }

    /// Total realized P&L over closed positions.
    #[must_use]
    pub fn total_realized_pnl(&self) -> Decimal {
        self.closed.iter().map(|p| p.realized_pnl).sum()
    }

    /// Unrealized P&L over open positions, given current bids per market.
    #[must_use]
    pub fn total_unrealized_pnl(&self, bids: &HashMap<MarketId, (Price, Price)>) -> Decimal {
        self.positions
            .iter()
            .filter_map(|(market_id, position)| {
                bids.get(market_id)
                    .map(|(up_bid, down_bid)| position.unrealized_pnl(*up_bid, *down_bid))
            })
            .sum()
    }
}
