//! Working set of markets and context construction.
//!
//! Market discovery is an external concern; the engine is handed a
//! working set and routes book updates to markets by token id.

use crate::error::{FeedError, FeedResult};
use chrono::{TimeZone, Utc};
use lagbot_core::{
    session_at, Direction, MarketContext, MarketId, OrderBookUpdate, TokenId, UpDownMarket,
};
use std::collections::HashMap;
use tracing::info;

/// The engine's market working set.
pub struct WorkingSet {
    markets: Vec<UpDownMarket>,
    by_id: HashMap<MarketId, usize>,
    /// token -> (market index, which side the token is).
    by_token: HashMap<TokenId, (usize, Direction)>,
}

impl WorkingSet {
    /// Build and validate the working set.
    pub fn new(markets: Vec<UpDownMarket>) -> FeedResult<Self> {
        let mut by_id = HashMap::new();
        let mut by_token = HashMap::new();

        for (idx, market) in markets.iter().enumerate() {
            market.validate()?;
            by_id.insert(market.market_id.clone(), idx);
            if by_token
                .insert(market.up_token.clone(), (idx, Direction::Up))
                .is_some()
            {
                return Err(FeedError::DuplicateToken(market.up_token.0.clone()));
            }
            if by_token
                .insert(market.down_token.clone(), (idx, Direction::Down))
                .is_some()
            {
                return Err(FeedError::DuplicateToken(market.down_token.0.clone()));
            }
        }

        info!(markets = markets.len(), "working set built");
        Ok(Self {
            markets,
            by_id,
            by_token,
        })
    }

    #[must_use]
    pub fn markets(&self) -> &[UpDownMarket] {
        &self.markets
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.markets.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.markets.is_empty()
    }

    #[must_use]
    pub fn market(&self, market_id: &MarketId) -> Option<&UpDownMarket> {
        self.by_id.get(market_id).map(|idx| &self.markets[*idx])
    }

    /// The market owning a token, and which side the token is.
    #[must_use]
    pub fn market_for_token(&self, token: &TokenId) -> Option<(&UpDownMarket, Direction)> {
        self.by_token
            .get(token)
            .map(|(idx, side)| (&self.markets[*idx], *side))
    }

    /// All token ids across the working set, for book subscriptions.
    #[must_use]
    pub fn all_tokens(&self) -> Vec<TokenId> {
        self.markets
            .iter()
            .flat_map(|m| [m.up_token.clone(), m.down_token.clone()])
            .collect()
    }

    /// Distinct reference symbols across the working set.
    #[must_use]
    pub fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self.markets.iter().map(|m| m.symbol.clone()).collect();
        symbols.sort_unstable();
        symbols.dedup();
        symbols
    }

    /// Build the signal-time context for one market from the latest books.
    ///
    /// Returns `None` until both outcome tokens have a book.
    #[must_use]
    pub fn build_context(
        &self,
        market: &UpDownMarket,
        books: &HashMap<TokenId, OrderBookUpdate>,
        now_ms: i64,
    ) -> Option<MarketContext> {
        let up_book = books.get(&market.up_token)?;
        let down_book = books.get(&market.down_token)?;

        let session = Utc
            .timestamp_millis_opt(now_ms)
            .single()
            .map(session_at)
            .unwrap_or(lagbot_core::TradingSession::All);

        Some(MarketContext::new(
            now_ms,
            up_book.best_ask,
            down_book.best_ask,
            up_book.best_bid,
            down_book.best_bid,
            market.time_remaining_sec(now_ms),
            session,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use lagbot_core::{Price, Size};
    use rust_decimal_macros::dec;

    fn market(n: u32) -> UpDownMarket {
        UpDownMarket {
            market_id: MarketId::new(format!("0xmarket{n}")),
            slug: format!("btc-updown-{n}"),
            symbol: "BTCUSDT".to_string(),
            up_token: TokenId::new(format!("0xup{n}")),
            down_token: TokenId::new(format!("0xdown{n}")),
            interval_sec: 3600,
        }
    }

    fn book(token: &TokenId, bid: rust_decimal::Decimal, ask: rust_decimal::Decimal) -> OrderBookUpdate {
        OrderBookUpdate {
            token: token.clone(),
            best_bid: Price::new(bid),
            best_ask: Price::new(ask),
            bid_size: Size::new(dec!(100)),
            ask_size: Size::new(dec!(100)),
            timestamp_ms: 0,
        }
    }

    #[test]
    fn test_token_routing() {
        let set = WorkingSet::new(vec![market(1), market(2)]).unwrap();

        let (m, side) = set
            .market_for_token(&TokenId::new("0xdown2"))
            .expect("token known");
        assert_eq!(m.market_id, MarketId::new("0xmarket2"));
        assert_eq!(side, Direction::Down);

        assert!(set.market_for_token(&TokenId::new("0xother")).is_none());
        assert_eq!(set.all_tokens().len(), 4);
        assert_eq!(set.symbols(), vec!["BTCUSDT".to_string()]);
    }

    #[test]
    fn test_duplicate_token_rejected() {
        let mut second = market(2);
        second.up_token = TokenId::new("0xup1");
        let result = WorkingSet::new(vec![market(1), second]);
        assert!(matches!(result, Err(FeedError::DuplicateToken(_))));
    }

    #[test]
    fn test_context_needs_both_books() {
        let set = WorkingSet::new(vec![market(1)]).unwrap();
        let m = &set.markets()[0];
        let now_ms = 1_700_000_000_000;

        let mut books = HashMap::new();
        books.insert(
            m.up_token.clone(),
            book(&m.up_token, dec!(0.46), dec!(0.48)),
        );
        assert!(set.build_context(m, &books, now_ms).is_none());

        books.insert(
            m.down_token.clone(),
            book(&m.down_token, dec!(0.48), dec!(0.50)),
        );
        let ctx = set.build_context(m, &books, now_ms).expect("both books");
        assert_eq!(ctx.combined_ask, Price::new(dec!(0.98)));
        assert_eq!(ctx.combined_bid, Price::new(dec!(0.94)));
        assert_eq!(ctx.time_remaining_sec, m.time_remaining_sec(now_ms));
    }
}
