//! Execution client trait and the dry-run implementation.

use async_trait::async_trait;
use lagbot_core::{OrderBookUpdate, OrderResult, OrderSide, Price, Size, TokenId};
use parking_lot::Mutex;
use std::collections::HashMap;
use tracing::info;

/// Narrow order-execution interface consumed by the engine.
///
/// Calls may block on network; failures come back inside `OrderResult`
/// rather than as errors, so a partial two-leg submission is visible to
/// the caller leg by leg.
#[async_trait]
pub trait ExecutionClient: Send + Sync {
    /// Place a limit order for one outcome token.
    async fn place_order(
        &self,
        token: &TokenId,
        side: OrderSide,
        price: Price,
        size: Size,
    ) -> OrderResult;

    /// Fetch the current top of book for one token.
    async fn get_order_book(&self, token: &TokenId) -> Option<OrderBookUpdate>;

    /// Fetch top of book for several tokens in one round trip.
    async fn get_order_books_batch(
        &self,
        tokens: &[TokenId],
    ) -> HashMap<TokenId, OrderBookUpdate>;
}

/// Paper-trading executor.
///
/// Every order succeeds with `filled_size = size` and
/// `filled_price = price`. Book queries answer from seeded snapshots.
#[derive(Default)]
pub struct DryRunExecutor {
    books: Mutex<HashMap<TokenId, OrderBookUpdate>>,
}

impl DryRunExecutor {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seed a book snapshot served by subsequent queries.
    pub fn seed_book(&self, book: OrderBookUpdate) {
        self.books.lock().insert(book.token.clone(), book);
    }
}

#[async_trait]
impl ExecutionClient for DryRunExecutor {
    async fn place_order(
        &self,
        token: &TokenId,
        side: OrderSide,
        price: Price,
        size: Size,
    ) -> OrderResult {
        info!(
            token = %token,
            %side,
            %price,
            %size,
            "dry-run order"
        );
        OrderResult::filled(price, size)
    }

    async fn get_order_book(&self, token: &TokenId) -> Option<OrderBookUpdate> {
        self.books.lock().get(token).cloned()
    }

    async fn get_order_books_batch(
        &self,
        tokens: &[TokenId],
    ) -> HashMap<TokenId, OrderBookUpdate> {
        let books = self.books.lock();
        tokens
            .iter()
            .filter_map(|t| books.get(t).map(|b| (t.clone(), b.clone())))
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[tokio::test]
    async fn test_dry_run_synthesizes_fill() {
        let executor = DryRunExecutor::new();
        let token = TokenId::new("0xup");

        let result = executor
            .place_order(
                &token,
                OrderSide::Buy,
                Price::new(dec!(0.48)),
                Size::new(dec!(100)),
            )
            .await;

        assert!(result.success);
        assert_eq!(result.filled_price, Price::new(dec!(0.48)));
        assert_eq!(result.filled_size, Size::new(dec!(100)));
    }

    #[tokio::test]
    async fn test_book_queries_answer_from_seeds() {
        let executor = DryRunExecutor::new();
        let up = TokenId::new("0xup");
        let down = TokenId::new("0xdown");

        executor.seed_book(OrderBookUpdate {
            token: up.clone(),
            best_bid: Price::new(dec!(0.46)),
            best_ask: Price::new(dec!(0.48)),
            bid_size: Size::new(dec!(50)),
            ask_size: Size::new(dec!(50)),
            timestamp_ms: 0,
        });

        assert!(executor.get_order_book(&up).await.is_some());
        assert!(executor.get_order_book(&down).await.is_none());

        let batch = executor
            .get_order_books_batch(&[up.clone(), down.clone()])
            .await;
        assert_eq!(batch.len(), 1);
        assert!(batch.contains_key(&up));
    }
}
