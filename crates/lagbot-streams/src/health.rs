//! Per-adapter health counters.

use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, AtomicI64, AtomicU64, Ordering};

/// Shared counters and last-observation accessors for one adapter.
///
/// This is the whole of an adapter's observability surface: the engine
/// never sees adapter errors, only these numbers.
#[derive(Debug, Default)]
pub struct StreamHealth {
    connected: AtomicBool,
    update_count: AtomicU64,
    reconnect_count: AtomicU64,
    last_price: Mutex<Option<f64>>,
    last_timestamp_ms: AtomicI64,
}

impl StreamHealth {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_connected(&self, connected: bool) {
        self.connected.store(connected, Ordering::Release);
    }

    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn record_update(&self, price: f64, timestamp_ms: i64) {
        self.update_count.fetch_add(1, Ordering::Relaxed);
        *self.last_price.lock() = Some(price);
        self.last_timestamp_ms.store(timestamp_ms, Ordering::Relaxed);
    }

    pub fn record_reconnect(&self) {
        self.reconnect_count.fetch_add(1, Ordering::Relaxed);
        self.set_connected(false);
    }

    #[must_use]
    pub fn update_count(&self) -> u64 {
        self.update_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn reconnect_count(&self) -> u64 {
        self.reconnect_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn latest_price(&self) -> Option<f64> {
        *self.last_price.lock()
    }

    #[must_use]
    pub fn latest_timestamp_ms(&self) -> Option<i64> {
        let ts = self.last_timestamp_ms.load(Ordering::Relaxed);
        (ts != 0).then_some(ts)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters() {
        let health = StreamHealth::new();
        assert!(!health.is_connected());
        assert_eq!(health.latest_price(), None);
        assert_eq!(health.latest_timestamp_ms(), None);

        health.set_connected(true);
        health.record_update(50_000.0, 1_700_000_000_000);
        health.record_update(50_100.0, 1_700_000_000_100);
        assert_eq!(health.update_count(), 2);
        assert_eq!(health.latest_price(), Some(50_100.0));
        assert_eq!(health.latest_timestamp_ms(), Some(1_700_000_000_100));

        health.record_reconnect();
        assert!(!health.is_connected());
        assert_eq!(health.reconnect_count(), 1);
    }
}
