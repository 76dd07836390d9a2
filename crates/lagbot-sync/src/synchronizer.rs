//! Stream synchronizer.

use chrono::Utc;
use lagbot_core::{OrderBookUpdate, PriceUpdate, StreamSource, SynchronizedSnapshot, TokenId};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

/// Synchronizer configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SyncConfig {
    /// Cadence of snapshot publication.
    #[serde(default = "default_snapshot_interval_ms")]
    pub snapshot_interval_ms: u64,
    /// Ring capacity; 10,000 is ~10 minutes at the 100 ms default.
    #[serde(default = "default_ring_capacity")]
    pub ring_capacity: usize,
}

fn default_snapshot_interval_ms() -> u64 {
    100
}

fn default_ring_capacity() -> usize {
    10_000
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            snapshot_interval_ms: default_snapshot_interval_ms(),
            ring_capacity: default_ring_capacity(),
        }
    }
}

/// Lag percentiles over the snapshots currently in the ring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct LagStats {
    /// Snapshots in the ring with a computable lag.
    pub count: usize,
    pub p50: Option<i64>,
    /// Requires at least 20 samples.
    pub p95: Option<i64>,
    /// Requires at least 100 samples.
    pub p99: Option<i64>,
    pub min: Option<i64>,
    pub max: Option<i64>,
}

/// Latest-per-source state, mutated by producers under one lock.
#[derive(Default)]
struct Latest {
    spot_direct: Option<PriceUpdate>,
    venue_spot: Option<PriceUpdate>,
    venue_oracle: Option<PriceUpdate>,
    chain_oracle: Option<PriceUpdate>,
    books: HashMap<TokenId, OrderBookUpdate>,
}

/// Fan-in synchronizer and snapshot publisher.
///
/// Producers (the stream adapters) call `on_price_update` /
/// `on_book_update` concurrently; the publisher task is the only writer
/// of the ring. `stop()` halts only the publisher: in-flight producer
/// calls complete normally.
pub struct Synchronizer {
    config: SyncConfig,
    latest: Mutex<Latest>,
    ring: Mutex<VecDeque<SynchronizedSnapshot>>,
    publisher_cancel: CancellationToken,
    price_update_count: AtomicU64,
    book_update_count: AtomicU64,
    snapshot_count: AtomicU64,
}

impl Synchronizer {
    #[must_use]
    pub fn new(config: SyncConfig) -> Self {
        let ring_capacity = config.ring_capacity;
        Self {
            config,
            latest: Mutex::new(Latest::default()),
            ring: Mutex::new(VecDeque::with_capacity(ring_capacity)),
            publisher_cancel: CancellationToken::new(),
            price_update_count: AtomicU64::new(0),
            book_update_count: AtomicU64::new(0),
            snapshot_count: AtomicU64::new(0),
        }
    }

    /// Record the latest price for a source. Thread-safe producer entry.
    pub fn on_price_update(&self, update: PriceUpdate) {
        self.price_update_count.fetch_add(1, Ordering::Relaxed);
        let mut latest = self.latest.lock();
        match update.source {
            StreamSource::SpotDirect => latest.spot_direct = Some(update),
            StreamSource::VenueSpot => latest.venue_spot = Some(update),
            StreamSource::VenueOracle => latest.venue_oracle = Some(update),
            StreamSource::ChainOracle => latest.chain_oracle = Some(update),
        }
    }

    /// Record the latest book for a token. Thread-safe producer entry.
    pub fn on_book_update(&self, update: OrderBookUpdate) {
        self.book_update_count.fetch_add(1, Ordering::Relaxed);
        let mut latest = self.latest.lock();
        latest.books.insert(update.token.clone(), update);
    }

    /// Capture one snapshot, push it into the ring, and return it.
    ///
    /// The per-source slots and book map are captured under the same lock
    /// acquisition, so they are mutually consistent within the snapshot.
    pub fn publish_once(&self, timestamp_ms: i64) -> SynchronizedSnapshot {
        let snapshot = {
            let latest = self.latest.lock();
            SynchronizedSnapshot {
                timestamp_ms,
                spot_direct: latest.spot_direct.clone(),
                venue_spot: latest.venue_spot.clone(),
                venue_oracle: latest.venue_oracle.clone(),
                chain_oracle: latest.chain_oracle.clone(),
                books: latest.books.clone(),
            }
        };

        {
            let mut ring = self.ring.lock();
            if ring.len() >= self.config.ring_capacity {
                ring.pop_front();
            }
            ring.push_back(snapshot.clone());
        }

        self.snapshot_count.fetch_add(1, Ordering::Relaxed);
        snapshot
    }

    /// Spawn the publisher task.
    ///
    /// Snapshots go to `tx` with `try_send`: if the consumer lags, ticks
    /// are dropped (it can sample the ring's tail later) rather than
    /// stalling producers.
    pub fn start(
        self: &Arc<Self>,
        tx: mpsc::Sender<SynchronizedSnapshot>,
    ) -> JoinHandle<()> {
        let sync = Arc::clone(self);
        let cancel = self.publisher_cancel.clone();
        info!(
            interval_ms = sync.config.snapshot_interval_ms,
            ring_capacity = sync.config.ring_capacity,
            "synchronizer publisher starting"
        );

        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_millis(
                sync.config.snapshot_interval_ms,
            ));
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        info!("synchronizer publisher stopped");
                        return;
                    }
                    _ = interval.tick() => {
                        let snapshot = sync.publish_once(Utc::now().timestamp_millis());
                        if let Err(mpsc::error::TrySendError::Full(_)) = tx.try_send(snapshot) {
                            debug!("snapshot consumer lagging, tick dropped");
                        }
                    }
                }
            }
        })
    }

    /// Halt the publisher. Producers are unaffected.
    pub fn stop(&self) {
        self.publisher_cancel.cancel();
    }

    /// All snapshots currently in the ring, oldest first.
    #[must_use]
    pub fn snapshots(&self) -> Vec<SynchronizedSnapshot> {
        self.ring.lock().iter().cloned().collect()
    }

    #[must_use]
    pub fn latest_snapshot(&self) -> Option<SynchronizedSnapshot> {
        self.ring.lock().back().cloned()
    }

    /// Latest book map, for consumers that need books between ticks.
    #[must_use]
    pub fn latest_books(&self) -> HashMap<TokenId, OrderBookUpdate> {
        self.latest.lock().books.clone()
    }

    #[must_use]
    pub fn price_update_count(&self) -> u64 {
        self.price_update_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn book_update_count(&self) -> u64 {
        self.book_update_count.load(Ordering::Relaxed)
    }

    #[must_use]
    pub fn snapshot_count(&self) -> u64 {
        self.snapshot_count.load(Ordering::Relaxed)
    }

    /// Lag percentiles over the ring. p95 needs at least 20 samples and
    /// p99 at least 100; below that they are unknown.
    #[must_use]
    pub fn lag_stats(&self) -> LagStats {
        let mut lags: Vec<i64> = {
            let ring = self.ring.lock();
            ring.iter().filter_map(SynchronizedSnapshot::lag_ms).collect()
        };

        if lags.is_empty() {
            return LagStats {
                count: 0,
                p50: None,
                p95: None,
                p99: None,
                min: None,
                max: None,
            };
        }

        lags.sort_unstable();
        let n = lags.len();
        let pick = |q: f64| lags[(((n as f64) * q) as usize).min(n - 1)];

        LagStats {
            count: n,
            p50: Some(pick(0.50)),
            p95: (n >= 20).then(|| pick(0.95)),
            p99: (n >= 100).then(|| pick(0.99)),
            min: Some(lags[0]),
            max: Some(lags[n - 1]),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn update(source: StreamSource, price: f64, ts: i64) -> PriceUpdate {
        PriceUpdate::new(source, "BTCUSDT", price, ts)
    }

    #[test]
    fn test_snapshot_captures_latest_per_source() {
        let sync = Synchronizer::new(SyncConfig::default());

        sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000));
        sync.on_price_update(update(StreamSource::SpotDirect, 50_050.0, 1500));
        sync.on_price_update(update(StreamSource::VenueOracle, 49_990.0, 900));

        let snapshot = sync.publish_once(2000);
        assert_eq!(snapshot.spot_price(), Some(50_050.0));
        assert_eq!(snapshot.oracle_price(), Some(49_990.0));
        assert_eq!(snapshot.lag_ms(), Some(600));
        assert!(snapshot.venue_spot.is_none());
    }

    #[test]
    fn test_lag_equals_spot_minus_oracle_over_ring() {
        let sync = Synchronizer::new(SyncConfig::default());

        for i in 0..10_i64 {
            sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000 + i * 100));
            sync.on_price_update(update(StreamSource::ChainOracle, 49_990.0, 700 + i * 100));
            let snapshot = sync.publish_once(2000 + i * 100);
            let spot_ts = snapshot.spot_direct.as_ref().unwrap().timestamp_ms;
            let oracle_ts = snapshot.chain_oracle.as_ref().unwrap().timestamp_ms;
            assert_eq!(snapshot.lag_ms(), Some(spot_ts - oracle_ts));
        }
    }

    #[test]
    fn test_ring_evicts_oldest_first() {
        let sync = Synchronizer::new(SyncConfig {
            snapshot_interval_ms: 100,
            ring_capacity: 3,
        });

        for i in 0..5_i64 {
            sync.publish_once(i);
        }

        let snapshots = sync.snapshots();
        assert_eq!(snapshots.len(), 3);
        assert_eq!(snapshots[0].timestamp_ms, 2);
        assert_eq!(snapshots[2].timestamp_ms, 4);
        assert_eq!(sync.latest_snapshot().unwrap().timestamp_ms, 4);
        assert_eq!(sync.snapshot_count(), 5);
    }

    #[test]
    fn test_lag_percentile_sample_requirements() {
        let sync = Synchronizer::new(SyncConfig::default());

        // 10 samples: p50 known, p95/p99 unknown.
        for i in 0..10_i64 {
            sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000 + i));
            sync.on_price_update(update(StreamSource::VenueOracle, 49_990.0, 500));
            sync.publish_once(2000 + i);
        }
        let stats = sync.lag_stats();
        assert_eq!(stats.count, 10);
        assert!(stats.p50.is_some());
        assert!(stats.p95.is_none());
        assert!(stats.p99.is_none());

        // 20 samples: p95 appears.
        for i in 10..20_i64 {
            sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000 + i));
            sync.publish_once(2000 + i);
        }
        let stats = sync.lag_stats();
        assert_eq!(stats.count, 20);
        assert!(stats.p95.is_some());
        assert!(stats.p99.is_none());

        // 100 samples: p99 appears.
        for i in 20..100_i64 {
            sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000 + i));
            sync.publish_once(2000 + i);
        }
        let stats = sync.lag_stats();
        assert_eq!(stats.count, 100);
        assert!(stats.p99.is_some());
        assert_eq!(stats.min, Some(500));
        assert_eq!(stats.max, Some(599));
    }

    #[test]
    fn test_empty_ring_stats() {
        let sync = Synchronizer::new(SyncConfig::default());
        let stats = sync.lag_stats();
        assert_eq!(stats.count, 0);
        assert!(stats.p50.is_none());
    }

    #[tokio::test]
    async fn test_publisher_ticks_and_stops() {
        let sync = Arc::new(Synchronizer::new(SyncConfig {
            snapshot_interval_ms: 10,
            ring_capacity: 100,
        }));
        let (tx, mut rx) = mpsc::channel(16);

        let handle = sync.start(tx);

        // A few ticks should arrive.
        let first = rx.recv().await.expect("first snapshot");
        assert!(first.timestamp_ms > 0);
        let _ = rx.recv().await.expect("second snapshot");

        sync.stop();
        handle.await.unwrap();

        // Producers still work after the publisher stops.
        sync.on_price_update(update(StreamSource::SpotDirect, 50_000.0, 1000));
        assert!(sync.price_update_count() >= 1);
    }

    #[tokio::test]
    async fn test_full_consumer_drops_instead_of_blocking() {
        let sync = Arc::new(Synchronizer::new(SyncConfig {
            snapshot_interval_ms: 5,
            ring_capacity: 100,
        }));
        // Capacity-1 channel that nobody drains.
        let (tx, rx) = mpsc::channel(1);

        let handle = sync.start(tx);
        tokio::time::sleep(std::time::Duration::from_millis(60)).await;
        sync.stop();
        handle.await.unwrap();

        // The ring kept every tick even though the channel was full.
        assert!(sync.snapshot_count() > 1);
        drop(rx);
    }
}
