//! Rolling-window price tracking for momentum detection.
//!
//! Each symbol carries an interval-aligned candle (the open price the
//! market resolves against) and a bounded window of recent trades. When
//! spot moves sharply the venue's repricing lags by seconds, which is
//! the window this tracker is built to catch.

use lagbot_core::{Direction, SpotTrade};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use tracing::{debug, info};

/// Tracker configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Rolling window length in seconds.
    #[serde(default = "default_window_sec")]
    pub window_sec: f64,
    /// Minimum |move from open| for a direction and for emission.
    #[serde(default = "default_move_threshold")]
    pub move_threshold: f64,
}

fn default_window_sec() -> f64 {
    10.0
}

fn default_move_threshold() -> f64 {
    0.001
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            window_sec: default_window_sec(),
            move_threshold: default_move_threshold(),
        }
    }
}

/// Signal of a significant move from the interval open.
#[derive(Debug, Clone, PartialEq)]
pub struct DirectionSignal {
    pub symbol: String,
    pub direction: Direction,
    /// Window-relative change: (current - window_start) / window_start.
    pub momentum: f64,
    /// Candle-relative change: (current - open) / open.
    pub move_from_open: f64,
    /// Taker-volume fraction aligned with the direction (0.5 when Neutral).
    pub confidence: f64,
    pub current_price: f64,
    pub window_start_price: f64,
    pub candle_open: f64,
    pub timestamp_ms: i64,
}

impl DirectionSignal {
    /// The outcome token this signal predicts will win.
    #[must_use]
    pub fn expected_winner(&self) -> &'static str {
        match self.direction {
            Direction::Up => "UP",
            Direction::Down => "DOWN",
            Direction::Neutral => "NONE",
        }
    }
}

/// Interval candle: the open price the market resolves against.
#[derive(Debug, Clone, Copy)]
struct Candle {
    open: f64,
    start_ms: i64,
}

#[derive(Debug, Clone, Copy)]
struct TradePoint {
    price: f64,
    quantity: f64,
    timestamp_ms: i64,
    is_buyer_maker: bool,
}

/// Tracks one symbol's candle and rolling trade window.
pub struct SymbolTracker {
    symbol: String,
    config: TrackerConfig,
    interval_ms: i64,
    candle: Option<Candle>,
    window: VecDeque<TradePoint>,
    current_price: f64,
}

impl SymbolTracker {
    #[must_use]
    pub fn new(symbol: &str, config: TrackerConfig, interval_sec: u32) -> Self {
        Self {
            symbol: symbol.to_string(),
            config,
            interval_ms: i64::from(interval_sec) * 1000,
            candle: None,
            window: VecDeque::new(),
            current_price: 0.0,
        }
    }

    /// Set the candle open, normally from the one-shot REST fetch at
    /// engine start.
    pub fn set_candle_open(&mut self, open: f64, interval_start_ms: i64) {
        info!(
            symbol = %self.symbol,
            open,
            interval_start_ms,
            "candle open set"
        );
        self.candle = Some(Candle {
            open,
            start_ms: interval_start_ms,
        });
    }

    #[must_use]
    pub fn current_price(&self) -> f64 {
        self.current_price
    }

    #[must_use]
    pub fn candle_open(&self) -> Option<f64> {
        self.candle.map(|c| c.open)
    }

    /// Ingest a trade and compute the fresh direction signal.
    ///
    /// Returns `Some` when `|move_from_open|` reaches the threshold.
    pub fn on_trade(&mut self, trade: &SpotTrade) -> Option<DirectionSignal> {
        self.roll_candle(trade);

        self.window.push_back(TradePoint {
            price: trade.price,
            quantity: trade.quantity,
            timestamp_ms: trade.timestamp_ms,
            is_buyer_maker: trade.is_buyer_maker,
        });
        self.current_price = trade.price;
        self.prune(trade.timestamp_ms);

        let candle = self.candle?;
        if candle.open <= 0.0 {
            return None;
        }

        let move_from_open = (self.current_price - candle.open) / candle.open;

        let window_start = self.window.front().map_or(self.current_price, |p| p.price);
        let momentum = if window_start > 0.0 {
            (self.current_price - window_start) / window_start
        } else {
            0.0
        };

        let direction = if move_from_open >= self.config.move_threshold {
            Direction::Up
        } else if move_from_open <= -self.config.move_threshold {
            Direction::Down
        } else {
            Direction::Neutral
        };

        let confidence = self.volume_confidence(direction);

        if move_from_open.abs() < self.config.move_threshold {
            return None;
        }

        Some(DirectionSignal {
            symbol: self.symbol.clone(),
            direction,
            momentum,
            move_from_open,
            confidence,
            current_price: self.current_price,
            window_start_price: window_start,
            candle_open: candle.open,
            timestamp_ms: trade.timestamp_ms,
        })
    }

    /// Window-relative momentum without ingesting a trade.
    #[must_use]
    pub fn momentum(&self) -> f64 {
        let Some(start) = self.window.front() else {
            return 0.0;
        };
        if start.price <= 0.0 {
            return 0.0;
        }
        (self.current_price - start.price) / start.price
    }

    /// Deviation of the current price from the candle open.
    #[must_use]
    pub fn move_from_open(&self) -> Option<f64> {
        let candle = self.candle?;
        if candle.open <= 0.0 || self.current_price <= 0.0 {
            return None;
        }
        Some((self.current_price - candle.open) / candle.open)
    }

    fn roll_candle(&mut self, trade: &SpotTrade) {
        let boundary = (trade.timestamp_ms / self.interval_ms) * self.interval_ms;
        match self.candle {
            // First trade of a new interval establishes the next open.
            Some(candle) if trade.timestamp_ms >= candle.start_ms + self.interval_ms => {
                debug!(
                    symbol = %self.symbol,
                    open = trade.price,
                    start_ms = boundary,
                    "candle rollover"
                );
                self.candle = Some(Candle {
                    open: trade.price,
                    start_ms: boundary,
                });
            }
            Some(_) => {}
            // No REST open yet: bootstrap from the first trade seen.
            None => {
                self.candle = Some(Candle {
                    open: trade.price,
                    start_ms: boundary,
                });
            }
        }
    }

    fn prune(&mut self, now_ms: i64) {
        let cutoff = now_ms - (self.config.window_sec * 1000.0) as i64;
        while self
            .window
            .front()
            .is_some_and(|p| p.timestamp_ms < cutoff)
        {
            self.window.pop_front();
        }
    }

    fn volume_confidence(&self, direction: Direction) -> f64 {
        if direction == Direction::Neutral {
            return 0.5;
        }

        let mut buy_volume = 0.0;
        let mut sell_volume = 0.0;
        for point in &self.window {
            // Taker bought when the buyer was not the resting order.
            if point.is_buyer_maker {
                sell_volume += point.quantity;
            } else {
                buy_volume += point.quantity;
            }
        }
        let total = buy_volume + sell_volume;
        if total <= 0.0 {
            return 0.5;
        }

        match direction {
            Direction::Up => buy_volume / total,
            Direction::Down => sell_volume / total,
            Direction::Neutral => 0.5,
        }
    }
}

/// Tracks momentum across the symbols of the working set.
pub struct PriceTracker {
    config: TrackerConfig,
    interval_sec: u32,
    trackers: HashMap<String, SymbolTracker>,
}

impl PriceTracker {
    #[must_use]
    pub fn new(config: TrackerConfig, interval_sec: u32) -> Self {
        Self {
            config,
            interval_sec,
            trackers: HashMap::new(),
        }
    }

    fn tracker_mut(&mut self, symbol: &str) -> &mut SymbolTracker {
        let config = self.config.clone();
        let interval_sec = self.interval_sec;
        self.trackers
            .entry(symbol.to_string())
            .or_insert_with(|| SymbolTracker::new(symbol, config, interval_sec))
    }

    /// Seed candle opens from the one-shot batch REST call.
    pub fn set_candle_opens(&mut self, opens: &HashMap<String, (f64, i64)>) {
        for (symbol, (open, start_ms)) in opens {
            self.tracker_mut(symbol).set_candle_open(*open, *start_ms);
        }
    }

    /// Ingest a trade; emits a direction signal on a significant move.
    pub fn on_trade(&mut self, trade: &SpotTrade) -> Option<DirectionSignal> {
        self.tracker_mut(&trade.symbol).on_trade(trade)
    }

    #[must_use]
    pub fn tracker(&self, symbol: &str) -> Option<&SymbolTracker> {
        self.trackers.get(symbol)
    }

    #[must_use]
    pub fn current_price(&self, symbol: &str) -> Option<f64> {
        self.trackers
            .get(symbol)
            .map(SymbolTracker::current_price)
            .filter(|p| *p > 0.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const HOUR_MS: i64 = 3_600_000;

    fn trade(price: f64, quantity: f64, ts: i64, is_buyer_maker: bool) -> SpotTrade {
        SpotTrade {
            symbol: "BTCUSDT".to_string(),
            price,
            quantity,
            timestamp_ms: ts,
            is_buyer_maker,
            trade_id: None,
        }
    }

    fn tracker() -> SymbolTracker {
        let mut t = SymbolTracker::new("BTCUSDT", TrackerConfig::default(), 3600);
        t.set_candle_open(50_000.0, 0);
        t
    }

    #[test]
    fn test_no_signal_below_threshold() {
        let mut t = tracker();
        // +0.05% move, threshold is 0.1%.
        assert!(t.on_trade(&trade(50_025.0, 1.0, 1_000, false)).is_none());
    }

    #[test]
    fn test_up_signal_at_threshold() {
        let mut t = tracker();
        let signal = t
            .on_trade(&trade(50_050.0, 1.0, 1_000, false))
            .expect("0.1% move emits");
        assert_eq!(signal.direction, Direction::Up);
        assert!((signal.move_from_open - 0.001).abs() < 1e-12);
        assert_eq!(signal.expected_winner(), "UP");
    }

    #[test]
    fn test_down_signal() {
        let mut t = tracker();
        let signal = t
            .on_trade(&trade(49_900.0, 1.0, 1_000, true))
            .expect("-0.2% move emits");
        assert_eq!(signal.direction, Direction::Down);
        assert!(signal.move_from_open < 0.0);
    }

    #[test]
    fn test_momentum_is_window_relative() {
        let mut t = tracker();
        t.on_trade(&trade(50_000.0, 1.0, 0, false));
        let signal = t
            .on_trade(&trade(50_100.0, 1.0, 500, false))
            .expect("0.2% from open");
        // Window start 50,000 -> 50,100 over 500 ms.
        assert!((signal.momentum - 0.002).abs() < 1e-9);
        assert_eq!(signal.window_start_price, 50_000.0);
    }

    #[test]
    fn test_window_prunes_old_trades() {
        let mut t = tracker();
        t.on_trade(&trade(50_000.0, 1.0, 0, false));
        // 11 s later: the first trade has left the 10 s window, so the
        // window start is the second trade itself.
        let signal = t
            .on_trade(&trade(50_100.0, 1.0, 11_000, false))
            .expect("move from open still emits");
        assert_eq!(signal.window_start_price, 50_100.0);
        assert_eq!(signal.momentum, 0.0);
    }

    #[test]
    fn test_confidence_tracks_aligned_taker_volume() {
        let mut t = tracker();
        // 3 units of taker buys, 1 unit of taker sells.
        t.on_trade(&trade(50_000.0, 2.0, 0, false));
        t.on_trade(&trade(50_020.0, 1.0, 100, false));
        t.on_trade(&trade(50_030.0, 1.0, 200, true));
        let signal = t
            .on_trade(&trade(50_100.0, 1.0, 300, false))
            .expect("up move");
        assert_eq!(signal.direction, Direction::Up);
        // buy volume 4 of 5 total.
        assert!((signal.confidence - 0.8).abs() < 1e-9);
    }

    #[test]
    fn test_candle_rollover_on_interval_boundary() {
        let mut t = tracker();
        t.on_trade(&trade(50_500.0, 1.0, HOUR_MS - 1, false));
        assert_eq!(t.candle_open(), Some(50_000.0));

        // First trade of the next interval establishes the new open.
        t.on_trade(&trade(50_480.0, 1.0, HOUR_MS + 5, false));
        assert_eq!(t.candle_open(), Some(50_480.0));

        // The new open means a fresh deviation baseline.
        let signal = t.on_trade(&trade(50_400.0, 1.0, HOUR_MS + 500, true));
        let signal = signal.expect("-0.16% from new open");
        assert_eq!(signal.direction, Direction::Down);
        assert_eq!(signal.candle_open, 50_480.0);
    }

    #[test]
    fn test_bootstrap_candle_from_first_trade() {
        let mut t = SymbolTracker::new("BTCUSDT", TrackerConfig::default(), 3600);
        t.on_trade(&trade(50_000.0, 1.0, 1_000, false));
        assert_eq!(t.candle_open(), Some(50_000.0));
    }

    #[test]
    fn test_price_tracker_routes_by_symbol() {
        let mut tracker = PriceTracker::new(TrackerConfig::default(), 3600);
        let mut opens = HashMap::new();
        opens.insert("BTCUSDT".to_string(), (50_000.0, 0_i64));
        tracker.set_candle_opens(&opens);

        tracker.on_trade(&trade(50_000.0, 1.0, 0, false));
        assert_eq!(tracker.current_price("BTCUSDT"), Some(50_000.0));
        assert_eq!(tracker.current_price("ETHUSDT"), None);
    }
}
