//! Application wiring and the engine loop.
//!
//! The engine task is the sole owner of the price tracker, position
//! manager, and risk state. It consumes synchronizer snapshots, price
//! tracker direction signals, and a 1 s heartbeat, and drives entries
//! and exits through the execution interface.

use crate::config::{BotConfig, ExitConfig, TradingConfig};
use crate::error::AppResult;
use chrono::{Local, NaiveDate, Utc};
use lagbot_core::{
    Direction, MarketContext, OrderBookUpdate, OrderSide, Size, SynchronizedSnapshot, TokenId,
    UpDownMarket,
};
use lagbot_detector::{EvalInput, SignalEvaluator, UnifiedSignal};
use lagbot_executor::ExecutionClient;
use lagbot_feed::{DirectionSignal, PriceTracker, WorkingSet};
use lagbot_model::{ModelBridge, KELLY_CAP};
use lagbot_persistence::{SnapshotRecord, SnapshotSpooler};
use lagbot_position::PositionManager;
use lagbot_risk::RiskManager;
use lagbot_streams::{
    fetch_interval_opens, BookStream, OracleRpcPoller, SpotTradeStream, VenueStream,
};
use lagbot_sync::Synchronizer;
use lagbot_telemetry::{EngineEvent, EventBus};
use rust_decimal::prelude::FromPrimitive;
use rust_decimal::Decimal;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// What the exit evaluation decided for one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ExitDecision {
    Hold,
    /// Sell every remaining leg.
    Full(&'static str),
    /// Sell only the UP leg.
    PartialUp(&'static str),
    /// Sell only the DOWN leg.
    PartialDown(&'static str),
}

/// Exit rules, checked on every snapshot and on the heartbeat.
fn decide_exit(
    position: &lagbot_position::Position,
    ctx: &MarketContext,
    exits: &ExitConfig,
) -> ExitDecision {
    // Resolution deadline outranks everything else.
    if ctx.time_remaining_sec <= exits.deadline_floor_sec {
        return ExitDecision::Full("deadline");
    }

    let cost = position.total_cost();
    if cost > Decimal::ZERO {
        let value = position.current_value(ctx.up_bid, ctx.down_bid);
        if value >= cost * (Decimal::ONE + exits.profit_take_fraction) {
            return ExitDecision::Full("profit_target");
        }
    }

    // Per-leg profit taking only while both legs are held; the survivor
    // is governed by the full-exit rules.
    if !position.is_partially_exited() {
        let up_target =
            position.up_entry_price.inner() * (Decimal::ONE + exits.leg_profit_fraction);
        if position.up_shares.is_positive() && ctx.up_bid.inner() >= up_target {
            return ExitDecision::PartialUp("leg_profit");
        }
        let down_target =
            position.down_entry_price.inner() * (Decimal::ONE + exits.leg_profit_fraction);
        if position.down_shares.is_positive() && ctx.down_bid.inner() >= down_target {
            return ExitDecision::PartialDown("leg_profit");
        }
    }

    ExitDecision::Hold
}

/// The engine loop state. Owned and touched only by the engine task.
struct Engine {
    evaluator: SignalEvaluator,
    working_set: WorkingSet,
    tracker: PriceTracker,
    positions: PositionManager,
    risk: RiskManager,
    executor: Arc<dyn ExecutionClient>,
    events: EventBus,
    trading: TradingConfig,
    exits: ExitConfig,
    /// Cleared when shutdown starts: no new entries after that.
    accepting_entries: bool,
    spooler: Option<SnapshotSpooler>,
    last_daily_reset: NaiveDate,
}

impl Engine {
    /// Handle one synchronized snapshot: entry checks for idle markets,
    /// exit checks for held ones.
    async fn on_snapshot(&mut self, snapshot: &SynchronizedSnapshot) {
        if let Some(spooler) = self.spooler.as_mut() {
            if let Err(e) = spooler.add_record(SnapshotRecord::from_snapshot(snapshot)) {
                warn!(?e, "snapshot spool failed");
            }
        }

        let markets: Vec<UpDownMarket> = self.working_set.markets().to_vec();
        for market in &markets {
            let Some(ctx) =
                self.working_set
                    .build_context(market, &snapshot.books, snapshot.timestamp_ms)
            else {
                continue;
            };

            if self.positions.has_position(&market.market_id) {
                self.check_exit(market, &ctx).await;
            } else {
                self.check_entry(market, &ctx, snapshot.spot_price()).await;
            }
        }
    }

    /// A significant spot move: bulk entry check across the working set.
    async fn on_direction_signal(
        &mut self,
        signal: &DirectionSignal,
        books: &HashMap<TokenId, OrderBookUpdate>,
        now_ms: i64,
    ) {
        debug!(
            symbol = %signal.symbol,
            direction = %signal.direction,
            move_from_open = signal.move_from_open,
            momentum = signal.momentum,
            "direction signal"
        );

        let markets: Vec<UpDownMarket> = self
            .working_set
            .markets()
            .iter()
            .filter(|m| m.symbol == signal.symbol)
            .cloned()
            .collect();

        for market in &markets {
            if self.positions.has_position(&market.market_id) {
                continue;
            }
            let Some(ctx) = self.working_set.build_context(market, books, now_ms) else {
                continue;
            };
            self.check_entry(market, &ctx, Some(signal.current_price))
                .await;
        }
    }

    /// Heartbeat: exit checks for every open position, plus the daily
    /// risk reset at local midnight.
    async fn on_heartbeat(&mut self, books: &HashMap<TokenId, OrderBookUpdate>, now_ms: i64) {
        let today = Local::now().date_naive();
        if today != self.last_daily_reset {
            self.risk.reset_daily();
            self.last_daily_reset = today;
        }

        let open_markets: Vec<_> = self
            .positions
            .open_positions()
            .iter()
            .map(|p| p.market_id.clone())
            .collect();

        for market_id in open_markets {
            let Some(market) = self.working_set.market(&market_id).cloned() else {
                continue;
            };
            let Some(ctx) = self.working_set.build_context(&market, books, now_ms) else {
                continue;
            };
            self.check_exit(&market, &ctx).await;
        }
    }

    fn market_inputs(
        &self,
        market: &UpDownMarket,
        spot_hint: Option<f64>,
    ) -> (f64, f64, f64, f64) {
        if let Some(tracker) = self.tracker.tracker(&market.symbol) {
            let spot = tracker.current_price();
            if spot > 0.0 {
                return (
                    tracker.momentum(),
                    tracker.move_from_open().unwrap_or(0.0),
                    spot,
                    tracker.candle_open().unwrap_or(0.0),
                );
            }
        }
        (0.0, 0.0, spot_hint.unwrap_or(0.0), 0.0)
    }

    async fn check_entry(
        &mut self,
        market: &UpDownMarket,
        ctx: &MarketContext,
        spot_hint: Option<f64>,
    ) {
        if !self.accepting_entries {
            return;
        }

        let (momentum, deviation_pct, spot_price, candle_open) =
            self.market_inputs(market, spot_hint);

        let input = EvalInput {
            symbol: &market.symbol,
            market_id: Some(&market.market_id),
            timestamp_ms: ctx.timestamp_ms,
            momentum,
            deviation_pct,
            spot_price,
            candle_open,
            market: Some(ctx),
            time_remaining_sec: ctx.time_remaining_sec,
        };

        let signals = self.evaluator.evaluate(&input);
        let Some(signal) = signals.into_iter().find(UnifiedSignal::is_actionable) else {
            return;
        };

        info!(
            market = %market.slug,
            tier = %signal.tier,
            direction = %signal.direction,
            expected_edge = signal.expected_edge,
            confidence = signal.confidence,
            "actionable signal"
        );
        self.events.emit(EngineEvent::SignalDetected {
            tier: signal.tier,
            direction: signal.direction,
            symbol: signal.symbol.clone(),
            market_id: signal.market_id.clone(),
            expected_edge: signal.expected_edge,
            confidence: signal.confidence,
            timestamp_ms: signal.timestamp_ms,
        });

        if let Err(block) = self.risk.can_trade() {
            warn!(market = %market.slug, %block, "entry blocked");
            self.events.emit(EngineEvent::EntryBlocked {
                market_id: market.market_id.clone(),
                reason: block.to_string(),
                timestamp_ms: ctx.timestamp_ms,
            });
            return;
        }

        // Kelly-scaled size when the model spoke, base size otherwise.
        let size = match signal.model.as_ref() {
            Some(model) => {
                let kelly = model
                    .kelly_fraction
                    .clamp(self.trading.kelly_floor, KELLY_CAP);
                let scale = Decimal::from_f64(kelly).unwrap_or(Decimal::ZERO);
                self.trading.base_position_size * scale
            }
            None => self.trading.base_position_size,
        };
        if size <= Decimal::ZERO {
            debug!(market = %market.slug, "sized to zero, skipping entry");
            return;
        }

        if let Err(block) = self
            .risk
            .can_increase_exposure(self.positions.total_exposure(), size)
        {
            warn!(market = %market.slug, %block, "entry blocked");
            self.events.emit(EngineEvent::EntryBlocked {
                market_id: market.market_id.clone(),
                reason: block.to_string(),
                timestamp_ms: ctx.timestamp_ms,
            });
            return;
        }

        if !ctx.combined_ask.is_positive() {
            return;
        }
        let shares = Size::new((size / ctx.combined_ask.inner()).round_dp(2));
        if !shares.is_positive() {
            return;
        }

        // Both legs are submitted together; a partial failure surrenders
        // the entry with no half-leg position.
        let up_result = self
            .executor
            .place_order(&market.up_token, OrderSide::Buy, ctx.up_ask, shares)
            .await;
        let down_result = self
            .executor
            .place_order(&market.down_token, OrderSide::Buy, ctx.down_ask, shares)
            .await;

        if up_result.success && down_result.success {
            match self.positions.open(
                market.market_id.clone(),
                &market.slug,
                up_result.filled_size,
                up_result.filled_price,
                down_result.filled_size,
                down_result.filled_price,
                ctx.timestamp_ms,
            ) {
                Ok(position) => {
                    self.events.emit(EngineEvent::PositionOpened {
                        market_id: market.market_id.clone(),
                        slug: market.slug.clone(),
                        tier: signal.tier,
                        cost: position.total_cost(),
                        up_shares: position.up_shares.inner(),
                        down_shares: position.down_shares.inner(),
                        timestamp_ms: ctx.timestamp_ms,
                    });
                }
                Err(e) => error!(?e, market = %market.slug, "position open failed"),
            }
        } else {
            let leg_error = up_result
                .error
                .or(down_result.error)
                .unwrap_or_else(|| "leg rejected".to_string());
            warn!(market = %market.slug, error = %leg_error, "entry failed");
            self.events.emit(EngineEvent::EntryFailed {
                market_id: market.market_id.clone(),
                error: leg_error,
                timestamp_ms: ctx.timestamp_ms,
            });
        }
    }

    async fn check_exit(&mut self, market: &UpDownMarket, ctx: &MarketContext) {
        let Some(position) = self.positions.get(&market.market_id) else {
            return;
        };

        match decide_exit(position, ctx, &self.exits) {
            ExitDecision::Hold => {}
            ExitDecision::Full(reason) => self.execute_full_exit(market, ctx, reason).await,
            ExitDecision::PartialUp(reason) => {
                self.execute_partial_exit(market, ctx, Direction::Up, reason)
                    .await;
            }
            ExitDecision::PartialDown(reason) => {
                self.execute_partial_exit(market, ctx, Direction::Down, reason)
                    .await;
            }
        }
    }

    async fn execute_full_exit(
        &mut self,
        market: &UpDownMarket,
        ctx: &MarketContext,
        reason: &str,
    ) {
        let Some(position) = self.positions.get(&market.market_id) else {
            return;
        };
        let up_shares = position.up_shares;
        let down_shares = position.down_shares;

        let mut up_fill = ctx.up_bid;
        if up_shares.is_positive() {
            let result = self
                .executor
                .place_order(&market.up_token, OrderSide::Sell, ctx.up_bid, up_shares)
                .await;
            if !result.success {
                warn!(
                    market = %market.slug,
                    error = result.error.as_deref().unwrap_or("rejected"),
                    "UP exit leg failed, position stays open"
                );
                return;
            }
            up_fill = result.filled_price;
        }

        let mut down_fill = ctx.down_bid;
        if down_shares.is_positive() {
            let result = self
                .executor
                .place_order(&market.down_token, OrderSide::Sell, ctx.down_bid, down_shares)
                .await;
            if !result.success {
                warn!(
                    market = %market.slug,
                    error = result.error.as_deref().unwrap_or("rejected"),
                    "DOWN exit leg failed"
                );
                // The UP leg already sold: record it so the book is true.
                if up_shares.is_positive() {
                    if let Ok(leg_pnl) =
                        self.positions.partial_exit_up(&market.market_id, up_fill)
                    {
                        self.events.emit(EngineEvent::PartialExit {
                            market_id: market.market_id.clone(),
                            slug: market.slug.clone(),
                            side: Direction::Up,
                            leg_pnl,
                            timestamp_ms: ctx.timestamp_ms,
                        });
                    }
                }
                return;
            }
            down_fill = result.filled_price;
        }

        match self.positions.close(
            &market.market_id,
            up_fill,
            down_fill,
            reason,
            ctx.timestamp_ms,
        ) {
            Ok(closed) => {
                self.risk.record_trade_result(closed.realized_pnl);
                info!(
                    market = %market.slug,
                    reason,
                    realized_pnl = %closed.realized_pnl,
                    "position closed"
                );
                self.events.emit(EngineEvent::PositionClosed {
                    market_id: market.market_id.clone(),
                    slug: market.slug.clone(),
                    reason: reason.to_string(),
                    realized_pnl: closed.realized_pnl,
                    timestamp_ms: ctx.timestamp_ms,
                });
            }
            Err(e) => error!(?e, market = %market.slug, "position close failed"),
        }
    }

    async fn execute_partial_exit(
        &mut self,
        market: &UpDownMarket,
        ctx: &MarketContext,
        side: Direction,
        reason: &str,
    ) {
        let Some(position) = self.positions.get(&market.market_id) else {
            return;
        };
        let (token, bid, shares) = match side {
            Direction::Up => (&market.up_token, ctx.up_bid, position.up_shares),
            Direction::Down => (&market.down_token, ctx.down_bid, position.down_shares),
            Direction::Neutral => return,
        };
        if !shares.is_positive() {
            return;
        }

        let result = self
            .executor
            .place_order(token, OrderSide::Sell, bid, shares)
            .await;
        if !result.success {
            warn!(
                market = %market.slug,
                %side,
                error = result.error.as_deref().unwrap_or("rejected"),
                "partial exit leg failed, position unchanged"
            );
            return;
        }

        let leg_result = match side {
            Direction::Up => self
                .positions
                .partial_exit_up(&market.market_id, result.filled_price),
            _ => self
                .positions
                .partial_exit_down(&market.market_id, result.filled_price),
        };

        match leg_result {
            Ok(leg_pnl) => {
                info!(
                    market = %market.slug,
                    %side,
                    reason,
                    leg_pnl = %leg_pnl,
                    "partial exit"
                );
                self.events.emit(EngineEvent::PartialExit {
                    market_id: market.market_id.clone(),
                    slug: market.slug.clone(),
                    side,
                    leg_pnl,
                    timestamp_ms: ctx.timestamp_ms,
                });
            }
            Err(e) => error!(?e, market = %market.slug, "partial exit bookkeeping failed"),
        }
    }
}

/// The application: config plus injected collaborators.
pub struct App {
    config: BotConfig,
    config_path: Option<PathBuf>,
    executor: Arc<dyn ExecutionClient>,
    events: EventBus,
}

impl App {
    #[must_use]
    pub fn new(config: BotConfig, executor: Arc<dyn ExecutionClient>, events: EventBus) -> Self {
        Self {
            config,
            config_path: None,
            executor,
            events,
        }
    }

    /// Remember the config path so the refresh signal can re-read the
    /// market list.
    #[must_use]
    pub fn with_config_path(mut self, path: PathBuf) -> Self {
        self.config_path = Some(path);
        self
    }

    /// Run until the shutdown token fires.
    ///
    /// `refresh_rx` re-reads the working set (market refresh signal).
    pub async fn run(
        self,
        shutdown: CancellationToken,
        mut refresh_rx: mpsc::Receiver<()>,
    ) -> AppResult<()> {
        let config = self.config;

        // Surface load failure aborts startup; everything downstream
        // degrades instead of failing.
        let bridge = Arc::new(ModelBridge::load(&config.model)?);
        let evaluator = SignalEvaluator::new(config.evaluator.clone(), Some(bridge))?;
        let working_set = WorkingSet::new(config.markets.clone())?;
        let interval_sec = config.interval_sec();

        info!(
            markets = working_set.len(),
            interval_sec,
            dry_run = config.trading.dry_run,
            base_size = %config.trading.base_position_size,
            "engine starting"
        );

        let mut tracker = PriceTracker::new(config.tracker.clone(), interval_sec);
        let http = reqwest::Client::new();
        match fetch_interval_opens(&http, &config.rest_url, &working_set.symbols(), interval_sec)
            .await
        {
            Ok(opens) => tracker.set_candle_opens(&opens),
            Err(e) => warn!(?e, "candle open fetch failed, bootstrapping from trades"),
        }

        // Synchronizer and its publisher.
        let sync = Arc::new(Synchronizer::new(config.sync.clone()));
        let (snapshot_tx, mut snapshot_rx) = mpsc::channel(64);
        let publisher = sync.start(snapshot_tx);

        // Stream adapters, each on its own task.
        let adapters_cancel = CancellationToken::new();
        let mut adapter_handles = Vec::new();

        let (trade_tx, mut trade_rx) = mpsc::channel(2048);
        let mut spot_config = config.spot.clone();
        if spot_config.symbols.is_empty() {
            spot_config.symbols = working_set.symbols();
        }
        adapter_handles
            .push(SpotTradeStream::new(spot_config, trade_tx).spawn(adapters_cancel.child_token()));

        let (price_tx, mut price_rx) = mpsc::channel(2048);
        adapter_handles.push(
            VenueStream::new(config.venue.clone(), price_tx.clone())
                .spawn(adapters_cancel.child_token()),
        );
        adapter_handles.push(
            OracleRpcPoller::new(config.oracle.clone(), price_tx)
                .spawn(adapters_cancel.child_token()),
        );

        let (book_tx, mut book_rx) = mpsc::channel(2048);
        let mut book_cancel = adapters_cancel.child_token();
        let mut book_handle = BookStream::new(
            config.book.clone(),
            working_set.all_tokens(),
            book_tx.clone(),
        )
        .spawn(book_cancel.clone());

        // Forwarders: venue/oracle prices and books into the synchronizer.
        let sync_prices = Arc::clone(&sync);
        let price_forwarder = tokio::spawn(async move {
            while let Some(update) = price_rx.recv().await {
                sync_prices.on_price_update(update);
            }
        });
        let sync_books = Arc::clone(&sync);
        let book_forwarder = tokio::spawn(async move {
            while let Some(update) = book_rx.recv().await {
                sync_books.on_book_update(update);
            }
        });

        let spooler = config
            .spool_dir
            .as_ref()
            .map(|dir| SnapshotSpooler::new(dir, 500));

        let mut engine = Engine {
            evaluator,
            working_set,
            tracker,
            positions: PositionManager::new(),
            risk: RiskManager::new(config.risk.clone()),
            executor: self.executor,
            events: self.events,
            trading: config.trading.clone(),
            exits: config.exits.clone(),
            accepting_entries: true,
            spooler,
            last_daily_reset: Local::now().date_naive(),
        };

        let mut heartbeat = tokio::time::interval(Duration::from_secs(1));
        heartbeat.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);

        info!("engine loop running");
        loop {
            tokio::select! {
                _ = shutdown.cancelled() => {
                    info!("shutdown signal received");
                    engine.accepting_entries = false;
                    break;
                }
                Some(snapshot) = snapshot_rx.recv() => {
                    engine.on_snapshot(&snapshot).await;
                }
                Some(trade) = trade_rx.recv() => {
                    sync.on_price_update(trade.to_price_update());
                    if let Some(signal) = engine.tracker.on_trade(&trade) {
                        let books = sync.latest_books();
                        engine
                            .on_direction_signal(&signal, &books, Utc::now().timestamp_millis())
                            .await;
                    }
                }
                _ = heartbeat.tick() => {
                    let books = sync.latest_books();
                    engine.on_heartbeat(&books, Utc::now().timestamp_millis()).await;
                }
                Some(()) = refresh_rx.recv() => {
                    let markets = match self.config_path.as_ref() {
                        Some(path) => match BotConfig::load(path) {
                            Ok(fresh) => fresh.markets,
                            Err(e) => {
                                warn!(?e, "refresh: config reload failed, keeping working set");
                                continue;
                            }
                        },
                        None => config.markets.clone(),
                    };
                    match WorkingSet::new(markets) {
                        Ok(fresh_set) => {
                            info!(markets = fresh_set.len(), "refresh: working set rebuilt");
                            // Resubscribe the book stream to the new tokens.
                            book_cancel.cancel();
                            book_cancel = adapters_cancel.child_token();
                            book_handle = BookStream::new(
                                config.book.clone(),
                                fresh_set.all_tokens(),
                                book_tx.clone(),
                            )
                            .spawn(book_cancel.clone());
                            engine.working_set = fresh_set;
                        }
                        Err(e) => warn!(?e, "refresh: invalid working set, keeping current"),
                    }
                }
            }
        }

        // Reverse-dependency shutdown: the engine loop above has already
        // stopped; then the publisher, then the adapters.
        sync.stop();
        let _ = publisher.await;

        adapters_cancel.cancel();
        let grace = Duration::from_secs(5);
        adapter_handles.push(book_handle);
        if tokio::time::timeout(grace, futures_util::future::join_all(adapter_handles))
            .await
            .is_err()
        {
            warn!("adapters did not finish within the grace window");
        }
        drop(book_tx);
        let _ = tokio::time::timeout(grace, price_forwarder).await;
        let _ = tokio::time::timeout(grace, book_forwarder).await;

        if let Some(spooler) = engine.spooler.as_mut() {
            if let Err(e) = spooler.flush() {
                warn!(?e, "final spool flush failed");
            }
        }

        info!(
            open_positions = engine.positions.open_count(),
            closed_positions = engine.positions.closed_positions().len(),
            realized_pnl = %engine.positions.total_realized_pnl(),
            "engine stopped"
        );
        Ok(())
    }
}
