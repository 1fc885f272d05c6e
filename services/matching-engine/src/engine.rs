//! Engine facade: submission API, queries, event log and persistence
//!
//! `OrderBook` owns every piece of state for one symbol: the two priority
//! books, the authoritative registry, the stop book, the fills list, the
//! fill router, the in-memory event log and the diagnostics. All operations
//! run synchronously on the caller's stack; there is no internal
//! concurrency and no retry. Embedders wanting shared access must wrap the
//! engine in their own lock.

use rust_decimal::Decimal;
use std::collections::BTreeMap;
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use thiserror::Error;
use tracing::{debug, info};
use types::prelude::*;

use crate::book::{MarketDepth, PriceLevel, PriorityBook};
use crate::registry::OrderRegistry;
use crate::router::FillRouter;
use crate::stats::{LatencyRecorder, LatencySummary, MatchStats};
use crate::stops::StopBook;
use persistence::events::{self, EventLogError, OrderEvent};
use persistence::snapshot::{self, Snapshot, SnapshotError};

/// Failures when writing or consuming a checkpoint (snapshot + events).
#[derive(Error, Debug)]
pub enum CheckpointError {
    #[error("snapshot error: {0}")]
    Snapshot(#[from] SnapshotError),

    #[error("event log error: {0}")]
    Events(#[from] EventLogError),
}

/// Monotonic session clock. Wall-clock anchored but strictly increasing:
/// two observations never tie, so "events after the snapshot time" is an
/// unambiguous boundary during checkpoint recovery.
#[derive(Debug)]
struct EngineClock {
    origin: Instant,
    base_ns: i64,
    last_ns: i64,
}

impl EngineClock {
    fn new() -> Self {
        let base_ns = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as i64)
            .unwrap_or(0);
        Self {
            origin: Instant::now(),
            base_ns,
            last_ns: base_ns,
        }
    }

    fn now_ns(&mut self) -> i64 {
        let now = self.base_ns + self.origin.elapsed().as_nanos() as i64;
        self.last_ns = if now > self.last_ns {
            now
        } else {
            self.last_ns + 1
        };
        self.last_ns
    }
}

/// Single-symbol limit order book and matching engine.
pub struct OrderBook {
    pub(crate) symbol: String,
    pub(crate) bids: PriorityBook,
    pub(crate) asks: PriorityBook,
    pub(crate) registry: OrderRegistry,
    pub(crate) stops: StopBook,
    pub(crate) fills: Vec<Fill>,
    pub(crate) router: FillRouter,
    events: Vec<OrderEvent>,
    pub(crate) logging_enabled: bool,
    pub(crate) last_trade_price: Option<Price>,
    next_arrival_seq: u64,
    clock: EngineClock,
    orders_processed: u64,
    latency: LatencyRecorder,
    snapshot_counter: u64,
}

impl OrderBook {
    pub fn new(symbol: impl Into<String>) -> Self {
        Self {
            symbol: symbol.into(),
            bids: PriorityBook::new(Side::Buy),
            asks: PriorityBook::new(Side::Sell),
            registry: OrderRegistry::new(),
            stops: StopBook::new(),
            fills: Vec::new(),
            router: FillRouter::new(false),
            events: Vec::new(),
            logging_enabled: false,
            last_trade_price: None,
            next_arrival_seq: 1,
            clock: EngineClock::new(),
            orders_processed: 0,
            latency: LatencyRecorder::new(),
            snapshot_counter: 0,
        }
    }

    pub fn symbol(&self) -> &str {
        &self.symbol
    }

    // ── Submission API ──────────────────────────────────────────────

    /// Accept an order: stamp it, register it, match it, finalize its
    /// state, sweep stop triggers. The engine owns the canonical copy from
    /// this point on.
    pub fn submit(&mut self, mut order: Order) {
        let timer = self.latency.start();

        // Market orders cannot rest; a resting time-in-force is rewritten.
        if order.is_market() && matches!(order.tif, TimeInForce::Gtc | TimeInForce::Day) {
            order.tif = TimeInForce::Ioc;
        }

        order.timestamp_ns = self.clock.now_ns();
        order.arrival_seq = self.next_seq();
        self.orders_processed += 1;

        if order.is_stop() {
            self.record_new(&order);
            let trigger_ref = if self.stop_should_trigger_now(&order) {
                self.reference_price_for(order.side)
            } else {
                None
            };
            match trigger_ref {
                Some(ref_price) => self.trigger_stop(order, ref_price),
                None => {
                    order.state = OrderState::Pending;
                    self.registry.insert(order.clone());
                    debug!(order_id = %order.id, side = %order.side, "stop order enqueued");
                    self.stops.insert(order);
                }
            }
            self.latency.record(timer);
            return;
        }

        order.state = OrderState::Active;
        self.registry.insert(order.clone());
        self.record_new(&order);

        self.match_incoming(&mut order);
        self.finalize_after_matching(&mut order);

        self.latency.record(timer);
    }

    /// Cancel a live order. The priority books are left untouched; the
    /// stale entry is discarded by the next sweep. Returns false for
    /// unknown or terminal ids. The CANCEL event is recorded before the
    /// validity check.
    pub fn cancel(&mut self, order_id: OrderId) -> bool {
        let timestamp_ns = self.clock.now_ns();
        self.record_cancel(timestamp_ns, order_id);

        let rejected = match self.registry.get(order_id) {
            None => {
                debug!(%order_id, "cancel: order not found or already processed");
                return false;
            }
            Some(order) => order.state.is_terminal() || order.is_filled(),
        };
        if rejected {
            debug!(%order_id, "cancel: order already terminal");
            return false;
        }

        match self.registry.take_active(order_id) {
            Some(mut order) => {
                order.state = OrderState::Cancelled;
                self.registry.store_cancelled(order);
                debug!(%order_id, "order cancelled");
                true
            }
            None => false,
        }
    }

    /// Amend price and/or quantity: cancel-and-resubmit under the same id.
    /// The replacement is a plain limit order with a fresh arrival sequence
    /// (time priority is lost). Unspecified fields reuse the current price
    /// and remaining quantity. The AMEND event is recorded before the
    /// validity check; the internal cancel and resubmission are not logged.
    pub fn amend(
        &mut self,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<u32>,
    ) -> bool {
        let timestamp_ns = self.clock.now_ns();
        self.record_amend(timestamp_ns, order_id, new_price, new_quantity);

        let (side, account, tif, current_price, current_remaining) =
            match self.registry.get(order_id) {
                None => {
                    debug!(%order_id, "amend: order not found");
                    return false;
                }
                Some(order) if order.state.is_terminal() || order.is_filled() => {
                    debug!(%order_id, "amend: order already terminal");
                    return false;
                }
                Some(order) => (
                    order.side,
                    order.account,
                    order.tif,
                    order.limit_price(),
                    order.remaining,
                ),
            };

        let Some(price) = new_price.or(current_price) else {
            debug!(%order_id, "amend: no price available");
            return false;
        };
        let quantity = new_quantity.unwrap_or(current_remaining);
        let Ok(replacement) = Order::limit(order_id, account, side, price, quantity, tif) else {
            debug!(%order_id, "amend: invalid replacement quantity");
            return false;
        };

        let was_logging = self.logging_enabled;
        self.logging_enabled = false;
        self.cancel(order_id);
        self.submit(replacement);
        self.logging_enabled = was_logging;

        debug!(%order_id, "order amended");
        true
    }

    // ── Read-only queries ───────────────────────────────────────────

    /// Authoritative copy of the best live bid.
    pub fn best_bid(&self) -> Option<Order> {
        self.best_live(Side::Buy)
    }

    /// Authoritative copy of the best live ask.
    pub fn best_ask(&self) -> Option<Order> {
        self.best_live(Side::Sell)
    }

    pub fn spread(&self) -> Option<Decimal> {
        let bid = self.best_live(Side::Buy)?.limit_price()?;
        let ask = self.best_live(Side::Sell)?.limit_price()?;
        Some(ask.as_decimal() - bid.as_decimal())
    }

    /// Order by id, across active and cancelled orders.
    pub fn lookup(&self, order_id: OrderId) -> Option<&Order> {
        self.registry.lookup(order_id)
    }

    /// Raw fills in execution order.
    pub fn fills(&self) -> &[Fill] {
        &self.fills
    }

    pub fn last_trade_price(&self) -> Option<Price> {
        self.last_trade_price
    }

    pub fn router(&self) -> &FillRouter {
        &self.router
    }

    pub fn router_mut(&mut self) -> &mut FillRouter {
        &mut self.router
    }

    pub fn pending_stop_count(&self) -> usize {
        self.stops
            .iter_pending()
            .filter(|order| self.is_pending_stop(order.id))
            .count()
    }

    pub fn active_bids_count(&self) -> usize {
        self.count_live(Side::Buy)
    }

    pub fn active_asks_count(&self) -> usize {
        self.count_live(Side::Sell)
    }

    /// Aggregated displayed liquidity, best `levels` price levels per side.
    pub fn market_depth(&self, levels: usize) -> MarketDepth {
        MarketDepth {
            bids: self.depth_levels(Side::Buy, levels),
            asks: self.depth_levels(Side::Sell, levels),
        }
    }

    pub fn bid_levels(&self, levels: usize) -> Vec<PriceLevel> {
        self.depth_levels(Side::Buy, levels)
    }

    pub fn ask_levels(&self, levels: usize) -> Vec<PriceLevel> {
        self.depth_levels(Side::Sell, levels)
    }

    // ── Event log ───────────────────────────────────────────────────

    pub fn enable_logging(&mut self) {
        self.logging_enabled = true;
    }

    pub fn disable_logging(&mut self) {
        self.logging_enabled = false;
    }

    pub fn is_logging(&self) -> bool {
        self.logging_enabled
    }

    pub fn events(&self) -> &[OrderEvent] {
        &self.events
    }

    pub fn event_count(&self) -> usize {
        self.events.len()
    }

    pub fn clear_events(&mut self) {
        self.events.clear();
    }

    pub fn save_events(&self, path: impl AsRef<std::path::Path>) -> Result<(), EventLogError> {
        events::save_events(path, &self.events)?;
        info!(count = self.events.len(), "events saved");
        Ok(())
    }

    // ── Snapshot & checkpoint ───────────────────────────────────────

    /// Capture the full engine state.
    pub fn create_snapshot(&mut self) -> Snapshot {
        let snapshot_time_ns = self.clock.now_ns();

        let mut active: Vec<Order> = self
            .registry
            .active_orders()
            .filter(|order| !(order.is_stop() && order.state == OrderState::Pending))
            .cloned()
            .collect();
        active.sort_by_key(|order| order.id);

        let pending: Vec<Order> = self
            .stops
            .iter_pending()
            .filter(|order| self.is_pending_stop(order.id))
            .cloned()
            .collect();

        Snapshot::new(
            self.snapshot_counter,
            snapshot_time_ns,
            self.symbol.clone(),
            active,
            pending,
            self.fills.clone(),
            self.last_trade_price,
            self.orders_processed,
            self.latency.samples().to_vec(),
        )
    }

    /// Wipe current state and rebuild from a snapshot.
    pub fn restore_from_snapshot(&mut self, snapshot: Snapshot) {
        self.bids.clear();
        self.asks.clear();
        self.registry.clear();
        self.stops.clear();
        self.fills.clear();
        self.events.clear();
        self.latency.clear();

        self.last_trade_price = snapshot.last_trade_price;
        self.fills = snapshot.fills;
        self.orders_processed = snapshot.total_orders_processed;
        self.latency.restore(snapshot.latencies_ns);

        let mut max_seq = 0u64;
        for order in snapshot.active_orders {
            max_seq = max_seq.max(order.arrival_seq);
            if order.is_active() && !order.is_stop() {
                match order.side {
                    Side::Buy => self.bids.push(order.clone()),
                    Side::Sell => self.asks.push(order.clone()),
                }
            }
            self.registry.insert(order);
        }
        for stop in snapshot.pending_stops {
            max_seq = max_seq.max(stop.arrival_seq);
            self.registry.insert(stop.clone());
            self.stops.insert(stop);
        }
        self.next_arrival_seq = max_seq + 1;

        info!(
            active = self.registry.active_len(),
            pending_stops = self.stops.len(),
            fills = self.fills.len(),
            "order book restored from snapshot"
        );
    }

    pub fn save_snapshot(
        &mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), SnapshotError> {
        let snap = self.create_snapshot();
        snapshot::save_snapshot(path, &snap)?;
        self.snapshot_counter += 1;
        info!(snapshot_id = snap.snapshot_id, "snapshot saved");
        Ok(())
    }

    /// Load and restore a snapshot. The file is parsed and fully validated
    /// before any state is touched: on error the engine is unchanged.
    pub fn load_snapshot(
        &mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<(), SnapshotError> {
        let snap = snapshot::load_snapshot(path)?;
        if snap.symbol != self.symbol {
            return Err(SnapshotError::SymbolMismatch {
                expected: self.symbol.clone(),
                found: snap.symbol,
            });
        }
        self.restore_from_snapshot(snap);
        Ok(())
    }

    /// Checkpoint = snapshot + the event log recorded alongside it.
    pub fn save_checkpoint(
        &mut self,
        snapshot_path: impl AsRef<std::path::Path>,
        events_path: impl AsRef<std::path::Path>,
    ) -> Result<(), CheckpointError> {
        self.save_snapshot(snapshot_path)?;
        self.save_events(events_path)?;
        Ok(())
    }

    /// Restore the snapshot, then apply the incremental events: FILL events
    /// are skipped (the engine recomputes them) and so is anything at or
    /// before the snapshot time. Returns the number of events applied.
    pub fn recover_from_checkpoint(
        &mut self,
        snapshot_path: impl AsRef<std::path::Path>,
        events_path: impl AsRef<std::path::Path>,
    ) -> Result<u64, CheckpointError> {
        let snap = snapshot::load_snapshot(snapshot_path)?;
        if snap.symbol != self.symbol {
            return Err(CheckpointError::Snapshot(SnapshotError::SymbolMismatch {
                expected: self.symbol.clone(),
                found: snap.symbol,
            }));
        }
        let snapshot_time_ns = snap.snapshot_time_ns;
        let incremental = events::load_events(events_path)?;

        self.restore_from_snapshot(snap);

        // Recovery must not re-log the events it is consuming.
        let was_logging = self.logging_enabled;
        self.logging_enabled = false;
        let mut applied = 0u64;
        for event in &incremental {
            if event.is_fill() || event.timestamp_ns() <= snapshot_time_ns {
                continue;
            }
            crate::replay::apply_event(self, event);
            applied += 1;
        }
        self.logging_enabled = was_logging;

        info!(applied, "checkpoint recovery complete");
        Ok(applied)
    }

    // ── Diagnostics ─────────────────────────────────────────────────

    /// Toggle per-submission latency sampling (diagnostic only).
    pub fn set_latency_tracking(&mut self, enabled: bool) {
        self.latency.set_enabled(enabled);
    }

    pub fn latency_summary(&self) -> Option<LatencySummary> {
        self.latency.summary()
    }

    pub fn match_stats(&self) -> MatchStats {
        MatchStats::compute(self.orders_processed, &self.fills)
    }

    pub fn orders_processed(&self) -> u64 {
        self.orders_processed
    }

    // ── Internal plumbing (shared with the matching core) ───────────

    pub(crate) fn next_seq(&mut self) -> u64 {
        let seq = self.next_arrival_seq;
        self.next_arrival_seq += 1;
        seq
    }

    pub(crate) fn now_ns(&mut self) -> i64 {
        self.clock.now_ns()
    }

    pub(crate) fn book_mut(&mut self, side: Side) -> &mut PriorityBook {
        match side {
            Side::Buy => &mut self.bids,
            Side::Sell => &mut self.asks,
        }
    }

    pub(crate) fn book(&self, side: Side) -> &PriorityBook {
        match side {
            Side::Buy => &self.bids,
            Side::Sell => &self.asks,
        }
    }

    fn is_pending_stop(&self, id: OrderId) -> bool {
        matches!(
            self.registry.get(id),
            Some(current) if current.is_stop() && current.state == OrderState::Pending
        )
    }

    fn best_live(&self, side: Side) -> Option<Order> {
        let mut best: Option<&Order> = None;
        for entry in self.book(side).iter() {
            let Some(live) = self.registry.live_view(entry) else {
                continue;
            };
            if live.display_qty() == 0 {
                continue;
            }
            best = match best {
                Some(current) if !crate::book::ranks_before(side, live, current) => Some(current),
                _ => Some(live),
            };
        }
        best.cloned()
    }

    fn count_live(&self, side: Side) -> usize {
        self.book(side)
            .iter()
            .filter(|entry| self.registry.live_view(entry).is_some())
            .count()
    }

    fn depth_levels(&self, side: Side, max_levels: usize) -> Vec<PriceLevel> {
        let mut by_price: BTreeMap<Price, (u32, u32)> = BTreeMap::new();
        for entry in self.book(side).iter() {
            let Some(live) = self.registry.live_view(entry) else {
                continue;
            };
            if live.display_qty() == 0 {
                continue;
            }
            let Some(price) = live.limit_price() else {
                continue;
            };
            let slot = by_price.entry(price).or_insert((0, 0));
            slot.0 += live.display_qty();
            slot.1 += 1;
        }

        let to_level = |(price, (qty, count)): (&Price, &(u32, u32))| PriceLevel {
            price: *price,
            total_quantity: *qty,
            order_count: *count,
        };
        match side {
            Side::Buy => by_price.iter().rev().take(max_levels).map(to_level).collect(),
            Side::Sell => by_price.iter().take(max_levels).map(to_level).collect(),
        }
    }

    // ── Event recording ─────────────────────────────────────────────

    pub(crate) fn record_new(&mut self, order: &Order) {
        if self.logging_enabled {
            self.events.push(OrderEvent::New {
                timestamp_ns: order.timestamp_ns,
                order: order.clone(),
            });
        }
    }

    fn record_cancel(&mut self, timestamp_ns: i64, order_id: OrderId) {
        if self.logging_enabled {
            self.events.push(OrderEvent::Cancel {
                timestamp_ns,
                order_id,
            });
        }
    }

    fn record_amend(
        &mut self,
        timestamp_ns: i64,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<u32>,
    ) {
        if self.logging_enabled {
            self.events.push(OrderEvent::Amend {
                timestamp_ns,
                order_id,
                new_price,
                new_quantity,
            });
        }
    }

    pub(crate) fn record_fill(&mut self, fill: &Fill, buy_account: AccountId) {
        if self.logging_enabled {
            self.events.push(OrderEvent::Fill {
                timestamp_ns: fill.timestamp_ns,
                buy_order_id: fill.buy_order_id,
                sell_order_id: fill.sell_order_id,
                price: fill.price,
                quantity: fill.quantity,
                buy_account: Some(buy_account),
            });
        }
    }
}

impl std::fmt::Debug for OrderBook {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OrderBook")
            .field("symbol", &self.symbol)
            .field("bids", &self.bids.len())
            .field("asks", &self.asks.len())
            .field("active_orders", &self.registry.active_len())
            .field("pending_stops", &self.stops.len())
            .field("fills", &self.fills.len())
            .field("last_trade_price", &self.last_trade_price)
            .finish()
    }
}
