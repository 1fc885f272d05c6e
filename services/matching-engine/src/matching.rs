//! Matching core: the aggressor/passive walk under price/time priority
//!
//! The incoming order repeatedly takes the top of the opposite book. Every
//! popped entry is re-validated against the registry (lazy deletion) before
//! it may trade. Trades execute at the passive price; each print updates
//! the last trade price and sweeps the stop book, and a triggered stop runs
//! its own matching round recursively, so cascades happen within the
//! originating submission.

use std::collections::HashSet;
use tracing::{debug, info};
use types::prelude::*;

use crate::engine::OrderBook;

/// Price compatibility between an incoming order and a resting one.
/// A limit at exactly the opposite price matches (inclusive compare).
pub(crate) fn can_match(aggressor: &Order, passive: &Order) -> bool {
    if aggressor.is_market() {
        return true;
    }
    match (aggressor.limit_price(), passive.limit_price()) {
        (Some(aggressor_price), Some(passive_price)) => match aggressor.side {
            Side::Buy => aggressor_price >= passive_price,
            Side::Sell => aggressor_price <= passive_price,
        },
        _ => false,
    }
}

impl OrderBook {
    /// Match an incoming order against the opposite book, then park or
    /// cancel whatever is left.
    pub(crate) fn match_incoming(&mut self, order: &mut Order) {
        if !self.check_fok(order) {
            return;
        }

        while order.remaining > 0 {
            let Some(mut passive) = self.pop_live(order.side.opposite()) else {
                break;
            };

            if !can_match(order, &passive) {
                self.book_mut(passive.side).push(passive);
                break;
            }

            self.execute_trade(order, &mut passive);
            self.update_order_state(order);
            self.update_order_state(&mut passive);

            if passive.needs_refresh() {
                let seq = self.next_seq();
                let ts = self.now_ns();
                // The refreshed slice joins the back of its price level.
                passive.refresh_display(seq, ts);
                self.registry.write_back(&passive);
                self.book_mut(passive.side).push(passive);
            } else if passive.remaining > 0 && passive.display_qty() > 0 {
                self.book_mut(passive.side).push(passive);
            }
        }

        self.handle_unfilled(order);
    }

    /// Pop the best opposite entry that is still live: absent, terminal,
    /// superseded and stale pre-refresh copies are discarded, and the
    /// surviving copy is replaced by the authoritative registry record.
    fn pop_live(&mut self, side: Side) -> Option<Order> {
        loop {
            let entry = self.book_mut(side).pop()?;
            let live = match self.registry.live_view(&entry) {
                Some(live) => live.clone(),
                None => continue,
            };
            if live.display_qty() == 0 && live.remaining > 0 {
                continue;
            }
            return Some(live);
        }
    }

    /// Execute one trade at the passive price, record it, route it, and
    /// sweep the stop book for the new print.
    fn execute_trade(&mut self, aggressor: &mut Order, passive: &mut Order) {
        let available = passive.display_qty();
        let trade_qty = aggressor.remaining.min(available);
        let trade_price = match passive.limit_price() {
            Some(price) => price,
            // Unpriced orders never rest, so this entry cannot trade.
            None => return,
        };

        let (buy_id, sell_id, buy_account) = match aggressor.side {
            Side::Buy => (aggressor.id, passive.id, aggressor.account),
            Side::Sell => (passive.id, aggressor.id, passive.account),
        };

        let timestamp_ns = self.now_ns();
        let fill = Fill::new(buy_id, sell_id, trade_price, trade_qty, timestamp_ns);

        // The router sees the fill before it is published anywhere else;
        // a self-trade veto suppresses the enriched fill only.
        self.router
            .route_fill(&fill, aggressor, passive, &self.symbol);
        self.record_fill(&fill, buy_account);
        self.fills.push(fill);

        aggressor.consume(trade_qty);
        passive.consume(trade_qty);

        debug!(
            buy = %buy_id,
            sell = %sell_id,
            price = %trade_price,
            qty = trade_qty,
            "trade executed"
        );

        self.last_trade_price = Some(trade_price);
        self.sweep_stops(trade_price);
    }

    /// Derive FILLED / PARTIALLY_FILLED from the quantities and write the
    /// order back to the registry.
    fn update_order_state(&mut self, order: &mut Order) {
        if order.remaining == 0 {
            order.state = OrderState::Filled;
        } else if order.remaining < order.quantity {
            order.state = OrderState::PartiallyFilled;
        }
        self.registry.write_back(order);
    }

    /// Fill-or-kill pre-check: the whole quantity must be immediately
    /// matchable or the order dies before any trade happens.
    fn check_fok(&mut self, order: &mut Order) -> bool {
        if order.tif != TimeInForce::Fok {
            return true;
        }
        if self.crossable_quantity(order) >= u64::from(order.quantity) {
            return true;
        }

        order.state = OrderState::Cancelled;
        self.registry.write_back(order);
        info!(
            order_id = %order.id,
            quantity = order.quantity,
            "FOK order cancelled (insufficient liquidity)"
        );
        false
    }

    /// Authoritative quantity resting at crossable prices. Hidden iceberg
    /// reserve counts: it becomes reachable through refreshes within a
    /// single sweep.
    fn crossable_quantity(&self, order: &Order) -> u64 {
        let mut seen = HashSet::new();
        let mut total = 0u64;
        for entry in self.book(order.side.opposite()).iter() {
            let Some(live) = self.registry.live_view(entry) else {
                continue;
            };
            if !seen.insert(live.id) {
                continue;
            }
            if can_match(order, live) {
                total += u64::from(live.remaining);
            }
        }
        total
    }

    /// Park a resting-capable remainder in its book; cancel anything else
    /// (IOC remainders, market-order leftovers). The frozen remainder
    /// keeps its quantity.
    fn handle_unfilled(&mut self, order: &mut Order) {
        if order.remaining == 0 {
            return;
        }

        if order.can_rest_in_book() {
            self.book_mut(order.side).push(order.clone());
            return;
        }

        order.state = OrderState::Cancelled;
        self.registry.write_back(order);

        if order.tif == TimeInForce::Ioc {
            let filled = order.quantity - order.remaining;
            if filled > 0 {
                debug!(
                    order_id = %order.id,
                    filled,
                    total = order.quantity,
                    "IOC order partially filled, remainder cancelled"
                );
            } else {
                debug!(order_id = %order.id, "IOC order cancelled (no immediate liquidity)");
            }
        }
    }

    /// Enforce terminal-state rules once matching has finished. Terminal
    /// registry records are never overwritten.
    pub(crate) fn finalize_after_matching(&mut self, order: &mut Order) {
        if let Some(current) = self.registry.get(order.id) {
            if current.state.is_terminal() {
                return;
            }
        }

        if order.tif == TimeInForce::Ioc {
            if order.remaining > 0 {
                order.state = OrderState::Cancelled;
            } else {
                order.state = OrderState::Filled;
            }
            self.registry.write_back(order);
            return;
        }

        // FOK failures are handled before matching starts.

        if order.remaining == 0 {
            order.state = OrderState::Filled;
            self.registry.write_back(order);
        } else if order.remaining < order.quantity {
            order.state = OrderState::PartiallyFilled;
            self.registry.write_back(order);
        }
    }

    // ── Stop triggering ─────────────────────────────────────────────

    /// Collect and route every stop triggered by a trade print. Entries
    /// whose registry record is no longer a pending stop (cancelled while
    /// dormant) are dropped silently.
    pub(crate) fn sweep_stops(&mut self, trade_price: Price) {
        let triggered = self.stops.take_triggered(trade_price);
        for stop in triggered {
            let still_pending = matches!(
                self.registry.get(stop.id),
                Some(current) if current.is_stop() && current.state == OrderState::Pending
            );
            if !still_pending {
                continue;
            }
            self.trigger_stop(stop, trade_price);
        }
    }

    /// Convert a triggered stop and route it through normal matching. Its
    /// own fills may cascade-trigger further stops.
    pub(crate) fn trigger_stop(&mut self, mut order: Order, reference_price: Price) {
        info!(
            order_id = %order.id,
            side = %order.side,
            reference = %reference_price,
            "stop order triggered"
        );

        order.convert_stop();
        order.state = OrderState::Active;
        order.arrival_seq = self.next_seq();
        order.timestamp_ns = self.now_ns();
        self.registry.insert(order.clone());

        self.match_incoming(&mut order);
        self.finalize_after_matching(&mut order);
    }

    /// Reference price for trigger-on-placement: the last trade if one has
    /// printed, otherwise derived from the current book. Sell stops use the
    /// lowest available signal, buy stops the highest; an empty book yields
    /// no reference and the stop is enqueued.
    pub(crate) fn reference_price_for(&self, side: Side) -> Option<Price> {
        if let Some(last) = self.last_trade_price {
            return Some(last);
        }

        let best_bid = self.best_bid().and_then(|o| o.limit_price());
        let best_ask = self.best_ask().and_then(|o| o.limit_price());
        match side {
            Side::Sell => match (best_bid, best_ask) {
                (Some(bid), Some(ask)) => Some(bid.min(ask)),
                (Some(bid), None) => Some(bid),
                (None, Some(ask)) => Some(ask),
                (None, None) => None,
            },
            Side::Buy => match (best_bid, best_ask) {
                (Some(bid), Some(ask)) => Some(bid.max(ask)),
                (Some(bid), None) => Some(bid),
                (None, Some(ask)) => Some(ask),
                (None, None) => None,
            },
        }
    }

    /// Would a just-placed stop trigger immediately under current
    /// conditions?
    pub(crate) fn stop_should_trigger_now(&self, order: &Order) -> bool {
        let Some(stop_price) = order.stop_price() else {
            return false;
        };
        let Some(reference) = self.reference_price_for(order.side) else {
            return false;
        };
        match order.side {
            Side::Buy => reference >= stop_price,
            Side::Sell => reference <= stop_price,
        }
    }
}
