//! Stop book: dormant stop orders keyed by trigger price
//!
//! Stops never rest in the priority books. They sit here until a trade
//! print satisfies their trigger: buy stops fire when the trade price rises
//! to or through the stop price, sell stops when it falls to or through.
//! Multiple stops at one price preserve insertion order.

use std::collections::BTreeMap;
use types::prelude::*;

#[derive(Debug, Default)]
pub struct StopBook {
    /// Buy stops, ascending trigger price.
    buys: BTreeMap<Price, Vec<Order>>,
    /// Sell stops, ascending trigger price.
    sells: BTreeMap<Price, Vec<Order>>,
}

impl StopBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enqueue a dormant stop. Orders without a stop price are ignored.
    pub fn insert(&mut self, order: Order) {
        let Some(stop_price) = order.stop_price() else {
            return;
        };
        let side = match order.side {
            Side::Buy => &mut self.buys,
            Side::Sell => &mut self.sells,
        };
        side.entry(stop_price).or_default().push(order);
    }

    /// Remove and return every stop triggered by a trade at `trade_price`:
    /// buy stops with stop_price ≤ trade_price, then sell stops with
    /// stop_price ≥ trade_price, each group in ascending price order with
    /// FIFO within a price.
    pub fn take_triggered(&mut self, trade_price: Price) -> Vec<Order> {
        let mut triggered = Vec::new();

        let buy_prices: Vec<Price> = self
            .buys
            .range(..=trade_price)
            .map(|(price, _)| *price)
            .collect();
        for price in buy_prices {
            if let Some(orders) = self.buys.remove(&price) {
                triggered.extend(orders);
            }
        }

        let sell_prices: Vec<Price> = self
            .sells
            .range(trade_price..)
            .map(|(price, _)| *price)
            .collect();
        for price in sell_prices {
            if let Some(orders) = self.sells.remove(&price) {
                triggered.extend(orders);
            }
        }

        triggered
    }

    /// All pending stops in book order (buys ascending, then sells
    /// ascending), for snapshots and inspection.
    pub fn iter_pending(&self) -> impl Iterator<Item = &Order> {
        self.buys
            .values()
            .flatten()
            .chain(self.sells.values().flatten())
    }

    pub fn len(&self) -> usize {
        self.buys.values().map(Vec::len).sum::<usize>()
            + self.sells.values().map(Vec::len).sum::<usize>()
    }

    pub fn is_empty(&self) -> bool {
        self.buys.is_empty() && self.sells.is_empty()
    }

    pub fn clear(&mut self) {
        self.buys.clear();
        self.sells.clear();
    }
}
