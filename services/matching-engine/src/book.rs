//! Priority books for resting liquidity
//!
//! One `PriorityBook` per side, backed by a binary heap of order copies
//! ranked by (price, arrival sequence): bids highest price first, asks
//! lowest price first, earlier arrival winning ties. There is no interior
//! deletion; cancelled and superseded entries stay in the heap and are
//! filtered against the registry at pop time (lazy deletion).

use std::cmp::Ordering;
use std::collections::BinaryHeap;
use types::prelude::*;

/// True if `a` has strictly better book priority than `b` on `side`.
///
/// Orders without a limit price never rest, so the price comparison only
/// ever sees priced entries; unpriced pairs fall through to arrival order.
pub fn ranks_before(side: Side, a: &Order, b: &Order) -> bool {
    price_time_cmp(side, a, b) == Ordering::Greater
}

fn price_time_cmp(side: Side, a: &Order, b: &Order) -> Ordering {
    let by_price = match (a.limit_price(), b.limit_price()) {
        (Some(pa), Some(pb)) => match side {
            Side::Buy => pa.cmp(&pb),
            Side::Sell => pb.cmp(&pa),
        },
        _ => Ordering::Equal,
    };
    // Earlier arrival outranks later at the same price.
    by_price.then_with(|| b.arrival_seq.cmp(&a.arrival_seq))
}

#[derive(Debug, Clone)]
struct Ranked {
    side: Side,
    order: Order,
}

impl Ord for Ranked {
    fn cmp(&self, other: &Self) -> Ordering {
        price_time_cmp(self.side, &self.order, &other.order)
    }
}

impl PartialOrd for Ranked {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Ranked {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Ranked {}

/// One side of the book. Stores copies of orders; the registry holds the
/// authoritative state and pop-side filtering discards stale entries.
#[derive(Debug, Clone)]
pub struct PriorityBook {
    side: Side,
    heap: BinaryHeap<Ranked>,
}

impl PriorityBook {
    pub fn new(side: Side) -> Self {
        Self {
            side,
            heap: BinaryHeap::new(),
        }
    }

    pub fn side(&self) -> Side {
        self.side
    }

    /// Insert an order copy. Re-inserting a previously popped order is the
    /// normal way to return it to the book.
    pub fn push(&mut self, order: Order) {
        debug_assert!(order.limit_price().is_some(), "unpriced orders never rest");
        self.heap.push(Ranked {
            side: self.side,
            order,
        });
    }

    /// Remove and return the top-priority entry. May be stale; callers
    /// apply the lazy-deletion rules against the registry.
    pub fn pop(&mut self) -> Option<Order> {
        self.heap.pop().map(|ranked| ranked.order)
    }

    pub fn peek(&self) -> Option<&Order> {
        self.heap.peek().map(|ranked| &ranked.order)
    }

    /// Unordered iteration over every entry, stale copies included.
    pub fn iter(&self) -> impl Iterator<Item = &Order> {
        self.heap.iter().map(|ranked| &ranked.order)
    }

    pub fn len(&self) -> usize {
        self.heap.len()
    }

    pub fn is_empty(&self) -> bool {
        self.heap.is_empty()
    }

    pub fn clear(&mut self) {
        self.heap.clear();
    }
}

/// Aggregated liquidity at one price.
#[derive(Debug, Clone, PartialEq)]
pub struct PriceLevel {
    pub price: Price,
    /// Displayed quantity only; hidden iceberg reserve is not included.
    pub total_quantity: u32,
    pub order_count: u32,
}

/// Two-sided depth view, best levels first on each side.
#[derive(Debug, Clone, PartialEq)]
pub struct MarketDepth {
    pub bids: Vec<PriceLevel>,
    pub asks: Vec<PriceLevel>,
}
