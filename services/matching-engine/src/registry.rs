//! Order registry: the single source of truth for order state
//!
//! The priority books hold copies that go stale the moment an order is
//! cancelled, amended or refreshed. Every copy popped from a book must be
//! re-validated here before it trades:
//!
//! 1. absent or terminal → discard the copy;
//! 2. otherwise the authoritative record replaces the copy;
//! 3. a copy whose arrival sequence no longer matches the record is a
//!    leftover from a superseded insertion (amend reuses ids) → discard;
//! 4. after any mutation the authoritative record is written back.
//!
//! This makes cancellation O(1): flip the state here, never touch the heap.

use std::collections::HashMap;
use types::prelude::*;

#[derive(Debug, Default)]
pub struct OrderRegistry {
    /// Live and in-place-terminal orders (filled orders stay here).
    active: HashMap<OrderId, Order>,
    /// Explicitly cancelled orders, kept so `lookup` still resolves them.
    cancelled: HashMap<OrderId, Order>,
}

impl OrderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or overwrite. Duplicate ids silently replace the old record.
    pub fn insert(&mut self, order: Order) {
        self.active.insert(order.id, order);
    }

    /// Authoritative record, active map only.
    pub fn get(&self, id: OrderId) -> Option<&Order> {
        self.active.get(&id)
    }

    /// Lookup across active and cancelled orders.
    pub fn lookup(&self, id: OrderId) -> Option<&Order> {
        self.active.get(&id).or_else(|| self.cancelled.get(&id))
    }

    /// Validate a popped book copy. Returns the authoritative record if the
    /// copy is still live, or None if it must be discarded.
    pub fn live_view(&self, copy: &Order) -> Option<&Order> {
        let current = self.active.get(&copy.id)?;
        if current.state.is_terminal() {
            return None;
        }
        if current.arrival_seq != copy.arrival_seq {
            return None;
        }
        Some(current)
    }

    /// Write the mutated order back over the active record, if present.
    pub fn write_back(&mut self, order: &Order) {
        if let Some(entry) = self.active.get_mut(&order.id) {
            *entry = order.clone();
        }
    }

    /// Remove an order from the active map (explicit cancellation path).
    pub fn take_active(&mut self, id: OrderId) -> Option<Order> {
        self.active.remove(&id)
    }

    /// Mirror an explicitly cancelled order for later lookups.
    pub fn store_cancelled(&mut self, order: Order) {
        self.cancelled.insert(order.id, order);
    }

    pub fn active_orders(&self) -> impl Iterator<Item = &Order> {
        self.active.values()
    }

    pub fn active_len(&self) -> usize {
        self.active.len()
    }

    pub fn clear(&mut self) {
        self.active.clear();
        self.cancelled.clear();
    }
}
