//! Raw trade execution record

use crate::ids::OrderId;
use crate::numeric::Price;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A single execution between a buy order and a sell order.
///
/// Emitted by the matching core at the passive order's price; enrichment
/// (accounts, fees, liquidity flags) happens downstream in the fill router.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Fill {
    pub buy_order_id: OrderId,
    pub sell_order_id: OrderId,
    pub price: Price,
    pub quantity: u32,
    pub timestamp_ns: i64,
}

impl Fill {
    pub fn new(
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        price: Price,
        quantity: u32,
        timestamp_ns: i64,
    ) -> Self {
        Self {
            buy_order_id,
            sell_order_id,
            price,
            quantity,
            timestamp_ns,
        }
    }

    /// Notional value (price × quantity).
    pub fn notional(&self) -> rust_decimal::Decimal {
        self.price.notional(self.quantity)
    }
}

impl fmt::Display for Fill {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Fill{{buy={}, sell={}, px={}, qty={}}}",
            self.buy_order_id, self.sell_order_id, self.price, self.quantity
        )
    }
}
