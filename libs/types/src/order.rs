//! Order lifecycle types
//!
//! An order is a common header (identity, side, time-in-force, quantities,
//! lifecycle state, arrival stamp) plus a kind-specific payload. Limit,
//! market, iceberg and stop orders each get an explicit constructor; there
//! are no sentinel fields.

use crate::ids::{AccountId, OrderId};
use crate::numeric::Price;
use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Order side (buyer or seller).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Side {
    Buy,
    Sell,
}

impl Side {
    /// Get the opposite side.
    pub fn opposite(&self) -> Self {
        match self {
            Side::Buy => Side::Sell,
            Side::Sell => Side::Buy,
        }
    }
}

impl fmt::Display for Side {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Side::Buy => write!(f, "BUY"),
            Side::Sell => write!(f, "SELL"),
        }
    }
}

/// Time-in-force policy.
///
/// `Day` is an alias of `Gtc` in this engine: there is no session clock and
/// nothing expires autonomously.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum TimeInForce {
    /// Good-till-cancel: rests until filled or explicitly cancelled.
    Gtc,
    /// Alias of GTC here; no autonomous expiry.
    Day,
    /// Immediate-or-cancel: match what is available, cancel the remainder.
    Ioc,
    /// Fill-or-kill: full quantity immediately or nothing.
    Fok,
}

impl fmt::Display for TimeInForce {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            TimeInForce::Gtc => "GTC",
            TimeInForce::Day => "DAY",
            TimeInForce::Ioc => "IOC",
            TimeInForce::Fok => "FOK",
        };
        write!(f, "{s}")
    }
}

/// Order lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum OrderState {
    /// Accepted but dormant (pending stops).
    Pending,
    /// Live and matchable.
    Active,
    /// Some quantity executed, remainder live.
    PartiallyFilled,
    /// Fully executed (terminal).
    Filled,
    /// Cancelled by the caller or by time-in-force rules (terminal).
    Cancelled,
    /// Failed validation (terminal).
    Rejected,
}

impl OrderState {
    /// Terminal states never transition again; remaining quantity is frozen.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            OrderState::Filled | OrderState::Cancelled | OrderState::Rejected
        )
    }
}

impl fmt::Display for OrderState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            OrderState::Pending => "PENDING",
            OrderState::Active => "ACTIVE",
            OrderState::PartiallyFilled => "PARTIALLY_FILLED",
            OrderState::Filled => "FILLED",
            OrderState::Cancelled => "CANCELLED",
            OrderState::Rejected => "REJECTED",
        };
        write!(f, "{s}")
    }
}

/// What a stop order converts into when its trigger fires.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum StopBecomes {
    /// Stop-market: converts to a market order.
    Market,
    /// Stop-limit: converts to a limit order at the carried price.
    Limit(Price),
}

/// Kind-specific order payload.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum OrderKind {
    Limit {
        price: Price,
    },
    Market,
    /// Hidden-reserve order. Only `display` is visible to aggressors;
    /// `display + hidden` always equals the order's remaining quantity.
    Iceberg {
        price: Price,
        peak: u32,
        display: u32,
        hidden: u32,
    },
    /// Dormant until the trigger price is touched; never rests in the
    /// priority books while in this kind.
    Stop {
        stop_price: Price,
        becomes: StopBecomes,
    },
}

/// Construction-time validation failures.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum OrderError {
    #[error("order quantity must be positive")]
    ZeroQuantity,

    #[error("iceberg peak size must be positive")]
    ZeroPeakSize,
}

/// A single order, engine-owned from submission onward.
///
/// `timestamp_ns` and `arrival_seq` are assigned by the engine at
/// submission; caller-provided values are overwritten.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Order {
    pub id: OrderId,
    pub account: AccountId,
    pub side: Side,
    pub tif: TimeInForce,
    pub kind: OrderKind,
    /// Original quantity.
    pub quantity: u32,
    /// Quantity still unexecuted (visible + hidden for icebergs).
    pub remaining: u32,
    pub state: OrderState,
    pub timestamp_ns: i64,
    pub arrival_seq: u64,
}

impl Order {
    fn new(
        id: OrderId,
        account: AccountId,
        side: Side,
        tif: TimeInForce,
        kind: OrderKind,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        if quantity == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        Ok(Self {
            id,
            account,
            side,
            tif,
            kind,
            quantity,
            remaining: quantity,
            state: OrderState::Pending,
            timestamp_ns: 0,
            arrival_seq: 0,
        })
    }

    /// Plain limit order.
    pub fn limit(
        id: OrderId,
        account: AccountId,
        side: Side,
        price: Price,
        quantity: u32,
        tif: TimeInForce,
    ) -> Result<Self, OrderError> {
        Self::new(id, account, side, tif, OrderKind::Limit { price }, quantity)
    }

    /// Market order. Has no limit price; it is logged with price 0.
    pub fn market(
        id: OrderId,
        account: AccountId,
        side: Side,
        quantity: u32,
        tif: TimeInForce,
    ) -> Result<Self, OrderError> {
        Self::new(id, account, side, tif, OrderKind::Market, quantity)
    }

    /// Iceberg order: at most `peak` shares are displayed at a time.
    pub fn iceberg(
        id: OrderId,
        account: AccountId,
        side: Side,
        price: Price,
        quantity: u32,
        peak: u32,
        tif: TimeInForce,
    ) -> Result<Self, OrderError> {
        if peak == 0 {
            return Err(OrderError::ZeroPeakSize);
        }
        if quantity == 0 {
            return Err(OrderError::ZeroQuantity);
        }
        let display = peak.min(quantity);
        let hidden = quantity - display;
        Self::new(
            id,
            account,
            side,
            tif,
            OrderKind::Iceberg {
                price,
                peak,
                display,
                hidden,
            },
            quantity,
        )
    }

    /// Stop-market order: converts to a market order on trigger.
    pub fn stop_market(
        id: OrderId,
        account: AccountId,
        side: Side,
        stop_price: Price,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        Self::new(
            id,
            account,
            side,
            TimeInForce::Gtc,
            OrderKind::Stop {
                stop_price,
                becomes: StopBecomes::Market,
            },
            quantity,
        )
    }

    /// Stop-limit order: converts to a limit order at `limit_price` on
    /// trigger.
    pub fn stop_limit(
        id: OrderId,
        account: AccountId,
        side: Side,
        stop_price: Price,
        limit_price: Price,
        quantity: u32,
    ) -> Result<Self, OrderError> {
        Self::new(
            id,
            account,
            side,
            TimeInForce::Gtc,
            OrderKind::Stop {
                stop_price,
                becomes: StopBecomes::Limit(limit_price),
            },
            quantity,
        )
    }

    /// Limit price, if the order has one. `None` for market orders;
    /// stop-limits report their post-trigger price.
    pub fn limit_price(&self) -> Option<Price> {
        match self.kind {
            OrderKind::Limit { price } => Some(price),
            OrderKind::Iceberg { price, .. } => Some(price),
            OrderKind::Market => None,
            OrderKind::Stop { becomes, .. } => match becomes {
                StopBecomes::Limit(price) => Some(price),
                StopBecomes::Market => None,
            },
        }
    }

    /// Trigger price for dormant stops.
    pub fn stop_price(&self) -> Option<Price> {
        match self.kind {
            OrderKind::Stop { stop_price, .. } => Some(stop_price),
            _ => None,
        }
    }

    pub fn is_market(&self) -> bool {
        matches!(self.kind, OrderKind::Market)
    }

    pub fn is_iceberg(&self) -> bool {
        matches!(self.kind, OrderKind::Iceberg { .. })
    }

    /// A stop still waiting for its trigger.
    pub fn is_stop(&self) -> bool {
        matches!(self.kind, OrderKind::Stop { .. })
    }

    pub fn is_filled(&self) -> bool {
        self.remaining == 0 || self.state == OrderState::Filled
    }

    pub fn is_active(&self) -> bool {
        matches!(
            self.state,
            OrderState::Active | OrderState::PartiallyFilled
        )
    }

    /// Only limit-style orders with a resting time-in-force may sit in the
    /// priority books.
    pub fn can_rest_in_book(&self) -> bool {
        matches!(
            self.kind,
            OrderKind::Limit { .. } | OrderKind::Iceberg { .. }
        ) && matches!(self.tif, TimeInForce::Gtc | TimeInForce::Day)
    }

    /// Quantity visible to aggressors right now.
    pub fn display_qty(&self) -> u32 {
        match self.kind {
            OrderKind::Iceberg { display, .. } => display,
            _ => self.remaining,
        }
    }

    /// Hidden reserve not yet displayed.
    pub fn hidden_qty(&self) -> u32 {
        match self.kind {
            OrderKind::Iceberg { hidden, .. } => hidden,
            _ => 0,
        }
    }

    /// Iceberg peak size; zero for other kinds.
    pub fn peak_size(&self) -> u32 {
        match self.kind {
            OrderKind::Iceberg { peak, .. } => peak,
            _ => 0,
        }
    }

    /// The displayed slice is exhausted but hidden reserve remains.
    pub fn needs_refresh(&self) -> bool {
        match self.kind {
            OrderKind::Iceberg {
                display, hidden, ..
            } => display == 0 && hidden > 0,
            _ => false,
        }
    }

    /// Reveal the next iceberg slice. The order takes a new arrival stamp
    /// and therefore loses time priority at its price level.
    pub fn refresh_display(&mut self, arrival_seq: u64, timestamp_ns: i64) {
        if let OrderKind::Iceberg {
            peak,
            display,
            hidden,
            ..
        } = &mut self.kind
        {
            let slice = (*peak).min(*hidden);
            *display = slice;
            *hidden -= slice;
            self.arrival_seq = arrival_seq;
            self.timestamp_ns = timestamp_ns;
        }
    }

    /// Consume `qty` shares from a trade, keeping
    /// `display + hidden = remaining` for icebergs. A passive iceberg only
    /// ever trades within its displayed slice; an aggressing iceberg is not
    /// bounded by it, so the slice is rebased on what is left.
    pub fn consume(&mut self, qty: u32) {
        debug_assert!(qty <= self.remaining);
        self.remaining -= qty;
        let remaining = self.remaining;
        if let OrderKind::Iceberg {
            peak,
            display,
            hidden,
            ..
        } = &mut self.kind
        {
            if qty <= *display {
                *display -= qty;
            } else {
                *display = (*peak).min(remaining);
                *hidden = remaining - *display;
            }
        }
    }

    /// Convert a triggered stop into its target kind. No-op for other kinds.
    pub fn convert_stop(&mut self) {
        if let OrderKind::Stop { becomes, .. } = self.kind {
            self.kind = match becomes {
                StopBecomes::Market => OrderKind::Market,
                StopBecomes::Limit(price) => OrderKind::Limit { price },
            };
        }
    }

    fn kind_label(&self) -> &'static str {
        match self.kind {
            OrderKind::Limit { .. } => "LIMIT",
            OrderKind::Market => "MARKET",
            OrderKind::Iceberg { .. } => "ICEBERG",
            OrderKind::Stop { .. } => "STOP",
        }
    }
}

impl fmt::Display for Order {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Order{{id={}, kind={}, side={}, price=",
            self.id,
            self.kind_label(),
            self.side
        )?;
        match self.limit_price() {
            Some(price) => write!(f, "{price}")?,
            None => write!(f, "MARKET")?,
        }
        write!(
            f,
            ", qty={}/{}, state={}, seq={}}}",
            self.remaining, self.quantity, self.state, self.arrival_seq
        )
    }
}
