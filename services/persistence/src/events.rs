//! Event file: the ordered record of order-flow transitions
//!
//! Every user-visible transition (NEW / CANCEL / AMEND / FILL) is recorded
//! as one line of a fixed-header textual file. The codec must round-trip
//! every variant losslessly: prices are written as exact decimal strings,
//! market orders log price 0, icebergs record their peak size, and stop
//! orders record their trigger descriptor.
//!
//! # Line format
//! ```text
//! timestamp_ns,event,order_id,account_id,side,order_type,tif,price,quantity,
//! peak_size,stop_price,new_price,new_qty,counterparty_id,fill_qty
//! ```
//! Absent fields are empty columns. `order_type` doubles as the stop
//! conversion descriptor (`STOP_MARKET` / `STOP_LIMIT`).

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{self, BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use thiserror::Error;
use types::prelude::*;

/// Fixed header line of the event file.
pub const EVENT_FILE_HEADER: &str = "timestamp_ns,event,order_id,account_id,side,order_type,tif,price,quantity,peak_size,stop_price,new_price,new_qty,counterparty_id,fill_qty";

const FIELD_COUNT: usize = 15;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum EventCodecError {
    #[error("expected {FIELD_COUNT} fields, got {got}")]
    FieldCount { got: usize },

    #[error("unknown event type: {0}")]
    UnknownEventType(String),

    #[error("unknown side: {0}")]
    UnknownSide(String),

    #[error("unknown order type: {0}")]
    UnknownOrderType(String),

    #[error("unknown time-in-force: {0}")]
    UnknownTimeInForce(String),

    #[error("invalid {field} value: {value}")]
    InvalidNumber { field: &'static str, value: String },

    #[error("missing required field: {0}")]
    MissingField(&'static str),

    #[error("order reconstruction failed: {0}")]
    InvalidOrder(#[from] OrderError),
}

#[derive(Error, Debug)]
pub enum EventLogError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("codec error on line {line}: {source}")]
    Codec {
        line: usize,
        source: EventCodecError,
    },

    #[error("bad event file header: {found}")]
    BadHeader { found: String },
}

// ── Event ───────────────────────────────────────────────────────────

/// One recorded engine transition. Every variant carries its timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum OrderEvent {
    /// Order accepted: full snapshot of the order as submitted.
    New { timestamp_ns: i64, order: Order },

    /// Cancellation request (recorded before the validity check).
    Cancel {
        timestamp_ns: i64,
        order_id: OrderId,
    },

    /// Amendment request (recorded before the validity check).
    Amend {
        timestamp_ns: i64,
        order_id: OrderId,
        new_price: Option<Price>,
        new_quantity: Option<u32>,
    },

    /// Executed trade.
    Fill {
        timestamp_ns: i64,
        buy_order_id: OrderId,
        sell_order_id: OrderId,
        price: Price,
        quantity: u32,
        buy_account: Option<AccountId>,
    },
}

impl OrderEvent {
    pub fn timestamp_ns(&self) -> i64 {
        match self {
            OrderEvent::New { timestamp_ns, .. }
            | OrderEvent::Cancel { timestamp_ns, .. }
            | OrderEvent::Amend { timestamp_ns, .. }
            | OrderEvent::Fill { timestamp_ns, .. } => *timestamp_ns,
        }
    }

    pub fn is_fill(&self) -> bool {
        matches!(self, OrderEvent::Fill { .. })
    }

    /// Encode as one line of the event file.
    pub fn encode(&self) -> String {
        // Column slots, filled per variant; empty string = absent.
        let mut cols: [String; FIELD_COUNT] = Default::default();

        match self {
            OrderEvent::New {
                timestamp_ns,
                order,
            } => {
                cols[0] = timestamp_ns.to_string();
                cols[1] = "NEW".into();
                cols[2] = order.id.value().to_string();
                cols[3] = order.account.value().to_string();
                cols[4] = order.side.to_string();
                cols[5] = kind_label(order).into();
                cols[6] = order.tif.to_string();
                cols[7] = order
                    .limit_price()
                    .map(|p| p.to_string())
                    .unwrap_or_else(|| "0".into());
                cols[8] = order.quantity.to_string();
                cols[9] = order.peak_size().to_string();
                if let Some(stop) = order.stop_price() {
                    cols[10] = stop.to_string();
                }
            }
            OrderEvent::Cancel {
                timestamp_ns,
                order_id,
            } => {
                cols[0] = timestamp_ns.to_string();
                cols[1] = "CANCEL".into();
                cols[2] = order_id.value().to_string();
            }
            OrderEvent::Amend {
                timestamp_ns,
                order_id,
                new_price,
                new_quantity,
            } => {
                cols[0] = timestamp_ns.to_string();
                cols[1] = "AMEND".into();
                cols[2] = order_id.value().to_string();
                if let Some(p) = new_price {
                    cols[11] = p.to_string();
                }
                if let Some(q) = new_quantity {
                    cols[12] = q.to_string();
                }
            }
            OrderEvent::Fill {
                timestamp_ns,
                buy_order_id,
                sell_order_id,
                price,
                quantity,
                buy_account,
            } => {
                cols[0] = timestamp_ns.to_string();
                cols[1] = "FILL".into();
                cols[2] = buy_order_id.value().to_string();
                if let Some(account) = buy_account {
                    cols[3] = account.value().to_string();
                }
                cols[7] = price.to_string();
                cols[13] = sell_order_id.value().to_string();
                cols[14] = quantity.to_string();
            }
        }

        cols.join(",")
    }

    /// Decode one line of the event file.
    pub fn decode(line: &str) -> Result<Self, EventCodecError> {
        let cols: Vec<&str> = line.split(',').collect();
        if cols.len() != FIELD_COUNT {
            return Err(EventCodecError::FieldCount { got: cols.len() });
        }

        let timestamp_ns = parse_i64("timestamp_ns", cols[0])?;

        match cols[1] {
            "NEW" => {
                let order = decode_new_order(&cols)?;
                Ok(OrderEvent::New {
                    timestamp_ns,
                    order,
                })
            }
            "CANCEL" => Ok(OrderEvent::Cancel {
                timestamp_ns,
                order_id: OrderId::new(parse_u64("order_id", cols[2])?),
            }),
            "AMEND" => Ok(OrderEvent::Amend {
                timestamp_ns,
                order_id: OrderId::new(parse_u64("order_id", cols[2])?),
                new_price: parse_opt_price("new_price", cols[11])?,
                new_quantity: parse_opt_u32("new_qty", cols[12])?,
            }),
            "FILL" => Ok(OrderEvent::Fill {
                timestamp_ns,
                buy_order_id: OrderId::new(parse_u64("order_id", cols[2])?),
                buy_account: parse_opt_u64("account_id", cols[3])?.map(AccountId::new),
                price: parse_price("price", cols[7])?,
                sell_order_id: OrderId::new(parse_u64("counterparty_id", cols[13])?),
                quantity: parse_u32("fill_qty", cols[14])?,
            }),
            other => Err(EventCodecError::UnknownEventType(other.to_string())),
        }
    }
}

fn kind_label(order: &Order) -> &'static str {
    match order.kind {
        OrderKind::Limit { .. } => "LIMIT",
        OrderKind::Market => "MARKET",
        OrderKind::Iceberg { .. } => "ICEBERG",
        OrderKind::Stop { becomes, .. } => match becomes {
            StopBecomes::Market => "STOP_MARKET",
            StopBecomes::Limit(_) => "STOP_LIMIT",
        },
    }
}

fn decode_new_order(cols: &[&str]) -> Result<Order, EventCodecError> {
    let id = OrderId::new(parse_u64("order_id", cols[2])?);
    let account = AccountId::new(parse_u64("account_id", cols[3])?);
    let side = match cols[4] {
        "BUY" => Side::Buy,
        "SELL" => Side::Sell,
        other => return Err(EventCodecError::UnknownSide(other.to_string())),
    };
    let tif = match cols[6] {
        "GTC" => TimeInForce::Gtc,
        "DAY" => TimeInForce::Day,
        "IOC" => TimeInForce::Ioc,
        "FOK" => TimeInForce::Fok,
        other => return Err(EventCodecError::UnknownTimeInForce(other.to_string())),
    };
    let quantity = parse_u32("quantity", cols[8])?;

    let order = match cols[5] {
        "LIMIT" => Order::limit(id, account, side, parse_price("price", cols[7])?, quantity, tif)?,
        "MARKET" => Order::market(id, account, side, quantity, tif)?,
        "ICEBERG" => Order::iceberg(
            id,
            account,
            side,
            parse_price("price", cols[7])?,
            quantity,
            parse_u32("peak_size", cols[9])?,
            tif,
        )?,
        "STOP_MARKET" => Order::stop_market(
            id,
            account,
            side,
            parse_opt_price("stop_price", cols[10])?
                .ok_or(EventCodecError::MissingField("stop_price"))?,
            quantity,
        )?,
        "STOP_LIMIT" => Order::stop_limit(
            id,
            account,
            side,
            parse_opt_price("stop_price", cols[10])?
                .ok_or(EventCodecError::MissingField("stop_price"))?,
            parse_price("price", cols[7])?,
            quantity,
        )?,
        other => return Err(EventCodecError::UnknownOrderType(other.to_string())),
    };
    Ok(order)
}

// ── Field parsers ───────────────────────────────────────────────────

fn parse_i64(field: &'static str, value: &str) -> Result<i64, EventCodecError> {
    value.parse().map_err(|_| EventCodecError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_u64(field: &'static str, value: &str) -> Result<u64, EventCodecError> {
    value.parse().map_err(|_| EventCodecError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_u32(field: &'static str, value: &str) -> Result<u32, EventCodecError> {
    value.parse().map_err(|_| EventCodecError::InvalidNumber {
        field,
        value: value.to_string(),
    })
}

fn parse_opt_u64(field: &'static str, value: &str) -> Result<Option<u64>, EventCodecError> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_u64(field, value).map(Some)
    }
}

fn parse_opt_u32(field: &'static str, value: &str) -> Result<Option<u32>, EventCodecError> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_u32(field, value).map(Some)
    }
}

fn parse_price(field: &'static str, value: &str) -> Result<Price, EventCodecError> {
    value
        .parse::<Decimal>()
        .ok()
        .and_then(Price::try_new)
        .ok_or_else(|| EventCodecError::InvalidNumber {
            field,
            value: value.to_string(),
        })
}

fn parse_opt_price(field: &'static str, value: &str) -> Result<Option<Price>, EventCodecError> {
    if value.is_empty() {
        Ok(None)
    } else {
        parse_price(field, value).map(Some)
    }
}

// ── File I/O ────────────────────────────────────────────────────────

/// Write events to a textual file: header line, then one event per line.
pub fn save_events(path: impl AsRef<Path>, events: &[OrderEvent]) -> Result<(), EventLogError> {
    let file = File::create(path)?;
    let mut writer = BufWriter::new(file);
    writeln!(writer, "{EVENT_FILE_HEADER}")?;
    for event in events {
        writeln!(writer, "{}", event.encode())?;
    }
    writer.flush()?;
    Ok(())
}

/// Load events from a file written by [`save_events`].
pub fn load_events(path: impl AsRef<Path>) -> Result<Vec<OrderEvent>, EventLogError> {
    let file = File::open(path)?;
    let reader = BufReader::new(file);
    let mut lines = reader.lines();

    let header = lines.next().transpose()?.unwrap_or_default();
    if header != EVENT_FILE_HEADER {
        return Err(EventLogError::BadHeader { found: header });
    }

    let mut events = Vec::new();
    for (idx, line) in lines.enumerate() {
        let line = line?;
        if line.is_empty() {
            continue;
        }
        let event = OrderEvent::decode(&line).map_err(|source| EventLogError::Codec {
            // +2: one-based, after the header line
            line: idx + 2,
            source,
        })?;
        events.push(event);
    }
    Ok(events)
}

// ── Tests ───────────────────────────────────────────────────────────
