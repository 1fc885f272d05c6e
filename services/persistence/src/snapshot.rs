//! State snapshots: versioned, integrity-checked, textual
//!
//! A snapshot captures everything needed to rebuild an engine: active
//! orders, pending stops, the fills list, the last trade price and the
//! processing counters. The on-disk form is pretty-printed JSON with a
//! version tag (incompatible files are rejected on load) and a SHA-256
//! digest over the state (tampering and truncation are rejected on load).
//!
//! Writes are atomic: serialize to a temp file, fsync, rename.

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::Path;
use thiserror::Error;
use types::prelude::*;

/// Current snapshot format version.
pub const SNAPSHOT_VERSION: u32 = 1;

// ── Errors ──────────────────────────────────────────────────────────

#[derive(Error, Debug)]
pub enum SnapshotError {
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("unsupported snapshot version: {0}")]
    UnsupportedVersion(u32),

    #[error("integrity check failed: expected {expected}, got {actual}")]
    IntegrityFailure { expected: String, actual: String },

    #[error("duplicate order id in snapshot: {0}")]
    DuplicateOrderId(OrderId),

    #[error("order {0} violates quantity invariant")]
    QuantityInvariant(OrderId),

    #[error("iceberg order {0} violates display + hidden = remaining")]
    IcebergInvariant(OrderId),

    #[error("snapshot is for symbol {found}, engine is {expected}")]
    SymbolMismatch { expected: String, found: String },
}

// ── Snapshot ────────────────────────────────────────────────────────

/// Full engine state at a point in time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version for forward compatibility.
    pub version: u32,
    /// Per-engine snapshot counter.
    pub snapshot_id: u64,
    /// Engine clock at capture time (nanoseconds).
    pub snapshot_time_ns: i64,
    pub symbol: String,
    /// Every order in the registry's active map, sorted by id.
    pub active_orders: Vec<Order>,
    /// Dormant stops, in stop-book order (ascending price, FIFO per price).
    pub pending_stops: Vec<Order>,
    pub fills: Vec<Fill>,
    pub last_trade_price: Option<Price>,
    pub total_orders_processed: u64,
    /// Per-submission latency samples (diagnostic).
    pub latencies_ns: Vec<u64>,
    /// SHA-256 hex digest over the state fields.
    pub checksum: String,
}

/// Borrowed view of the hashed fields, so the digest is computed over the
/// same bytes at save and load time.
#[derive(Serialize)]
struct StateView<'a> {
    symbol: &'a str,
    active_orders: &'a [Order],
    pending_stops: &'a [Order],
    fills: &'a [Fill],
    last_trade_price: &'a Option<Price>,
    total_orders_processed: u64,
    latencies_ns: &'a [u64],
}

impl Snapshot {
    /// Build a snapshot and stamp its integrity digest.
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        snapshot_id: u64,
        snapshot_time_ns: i64,
        symbol: String,
        active_orders: Vec<Order>,
        pending_stops: Vec<Order>,
        fills: Vec<Fill>,
        last_trade_price: Option<Price>,
        total_orders_processed: u64,
        latencies_ns: Vec<u64>,
    ) -> Self {
        let mut snapshot = Self {
            version: SNAPSHOT_VERSION,
            snapshot_id,
            snapshot_time_ns,
            symbol,
            active_orders,
            pending_stops,
            fills,
            last_trade_price,
            total_orders_processed,
            latencies_ns,
            checksum: String::new(),
        };
        snapshot.checksum = snapshot.state_digest();
        snapshot
    }

    /// Deterministic SHA-256 digest over the state fields.
    pub fn state_digest(&self) -> String {
        let view = StateView {
            symbol: &self.symbol,
            active_orders: &self.active_orders,
            pending_stops: &self.pending_stops,
            fills: &self.fills,
            last_trade_price: &self.last_trade_price,
            total_orders_processed: self.total_orders_processed,
            latencies_ns: &self.latencies_ns,
        };
        let bytes = serde_json::to_vec(&view).expect("state serialization cannot fail");
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        format!("{:x}", hasher.finalize())
    }

    /// Check the stored digest against a recomputed one.
    pub fn verify_integrity(&self) -> bool {
        self.checksum == self.state_digest()
    }

    /// Structural validation of the captured orders.
    pub fn validate(&self) -> Result<(), SnapshotError> {
        let mut seen = std::collections::HashSet::new();
        for order in self.active_orders.iter().chain(&self.pending_stops) {
            if !seen.insert(order.id) {
                return Err(SnapshotError::DuplicateOrderId(order.id));
            }
            if order.remaining > order.quantity {
                return Err(SnapshotError::QuantityInvariant(order.id));
            }
            if order.is_iceberg()
                && order.display_qty() + order.hidden_qty() != order.remaining
            {
                return Err(SnapshotError::IcebergInvariant(order.id));
            }
        }
        Ok(())
    }
}

// ── File I/O ────────────────────────────────────────────────────────

/// Write a snapshot atomically: serialize → temp file → fsync → rename.
pub fn save_snapshot(path: impl AsRef<Path>, snapshot: &Snapshot) -> Result<(), SnapshotError> {
    let path = path.as_ref();
    let json = serde_json::to_string_pretty(snapshot)
        .map_err(|e| SnapshotError::Serialization(e.to_string()))?;

    let tmp_path = path.with_extension("tmp");
    {
        let mut file = File::create(&tmp_path)?;
        file.write_all(json.as_bytes())?;
        file.sync_all()?;
    }
    fs::rename(&tmp_path, path)?;
    Ok(())
}

/// Load a snapshot, rejecting unknown versions, integrity failures and
/// structurally invalid state. The caller's state is untouched on error.
pub fn load_snapshot(path: impl AsRef<Path>) -> Result<Snapshot, SnapshotError> {
    let data = fs::read_to_string(path)?;
    let snapshot: Snapshot =
        serde_json::from_str(&data).map_err(|e| SnapshotError::Serialization(e.to_string()))?;

    if snapshot.version > SNAPSHOT_VERSION {
        return Err(SnapshotError::UnsupportedVersion(snapshot.version));
    }

    if !snapshot.verify_integrity() {
        return Err(SnapshotError::IntegrityFailure {
            expected: snapshot.checksum.clone(),
            actual: snapshot.state_digest(),
        });
    }

    snapshot.validate()?;
    Ok(snapshot)
}

// ── Tests ───────────────────────────────────────────────────────────
