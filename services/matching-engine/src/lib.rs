//! Single-symbol limit order book and matching engine
//!
//! Strict price/time priority matching over two lazy-deletion priority
//! books, with a full order-type vocabulary (limit, market, iceberg,
//! stop/stop-limit), GTC/DAY/IOC/FOK time-in-force, a post-trade fill
//! router (self-trade prevention, maker/taker fees, subscriber fan-out),
//! an append-only event log and snapshot/checkpoint recovery.
//!
//! **Key invariants:**
//! - Price-time priority strictly enforced; refreshed iceberg slices lose
//!   time priority
//! - The registry is authoritative; book entries are hints filtered at pop
//! - Deterministic: replaying a recorded session reproduces its fills
//!   exactly
//! - Single-threaded and synchronous; callbacks run on the caller's stack

pub mod book;
pub mod engine;
pub mod matching;
pub mod registry;
pub mod replay;
pub mod router;
pub mod stats;
pub mod stops;

pub use book::{MarketDepth, PriceLevel};
pub use engine::{CheckpointError, OrderBook};
pub use replay::{ReplayEngine, ReplayError, ReplayMetrics, ReplayValidation};
pub use router::{EnhancedFill, FillRouter, LiquidityFlag};
pub use stats::{LatencySummary, MatchStats};
