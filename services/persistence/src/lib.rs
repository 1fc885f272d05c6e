//! Persistence layer for the matching engine
//!
//! Two textual artifacts, both designed for deterministic replay:
//! - `events`: the ordered NEW / CANCEL / AMEND / FILL record with a
//!   fixed-header line codec
//! - `snapshot`: versioned full-state capture with a SHA-256 integrity
//!   digest, written atomically
//!
//! A checkpoint is the combination of both: a snapshot plus the event file
//! recorded alongside it.

pub mod events;
pub mod snapshot;

pub use events::{load_events, save_events, EventCodecError, EventLogError, OrderEvent};
pub use snapshot::{load_snapshot, save_snapshot, Snapshot, SnapshotError, SNAPSHOT_VERSION};
