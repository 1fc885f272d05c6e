//! Deterministic replay over a recorded event stream
//!
//! Feeds a saved event file back into a fresh engine. NEW / CANCEL / AMEND
//! events re-execute through the normal submission path; FILL events are
//! counted but skipped, because the engine recomputes every fill itself.
//! For any session recorded by a logging engine, replaying its events into
//! a fresh engine of the same symbol reproduces the fills list exactly.

use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info};
use types::prelude::*;

use crate::engine::OrderBook;
use persistence::events::{self, EventLogError, OrderEvent};

#[derive(Error, Debug)]
pub enum ReplayError {
    #[error("event log error: {0}")]
    Events(#[from] EventLogError),

    #[error("no more events to replay")]
    Exhausted,

    #[error("event index {index} out of range ({len} events)")]
    OutOfRange { index: usize, len: usize },
}

/// Outcome counters for one replay run.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayMetrics {
    pub events_processed: u64,
    pub fills_skipped: u64,
    pub fills_generated: u64,
    pub duration_ms: u128,
    pub events_per_second: f64,
}

/// One fill position where replay diverged from the original.
#[derive(Debug, Clone, PartialEq)]
pub struct FillMismatch {
    pub index: usize,
    pub original: Fill,
    pub replayed: Fill,
}

/// Comparison of a replayed fills list against the originating session's.
#[derive(Debug, Clone, PartialEq)]
pub struct ReplayValidation {
    pub original_count: usize,
    pub replay_count: usize,
    pub mismatches: Vec<FillMismatch>,
}

impl ReplayValidation {
    pub fn is_match(&self) -> bool {
        self.original_count == self.replay_count && self.mismatches.is_empty()
    }
}

/// Apply one event to an engine. Returns false for FILL events, which are
/// never re-applied.
pub fn apply_event(book: &mut OrderBook, event: &OrderEvent) -> bool {
    match event {
        OrderEvent::New { order, .. } => {
            book.submit(order.clone());
            true
        }
        OrderEvent::Cancel { order_id, .. } => {
            book.cancel(*order_id);
            true
        }
        OrderEvent::Amend {
            order_id,
            new_price,
            new_quantity,
            ..
        } => {
            book.amend(*order_id, *new_price, *new_quantity);
            true
        }
        OrderEvent::Fill { .. } => false,
    }
}

/// Replays a loaded event stream into an owned engine.
pub struct ReplayEngine {
    symbol: String,
    book: OrderBook,
    events: Vec<OrderEvent>,
    current_idx: usize,
    events_processed: u64,
    fills_skipped: u64,
}

impl ReplayEngine {
    pub fn new(symbol: impl Into<String>) -> Self {
        let symbol = symbol.into();
        Self {
            book: OrderBook::new(symbol.clone()),
            symbol,
            events: Vec::new(),
            current_idx: 0,
            events_processed: 0,
            fills_skipped: 0,
        }
    }

    /// Load an event file and reset the replay position and engine.
    pub fn load_from_file(
        &mut self,
        path: impl AsRef<std::path::Path>,
    ) -> Result<usize, ReplayError> {
        let events = events::load_events(path)?;
        info!(count = events.len(), "events loaded for replay");
        self.events = events;
        self.reset();
        Ok(self.events.len())
    }

    /// Use an in-memory event stream instead of a file.
    pub fn load_events(&mut self, events: Vec<OrderEvent>) {
        self.events = events;
        self.reset();
    }

    // ── Modes ───────────────────────────────────────────────────────

    /// Apply every event as fast as possible.
    pub fn replay_instant(&mut self) -> ReplayMetrics {
        info!("starting instant replay");
        let started = Instant::now();
        self.reset();
        while self.has_next() {
            self.advance();
        }
        self.metrics(started)
    }

    /// Apply events spaced by recorded gaps scaled by `speed` (2.0 = twice
    /// as fast). Non-positive speeds degenerate to instant replay.
    pub fn replay_timed(&mut self, speed: f64) -> ReplayMetrics {
        info!(speed, "starting timed replay");
        let started = Instant::now();
        self.reset();

        let mut last_ts: Option<i64> = None;
        while self.has_next() {
            let event_ts = self.events[self.current_idx].timestamp_ns();
            if let Some(previous) = last_ts {
                let gap_ns = (event_ts - previous).max(0) as f64;
                if speed > 0.0 {
                    std::thread::sleep(Duration::from_nanos((gap_ns / speed) as u64));
                }
            }
            last_ts = Some(event_ts);
            self.advance();
        }
        self.metrics(started)
    }

    // ── Stepped / manual controls ───────────────────────────────────

    pub fn has_next(&self) -> bool {
        self.current_idx < self.events.len()
    }

    /// Apply the next event.
    pub fn next(&mut self) -> Result<(), ReplayError> {
        if !self.has_next() {
            return Err(ReplayError::Exhausted);
        }
        self.advance();
        Ok(())
    }

    /// Apply up to `n` further events.
    pub fn n_events(&mut self, n: usize) -> usize {
        let target = (self.current_idx + n).min(self.events.len());
        let mut applied = 0;
        while self.current_idx < target {
            self.advance();
            applied += 1;
        }
        applied
    }

    /// Position the replay just before event `index`. Rewinding resets the
    /// engine and replays from the beginning.
    pub fn skip_to(&mut self, index: usize) -> Result<(), ReplayError> {
        if index > self.events.len() {
            return Err(ReplayError::OutOfRange {
                index,
                len: self.events.len(),
            });
        }
        if index < self.current_idx {
            self.reset();
        }
        while self.current_idx < index {
            self.advance();
        }
        Ok(())
    }

    /// Fresh engine, position zero.
    pub fn reset(&mut self) {
        self.book = OrderBook::new(self.symbol.clone());
        self.current_idx = 0;
        self.events_processed = 0;
        self.fills_skipped = 0;
    }

    pub fn peek(&self) -> Option<&OrderEvent> {
        self.events.get(self.current_idx)
    }

    pub fn current_index(&self) -> usize {
        self.current_idx
    }

    pub fn total_events(&self) -> usize {
        self.events.len()
    }

    pub fn progress(&self) -> f64 {
        if self.events.is_empty() {
            return 0.0;
        }
        (self.current_idx as f64 * 100.0) / self.events.len() as f64
    }

    pub fn book(&self) -> &OrderBook {
        &self.book
    }

    pub fn book_mut(&mut self) -> &mut OrderBook {
        &mut self.book
    }

    // ── Validation ──────────────────────────────────────────────────

    /// Compare the replayed fills against the originating session's fills:
    /// ids, prices and quantities in order (timestamps are session-local
    /// and ignored).
    pub fn validate_against(&self, original_fills: &[Fill]) -> ReplayValidation {
        let replayed = self.book.fills();
        let mut mismatches = Vec::new();

        for (index, (original, replay)) in
            original_fills.iter().zip(replayed.iter()).enumerate()
        {
            let same = original.buy_order_id == replay.buy_order_id
                && original.sell_order_id == replay.sell_order_id
                && original.price == replay.price
                && original.quantity == replay.quantity;
            if !same {
                mismatches.push(FillMismatch {
                    index,
                    original: original.clone(),
                    replayed: replay.clone(),
                });
            }
        }

        ReplayValidation {
            original_count: original_fills.len(),
            replay_count: replayed.len(),
            mismatches,
        }
    }

    // ── Internal ────────────────────────────────────────────────────

    fn advance(&mut self) {
        let event = &self.events[self.current_idx];
        if !apply_event(&mut self.book, event) {
            self.fills_skipped += 1;
        }
        self.events_processed += 1;
        self.current_idx += 1;

        if self.current_idx % 1000 == 0 {
            debug!(
                position = self.current_idx,
                total = self.events.len(),
                "replay progress"
            );
        }
    }

    fn metrics(&self, started: Instant) -> ReplayMetrics {
        let duration_ms = started.elapsed().as_millis();
        let events_per_second = if duration_ms > 0 {
            (self.events_processed as f64 / duration_ms as f64) * 1000.0
        } else {
            self.events_processed as f64
        };
        let metrics = ReplayMetrics {
            events_processed: self.events_processed,
            fills_skipped: self.fills_skipped,
            fills_generated: self.book.fills().len() as u64,
            duration_ms,
            events_per_second,
        };
        info!(
            events = metrics.events_processed,
            fills = metrics.fills_generated,
            duration_ms = %metrics.duration_ms,
            "replay complete"
        );
        metrics
    }
}
