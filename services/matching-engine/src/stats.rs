//! Diagnostics: submission latency samples and match statistics
//!
//! Latency tracking is a runtime toggle and never influences matching; it
//! only observes it. Samples survive snapshots so a restored engine keeps
//! its history.

use rust_decimal::Decimal;
use std::time::Instant;
use types::prelude::*;

/// Records per-submission wall-clock latency in nanoseconds.
#[derive(Debug)]
pub struct LatencyRecorder {
    samples: Vec<u64>,
    enabled: bool,
}

impl LatencyRecorder {
    pub fn new() -> Self {
        Self {
            samples: Vec::new(),
            enabled: true,
        }
    }

    pub fn set_enabled(&mut self, enabled: bool) {
        self.enabled = enabled;
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    /// Start a measurement; returns None when tracking is disabled.
    pub fn start(&self) -> Option<Instant> {
        self.enabled.then(Instant::now)
    }

    /// Record the elapsed time for a measurement started with [`start`].
    pub fn record(&mut self, started: Option<Instant>) {
        if let Some(started) = started {
            self.samples.push(started.elapsed().as_nanos() as u64);
        }
    }

    pub fn samples(&self) -> &[u64] {
        &self.samples
    }

    pub fn restore(&mut self, samples: Vec<u64>) {
        self.samples = samples;
    }

    pub fn clear(&mut self) {
        self.samples.clear();
    }

    /// Percentile summary; None while no samples exist.
    pub fn summary(&self) -> Option<LatencySummary> {
        if self.samples.is_empty() {
            return None;
        }
        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let n = sorted.len();
        let total: u64 = sorted.iter().sum();

        Some(LatencySummary {
            count: n,
            min_ns: sorted[0],
            max_ns: sorted[n - 1],
            mean_ns: total as f64 / n as f64,
            p50_ns: sorted[n / 2],
            p95_ns: sorted[((n as f64 * 0.95) as usize).min(n - 1)],
            p99_ns: sorted[((n as f64 * 0.99) as usize).min(n - 1)],
        })
    }
}

impl Default for LatencyRecorder {
    fn default() -> Self {
        Self::new()
    }
}

/// Submission latency percentiles.
#[derive(Debug, Clone, PartialEq)]
pub struct LatencySummary {
    pub count: usize,
    pub min_ns: u64,
    pub max_ns: u64,
    pub mean_ns: f64,
    pub p50_ns: u64,
    pub p95_ns: u64,
    pub p99_ns: u64,
}

/// Aggregate execution statistics over a fills list.
#[derive(Debug, Clone, PartialEq)]
pub struct MatchStats {
    pub orders_processed: u64,
    pub total_fills: u64,
    pub total_volume: u64,
    pub total_notional: Decimal,
    /// Volume-weighted average price; None with no volume.
    pub vwap: Option<Decimal>,
    pub min_price: Option<Price>,
    pub max_price: Option<Price>,
}

impl MatchStats {
    pub fn compute(orders_processed: u64, fills: &[Fill]) -> Self {
        let mut total_volume = 0u64;
        let mut total_notional = Decimal::ZERO;
        let mut min_price: Option<Price> = None;
        let mut max_price: Option<Price> = None;

        for fill in fills {
            total_volume += fill.quantity as u64;
            total_notional += fill.notional();
            min_price = Some(min_price.map_or(fill.price, |p| p.min(fill.price)));
            max_price = Some(max_price.map_or(fill.price, |p| p.max(fill.price)));
        }

        let vwap = if total_volume > 0 {
            Some(total_notional / Decimal::from(total_volume))
        } else {
            None
        };

        Self {
            orders_processed,
            total_fills: fills.len() as u64,
            total_volume,
            total_notional,
            vwap,
            min_price,
            max_price,
        }
    }
}
