//! Process-wide counters: dropped events and webhook delivery attempts must
//! be observable, not just logged. Plain atomics — no metrics crate in the
//! dependency stack, and a `/metrics` scrape surface is out of scope here.

use std::sync::atomic::{AtomicU64, Ordering};

#[derive(Debug, Default)]
pub struct Metrics {
    pub dropped_events: AtomicU64,
    pub delivery_attempts: AtomicU64,
    pub delivery_successes: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub reconnections: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn incr_dropped_events(&self) {
        self.dropped_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_delivery_attempts(&self) {
        self.delivery_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_delivery_successes(&self) {
        self.delivery_successes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_delivery_failures(&self) {
        self.delivery_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn incr_reconnections(&self) {
        self.reconnections.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            dropped_events: self.dropped_events.load(Ordering::Relaxed),
            delivery_attempts: self.delivery_attempts.load(Ordering::Relaxed),
            delivery_successes: self.delivery_successes.load(Ordering::Relaxed),
            delivery_failures: self.delivery_failures.load(Ordering::Relaxed),
            reconnections: self.reconnections.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Clone, Copy, serde::Serialize)]
pub struct MetricsSnapshot {
    pub dropped_events: u64,
    pub delivery_attempts: u64,
    pub delivery_successes: u64,
    pub delivery_failures: u64,
    pub reconnections: u64,
}
