//! Gateway telemetry.
//!
//! Lock-free atomic counters updated on the request path, and a plain
//! snapshot type for display.
//!
//! ```text
//! AdaptiveGateway ─────► GatewayMetrics ─────► GatewaySnapshot ─────► Views
//!                        (atomic counters)     (point-in-time copy)    (CLI, logs)
//! ```

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Counters describing gateway activity since creation.
#[derive(Debug, Default)]
pub struct GatewayMetrics {
    reads: AtomicU64,
    cache_hits: AtomicU64,
    cache_misses: AtomicU64,
    fetches_dispatched: AtomicU64,
    writes: AtomicU64,
    retries: AtomicU64,
    exhausted: AtomicU64,
    invalidated_entries: AtomicU64,
    subscriptions_opened: AtomicU64,
    subscriptions_skipped: AtomicU64,
    subscriptions_failed: AtomicU64,
}

impl GatewayMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read_started(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_hit(&self) {
        self.cache_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn cache_miss(&self) {
        self.cache_misses.fetch_add(1, Ordering::Relaxed);
    }

    /// Record `count` underlying fetches sent in one raced batch.
    pub fn fetches_dispatched(&self, count: u64) {
        self.fetches_dispatched.fetch_add(count, Ordering::Relaxed);
    }

    pub fn write_started(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry(&self) {
        self.retries.fetch_add(1, Ordering::Relaxed);
    }

    pub fn exhausted(&self) {
        self.exhausted.fetch_add(1, Ordering::Relaxed);
    }

    pub fn invalidated(&self, entries: u64) {
        self.invalidated_entries.fetch_add(entries, Ordering::Relaxed);
    }

    pub fn subscription_opened(&self) {
        self.subscriptions_opened.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_skipped(&self) {
        self.subscriptions_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn subscription_failed(&self) {
        self.subscriptions_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> GatewaySnapshot {
        GatewaySnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            fetches_dispatched: self.fetches_dispatched.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            retries: self.retries.load(Ordering::Relaxed),
            exhausted: self.exhausted.load(Ordering::Relaxed),
            invalidated_entries: self.invalidated_entries.load(Ordering::Relaxed),
            subscriptions_opened: self.subscriptions_opened.load(Ordering::Relaxed),
            subscriptions_skipped: self.subscriptions_skipped.load(Ordering::Relaxed),
            subscriptions_failed: self.subscriptions_failed.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`GatewayMetrics`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct GatewaySnapshot {
    pub reads: u64,
    pub cache_hits: u64,
    pub cache_misses: u64,
    pub fetches_dispatched: u64,
    pub writes: u64,
    pub retries: u64,
    pub exhausted: u64,
    pub invalidated_entries: u64,
    pub subscriptions_opened: u64,
    pub subscriptions_skipped: u64,
    pub subscriptions_failed: u64,
}

impl GatewaySnapshot {
    /// Fraction of reads served from cache, 0 when there were none.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.cache_hits + self.cache_misses;
        if lookups == 0 {
            0.0
        } else {
            self.cache_hits as f64 / lookups as f64
        }
    }
}

impl fmt::Display for GatewaySnapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "reads={} hits={} ({:.0}%) fetches={} writes={} retries={} exhausted={} invalidated={}",
            self.reads,
            self.cache_hits,
            self.hit_rate() * 100.0,
            self.fetches_dispatched,
            self.writes,
            self.retries,
            self.exhausted,
            self.invalidated_entries
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_reflects_counters() {
        let metrics = GatewayMetrics::new();
        metrics.read_started();
        metrics.cache_miss();
        metrics.fetches_dispatched(3);
        metrics.read_started();
        metrics.cache_hit();

        let snap = metrics.snapshot();
        assert_eq!(snap.reads, 2);
        assert_eq!(snap.fetches_dispatched, 3);
        assert_eq!(snap.hit_rate(), 0.5);
    }

    #[test]
    fn test_hit_rate_empty() {
        assert_eq!(GatewaySnapshot::default().hit_rate(), 0.0);
    }

    #[test]
    fn test_display() {
        let snap = GatewaySnapshot {
            reads: 4,
            cache_hits: 1,
            cache_misses: 3,
            ..Default::default()
        };
        let text = snap.to_string();
        assert!(text.contains("reads=4"));
        assert!(text.contains("(25%)"));
    }
}
