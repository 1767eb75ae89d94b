//! The telemetry boundary exposed by the core to collaborators: names and
//! additive semantics only, sinks are external.
//!
//! A small trait the core calls into, with a trivial in-crate
//! implementation for tests and a no-op default for production wiring that
//! hasn't plugged in a real sink yet.

use std::sync::atomic::{AtomicU64, Ordering};

/// Sink for the core's counters, gauges, and stage-duration histograms.
pub trait Metrics: Send + Sync {
    /// Increment `processed_url` by one.
    fn inc_processed_url(&self) {}
    /// Increment `robot_allowed` by one.
    fn inc_robot_allowed(&self) {}
    /// Increment `robot_disallowed` by one.
    fn inc_robot_disallowed(&self) {}
    /// Increment `errors` by one.
    fn inc_errors(&self) {}
    /// Add `count` to the `links` counter.
    fn add_links(&self, count: u64) {
        let _ = count;
    }
    /// Best-effort gauge update for `queue_size`.
    fn set_queue_size(&self, size: u64) {
        let _ = size;
    }
    /// Record the end-to-end duration for one URL.
    fn observe_url_duration(&self, duration: std::time::Duration) {
        let _ = duration;
    }
}

/// A `Metrics` implementation that drops every observation. A library
/// should never install global state on a caller's behalf, so this is the
/// default until the caller supplies a real sink.
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopMetrics;

impl Metrics for NoopMetrics {}

/// A `Metrics` implementation backed by plain atomics, used by the crate's
/// own tests to assert on counter values after a run.
#[derive(Debug, Default)]
pub struct AtomicMetrics {
    pub processed_url: AtomicU64,
    pub robot_allowed: AtomicU64,
    pub robot_disallowed: AtomicU64,
    pub errors: AtomicU64,
    pub links: AtomicU64,
    pub queue_size: AtomicU64,
}

impl Metrics for AtomicMetrics {
    fn inc_processed_url(&self) {
        self.processed_url.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_robot_allowed(&self) {
        self.robot_allowed.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_robot_disallowed(&self) {
        self.robot_disallowed.fetch_add(1, Ordering::Relaxed);
    }
    fn inc_errors(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }
    fn add_links(&self, count: u64) {
        self.links.fetch_add(count, Ordering::Relaxed);
    }
    fn set_queue_size(&self, size: u64) {
        self.queue_size.store(size, Ordering::Relaxed);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::Ordering;

    #[test]
    fn atomic_metrics_accumulate() {
        let m = AtomicMetrics::default();
        m.inc_processed_url();
        m.inc_processed_url();
        m.inc_robot_disallowed();
        m.add_links(3);
        assert_eq!(m.processed_url.load(Ordering::Relaxed), 2);
        assert_eq!(m.robot_disallowed.load(Ordering::Relaxed), 1);
        assert_eq!(m.links.load(Ordering::Relaxed), 3);
    }

    #[test]
    fn noop_metrics_is_inert() {
        let m = NoopMetrics;
        m.inc_processed_url();
        m.add_links(100);
    }
}
