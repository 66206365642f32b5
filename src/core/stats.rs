//! Executor loop counters and their snapshot.

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

use serde::Serialize;

/// Statistics about loop activity.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct LoopStats {
    /// Descriptors claimed from the store.
    pub claimed: u64,
    /// Workers launched.
    pub launched: u64,
    /// Workers reaped with a successful outcome.
    pub succeeded: u64,
    /// Workers reaped with a fault.
    pub faulted: u64,
    /// Descriptors discarded without a worker.
    pub dropped: u64,
    /// Dispatches skipped because the same hash was already in flight.
    pub duplicates_skipped: u64,
    /// Store connectivity faults recovered by a connection reset.
    pub connectivity_faults: u64,
    /// Workers currently in flight.
    pub in_flight: usize,
    /// Highest in-flight count observed.
    pub peak_in_flight: usize,
}

/// Shared, lock-free counters behind [`LoopStats`].
#[derive(Debug, Default)]
pub(crate) struct LoopCounters {
    pub claimed: AtomicU64,
    pub launched: AtomicU64,
    pub succeeded: AtomicU64,
    pub faulted: AtomicU64,
    pub dropped: AtomicU64,
    pub duplicates_skipped: AtomicU64,
    pub connectivity_faults: AtomicU64,
    in_flight: AtomicUsize,
    peak_in_flight: AtomicUsize,
}

impl LoopCounters {
    pub fn incr(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn set_in_flight(&self, n: usize) {
        self.in_flight.store(n, Ordering::Relaxed);
        self.peak_in_flight.fetch_max(n, Ordering::Relaxed);
    }

    /// Get a snapshot of current statistics.
    pub fn snapshot(&self) -> LoopStats {
        LoopStats {
            claimed: self.claimed.load(Ordering::Relaxed),
            launched: self.launched.load(Ordering::Relaxed),
            succeeded: self.succeeded.load(Ordering::Relaxed),
            faulted: self.faulted.load(Ordering::Relaxed),
            dropped: self.dropped.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            connectivity_faults: self.connectivity_faults.load(Ordering::Relaxed),
            in_flight: self.in_flight.load(Ordering::Relaxed),
            peak_in_flight: self.peak_in_flight.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn peak_tracks_highest_in_flight() {
        let counters = LoopCounters::default();
        counters.set_in_flight(2);
        counters.set_in_flight(3);
        counters.set_in_flight(1);
        LoopCounters::incr(&counters.launched);

        let stats = counters.snapshot();
        assert_eq!(stats.in_flight, 1);
        assert_eq!(stats.peak_in_flight, 3);
        assert_eq!(stats.launched, 1);
        assert_eq!(stats.faulted, 0);
    }

    #[test]
    fn snapshot_serializes_flat() {
        let counters = LoopCounters::default();
        LoopCounters::incr(&counters.duplicates_skipped);
        let json = serde_json::to_value(counters.snapshot()).unwrap();
        assert_eq!(json["duplicates_skipped"], 1);
        assert_eq!(json["in_flight"], 0);
    }
}
