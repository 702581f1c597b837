//! Store statistics.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use versa_core::{Config, ReplicaStatus, Store};
//!
//! let store: Store<u32, u32> = Store::new(Config::default(), Arc::new(ReplicaStatus::primary()));
//! let snapshot = store.stats();
//! assert_eq!(snapshot.commits, 0);
//! ```

use std::sync::atomic::{AtomicU64, Ordering};

/// Live counters of a store.
///
/// All counters are atomic and monotonically increasing, except
/// `retained_versions` which is a gauge.
#[derive(Debug, Default)]
pub struct StoreStats {
    // Operation counters
    reads: AtomicU64,
    writes: AtomicU64,

    // Transaction counters
    transactions_started: AtomicU64,
    commits: AtomicU64,
    aborts: AtomicU64,
    replicated_commits: AtomicU64,

    // Failure counters
    lock_timeouts: AtomicU64,
    admission_denials: AtomicU64,

    // Checkpoint counters
    checkpoints: AtomicU64,
    checkpoint_failures: AtomicU64,

    // Gauges
    retained_versions: AtomicU64,
}

impl StoreStats {
    /// Creates zeroed statistics.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn record_read(&self) {
        self.reads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_write(&self) {
        self.writes.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_transaction_start(&self) {
        self.transactions_started.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_commit(&self) {
        self.commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_abort(&self) {
        self.aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_replicated_commit(&self) {
        self.replicated_commits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_lock_timeout(&self) {
        self.lock_timeouts.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_admission_denial(&self) {
        self.admission_denials.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint(&self) {
        self.checkpoints.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_checkpoint_failure(&self) {
        self.checkpoint_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn set_retained_versions(&self, count: usize) {
        self.retained_versions.store(count as u64, Ordering::Relaxed);
    }

    /// Returns a point-in-time copy of all counters.
    #[must_use]
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            reads: self.reads.load(Ordering::Relaxed),
            writes: self.writes.load(Ordering::Relaxed),
            transactions_started: self.transactions_started.load(Ordering::Relaxed),
            commits: self.commits.load(Ordering::Relaxed),
            aborts: self.aborts.load(Ordering::Relaxed),
            replicated_commits: self.replicated_commits.load(Ordering::Relaxed),
            lock_timeouts: self.lock_timeouts.load(Ordering::Relaxed),
            admission_denials: self.admission_denials.load(Ordering::Relaxed),
            checkpoints: self.checkpoints.load(Ordering::Relaxed),
            checkpoint_failures: self.checkpoint_failures.load(Ordering::Relaxed),
            retained_versions: self.retained_versions.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`StoreStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    /// Reads served.
    pub reads: u64,
    /// Writes staged (adds, updates, removes that changed something).
    pub writes: u64,
    /// Transactions begun.
    pub transactions_started: u64,
    /// Transactions committed.
    pub commits: u64,
    /// Transactions aborted, explicitly or by drop.
    pub aborts: u64,
    /// Commits installed from a primary.
    pub replicated_commits: u64,
    /// Lock acquisitions that timed out.
    pub lock_timeouts: u64,
    /// Operations rejected by the admission gate.
    pub admission_denials: u64,
    /// Checkpoints completed.
    pub checkpoints: u64,
    /// Checkpoints whose image could not be persisted.
    pub checkpoint_failures: u64,
    /// Versions currently held in the snapshot container.
    pub retained_versions: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn counters_accumulate() {
        let stats = StoreStats::new();
        stats.record_read();
        stats.record_read();
        stats.record_write();
        stats.record_commit();
        stats.record_lock_timeout();

        let snapshot = stats.snapshot();
        assert_eq!(snapshot.reads, 2);
        assert_eq!(snapshot.writes, 1);
        assert_eq!(snapshot.commits, 1);
        assert_eq!(snapshot.lock_timeouts, 1);
        assert_eq!(snapshot.aborts, 0);
    }

    #[test]
    fn retained_versions_is_a_gauge() {
        let stats = StoreStats::new();
        stats.set_retained_versions(5);
        stats.set_retained_versions(2);
        assert_eq!(stats.snapshot().retained_versions, 2);
    }
}
