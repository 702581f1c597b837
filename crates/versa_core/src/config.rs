//! Store configuration.

use crate::types::IsolationLevel;
use std::time::Duration;

/// Configuration for a store.
#[derive(Debug, Clone)]
pub struct Config {
    /// Lock timeout used by callers that do not pass their own.
    pub default_lock_timeout: Duration,

    /// Versions kept per key in the differential state before older ones are
    /// evicted (to the snapshot container when still needed).
    pub differential_versions: usize,

    /// Isolation level given to new transactions.
    pub default_isolation: IsolationLevel,

    /// Number of commit records kept in the commit feed history.
    pub commit_feed_history: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_lock_timeout: Duration::from_secs(4),
            differential_versions: 2, // current + previous
            default_isolation: IsolationLevel::Snapshot,
            commit_feed_history: 1024,
        }
    }
}

impl Config {
    /// Creates a new configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the default lock timeout.
    #[must_use]
    pub const fn default_lock_timeout(mut self, timeout: Duration) -> Self {
        self.default_lock_timeout = timeout;
        self
    }

    /// Sets how many versions per key the differential state keeps.
    ///
    /// Values below 1 are clamped to 1.
    #[must_use]
    pub const fn differential_versions(mut self, versions: usize) -> Self {
        self.differential_versions = if versions == 0 { 1 } else { versions };
        self
    }

    /// Sets the isolation level of new transactions.
    #[must_use]
    pub const fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }

    /// Sets the commit feed history size.
    #[must_use]
    pub const fn commit_feed_history(mut self, records: usize) -> Self {
        self.commit_feed_history = records;
        self
    }
}
