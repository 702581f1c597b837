//! Core type definitions for Versa.

use std::fmt;

/// Unique identifier for a transaction.
///
/// Transaction IDs are monotonically increasing within a store and never
/// reused.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TransactionId(pub u64);

impl TransactionId {
    /// Creates a new transaction ID.
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Returns the raw ID value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }
}

impl fmt::Display for TransactionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "txn:{}", self.0)
    }
}

/// Commit sequence number.
///
/// Sequence numbers totally order committed transactions across the whole
/// store. Higher sequence numbers indicate later commits. `SequenceNumber(0)`
/// means "nothing committed yet".
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SequenceNumber(pub u64);

impl SequenceNumber {
    /// The sequence before any commit.
    pub const ZERO: Self = Self(0);

    /// Creates a new sequence number.
    #[must_use]
    pub const fn new(seq: u64) -> Self {
        Self(seq)
    }

    /// Returns the raw sequence value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the next sequence number.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for SequenceNumber {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "seq:{}", self.0)
    }
}

/// Checkpoint generation counter.
///
/// Each checkpoint publishes the consolidated state of the next epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
pub struct CheckpointEpoch(pub u64);

impl CheckpointEpoch {
    /// Creates a new epoch.
    #[must_use]
    pub const fn new(epoch: u64) -> Self {
        Self(epoch)
    }

    /// Returns the raw epoch value.
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Returns the following epoch.
    #[must_use]
    pub const fn next(self) -> Self {
        Self(self.0 + 1)
    }
}

impl fmt::Display for CheckpointEpoch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "epoch:{}", self.0)
    }
}

/// Read isolation level of a store transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IsolationLevel {
    /// Reads lock the key and observe the latest committed version. Repeated
    /// reads of the same key are stable because the lock is held until the
    /// transaction ends.
    ReadRepeatable,
    /// Reads never lock and observe the store as of the transaction's first
    /// operation.
    Snapshot,
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadRepeatable => f.write_str("read-repeatable"),
            Self::Snapshot => f.write_str("snapshot"),
        }
    }
}

/// Bound for store keys.
///
/// Keys are totally ordered by their `Ord` implementation and must not change
/// once inserted.
pub trait StoreKey: Ord + Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> StoreKey for T where T: Ord + Clone + fmt::Debug + Send + Sync + 'static {}

/// Bound for store values.
pub trait StoreValue: Clone + fmt::Debug + Send + Sync + 'static {}

impl<T> StoreValue for T where T: Clone + fmt::Debug + Send + Sync + 'static {}
