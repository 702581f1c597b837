//! The public transaction handle.

use super::coordinator::TransactionCoordinator;
use super::state::{TransactionState, TransactionStatus};
use crate::error::CoreResult;
use crate::types::{IsolationLevel, SequenceNumber, StoreKey, StoreValue, TransactionId};
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// A transaction against a [`Store`](crate::Store).
///
/// Writes are staged privately and published atomically by
/// [`commit`](Self::commit). Every operation takes a lock timeout; a
/// `LockTimeout` error leaves the transaction open so the caller may retry
/// or abort.
///
/// Dropping an active transaction aborts it.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use versa_core::{Config, ReplicaStatus, Store};
///
/// let gate = Arc::new(ReplicaStatus::primary());
/// let store: Store<String, u32> = Store::new(Config::default(), gate);
/// let timeout = Duration::from_secs(1);
///
/// let mut txn = store.begin();
/// txn.add("apples".to_string(), 3, timeout)?;
/// assert!(txn.conditional_update("apples".to_string(), 4, timeout)?);
/// assert_eq!(txn.conditional_get(&"apples".to_string(), timeout)?, Some(4));
/// txn.commit()?;
/// # Ok::<(), versa_core::CoreError>(())
/// ```
pub struct StoreTransaction<K: StoreKey, V: StoreValue> {
    coordinator: Arc<TransactionCoordinator<K, V>>,
    state: TransactionState<K, V>,
}

impl<K: StoreKey, V: StoreValue> StoreTransaction<K, V> {
    pub(crate) fn new(
        coordinator: Arc<TransactionCoordinator<K, V>>,
        isolation: IsolationLevel,
    ) -> Self {
        let state = coordinator.begin(isolation);
        Self { coordinator, state }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.state.id()
    }

    /// Returns the isolation level.
    #[must_use]
    pub fn isolation_level(&self) -> IsolationLevel {
        self.state.isolation()
    }

    /// Returns the lifecycle status.
    #[must_use]
    pub fn status(&self) -> TransactionStatus {
        self.state.status()
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state.is_active()
    }

    /// Returns the visibility bound of a started snapshot transaction.
    #[must_use]
    pub fn snapshot_bound(&self) -> Option<SequenceNumber> {
        self.state.bound()
    }

    /// Returns the number of staged writes.
    #[must_use]
    pub fn write_count(&self) -> usize {
        self.state.write_count()
    }

    /// Returns the number of keys read under `ReadRepeatable`.
    #[must_use]
    pub fn read_count(&self) -> usize {
        self.state.read_count()
    }

    /// Changes the isolation level.
    ///
    /// # Errors
    ///
    /// Returns `InvalidOperation` once the transaction has performed an
    /// operation, or if it is no longer active.
    pub fn set_isolation_level(&mut self, level: IsolationLevel) -> CoreResult<()> {
        self.state.set_isolation(level)
    }

    /// Stages `value` under a key that must not have a live value.
    ///
    /// # Errors
    ///
    /// `AlreadyExists` if the key is live (including a value staged earlier
    /// by this transaction), `NotPrimary`, `LockTimeout`, or
    /// `InvalidOperation` on a finished transaction.
    pub fn add(&mut self, key: K, value: V, timeout: Duration) -> CoreResult<()> {
        self.coordinator.add(&mut self.state, key, value, timeout)
    }

    /// Stages `value` if the key has a live value. Returns whether it did.
    ///
    /// # Errors
    ///
    /// `NotPrimary`, `LockTimeout`, or `InvalidOperation` on a finished
    /// transaction.
    pub fn conditional_update(&mut self, key: K, value: V, timeout: Duration) -> CoreResult<bool> {
        self.coordinator
            .conditional_update(&mut self.state, key, value, timeout)
    }

    /// Stages removal of a key if it has a live value. Returns whether it did.
    ///
    /// # Errors
    ///
    /// `NotPrimary`, `LockTimeout`, or `InvalidOperation` on a finished
    /// transaction.
    pub fn conditional_remove(&mut self, key: K, timeout: Duration) -> CoreResult<bool> {
        self.coordinator
            .conditional_remove(&mut self.state, key, timeout)
    }

    /// Reads a key under the transaction's isolation level.
    ///
    /// Own staged writes are always visible. `ReadRepeatable` locks the key
    /// until the transaction ends; `Snapshot` never locks.
    ///
    /// # Errors
    ///
    /// `NotReadable`, `LockTimeout` (`ReadRepeatable` only), or
    /// `InvalidOperation` on a finished transaction.
    pub fn conditional_get(&mut self, key: &K, timeout: Duration) -> CoreResult<Option<V>> {
        self.coordinator
            .conditional_get(&mut self.state, key, timeout)
    }

    /// Publishes all staged writes at a new sequence number and releases
    /// every lock.
    ///
    /// A transaction that staged nothing takes no sequence number and
    /// returns the last committed one.
    ///
    /// # Errors
    ///
    /// `NotPrimary` if writes are staged but the replica lost write access;
    /// the transaction stays active and should be aborted.
    /// `InvalidOperation` on a finished transaction.
    pub fn commit(&mut self) -> CoreResult<SequenceNumber> {
        self.coordinator.commit(&mut self.state)
    }

    /// Discards staged writes and releases every lock.
    ///
    /// Never fails; a no-op on a finished transaction.
    pub fn abort(&mut self) {
        self.coordinator.abort(&mut self.state);
    }
}

impl<K: StoreKey, V: StoreValue> Drop for StoreTransaction<K, V> {
    fn drop(&mut self) {
        if self.state.is_active() {
            self.coordinator.abort(&mut self.state);
        }
    }
}

impl<K: StoreKey, V: StoreValue> fmt::Debug for StoreTransaction<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoreTransaction")
            .field("id", &self.state.id())
            .field("isolation", &self.state.isolation())
            .field("status", &self.state.status())
            .field("writes", &self.state.write_count())
            .finish()
    }
}
