//! Per-transaction bookkeeping.

use crate::error::{CoreError, CoreResult};
use crate::types::{IsolationLevel, SequenceNumber, TransactionId};
use std::collections::{BTreeMap, BTreeSet};

/// Lifecycle status of a transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransactionStatus {
    /// Transaction is active and can perform operations.
    Active,
    /// Transaction has been committed.
    Committed,
    /// Transaction has been aborted.
    Aborted,
}

/// What the transaction has done so far.
///
/// Staged writes stay private to the transaction until commit publishes them
/// at one sequence number.
#[derive(Debug)]
pub(crate) struct TransactionState<K, V> {
    id: TransactionId,
    isolation: IsolationLevel,
    status: TransactionStatus,
    started: bool,
    /// Visibility bound of a snapshot transaction, registered with the store.
    bound: Option<SequenceNumber>,
    reads: BTreeSet<K>,
    /// Staged writes; `None` stages a removal.
    writes: BTreeMap<K, Option<V>>,
    locks: BTreeSet<K>,
}

impl<K: Ord + Clone, V> TransactionState<K, V> {
    pub(crate) fn new(id: TransactionId, isolation: IsolationLevel) -> Self {
        Self {
            id,
            isolation,
            status: TransactionStatus::Active,
            started: false,
            bound: None,
            reads: BTreeSet::new(),
            writes: BTreeMap::new(),
            locks: BTreeSet::new(),
        }
    }

    pub(crate) fn id(&self) -> TransactionId {
        self.id
    }

    pub(crate) fn isolation(&self) -> IsolationLevel {
        self.isolation
    }

    pub(crate) fn status(&self) -> TransactionStatus {
        self.status
    }

    pub(crate) fn is_active(&self) -> bool {
        self.status == TransactionStatus::Active
    }

    pub(crate) fn bound(&self) -> Option<SequenceNumber> {
        self.bound
    }

    pub(crate) fn ensure_active(&self) -> CoreResult<()> {
        match self.status {
            TransactionStatus::Active => Ok(()),
            TransactionStatus::Committed => Err(CoreError::invalid_operation(format!(
                "transaction {} is already committed",
                self.id
            ))),
            TransactionStatus::Aborted => Err(CoreError::invalid_operation(format!(
                "transaction {} is already aborted",
                self.id
            ))),
        }
    }

    pub(crate) fn set_isolation(&mut self, isolation: IsolationLevel) -> CoreResult<()> {
        self.ensure_active()?;
        if self.started {
            return Err(CoreError::invalid_operation(format!(
                "isolation level of {} cannot change after its first operation",
                self.id
            )));
        }
        self.isolation = isolation;
        Ok(())
    }

    /// Marks the first operation. Returns true if this call did it.
    pub(crate) fn mark_started(&mut self) -> bool {
        !std::mem::replace(&mut self.started, true)
    }

    pub(crate) fn set_bound(&mut self, bound: SequenceNumber) {
        debug_assert!(self.bound.is_none(), "snapshot bound set twice");
        self.bound = Some(bound);
    }

    pub(crate) fn take_bound(&mut self) -> Option<SequenceNumber> {
        self.bound.take()
    }

    /// Returns the staged write for `key`: `Some(None)` is a staged removal.
    pub(crate) fn staged(&self, key: &K) -> Option<&Option<V>> {
        self.writes.get(key)
    }

    pub(crate) fn stage(&mut self, key: K, value: Option<V>) {
        self.writes.insert(key, value);
    }

    pub(crate) fn take_writes(&mut self) -> BTreeMap<K, Option<V>> {
        std::mem::take(&mut self.writes)
    }

    pub(crate) fn discard_writes(&mut self) -> usize {
        let discarded = self.writes.len();
        self.writes.clear();
        discarded
    }

    pub(crate) fn write_count(&self) -> usize {
        self.writes.len()
    }

    pub(crate) fn record_read(&mut self, key: &K) {
        if !self.reads.contains(key) {
            self.reads.insert(key.clone());
        }
    }

    pub(crate) fn read_count(&self) -> usize {
        self.reads.len()
    }

    pub(crate) fn record_lock(&mut self, key: &K) {
        if !self.locks.contains(key) {
            self.locks.insert(key.clone());
        }
    }

    pub(crate) fn holds_lock(&self, key: &K) -> bool {
        self.locks.contains(key)
    }

    pub(crate) fn take_locks(&mut self) -> BTreeSet<K> {
        std::mem::take(&mut self.locks)
    }

    pub(crate) fn finish(&mut self, status: TransactionStatus) {
        debug_assert!(self.is_active(), "transaction finished twice");
        self.status = status;
        self.reads.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn state() -> TransactionState<u32, u32> {
        TransactionState::new(TransactionId::new(1), IsolationLevel::Snapshot)
    }

    #[test]
    fn new_transaction_is_active() {
        let txn = state();
        assert!(txn.is_active());
        assert!(txn.ensure_active().is_ok());
        assert_eq!(txn.write_count(), 0);
    }

    #[test]
    fn isolation_fixed_after_start() {
        let mut txn = state();
        txn.set_isolation(IsolationLevel::ReadRepeatable).unwrap();
        assert_eq!(txn.isolation(), IsolationLevel::ReadRepeatable);

        assert!(txn.mark_started());
        assert!(!txn.mark_started());
        let result = txn.set_isolation(IsolationLevel::Snapshot);
        assert!(matches!(result, Err(CoreError::InvalidOperation { .. })));
    }

    #[test]
    fn staged_write_overrides() {
        let mut txn = state();
        txn.stage(1, Some(10));
        txn.stage(1, None);
        assert_eq!(txn.staged(&1), Some(&None));
        assert_eq!(txn.write_count(), 1);
        assert!(txn.staged(&2).is_none());
    }

    #[test]
    fn terminal_transaction_rejects_operations() {
        let mut txn = state();
        txn.finish(TransactionStatus::Committed);
        let err = txn.ensure_active().unwrap_err();
        assert!(err.to_string().contains("committed"));

        let mut txn = state();
        txn.finish(TransactionStatus::Aborted);
        assert!(txn.ensure_active().unwrap_err().to_string().contains("aborted"));
    }

    #[test]
    fn locks_and_reads_are_sets() {
        let mut txn = state();
        txn.record_lock(&3);
        txn.record_lock(&3);
        txn.record_read(&3);
        txn.record_read(&3);
        assert!(txn.holds_lock(&3));
        assert_eq!(txn.read_count(), 1);
        assert_eq!(txn.take_locks().len(), 1);
        assert!(!txn.holds_lock(&3));
    }
}
