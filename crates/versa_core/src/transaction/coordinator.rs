//! Transaction coordinator: lock discipline, admission and visibility.

use super::state::{TransactionState, TransactionStatus};
use crate::config::Config;
use crate::error::{CoreError, CoreResult};
use crate::feed::{CommitFeed, CommitRecord};
use crate::gate::{check_read_admission, check_write_admission, AdmissionGate};
use crate::lock::{LockGrant, LockTable};
use crate::state::{VersionState, VersionedValue};
use crate::stats::StoreStats;
use crate::types::{IsolationLevel, SequenceNumber, StoreKey, StoreValue, TransactionId};
use parking_lot::RwLock;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Shared engine behind a store and its transactions.
///
/// Lock order: a key lock may be held while taking the state lock, never
/// the other way around.
pub(crate) struct TransactionCoordinator<K, V> {
    config: Config,
    gate: Arc<dyn AdmissionGate>,
    locks: LockTable<K>,
    state: RwLock<VersionState<K, V>>,
    feed: CommitFeed<K, V>,
    stats: StoreStats,
    next_txn: AtomicU64,
}

impl<K: StoreKey, V: StoreValue> TransactionCoordinator<K, V> {
    /// Transaction ids continue above every creator recorded in `state`.
    pub(crate) fn new(
        config: Config,
        gate: Arc<dyn AdmissionGate>,
        state: VersionState<K, V>,
    ) -> Self {
        let feed = CommitFeed::with_max_history(config.commit_feed_history);
        let first_txn = state.max_creator().map_or(1, |id| id.as_u64() + 1);
        Self {
            config,
            gate,
            locks: LockTable::new(),
            state: RwLock::new(state),
            feed,
            stats: StoreStats::new(),
            next_txn: AtomicU64::new(first_txn),
        }
    }

    pub(crate) fn config(&self) -> &Config {
        &self.config
    }

    pub(crate) fn gate(&self) -> &Arc<dyn AdmissionGate> {
        &self.gate
    }

    pub(crate) fn state(&self) -> &RwLock<VersionState<K, V>> {
        &self.state
    }

    pub(crate) fn feed(&self) -> &CommitFeed<K, V> {
        &self.feed
    }

    pub(crate) fn stats(&self) -> &StoreStats {
        &self.stats
    }

    pub(crate) fn locks(&self) -> &LockTable<K> {
        &self.locks
    }

    pub(crate) fn begin(&self, isolation: IsolationLevel) -> TransactionState<K, V> {
        let id = TransactionId::new(self.next_txn.fetch_add(1, Ordering::Relaxed));
        self.stats.record_transaction_start();
        tracing::trace!(txn = %id, %isolation, "transaction begun");
        TransactionState::new(id, isolation)
    }

    fn admit_write(&self) -> CoreResult<()> {
        let decision = check_write_admission(self.gate.as_ref());
        if !decision.is_admitted() {
            self.stats.record_admission_denial();
            tracing::debug!(?decision, "write rejected by admission gate");
        }
        decision.to_result()
    }

    fn admit_read(&self, isolation: IsolationLevel) -> CoreResult<()> {
        let decision = check_read_admission(self.gate.as_ref(), isolation);
        if !decision.is_admitted() {
            self.stats.record_admission_denial();
            tracing::debug!(?decision, "read rejected by admission gate");
        }
        decision.to_result()
    }

    /// Fixes the isolation level and, for snapshot transactions, registers
    /// the visibility bound.
    fn start(&self, txn: &mut TransactionState<K, V>) {
        if txn.mark_started() && txn.isolation() == IsolationLevel::Snapshot {
            let bound = self.state.write().register_reader();
            txn.set_bound(bound);
        }
    }

    fn lock(&self, txn: &mut TransactionState<K, V>, key: &K, timeout: Duration) -> CoreResult<()> {
        match self.locks.acquire(key, txn.id(), timeout) {
            Ok(LockGrant::Acquired) => {
                txn.record_lock(key);
                Ok(())
            }
            Ok(LockGrant::AlreadyHeld) => {
                debug_assert!(txn.holds_lock(key));
                Ok(())
            }
            Err(error) => {
                self.stats.record_lock_timeout();
                Err(error)
            }
        }
    }

    /// Whether `key` currently has a live value from this transaction's
    /// point of view. The caller holds the key lock.
    fn is_live_for_writer(&self, txn: &TransactionState<K, V>, key: &K) -> bool {
        match txn.staged(key) {
            Some(staged) => staged.is_some(),
            None => self
                .state
                .read()
                .latest(key)
                .is_some_and(|version| !version.is_tombstone()),
        }
    }

    fn prepare_write(
        &self,
        txn: &mut TransactionState<K, V>,
        key: &K,
        timeout: Duration,
    ) -> CoreResult<()> {
        txn.ensure_active()?;
        self.admit_write()?;
        self.start(txn);
        self.lock(txn, key, timeout)
    }

    pub(crate) fn add(
        &self,
        txn: &mut TransactionState<K, V>,
        key: K,
        value: V,
        timeout: Duration,
    ) -> CoreResult<()> {
        self.prepare_write(txn, &key, timeout)?;
        if self.is_live_for_writer(txn, &key) {
            return Err(CoreError::already_exists(&key));
        }
        txn.stage(key, Some(value));
        self.stats.record_write();
        Ok(())
    }

    pub(crate) fn conditional_update(
        &self,
        txn: &mut TransactionState<K, V>,
        key: K,
        value: V,
        timeout: Duration,
    ) -> CoreResult<bool> {
        self.prepare_write(txn, &key, timeout)?;
        if !self.is_live_for_writer(txn, &key) {
            return Ok(false);
        }
        txn.stage(key, Some(value));
        self.stats.record_write();
        Ok(true)
    }

    pub(crate) fn conditional_remove(
        &self,
        txn: &mut TransactionState<K, V>,
        key: K,
        timeout: Duration,
    ) -> CoreResult<bool> {
        self.prepare_write(txn, &key, timeout)?;
        if !self.is_live_for_writer(txn, &key) {
            return Ok(false);
        }
        txn.stage(key, None);
        self.stats.record_write();
        Ok(true)
    }

    pub(crate) fn conditional_get(
        &self,
        txn: &mut TransactionState<K, V>,
        key: &K,
        timeout: Duration,
    ) -> CoreResult<Option<V>> {
        txn.ensure_active()?;
        self.admit_read(txn.isolation())?;
        self.start(txn);
        self.stats.record_read();

        if let Some(staged) = txn.staged(key) {
            return Ok(staged.clone());
        }

        match txn.isolation() {
            IsolationLevel::ReadRepeatable => {
                self.lock(txn, key, timeout)?;
                txn.record_read(key);
                let value = self
                    .state
                    .read()
                    .latest(key)
                    .and_then(VersionedValue::value)
                    .cloned();
                Ok(value)
            }
            IsolationLevel::Snapshot => {
                let bound = txn.bound().ok_or_else(|| {
                    CoreError::invalid_operation(format!(
                        "snapshot transaction {} has no bound",
                        txn.id()
                    ))
                })?;
                let value = self
                    .state
                    .read()
                    .visible_at(key, bound)
                    .and_then(VersionedValue::value)
                    .cloned();
                Ok(value)
            }
        }
    }

    pub(crate) fn commit(&self, txn: &mut TransactionState<K, V>) -> CoreResult<SequenceNumber> {
        txn.ensure_active()?;
        if txn.write_count() == 0 {
            return Ok(self.commit_read_only(txn));
        }
        self.admit_write()?;

        let writes: Vec<(K, Option<V>)> = txn.take_writes().into_iter().collect();
        let write_count = writes.len();
        let sequence = {
            let mut state = self.state.write();
            let sequence = state.last_committed().next();
            state.apply(sequence, txn.id(), writes.iter().cloned());
            if let Some(bound) = txn.take_bound() {
                state.release_reader(bound);
            }
            self.stats.set_retained_versions(state.retained_versions());
            // Emitted before the state lock drops so records leave in
            // sequence order.
            self.feed.emit(CommitRecord {
                sequence,
                creator: txn.id(),
                writes,
            });
            sequence
        };

        let locks = txn.take_locks();
        self.locks.release_all(locks.iter(), txn.id());
        txn.finish(TransactionStatus::Committed);
        self.stats.record_commit();
        tracing::debug!(txn = %txn.id(), %sequence, writes = write_count, "transaction committed");
        Ok(sequence)
    }

    /// Ends a transaction that staged nothing. It takes no sequence number
    /// and emits no record, so secondaries can run read-only transactions
    /// without diverging from the primary's numbering.
    fn commit_read_only(&self, txn: &mut TransactionState<K, V>) -> SequenceNumber {
        let sequence = {
            let mut state = self.state.write();
            if let Some(bound) = txn.take_bound() {
                state.release_reader(bound);
                self.stats.set_retained_versions(state.retained_versions());
            }
            state.last_committed()
        };

        let locks = txn.take_locks();
        self.locks.release_all(locks.iter(), txn.id());
        txn.finish(TransactionStatus::Committed);
        self.stats.record_commit();
        tracing::trace!(txn = %txn.id(), %sequence, "read-only transaction committed");
        sequence
    }

    /// Discards the transaction. A no-op once the transaction is terminal.
    pub(crate) fn abort(&self, txn: &mut TransactionState<K, V>) {
        if !txn.is_active() {
            return;
        }
        let discarded = txn.discard_writes();
        if let Some(bound) = txn.take_bound() {
            let mut state = self.state.write();
            state.release_reader(bound);
            self.stats.set_retained_versions(state.retained_versions());
        }
        let locks = txn.take_locks();
        self.locks.release_all(locks.iter(), txn.id());
        txn.finish(TransactionStatus::Aborted);
        self.stats.record_abort();
        tracing::debug!(txn = %txn.id(), discarded, "transaction aborted");
    }

    /// Installs a commit shipped from the primary.
    pub(crate) fn apply_replicated(&self, record: CommitRecord<K, V>) -> CoreResult<()> {
        let sequence = record.sequence;
        let creator = record.creator;
        let write_count = record.writes.len();
        {
            let mut state = self.state.write();
            let applied = state.last_committed();
            if sequence != applied.next() {
                return Err(CoreError::OutOfOrderReplication {
                    applied,
                    received: sequence,
                });
            }
            state.apply(sequence, creator, record.writes.iter().cloned());
            self.stats.set_retained_versions(state.retained_versions());
            self.feed.emit(record);
        }

        self.stats.record_replicated_commit();
        tracing::debug!(%sequence, %creator, writes = write_count, "replicated commit applied");
        Ok(())
    }
}

impl<K, V> fmt::Debug for TransactionCoordinator<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TransactionCoordinator")
            .field("config", &self.config)
            .field("next_txn", &self.next_txn.load(Ordering::Relaxed))
            .finish_non_exhaustive()
    }
}
