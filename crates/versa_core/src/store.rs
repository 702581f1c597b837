//! The store facade.

use crate::checkpoint::{CheckpointManager, CheckpointPhase, CheckpointSummary, Persistence};
use crate::config::Config;
use crate::error::CoreResult;
use crate::feed::CommitRecord;
use crate::gate::AdmissionGate;
use crate::state::VersionState;
use crate::stats::StatsSnapshot;
use crate::transaction::{StoreTransaction, TransactionCoordinator};
use crate::types::{CheckpointEpoch, IsolationLevel, SequenceNumber, StoreKey, StoreValue};
use std::fmt;
use std::sync::mpsc::Receiver;
use std::sync::Arc;

/// A transactional, versioned key-value store for one replica.
///
/// `Store` is a cheap handle; clones share the same data.
///
/// # Example
///
/// ```rust
/// use std::sync::Arc;
/// use std::time::Duration;
/// use versa_core::{Config, IsolationLevel, ReplicaStatus, Store};
///
/// let gate = Arc::new(ReplicaStatus::primary());
/// let store: Store<u32, String> = Store::new(Config::default(), gate);
/// let timeout = Duration::from_secs(1);
///
/// let mut writer = store.begin();
/// writer.add(1, "one".to_string(), timeout).unwrap();
/// writer.commit().unwrap();
///
/// store.checkpoint().unwrap();
///
/// let mut reader = store.begin_with(IsolationLevel::ReadRepeatable);
/// assert_eq!(reader.conditional_get(&1, timeout).unwrap().as_deref(), Some("one"));
/// ```
pub struct Store<K: StoreKey, V: StoreValue> {
    coordinator: Arc<TransactionCoordinator<K, V>>,
    checkpoints: Arc<CheckpointManager<K, V>>,
}

impl<K: StoreKey, V: StoreValue> Store<K, V> {
    /// Creates an empty in-memory store.
    pub fn new(config: Config, gate: Arc<dyn AdmissionGate>) -> Self {
        let state = VersionState::new(config.differential_versions);
        Self::assemble(config, gate, state, None)
    }

    /// Creates an empty store that writes each checkpoint to `persistence`.
    ///
    /// Any image already in the storage is ignored and replaced by the first
    /// checkpoint. Use [`Store::recover`] to start from it instead.
    pub fn with_persistence(
        config: Config,
        gate: Arc<dyn AdmissionGate>,
        persistence: Persistence<K, V>,
    ) -> Self {
        let state = VersionState::new(config.differential_versions);
        Self::assemble(config, gate, state, Some(persistence))
    }

    /// Opens a store from the last checkpoint image in `persistence`.
    ///
    /// Without an image the store starts empty. The recovered store resumes
    /// at the image's sequence number and epoch.
    ///
    /// # Errors
    ///
    /// Fails if the image cannot be read or is corrupt.
    pub fn recover(
        config: Config,
        gate: Arc<dyn AdmissionGate>,
        persistence: Persistence<K, V>,
    ) -> CoreResult<Self> {
        let state = match persistence.load()? {
            Some(consolidated) => {
                tracing::debug!(
                    epoch = %consolidated.epoch(),
                    sequence = %consolidated.sequence(),
                    keys = consolidated.len(),
                    "recovered checkpoint image"
                );
                VersionState::recovered(config.differential_versions, consolidated)
            }
            None => VersionState::new(config.differential_versions),
        };
        Ok(Self::assemble(config, gate, state, Some(persistence)))
    }

    fn assemble(
        config: Config,
        gate: Arc<dyn AdmissionGate>,
        state: VersionState<K, V>,
        persistence: Option<Persistence<K, V>>,
    ) -> Self {
        Self {
            coordinator: Arc::new(TransactionCoordinator::new(config, gate, state)),
            checkpoints: Arc::new(CheckpointManager::new(persistence)),
        }
    }

    /// Begins a transaction at the configured default isolation level.
    pub fn begin(&self) -> StoreTransaction<K, V> {
        self.begin_with(self.coordinator.config().default_isolation)
    }

    /// Begins a transaction at `isolation`.
    pub fn begin_with(&self, isolation: IsolationLevel) -> StoreTransaction<K, V> {
        StoreTransaction::new(Arc::clone(&self.coordinator), isolation)
    }

    /// Folds the differential state into a new consolidated generation.
    ///
    /// # Errors
    ///
    /// Fails only if the image could not be persisted; the new generation is
    /// published in memory regardless.
    pub fn checkpoint(&self) -> CoreResult<CheckpointSummary> {
        let result = self.checkpoints.run(self.coordinator.state());
        let stats = self.coordinator.stats();
        stats.set_retained_versions(self.coordinator.state().read().retained_versions());
        match &result {
            Ok(_) => stats.record_checkpoint(),
            Err(_) => stats.record_checkpoint_failure(),
        }
        result
    }

    /// Returns the checkpoint phase.
    #[must_use]
    pub fn checkpoint_phase(&self) -> CheckpointPhase {
        self.checkpoints.phase()
    }

    /// Installs a commit received from the primary.
    ///
    /// Bypasses key locks and the write gate. Records must arrive in
    /// sequence order with no gaps.
    ///
    /// # Errors
    ///
    /// `OutOfOrderReplication` if `record` does not directly follow the last
    /// applied commit.
    pub fn apply_replicated(&self, record: CommitRecord<K, V>) -> CoreResult<()> {
        self.coordinator.apply_replicated(record)
    }

    /// Subscribes to commit records.
    pub fn subscribe(&self) -> Receiver<CommitRecord<K, V>> {
        self.coordinator.feed().subscribe()
    }

    /// Returns up to `limit` retained commit records after `cursor`.
    pub fn poll_commits(&self, cursor: SequenceNumber, limit: usize) -> Vec<CommitRecord<K, V>> {
        self.coordinator.feed().poll(cursor, limit)
    }

    /// Returns the sequence of the last commit.
    #[must_use]
    pub fn last_committed(&self) -> SequenceNumber {
        self.coordinator.state().read().last_committed()
    }

    /// Returns the epoch of the current consolidated state.
    #[must_use]
    pub fn epoch(&self) -> CheckpointEpoch {
        self.coordinator.state().read().consolidated().epoch()
    }

    /// Returns the number of versions held for snapshot readers.
    #[must_use]
    pub fn retained_versions(&self) -> usize {
        self.coordinator.state().read().retained_versions()
    }

    /// Returns the number of open snapshot readers.
    #[must_use]
    pub fn snapshot_readers(&self) -> usize {
        self.coordinator.state().read().open_readers()
    }

    /// Returns the number of keys currently locked or waited for.
    #[must_use]
    pub fn locked_keys(&self) -> usize {
        self.coordinator.locks().len()
    }

    /// Returns a copy of the store counters.
    #[must_use]
    pub fn stats(&self) -> StatsSnapshot {
        self.coordinator.stats().snapshot()
    }

    /// Returns the store configuration.
    #[must_use]
    pub fn config(&self) -> &Config {
        self.coordinator.config()
    }

    /// Returns the admission gate.
    #[must_use]
    pub fn gate(&self) -> &Arc<dyn AdmissionGate> {
        self.coordinator.gate()
    }

    /// Returns true if the store writes checkpoint images.
    #[must_use]
    pub fn is_persistent(&self) -> bool {
        self.checkpoints.persistence().is_some()
    }
}

impl<K: StoreKey, V: StoreValue> Clone for Store<K, V> {
    fn clone(&self) -> Self {
        Self {
            coordinator: Arc::clone(&self.coordinator),
            checkpoints: Arc::clone(&self.checkpoints),
        }
    }
}

impl<K: StoreKey, V: StoreValue> fmt::Debug for Store<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let state = self.coordinator.state().read();
        f.debug_struct("Store")
            .field("last_committed", &state.last_committed())
            .field("epoch", &state.consolidated().epoch())
            .field("differential_keys", &state.differential_keys())
            .field("checkpoint_phase", &self.checkpoint_phase())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CoreError;
    use crate::gate::{AccessStatus, ReplicaStatus};
    use crate::serializer::{StringSerializer, U32Serializer};
    use std::thread;
    use std::time::Duration;
    use versa_storage::MemoryStorage;

    const TIMEOUT: Duration = Duration::from_millis(200);
    const SHORT: Duration = Duration::from_millis(20);

    fn primary() -> (Store<u32, String>, Arc<ReplicaStatus>) {
        let gate = Arc::new(ReplicaStatus::primary());
        (Store::new(Config::default(), gate.clone()), gate)
    }

    fn put(store: &Store<u32, String>, key: u32, value: &str) -> SequenceNumber {
        let mut txn = store.begin();
        if !txn.conditional_update(key, value.to_string(), TIMEOUT).unwrap() {
            txn.add(key, value.to_string(), TIMEOUT).unwrap();
        }
        txn.commit().unwrap()
    }

    fn get(store: &Store<u32, String>, key: u32) -> Option<String> {
        let mut txn = store.begin_with(IsolationLevel::ReadRepeatable);
        let value = txn.conditional_get(&key, TIMEOUT).unwrap();
        txn.commit().unwrap();
        value
    }

    #[test]
    fn add_commit_read() {
        let (store, _) = primary();
        let seq = put(&store, 1, "a");
        assert_eq!(seq, SequenceNumber::new(1));
        assert_eq!(get(&store, 1).as_deref(), Some("a"));
        assert_eq!(store.last_committed(), SequenceNumber::new(1));
        assert_eq!(store.locked_keys(), 0);
    }

    #[test]
    fn read_only_commit_takes_no_sequence() {
        let (store, _) = primary();
        let records = store.subscribe();
        put(&store, 1, "a");
        records.recv().unwrap();

        let mut reader = store.begin_with(IsolationLevel::Snapshot);
        reader.conditional_get(&1, TIMEOUT).unwrap();
        assert_eq!(reader.commit().unwrap(), SequenceNumber::new(1));
        assert_eq!(store.last_committed(), SequenceNumber::new(1));
        assert_eq!(store.snapshot_readers(), 0);
        assert!(records.try_recv().is_err());
        assert_eq!(store.stats().commits, 2);
    }

    #[test]
    fn read_your_own_writes() {
        let (store, _) = primary();
        let mut txn = store.begin();
        txn.add(1, "a".into(), TIMEOUT).unwrap();
        assert_eq!(txn.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("a"));
        assert!(txn.conditional_remove(1, TIMEOUT).unwrap());
        assert_eq!(txn.conditional_get(&1, TIMEOUT).unwrap(), None);
        // Re-adding after a staged removal is allowed.
        txn.add(1, "b".into(), TIMEOUT).unwrap();
        txn.commit().unwrap();
        assert_eq!(get(&store, 1).as_deref(), Some("b"));
    }

    #[test]
    fn second_add_in_same_transaction_fails() {
        let (store, _) = primary();
        let mut txn = store.begin();
        txn.add(1, "a".into(), TIMEOUT).unwrap();
        let result = txn.add(1, "b".into(), TIMEOUT);
        assert!(matches!(result, Err(CoreError::AlreadyExists { .. })));
        assert!(txn.is_active());
    }

    #[test]
    fn add_on_committed_key_fails() {
        let (store, _) = primary();
        put(&store, 1, "a");
        let mut txn = store.begin();
        assert!(matches!(
            txn.add(1, "b".into(), TIMEOUT),
            Err(CoreError::AlreadyExists { .. })
        ));
    }

    #[test]
    fn update_and_remove_missing_key_return_false() {
        let (store, _) = primary();
        let mut txn = store.begin();
        assert!(!txn.conditional_update(1, "a".into(), TIMEOUT).unwrap());
        assert!(!txn.conditional_remove(1, TIMEOUT).unwrap());
        assert_eq!(txn.write_count(), 0);
        txn.commit().unwrap();
    }

    #[test]
    fn abort_discards_writes() {
        let (store, _) = primary();
        let mut txn = store.begin();
        txn.add(1, "a".into(), TIMEOUT).unwrap();
        txn.abort();
        txn.abort();
        assert_eq!(get(&store, 1), None);
        assert_eq!(store.locked_keys(), 0);
        assert_eq!(store.stats().aborts, 1);
    }

    #[test]
    fn drop_aborts() {
        let (store, _) = primary();
        {
            let mut txn = store.begin();
            txn.add(1, "a".into(), TIMEOUT).unwrap();
        }
        assert_eq!(store.locked_keys(), 0);
        assert_eq!(store.snapshot_readers(), 0);
        assert_eq!(get(&store, 1), None);
    }

    #[test]
    fn terminal_transaction_rejects_operations() {
        let (store, _) = primary();
        let mut txn = store.begin();
        txn.commit().unwrap();
        assert!(matches!(
            txn.add(1, "a".into(), TIMEOUT),
            Err(CoreError::InvalidOperation { .. })
        ));
        assert!(matches!(txn.commit(), Err(CoreError::InvalidOperation { .. })));
        assert!(matches!(
            txn.conditional_get(&1, TIMEOUT),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn isolation_level_fixed_after_first_operation() {
        let (store, _) = primary();
        let mut txn = store.begin();
        txn.set_isolation_level(IsolationLevel::ReadRepeatable).unwrap();
        txn.conditional_get(&1, TIMEOUT).unwrap();
        assert!(matches!(
            txn.set_isolation_level(IsolationLevel::Snapshot),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn concurrent_add_times_out() {
        let (store, _) = primary();
        let mut first = store.begin();
        first.add(1, "a".into(), TIMEOUT).unwrap();

        let mut second = store.begin();
        let result = second.add(1, "b".into(), SHORT);
        assert!(matches!(result, Err(CoreError::LockTimeout { .. })));
        assert!(second.is_active());

        first.commit().unwrap();
        assert!(matches!(
            second.add(1, "b".into(), SHORT),
            Err(CoreError::AlreadyExists { .. })
        ));
        assert_eq!(store.stats().lock_timeouts, 1);
    }

    #[test]
    fn read_repeatable_read_blocks_on_writer() {
        let (store, _) = primary();
        put(&store, 1, "a");

        let mut writer = store.begin();
        assert!(writer.conditional_update(1, "b".into(), TIMEOUT).unwrap());

        let mut reader = store.begin_with(IsolationLevel::ReadRepeatable);
        let result = reader.conditional_get(&1, SHORT);
        assert!(matches!(result, Err(CoreError::LockTimeout { .. })));

        // Snapshot readers are never blocked and see the committed value.
        let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
        assert_eq!(snapshot.conditional_get(&1, SHORT).unwrap().as_deref(), Some("a"));
    }

    #[test]
    fn read_repeatable_read_waits_for_commit() {
        let (store, _) = primary();
        put(&store, 1, "a");

        let mut writer = store.begin();
        writer.conditional_update(1, "b".into(), TIMEOUT).unwrap();

        let reader = {
            let store = store.clone();
            thread::spawn(move || {
                let mut txn = store.begin_with(IsolationLevel::ReadRepeatable);
                txn.conditional_get(&1, Duration::from_secs(5)).unwrap()
            })
        };
        thread::sleep(SHORT);
        writer.commit().unwrap();
        assert_eq!(reader.join().unwrap().as_deref(), Some("b"));
    }

    #[test]
    fn read_repeatable_lock_held_until_end() {
        let (store, _) = primary();
        put(&store, 1, "a");

        let mut reader = store.begin_with(IsolationLevel::ReadRepeatable);
        reader.conditional_get(&1, TIMEOUT).unwrap();
        assert_eq!(reader.read_count(), 1);

        let mut writer = store.begin();
        assert!(matches!(
            writer.conditional_update(1, "b".into(), SHORT),
            Err(CoreError::LockTimeout { .. })
        ));

        reader.commit().unwrap();
        assert!(writer.conditional_update(1, "b".into(), SHORT).unwrap());
    }

    #[test]
    fn snapshot_is_stable_across_commits() {
        let (store, _) = primary();
        put(&store, 1, "v1");

        let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("v1"));
        let bound = snapshot.snapshot_bound().unwrap();

        put(&store, 1, "v2");
        put(&store, 1, "v3");
        put(&store, 2, "new");

        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("v1"));
        assert_eq!(snapshot.conditional_get(&2, TIMEOUT).unwrap(), None);
        assert_eq!(snapshot.snapshot_bound(), Some(bound));
        assert_eq!(store.retained_versions(), 1);

        snapshot.commit().unwrap();
        assert_eq!(store.retained_versions(), 0);
        assert_eq!(store.snapshot_readers(), 0);
    }

    #[test]
    fn snapshot_is_stable_across_checkpoints() {
        let (store, _) = primary();
        put(&store, 1, "v1");
        store.checkpoint().unwrap();

        let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("v1"));

        put(&store, 1, "v2");
        store.checkpoint().unwrap();
        put(&store, 1, "v3");
        put(&store, 1, "v4");
        store.checkpoint().unwrap();

        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("v1"));
        assert_eq!(get(&store, 1).as_deref(), Some("v4"));
        snapshot.abort();
        assert_eq!(store.retained_versions(), 0);
    }

    #[test]
    fn snapshot_sees_removed_key_until_it_closes() {
        let (store, _) = primary();
        put(&store, 1, "v1");

        let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
        snapshot.conditional_get(&1, TIMEOUT).unwrap();

        let mut remover = store.begin();
        assert!(remover.conditional_remove(1, TIMEOUT).unwrap());
        remover.commit().unwrap();
        store.checkpoint().unwrap();

        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("v1"));
        assert_eq!(get(&store, 1), None);
    }

    #[test]
    fn checkpoint_preserves_visibility() {
        let (store, _) = primary();
        for key in 0..10 {
            put(&store, key, &format!("v{key}"));
        }
        let before: Vec<_> = (0..10).map(|key| get(&store, key)).collect();
        let summary = store.checkpoint().unwrap();
        let after: Vec<_> = (0..10).map(|key| get(&store, key)).collect();

        assert_eq!(before, after);
        assert_eq!(summary.live_keys, 10);
        assert_eq!(store.epoch(), CheckpointEpoch::new(1));
        assert_eq!(store.stats().checkpoints, 1);
    }

    #[test]
    fn write_gate_rejects_when_not_granted() {
        let (store, gate) = primary();
        gate.set_write_status(AccessStatus::NotPrimary);

        let mut txn = store.begin();
        assert!(matches!(
            txn.add(1, "a".into(), TIMEOUT),
            Err(CoreError::NotPrimary)
        ));
        assert!(matches!(
            txn.conditional_update(1, "a".into(), TIMEOUT),
            Err(CoreError::NotPrimary)
        ));
        assert_eq!(store.stats().admission_denials, 2);
    }

    #[test]
    fn commit_rechecks_write_gate() {
        let (store, gate) = primary();
        let mut txn = store.begin();
        txn.add(1, "a".into(), TIMEOUT).unwrap();

        gate.demote();
        assert!(matches!(txn.commit(), Err(CoreError::NotPrimary)));
        assert!(txn.is_active());
        txn.abort();

        gate.promote();
        assert_eq!(get(&store, 1), None);
    }

    #[test]
    fn read_gate_with_pending_reconfiguration() {
        let (store, gate) = primary();
        gate.set_read_status(AccessStatus::ReconfigurationPending);

        for isolation in [IsolationLevel::ReadRepeatable, IsolationLevel::Snapshot] {
            let mut txn = store.begin_with(isolation);
            assert!(matches!(
                txn.conditional_get(&1, TIMEOUT),
                Err(CoreError::NotReadable { .. })
            ));
        }
    }

    #[test]
    fn secondary_serves_only_snapshot_reads() {
        let (primary, _) = primary();
        let secondary: Store<u32, String> =
            Store::new(Config::default(), Arc::new(ReplicaStatus::active_secondary()));
        let records = primary.subscribe();

        put(&primary, 1, "a");
        secondary.apply_replicated(records.recv().unwrap()).unwrap();

        let mut snapshot = secondary.begin_with(IsolationLevel::Snapshot);
        assert_eq!(snapshot.conditional_get(&1, TIMEOUT).unwrap().as_deref(), Some("a"));

        let mut repeatable = secondary.begin_with(IsolationLevel::ReadRepeatable);
        assert!(matches!(
            repeatable.conditional_get(&1, TIMEOUT),
            Err(CoreError::NotReadable { .. })
        ));

        let mut writer = secondary.begin();
        assert!(matches!(
            writer.add(2, "b".into(), TIMEOUT),
            Err(CoreError::NotPrimary)
        ));
    }

    #[test]
    fn replication_rejects_gaps() {
        let (primary, _) = primary();
        let secondary: Store<u32, String> =
            Store::new(Config::default(), Arc::new(ReplicaStatus::active_secondary()));
        let records = primary.subscribe();

        put(&primary, 1, "a");
        put(&primary, 2, "b");
        let _first = records.recv().unwrap();
        let second = records.recv().unwrap();

        let result = secondary.apply_replicated(second);
        assert!(matches!(
            result,
            Err(CoreError::OutOfOrderReplication { applied, received })
                if applied == SequenceNumber::ZERO && received == SequenceNumber::new(2)
        ));
    }

    #[test]
    fn concurrent_commits_reach_the_feed_in_sequence_order() {
        const THREADS: u32 = 8;
        const COMMITS: u32 = 200;

        let (primary, _) = primary();
        let secondary: Store<u32, String> =
            Store::new(Config::default(), Arc::new(ReplicaStatus::active_secondary()));
        let records = primary.subscribe();

        let writers: Vec<_> = (0..THREADS)
            .map(|t| {
                let store = primary.clone();
                thread::spawn(move || {
                    for i in 0..COMMITS {
                        let mut txn = store.begin();
                        txn.add(t * COMMITS + i, "v".into(), TIMEOUT).unwrap();
                        txn.commit().unwrap();
                    }
                })
            })
            .collect();
        for writer in writers {
            writer.join().unwrap();
        }

        let received: Vec<_> = records.try_iter().collect();
        assert_eq!(received.len(), (THREADS * COMMITS) as usize);
        for (expected, record) in (1u64..).zip(&received) {
            assert_eq!(record.sequence, SequenceNumber::new(expected));
        }

        for record in received {
            secondary.apply_replicated(record).unwrap();
        }
        assert_eq!(secondary.last_committed(), primary.last_committed());

        let polled = primary.poll_commits(SequenceNumber::ZERO, usize::MAX);
        assert!(polled
            .windows(2)
            .all(|pair| pair[0].sequence < pair[1].sequence));
    }

    #[test]
    fn commit_feed_carries_writes_in_key_order() {
        let (store, _) = primary();
        let records = store.subscribe();

        let mut txn = store.begin();
        txn.add(3, "c".into(), TIMEOUT).unwrap();
        txn.add(1, "a".into(), TIMEOUT).unwrap();
        let seq = txn.commit().unwrap();

        let record = records.recv().unwrap();
        assert_eq!(record.sequence, seq);
        assert_eq!(record.creator, txn.id());
        let keys: Vec<u32> = record.writes.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3]);
        assert_eq!(store.poll_commits(SequenceNumber::ZERO, 10).len(), 1);
    }

    fn memory_persistence(storage: &Arc<MemoryStorage>) -> Persistence<u32, String> {
        Persistence::new(
            Arc::clone(storage) as Arc<dyn versa_storage::CheckpointStorage>,
            Arc::new(U32Serializer),
            Arc::new(StringSerializer),
        )
    }

    #[test]
    fn recover_from_persisted_checkpoint() {
        let storage = Arc::new(MemoryStorage::new());
        let gate = Arc::new(ReplicaStatus::primary());
        let store =
            Store::with_persistence(Config::default(), gate.clone(), memory_persistence(&storage));
        assert!(store.is_persistent());
        put(&store, 1, "a");
        put(&store, 2, "b");
        let summary = store.checkpoint().unwrap();
        assert!(summary.persisted);
        put(&store, 3, "not checkpointed");

        let recovered =
            Store::recover(Config::default(), gate, memory_persistence(&storage)).unwrap();
        assert_eq!(recovered.last_committed(), summary.sequence);
        assert_eq!(recovered.epoch(), summary.epoch);
        assert_eq!(put(&recovered, 4, "d"), summary.sequence.next());

        assert_eq!(get(&recovered, 1).as_deref(), Some("a"));
        assert_eq!(get(&recovered, 2).as_deref(), Some("b"));
        assert_eq!(get(&recovered, 3), None);
    }

    #[test]
    fn recovered_store_does_not_reuse_creator_ids() {
        let storage = Arc::new(MemoryStorage::new());
        let gate = Arc::new(ReplicaStatus::primary());
        let store =
            Store::with_persistence(Config::default(), gate.clone(), memory_persistence(&storage));
        put(&store, 1, "a");
        let mut txn = store.begin();
        txn.add(2, "b".into(), TIMEOUT).unwrap();
        let writer = txn.id();
        txn.commit().unwrap();
        store.checkpoint().unwrap();

        let recovered =
            Store::recover(Config::default(), gate, memory_persistence(&storage)).unwrap();
        let next = recovered.begin();
        assert!(next.id() > writer);
    }

    #[test]
    fn recover_without_image_starts_empty() {
        let persistence = Persistence::new(
            Arc::new(MemoryStorage::new()),
            Arc::new(U32Serializer),
            Arc::new(StringSerializer),
        );
        let gate = Arc::new(ReplicaStatus::primary());
        let store: Store<u32, String> =
            Store::recover(Config::default(), gate, persistence).unwrap();
        assert_eq!(store.last_committed(), SequenceNumber::ZERO);
        assert_eq!(store.epoch(), CheckpointEpoch::new(0));
    }
}
