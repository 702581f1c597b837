//! Replica set harness.
//!
//! Wires one primary store to a set of secondaries through the commit feed.
//! Commits are shipped explicitly with [`ReplicaSet::replicate`], or
//! implicitly by [`ReplicaSet::write`], which commits on the primary and
//! then brings every secondary up to date.

use crate::fixtures::{init_tracing, TEST_TIMEOUT};
use std::sync::mpsc::{Receiver, TryRecvError};
use std::sync::Arc;
use versa_core::{
    CommitRecord, Config, CoreError, CoreResult, IsolationLevel, ReplicaStatus, SequenceNumber,
    Store, StoreKey, StoreTransaction, StoreValue,
};

/// One member of a replica set.
pub struct Replica<K: StoreKey, V: StoreValue> {
    /// The replica's store.
    pub store: Store<K, V>,
    /// Gate the harness drives on role changes.
    pub gate: Arc<ReplicaStatus>,
}

/// A primary and its secondaries.
pub struct ReplicaSet<K: StoreKey, V: StoreValue> {
    replicas: Vec<Replica<K, V>>,
    primary: usize,
    feed: Receiver<CommitRecord<K, V>>,
}

impl<K: StoreKey, V: StoreValue> ReplicaSet<K, V> {
    /// Creates `size` replicas; replica 0 starts as primary.
    ///
    /// # Panics
    ///
    /// Panics if `size` is zero.
    pub fn new(size: usize, config: Config) -> Self {
        assert!(size > 0, "a replica set needs at least one replica");
        init_tracing();

        let replicas: Vec<Replica<K, V>> = (0..size)
            .map(|index| {
                let gate = Arc::new(if index == 0 {
                    ReplicaStatus::primary()
                } else {
                    ReplicaStatus::active_secondary()
                });
                Replica {
                    store: Store::new(config.clone(), gate.clone()),
                    gate,
                }
            })
            .collect();
        let feed = replicas[0].store.subscribe();

        Self {
            replicas,
            primary: 0,
            feed,
        }
    }

    /// Creates the three-replica set most scenarios use.
    pub fn three() -> Self {
        Self::new(3, Config::default())
    }

    /// Returns the number of replicas.
    pub fn len(&self) -> usize {
        self.replicas.len()
    }

    /// Always false; a set has at least one replica.
    pub fn is_empty(&self) -> bool {
        self.replicas.is_empty()
    }

    /// Returns the index of the current primary.
    pub fn primary_index(&self) -> usize {
        self.primary
    }

    /// Returns the primary's store.
    pub fn primary(&self) -> &Store<K, V> {
        &self.replicas[self.primary].store
    }

    /// Returns replica `index`.
    pub fn replica(&self, index: usize) -> &Replica<K, V> {
        &self.replicas[index]
    }

    /// Iterates over every store, primary included.
    pub fn stores(&self) -> impl Iterator<Item = &Store<K, V>> {
        self.replicas.iter().map(|replica| &replica.store)
    }

    /// Iterates over the secondaries' stores.
    pub fn secondaries(&self) -> impl Iterator<Item = &Store<K, V>> {
        let primary = self.primary;
        self.replicas
            .iter()
            .enumerate()
            .filter(move |(index, _)| *index != primary)
            .map(|(_, replica)| &replica.store)
    }

    /// Ships every pending primary commit to the secondaries.
    ///
    /// Returns the number of records shipped.
    pub fn replicate(&self) -> CoreResult<usize> {
        let mut shipped = 0;
        loop {
            let record = match self.feed.try_recv() {
                Ok(record) => record,
                Err(TryRecvError::Empty) => break,
                Err(TryRecvError::Disconnected) => {
                    return Err(CoreError::invalid_operation("primary commit feed closed"))
                }
            };
            for secondary in self.secondaries() {
                secondary.apply_replicated(record.clone())?;
            }
            shipped += 1;
        }
        tracing::trace!(shipped, "replicated pending commits");
        Ok(shipped)
    }

    /// Runs `f` in a primary transaction, commits and replicates.
    ///
    /// If `f` fails the transaction is aborted and nothing is shipped.
    pub fn write<F, R>(&self, f: F) -> CoreResult<(R, SequenceNumber)>
    where
        F: FnOnce(&mut StoreTransaction<K, V>) -> CoreResult<R>,
    {
        let mut txn = self.primary().begin();
        let result = f(&mut txn)?;
        let sequence = txn.commit()?;
        self.replicate()?;
        Ok((result, sequence))
    }

    /// Adds `key` on the primary and replicates.
    pub fn add(&self, key: K, value: V) -> CoreResult<SequenceNumber> {
        self.write(|txn| txn.add(key, value, TEST_TIMEOUT))
            .map(|(_, sequence)| sequence)
    }

    /// Updates `key` on the primary and replicates. Returns whether it existed.
    pub fn update(&self, key: K, value: V) -> CoreResult<bool> {
        self.write(|txn| txn.conditional_update(key, value, TEST_TIMEOUT))
            .map(|(updated, _)| updated)
    }

    /// Removes `key` on the primary and replicates. Returns whether it existed.
    pub fn remove(&self, key: K) -> CoreResult<bool> {
        self.write(|txn| txn.conditional_remove(key, TEST_TIMEOUT))
            .map(|(removed, _)| removed)
    }

    /// Checkpoints every replica.
    pub fn checkpoint_all(&self) -> CoreResult<()> {
        for store in self.stores() {
            store.checkpoint()?;
        }
        Ok(())
    }

    /// Opens one snapshot transaction per replica, in replica order.
    pub fn begin_snapshots(&self) -> Vec<StoreTransaction<K, V>> {
        self.stores()
            .map(|store| store.begin_with(IsolationLevel::Snapshot))
            .collect()
    }

    /// Reads `key` on every replica through a snapshot transaction.
    pub fn read_all(&self, key: &K) -> CoreResult<Vec<Option<V>>> {
        self.stores()
            .map(|store| {
                let mut txn = store.begin_with(IsolationLevel::Snapshot);
                let value = txn.conditional_get(key, TEST_TIMEOUT)?;
                txn.commit()?;
                Ok(value)
            })
            .collect()
    }

    /// Moves the primary role to replica `index`.
    ///
    /// Pending commits are shipped first so the new primary continues the
    /// old primary's numbering.
    pub fn failover(&mut self, index: usize) -> CoreResult<()> {
        if index >= self.replicas.len() {
            return Err(CoreError::invalid_operation(format!(
                "replica {index} is not in a set of {}",
                self.replicas.len()
            )));
        }
        self.replicate()?;

        self.replicas[self.primary].gate.demote();
        self.replicas[index].gate.promote();
        self.primary = index;
        self.feed = self.replicas[index].store.subscribe();
        tracing::debug!(primary = index, "replica set failed over");
        Ok(())
    }
}

impl<K: StoreKey, V: StoreValue + PartialEq> ReplicaSet<K, V> {
    /// Asserts every replica sees `expected` for `key`.
    ///
    /// # Panics
    ///
    /// Panics if a read fails or any replica disagrees.
    pub fn assert_value(&self, key: &K, expected: Option<&V>) {
        let values = self.read_all(key).expect("Failed to read replicas");
        for (index, value) in values.iter().enumerate() {
            assert_eq!(
                value.as_ref(),
                expected,
                "replica {index} disagrees on key {key:?}"
            );
        }
    }

    /// Asserts every replica has applied the same commits.
    ///
    /// # Panics
    ///
    /// Panics if sequence numbers differ.
    pub fn assert_converged(&self) {
        let expected = self.primary().last_committed();
        for (index, store) in self.stores().enumerate() {
            assert_eq!(
                store.last_committed(),
                expected,
                "replica {index} has not caught up with the primary"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use versa_core::{AdmissionGate, ReplicaRole};

    #[test]
    fn writes_reach_every_replica() {
        let set: ReplicaSet<u32, u32> = ReplicaSet::three();
        set.add(1, 10).unwrap();
        assert!(set.update(1, 11).unwrap());

        set.assert_value(&1, Some(&11));
        set.assert_converged();
        assert_eq!(set.replicate().unwrap(), 0);
    }

    #[test]
    fn failed_write_ships_nothing() {
        let set: ReplicaSet<u32, u32> = ReplicaSet::three();
        set.add(1, 10).unwrap();
        assert!(matches!(set.add(1, 20), Err(CoreError::AlreadyExists { .. })));

        set.assert_value(&1, Some(&10));
        assert_eq!(set.primary().last_committed(), SequenceNumber::new(1));
    }

    #[test]
    fn failover_continues_numbering() {
        let mut set: ReplicaSet<u32, u32> = ReplicaSet::three();
        set.add(1, 1).unwrap();

        set.failover(2).unwrap();
        assert_eq!(set.primary_index(), 2);
        assert_eq!(set.replica(0).gate.as_ref().role(), ReplicaRole::ActiveSecondary);

        assert_eq!(set.add(2, 2).unwrap(), SequenceNumber::new(2));
        set.assert_value(&2, Some(&2));
        set.assert_converged();
    }

    #[test]
    fn failover_to_unknown_replica_fails() {
        let mut set: ReplicaSet<u32, u32> = ReplicaSet::three();
        assert!(set.failover(3).is_err());
        assert_eq!(set.primary_index(), 0);
    }
}
