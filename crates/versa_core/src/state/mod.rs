//! Multi-version state pipeline.
//!
//! Committed versions flow through three layers:
//!
//! - the **differential** state takes every commit, keeping a few versions
//!   per key
//! - a checkpoint **freezes** the differential and merges it into the next
//!   **consolidated** generation
//! - versions pushed out of either layer while a snapshot reader still needs
//!   them move to the **snapshot container**
//!
//! [`VersionState`] owns all layers and lives behind the store's state lock.

mod consolidated;
mod differential;
mod snapshot;
mod version;

pub use consolidated::{ConsolidatedState, MergeOutcome};
pub use differential::DifferentialState;
pub use snapshot::{RetainedVersion, SnapshotContainer, SnapshotReaders};
pub use version::{EvictedVersion, VersionChain, VersionedValue};

use crate::types::{SequenceNumber, StoreKey, StoreValue, TransactionId};
use std::sync::Arc;

/// Layers captured when a checkpoint freezes the differential state.
#[derive(Debug)]
pub(crate) struct FrozenLayers<K, V> {
    pub frozen: Arc<DifferentialState<K, V>>,
    pub base: Arc<ConsolidatedState<K, V>>,
    pub sequence: SequenceNumber,
}

/// All version layers of a store plus the reader registry.
#[derive(Debug)]
pub(crate) struct VersionState<K, V> {
    differential: DifferentialState<K, V>,
    frozen: Option<Arc<DifferentialState<K, V>>>,
    consolidated: Arc<ConsolidatedState<K, V>>,
    snapshots: SnapshotContainer<K, V>,
    readers: SnapshotReaders,
    last_committed: SequenceNumber,
}

impl<K: StoreKey, V: StoreValue> VersionState<K, V> {
    pub(crate) fn new(capacity: usize) -> Self {
        Self::recovered(capacity, ConsolidatedState::empty())
    }

    /// Starts from a consolidated image; nothing newer has been committed.
    pub(crate) fn recovered(capacity: usize, consolidated: ConsolidatedState<K, V>) -> Self {
        Self {
            differential: DifferentialState::new(capacity),
            frozen: None,
            last_committed: consolidated.sequence(),
            consolidated: Arc::new(consolidated),
            snapshots: SnapshotContainer::new(),
            readers: SnapshotReaders::new(),
        }
    }

    pub(crate) fn last_committed(&self) -> SequenceNumber {
        self.last_committed
    }

    pub(crate) fn consolidated(&self) -> &Arc<ConsolidatedState<K, V>> {
        &self.consolidated
    }

    pub(crate) fn is_frozen(&self) -> bool {
        self.frozen.is_some()
    }

    pub(crate) fn retained_versions(&self) -> usize {
        self.snapshots.len()
    }

    pub(crate) fn open_readers(&self) -> usize {
        self.readers.len()
    }

    pub(crate) fn differential_keys(&self) -> usize {
        self.differential.len()
    }

    /// Highest creator among the consolidated and differential versions.
    pub(crate) fn max_creator(&self) -> Option<TransactionId> {
        let consolidated = self.consolidated.iter().map(|(_, version)| version.creator());
        let differential = self
            .differential
            .iter()
            .flat_map(|(_, chain)| chain.iter().map(VersionedValue::creator));
        consolidated.chain(differential).max()
    }

    /// Latest committed version of `key`, tombstones included.
    pub(crate) fn latest(&self, key: &K) -> Option<&VersionedValue<V>> {
        if let Some(version) = self.differential.newest(key) {
            return Some(version);
        }
        if let Some(version) = self.frozen.as_ref().and_then(|frozen| frozen.newest(key)) {
            return Some(version);
        }
        self.consolidated.get(key)
    }

    /// Version of `key` a reader at `bound` observes, tombstones included.
    ///
    /// Every layer may hold a candidate; the newest one not after `bound`
    /// wins. Retained versions only count inside their window.
    pub(crate) fn visible_at(&self, key: &K, bound: SequenceNumber) -> Option<&VersionedValue<V>> {
        let candidates = [
            self.differential.get(key).and_then(|chain| chain.visible_at(bound)),
            self.frozen
                .as_ref()
                .and_then(|frozen| frozen.get(key))
                .and_then(|chain| chain.visible_at(bound)),
            self.consolidated
                .get(key)
                .filter(|version| version.is_visible_at(bound)),
            self.snapshots.visible_at(key, bound),
        ];
        candidates
            .into_iter()
            .flatten()
            .max_by_key(|version| version.sequence())
    }

    /// Registers a snapshot reader at the current commit point.
    pub(crate) fn register_reader(&mut self) -> SequenceNumber {
        let bound = self.last_committed;
        self.readers.register(bound);
        bound
    }

    /// Unregisters a snapshot reader and frees versions only it needed.
    pub(crate) fn release_reader(&mut self, bound: SequenceNumber) -> usize {
        if !self.readers.release(bound) {
            tracing::warn!(bound = %bound, "release of an unregistered snapshot reader");
            return 0;
        }
        let freed = self.snapshots.release_reader(bound);
        if freed > 0 {
            tracing::trace!(bound = %bound, freed, "snapshot versions freed");
        }
        freed
    }

    /// Installs the writes of one commit at `sequence`.
    ///
    /// Returns the number of evicted versions retained for readers.
    pub(crate) fn apply<I>(
        &mut self,
        sequence: SequenceNumber,
        creator: TransactionId,
        writes: I,
    ) -> usize
    where
        I: IntoIterator<Item = (K, Option<V>)>,
    {
        debug_assert!(sequence > self.last_committed, "commit sequence must advance");
        let mut retained = 0;
        for (key, value) in writes {
            let version = VersionedValue::from_parts(value, sequence, creator);
            if let Some(evicted) = self.differential.install(key.clone(), version) {
                retained += usize::from(self.retain(key, evicted));
            }
        }
        self.last_committed = sequence;
        retained
    }

    fn retain(&mut self, key: K, evicted: EvictedVersion<V>) -> bool {
        let from = evicted.version.sequence();
        let until = evicted.superseded_by;
        let kept = self.snapshots.retain(key.clone(), evicted, &self.readers);
        tracing::trace!(key = ?key, from = %from, until = %until, kept, "version evicted");
        kept
    }

    /// Swaps in a fresh differential and hands out the layers to merge.
    pub(crate) fn freeze(&mut self) -> FrozenLayers<K, V> {
        let fresh = DifferentialState::new(self.differential.capacity());
        let frozen = Arc::new(std::mem::replace(&mut self.differential, fresh));
        self.frozen = Some(Arc::clone(&frozen));
        FrozenLayers {
            frozen,
            base: Arc::clone(&self.consolidated),
            sequence: self.last_committed,
        }
    }

    /// Installs a merged consolidated generation and drops the frozen layer.
    ///
    /// Returns the number of evicted versions retained for readers.
    pub(crate) fn publish(&mut self, outcome: MergeOutcome<K, V>) -> usize {
        let mut retained = 0;
        for (key, evicted) in outcome.evicted {
            retained += usize::from(self.retain(key, evicted));
        }
        self.consolidated = Arc::new(outcome.consolidated);
        self.frozen = None;
        retained
    }
}
