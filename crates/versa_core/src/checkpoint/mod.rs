//! Checkpointing: folding the differential state into a new consolidated
//! generation.
//!
//! A checkpoint runs in three steps:
//!
//! 1. **Freeze** (state write lock): the differential state becomes the
//!    frozen layer and a fresh differential takes new commits.
//! 2. **Merge** (no store lock): the frozen layer is folded into a copy of
//!    the consolidated state. Readers and writers keep running.
//! 3. **Publish** (state write lock): versions that leave the store but are
//!    still visible to an open snapshot reader move to the snapshot
//!    container, the new generation is installed, and the frozen layer is
//!    dropped.
//!
//! When checkpoint storage is attached, the published image is then written
//! to it.

pub mod image;

use crate::error::CoreResult;
use crate::serializer::StateSerializer;
use crate::state::{ConsolidatedState, VersionState};
use crate::types::{CheckpointEpoch, SequenceNumber, StoreKey, StoreValue};
use parking_lot::{Mutex, RwLock};
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use versa_storage::CheckpointStorage;

/// Phase of the checkpoint state machine.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CheckpointPhase {
    /// No checkpoint is running.
    Idle,
    /// A frozen differential is being merged.
    Consolidating,
}

/// Outcome of one checkpoint pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckpointSummary {
    /// Epoch of the published consolidated state.
    pub epoch: CheckpointEpoch,
    /// Last commit folded into it.
    pub sequence: SequenceNumber,
    /// Keys merged from the frozen differential.
    pub merged_keys: usize,
    /// Live keys in the published state.
    pub live_keys: usize,
    /// Versions that left the store.
    pub evicted: usize,
    /// Of those, versions moved to the snapshot container.
    pub retained: usize,
    /// Whether the image was written to checkpoint storage.
    pub persisted: bool,
    /// Wall time of the pass.
    pub duration: Duration,
}

/// Durable sink for checkpoint images, with the codecs to fill it.
pub struct Persistence<K, V> {
    storage: Arc<dyn CheckpointStorage>,
    keys: Arc<dyn StateSerializer<K>>,
    values: Arc<dyn StateSerializer<V>>,
}

impl<K, V> Persistence<K, V> {
    /// Bundles a storage with key and value serializers.
    pub fn new(
        storage: Arc<dyn CheckpointStorage>,
        keys: Arc<dyn StateSerializer<K>>,
        values: Arc<dyn StateSerializer<V>>,
    ) -> Self {
        Self {
            storage,
            keys,
            values,
        }
    }

    /// Returns the underlying storage.
    pub fn storage(&self) -> &Arc<dyn CheckpointStorage> {
        &self.storage
    }
}

impl<K: Ord + Clone, V: Clone> Persistence<K, V> {
    /// Reads and decodes the stored image, if any.
    pub fn load(&self) -> CoreResult<Option<ConsolidatedState<K, V>>> {
        match self.storage.read_image()? {
            Some(bytes) => image::decode(&bytes, self.keys.as_ref(), self.values.as_ref())
                .map(Some),
            None => Ok(None),
        }
    }

    /// Encodes and writes `state`.
    pub fn save(&self, state: &ConsolidatedState<K, V>) -> CoreResult<()> {
        let bytes = image::encode(state, self.keys.as_ref(), self.values.as_ref())?;
        self.storage.write_image(&bytes)?;
        Ok(())
    }
}

impl<K, V> fmt::Debug for Persistence<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Persistence").finish_non_exhaustive()
    }
}

/// Runs checkpoints against a store's version state.
///
/// Checkpoints are serialized: a second caller waits for the running pass
/// and then performs its own.
#[derive(Debug)]
pub(crate) struct CheckpointManager<K, V> {
    running: Mutex<()>,
    consolidating: AtomicBool,
    persistence: Option<Persistence<K, V>>,
}

struct PhaseGuard<'a>(&'a AtomicBool);

impl Drop for PhaseGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<K: StoreKey, V: StoreValue> CheckpointManager<K, V> {
    pub(crate) fn new(persistence: Option<Persistence<K, V>>) -> Self {
        Self {
            running: Mutex::new(()),
            consolidating: AtomicBool::new(false),
            persistence,
        }
    }

    pub(crate) fn phase(&self) -> CheckpointPhase {
        if self.consolidating.load(Ordering::Acquire) {
            CheckpointPhase::Consolidating
        } else {
            CheckpointPhase::Idle
        }
    }

    pub(crate) fn persistence(&self) -> Option<&Persistence<K, V>> {
        self.persistence.as_ref()
    }

    /// Runs one checkpoint pass.
    ///
    /// # Errors
    ///
    /// Fails only when persisting the image fails. The new generation is
    /// already published in memory at that point.
    pub(crate) fn run(&self, state: &RwLock<VersionState<K, V>>) -> CoreResult<CheckpointSummary> {
        let _running = self.running.lock();
        self.consolidating.store(true, Ordering::Release);
        let _phase = PhaseGuard(&self.consolidating);
        let started = Instant::now();

        let layers = {
            let mut state = state.write();
            debug_assert!(!state.is_frozen(), "checkpoint already in progress");
            state.freeze()
        };
        tracing::debug!(
            sequence = %layers.sequence,
            keys = layers.frozen.len(),
            "checkpoint froze differential state"
        );

        let outcome = layers.base.merge(&layers.frozen, layers.sequence);
        let evicted = outcome.evicted.len();

        let (retained, published) = {
            let mut state = state.write();
            let retained = state.publish(outcome);
            (retained, Arc::clone(state.consolidated()))
        };

        let mut summary = CheckpointSummary {
            epoch: published.epoch(),
            sequence: published.sequence(),
            merged_keys: layers.frozen.len(),
            live_keys: published.len(),
            evicted,
            retained,
            persisted: false,
            duration: Duration::ZERO,
        };

        if let Some(persistence) = &self.persistence {
            if let Err(error) = persistence.save(&published) {
                tracing::warn!(epoch = %summary.epoch, %error, "checkpoint image not persisted");
                return Err(error);
            }
            summary.persisted = true;
        }

        summary.duration = started.elapsed();
        tracing::debug!(
            epoch = %summary.epoch,
            sequence = %summary.sequence,
            merged = summary.merged_keys,
            evicted,
            retained,
            persisted = summary.persisted,
            "checkpoint published"
        );
        Ok(summary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::serializer::{StringSerializer, U32Serializer};
    use crate::types::TransactionId;
    use versa_storage::{MemoryStorage, StorageError, StorageResult};

    fn commit(state: &RwLock<VersionState<String, u32>>, key: &str, value: Option<u32>) {
        let mut state = state.write();
        let sequence = state.last_committed().next();
        state.apply(sequence, TransactionId::new(1), vec![(key.to_string(), value)]);
    }

    fn persistence(storage: Arc<dyn CheckpointStorage>) -> Persistence<String, u32> {
        Persistence::new(storage, Arc::new(StringSerializer), Arc::new(U32Serializer))
    }

    #[test]
    fn checkpoint_publishes_next_epoch() {
        let state = RwLock::new(VersionState::new(2));
        commit(&state, "a", Some(1));
        commit(&state, "b", Some(2));

        let manager = CheckpointManager::new(None);
        let summary = manager.run(&state).unwrap();

        assert_eq!(summary.epoch, CheckpointEpoch::new(1));
        assert_eq!(summary.sequence, SequenceNumber::new(2));
        assert_eq!(summary.merged_keys, 2);
        assert_eq!(summary.live_keys, 2);
        assert!(!summary.persisted);
        assert_eq!(manager.phase(), CheckpointPhase::Idle);

        let state = state.read();
        assert!(!state.is_frozen());
        assert_eq!(state.differential_keys(), 0);
    }

    #[test]
    fn empty_checkpoint_still_advances_epoch() {
        let state: RwLock<VersionState<String, u32>> = RwLock::new(VersionState::new(2));
        let manager = CheckpointManager::new(None);
        manager.run(&state).unwrap();
        let summary = manager.run(&state).unwrap();
        assert_eq!(summary.epoch, CheckpointEpoch::new(2));
        assert_eq!(summary.live_keys, 0);
    }

    #[test]
    fn checkpoint_persists_image() {
        let storage = Arc::new(MemoryStorage::new());
        let state = RwLock::new(VersionState::new(2));
        commit(&state, "a", Some(7));

        let manager = CheckpointManager::new(Some(persistence(storage.clone())));
        let summary = manager.run(&state).unwrap();
        assert!(summary.persisted);
        assert_eq!(storage.writes(), 1);

        let loaded = manager.persistence().unwrap().load().unwrap().unwrap();
        assert_eq!(loaded.get(&"a".to_string()).unwrap().value(), Some(&7));
        assert_eq!(loaded.epoch(), summary.epoch);
    }

    struct FailingStorage;

    impl CheckpointStorage for FailingStorage {
        fn write_image(&self, _image: &[u8]) -> StorageResult<()> {
            Err(StorageError::Corrupted("disk full".into()))
        }

        fn read_image(&self) -> StorageResult<Option<Vec<u8>>> {
            Ok(None)
        }

        fn clear(&self) -> StorageResult<()> {
            Ok(())
        }
    }

    #[test]
    fn persist_failure_keeps_published_state() {
        let state = RwLock::new(VersionState::new(2));
        commit(&state, "a", Some(1));

        let manager = CheckpointManager::new(Some(persistence(Arc::new(FailingStorage))));
        assert!(manager.run(&state).is_err());
        assert_eq!(manager.phase(), CheckpointPhase::Idle);

        let state = state.read();
        assert_eq!(state.consolidated().epoch(), CheckpointEpoch::new(1));
        assert!(!state.is_frozen());
    }
}
