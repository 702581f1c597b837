//! Snapshot retention: evicted versions kept alive for open snapshot readers.
//!
//! Each open snapshot reader is registered with its visibility bound. When a
//! version leaves the differential or consolidated state, it is retained
//! only if some registered bound falls inside its window
//! `[sequence, superseded_by)`, with one reference per such reader. Closing
//! a reader drops its references; entries reaching zero are freed.

use super::version::{EvictedVersion, VersionedValue};
use crate::types::SequenceNumber;
use std::collections::BTreeMap;

/// An evicted version with its reference count.
#[derive(Debug, Clone)]
pub struct RetainedVersion<V> {
    evicted: EvictedVersion<V>,
    refs: usize,
}

impl<V> RetainedVersion<V> {
    /// Returns the retained version.
    pub fn version(&self) -> &VersionedValue<V> {
        &self.evicted.version
    }

    /// Returns the sequence that superseded this version.
    pub fn superseded_by(&self) -> SequenceNumber {
        self.evicted.superseded_by
    }

    /// Returns the number of readers still needing this version.
    pub fn refs(&self) -> usize {
        self.refs
    }
}

/// Registry of open snapshot readers, by visibility bound.
#[derive(Debug, Default, Clone)]
pub struct SnapshotReaders {
    bounds: BTreeMap<SequenceNumber, usize>,
}

impl SnapshotReaders {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a reader at `bound`.
    pub fn register(&mut self, bound: SequenceNumber) {
        *self.bounds.entry(bound).or_insert(0) += 1;
    }

    /// Unregisters one reader at `bound`. Returns false if none was registered.
    pub fn release(&mut self, bound: SequenceNumber) -> bool {
        match self.bounds.get_mut(&bound) {
            Some(count) if *count > 1 => {
                *count -= 1;
                true
            }
            Some(_) => {
                self.bounds.remove(&bound);
                true
            }
            None => false,
        }
    }

    /// Counts readers whose bound lies in `[from, until)`.
    pub fn count_within(&self, from: SequenceNumber, until: SequenceNumber) -> usize {
        if from >= until {
            return 0;
        }
        self.bounds.range(from..until).map(|(_, count)| count).sum()
    }

    /// Returns the oldest registered bound.
    pub fn oldest(&self) -> Option<SequenceNumber> {
        self.bounds.keys().next().copied()
    }

    /// Returns the number of registered readers.
    pub fn len(&self) -> usize {
        self.bounds.values().sum()
    }

    /// Returns true if no reader is registered.
    pub fn is_empty(&self) -> bool {
        self.bounds.is_empty()
    }
}

/// Arena of retained versions keyed by `(key, sequence)`.
#[derive(Debug, Clone)]
pub struct SnapshotContainer<K, V> {
    entries: BTreeMap<(K, SequenceNumber), RetainedVersion<V>>,
}

impl<K: Ord + Clone, V> SnapshotContainer<K, V> {
    /// Creates an empty container.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Retains `evicted` if any registered reader still needs it.
    ///
    /// Returns true if the version was retained.
    pub fn retain(
        &mut self,
        key: K,
        evicted: EvictedVersion<V>,
        readers: &SnapshotReaders,
    ) -> bool {
        let refs = readers.count_within(evicted.version.sequence(), evicted.superseded_by);
        if refs == 0 {
            return false;
        }
        let slot = (key, evicted.version.sequence());
        self.entries.insert(slot, RetainedVersion { evicted, refs });
        true
    }

    /// Returns the retained version of `key` a reader at `bound` resolves to.
    pub fn visible_at(&self, key: &K, bound: SequenceNumber) -> Option<&VersionedValue<V>> {
        self.entries
            .range((key.clone(), SequenceNumber::ZERO)..=(key.clone(), bound))
            .rev()
            .map(|(_, retained)| retained)
            .find(|retained| retained.evicted.is_needed_at(bound))
            .map(RetainedVersion::version)
    }

    /// Drops the references of a reader that closed at `bound`.
    ///
    /// Returns the number of entries freed.
    pub fn release_reader(&mut self, bound: SequenceNumber) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, retained| {
            if retained.evicted.is_needed_at(bound) {
                retained.refs = retained.refs.saturating_sub(1);
            }
            retained.refs > 0
        });
        before - self.entries.len()
    }

    /// Iterates retained entries in `(key, sequence)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &RetainedVersion<V>)> {
        self.entries.iter().map(|((key, _), retained)| (key, retained))
    }

    /// Returns the number of retained versions.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is retained.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Ord + Clone, V> Default for SnapshotContainer<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
