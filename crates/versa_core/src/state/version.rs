//! Committed versions and per-key version chains.

use crate::types::{SequenceNumber, TransactionId};
use std::collections::VecDeque;

/// One committed version of a key.
///
/// A `None` value is a tombstone: the key is absent as of `sequence`.
/// Versions are immutable once committed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionedValue<V> {
    value: Option<V>,
    sequence: SequenceNumber,
    creator: TransactionId,
}

impl<V> VersionedValue<V> {
    /// Creates a live version.
    pub fn put(value: V, sequence: SequenceNumber, creator: TransactionId) -> Self {
        Self {
            value: Some(value),
            sequence,
            creator,
        }
    }

    /// Creates a tombstone version.
    pub fn tombstone(sequence: SequenceNumber, creator: TransactionId) -> Self {
        Self {
            value: None,
            sequence,
            creator,
        }
    }

    /// Creates a version from an optional value.
    pub fn from_parts(value: Option<V>, sequence: SequenceNumber, creator: TransactionId) -> Self {
        Self {
            value,
            sequence,
            creator,
        }
    }

    /// Returns the value, or `None` for a tombstone.
    pub fn value(&self) -> Option<&V> {
        self.value.as_ref()
    }

    /// Returns the commit sequence of this version.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Returns the transaction that created this version.
    pub fn creator(&self) -> TransactionId {
        self.creator
    }

    /// Returns true if this version removes the key.
    pub fn is_tombstone(&self) -> bool {
        self.value.is_none()
    }

    /// Returns true if this version is visible at `bound`.
    pub fn is_visible_at(&self, bound: SequenceNumber) -> bool {
        self.sequence <= bound
    }
}

/// A version pushed out of a layer, with the sequence of the version that
/// replaced it.
///
/// Readers whose bound falls in `[version.sequence(), superseded_by)` still
/// resolve to this version.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EvictedVersion<V> {
    /// The evicted version.
    pub version: VersionedValue<V>,
    /// Sequence of the next newer version of the same key.
    pub superseded_by: SequenceNumber,
}

impl<V> EvictedVersion<V> {
    /// Returns true if a reader at `bound` would resolve to this version.
    pub fn is_needed_at(&self, bound: SequenceNumber) -> bool {
        self.version.sequence() <= bound && bound < self.superseded_by
    }
}

/// Versions of one key, newest first.
///
/// The chain also remembers its origin: the sequence of the first version
/// ever pushed into it, even after that version has been evicted. The origin
/// is what supersedes the key's version in the layer below.
#[derive(Debug, Clone)]
pub struct VersionChain<V> {
    versions: VecDeque<VersionedValue<V>>,
    origin: SequenceNumber,
}

impl<V> VersionChain<V> {
    /// Creates a chain holding a single version.
    pub fn new(first: VersionedValue<V>) -> Self {
        let origin = first.sequence();
        let mut versions = VecDeque::with_capacity(2);
        versions.push_front(first);
        Self { versions, origin }
    }

    /// Pushes a newer version, keeping at most `capacity` versions.
    ///
    /// Returns the version that no longer fits, if any.
    pub fn push(
        &mut self,
        version: VersionedValue<V>,
        capacity: usize,
    ) -> Option<EvictedVersion<V>> {
        debug_assert!(
            version.sequence() > self.newest().sequence(),
            "versions must be pushed in sequence order"
        );
        self.versions.push_front(version);

        if self.versions.len() <= capacity.max(1) {
            return None;
        }
        let evicted = self.versions.pop_back()?;
        let superseded_by = self.versions.back()?.sequence();
        Some(EvictedVersion {
            version: evicted,
            superseded_by,
        })
    }

    /// Returns the newest version.
    pub fn newest(&self) -> &VersionedValue<V> {
        // A chain is never empty: it is created with one version and `push`
        // only evicts beyond the first.
        &self.versions[0]
    }

    /// Returns the newest version visible at `bound`.
    pub fn visible_at(&self, bound: SequenceNumber) -> Option<&VersionedValue<V>> {
        self.versions.iter().find(|version| version.is_visible_at(bound))
    }

    /// Returns the sequence of the first version pushed into this chain.
    pub fn origin(&self) -> SequenceNumber {
        self.origin
    }

    /// Returns the number of versions held.
    pub fn len(&self) -> usize {
        self.versions.len()
    }

    /// Always false; chains hold at least one version.
    pub fn is_empty(&self) -> bool {
        self.versions.is_empty()
    }

    /// Iterates versions newest first.
    pub fn iter(&self) -> impl Iterator<Item = &VersionedValue<V>> {
        self.versions.iter()
    }
}

impl<V: Clone> VersionChain<V> {
    /// Splits the chain into its newest version and the older versions,
    /// each paired with the sequence that superseded it.
    pub fn split_newest(&self) -> (VersionedValue<V>, Vec<EvictedVersion<V>>) {
        let newest = self.newest().clone();
        let older = self
            .versions
            .iter()
            .zip(self.versions.iter().skip(1))
            .map(|(newer, older)| EvictedVersion {
                version: older.clone(),
                superseded_by: newer.sequence(),
            })
            .collect();
        (newest, older)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn put(value: u32, seq: u64) -> VersionedValue<u32> {
        VersionedValue::put(value, SequenceNumber::new(seq), TransactionId::new(seq))
    }

    #[test]
    fn tombstone_has_no_value() {
        let v: VersionedValue<u32> =
            VersionedValue::tombstone(SequenceNumber::new(3), TransactionId::new(1));
        assert!(v.is_tombstone());
        assert!(v.value().is_none());
    }

    #[test]
    fn push_within_capacity_evicts_nothing() {
        let mut chain = VersionChain::new(put(1, 1));
        assert!(chain.push(put(2, 2), 2).is_none());
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.newest().value(), Some(&2));
    }

    #[test]
    fn push_beyond_capacity_evicts_oldest() {
        let mut chain = VersionChain::new(put(1, 1));
        chain.push(put(2, 2), 2);
        let evicted = chain.push(put(3, 5), 2).unwrap();

        assert_eq!(evicted.version.value(), Some(&1));
        assert_eq!(evicted.superseded_by, SequenceNumber::new(2));
        assert_eq!(chain.len(), 2);
        assert_eq!(chain.origin(), SequenceNumber::new(1));
    }

    #[test]
    fn visible_at_picks_newest_not_after_bound() {
        let mut chain = VersionChain::new(put(1, 1));
        chain.push(put(2, 4), 2);

        assert_eq!(chain.visible_at(SequenceNumber::new(3)).unwrap().value(), Some(&1));
        assert_eq!(chain.visible_at(SequenceNumber::new(4)).unwrap().value(), Some(&2));
        assert!(chain.visible_at(SequenceNumber::ZERO).is_none());
    }

    #[test]
    fn evicted_window() {
        let evicted = EvictedVersion {
            version: put(1, 2),
            superseded_by: SequenceNumber::new(5),
        };
        assert!(!evicted.is_needed_at(SequenceNumber::new(1)));
        assert!(evicted.is_needed_at(SequenceNumber::new(2)));
        assert!(evicted.is_needed_at(SequenceNumber::new(4)));
        assert!(!evicted.is_needed_at(SequenceNumber::new(5)));
    }

    #[test]
    fn split_newest_pairs_superseding_sequences() {
        let mut chain = VersionChain::new(put(1, 1));
        chain.push(put(2, 3), 3);
        chain.push(put(3, 6), 3);

        let (newest, older) = chain.split_newest();
        assert_eq!(newest.value(), Some(&3));
        assert_eq!(older.len(), 2);
        assert_eq!(older[0].version.value(), Some(&2));
        assert_eq!(older[0].superseded_by, SequenceNumber::new(6));
        assert_eq!(older[1].version.value(), Some(&1));
        assert_eq!(older[1].superseded_by, SequenceNumber::new(3));
    }
}
