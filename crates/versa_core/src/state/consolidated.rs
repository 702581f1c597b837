//! Consolidated state: the immutable image produced by a checkpoint.

use super::differential::DifferentialState;
use super::version::{EvictedVersion, VersionedValue};
use crate::types::{CheckpointEpoch, SequenceNumber};
use std::collections::BTreeMap;

/// Latest live version of every key as of a checkpoint.
///
/// A consolidated state is never modified after construction; a checkpoint
/// builds the next generation with [`ConsolidatedState::merge`] and swaps
/// it in.
#[derive(Debug, Clone)]
pub struct ConsolidatedState<K, V> {
    entries: BTreeMap<K, VersionedValue<V>>,
    epoch: CheckpointEpoch,
    sequence: SequenceNumber,
}

/// Result of merging a frozen differential into a consolidated state.
#[derive(Debug)]
pub struct MergeOutcome<K, V> {
    /// The next consolidated generation.
    pub consolidated: ConsolidatedState<K, V>,
    /// Versions that no longer live in any layer once the merge is published.
    pub evicted: Vec<(K, EvictedVersion<V>)>,
}

impl<K: Ord + Clone, V: Clone> ConsolidatedState<K, V> {
    /// The empty state at epoch 0.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            entries: BTreeMap::new(),
            epoch: CheckpointEpoch::default(),
            sequence: SequenceNumber::ZERO,
        }
    }

    /// Builds a state from recovered entries.
    ///
    /// Tombstones are dropped; a consolidated state only holds live values.
    pub fn from_entries<I>(epoch: CheckpointEpoch, sequence: SequenceNumber, entries: I) -> Self
    where
        I: IntoIterator<Item = (K, VersionedValue<V>)>,
    {
        Self {
            entries: entries
                .into_iter()
                .filter(|(_, version)| !version.is_tombstone())
                .collect(),
            epoch,
            sequence,
        }
    }

    /// Folds `frozen` into a copy of this state.
    ///
    /// The newest version of each frozen chain replaces the key's entry (a
    /// tombstone removes it). The replaced entry is evicted, superseded by
    /// the chain's origin, and so is every older version still in the chain.
    /// `sequence` is the last commit covered by the frozen layer.
    pub fn merge(
        &self,
        frozen: &DifferentialState<K, V>,
        sequence: SequenceNumber,
    ) -> MergeOutcome<K, V> {
        let mut entries = self.entries.clone();
        let mut evicted = Vec::new();

        for (key, chain) in frozen.iter() {
            let (newest, older) = chain.split_newest();
            evicted.extend(older.into_iter().map(|version| (key.clone(), version)));

            let replaced = if newest.is_tombstone() {
                entries.remove(key)
            } else {
                entries.insert(key.clone(), newest)
            };
            if let Some(version) = replaced {
                evicted.push((
                    key.clone(),
                    EvictedVersion {
                        version,
                        superseded_by: chain.origin(),
                    },
                ));
            }
        }

        MergeOutcome {
            consolidated: Self {
                entries,
                epoch: self.epoch.next(),
                sequence: sequence.max(self.sequence),
            },
            evicted,
        }
    }
}

impl<K: Ord, V> ConsolidatedState<K, V> {
    /// Returns the version of `key`.
    pub fn get(&self, key: &K) -> Option<&VersionedValue<V>> {
        self.entries.get(key)
    }

    /// Returns the epoch that produced this state.
    pub fn epoch(&self) -> CheckpointEpoch {
        self.epoch
    }

    /// Returns the last commit sequence covered by this state.
    pub fn sequence(&self) -> SequenceNumber {
        self.sequence
    }

    /// Iterates entries in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &VersionedValue<V>)> {
        self.entries.iter()
    }

    /// Returns the number of live keys.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if no key is live.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TransactionId;

    fn seq(n: u64) -> SequenceNumber {
        SequenceNumber::new(n)
    }

    fn put(value: u32, n: u64) -> VersionedValue<u32> {
        VersionedValue::put(value, seq(n), TransactionId::new(n))
    }

    #[test]
    fn merge_into_empty() {
        let mut frozen = DifferentialState::new(2);
        frozen.install("a", put(1, 1));
        frozen.install("b", put(2, 2));

        let outcome = ConsolidatedState::empty().merge(&frozen, seq(2));
        let state = outcome.consolidated;

        assert_eq!(state.epoch(), CheckpointEpoch::new(1));
        assert_eq!(state.sequence(), seq(2));
        assert_eq!(state.get(&"a").unwrap().value(), Some(&1));
        assert_eq!(state.len(), 2);
        assert!(outcome.evicted.is_empty());
    }

    #[test]
    fn merge_evicts_replaced_and_older_versions() {
        let mut first = DifferentialState::new(2);
        first.install("k", put(1, 1));
        let base = ConsolidatedState::empty().merge(&first, seq(1)).consolidated;

        let mut frozen = DifferentialState::new(2);
        frozen.install("k", put(2, 3));
        frozen.install("k", put(3, 5));

        let outcome = base.merge(&frozen, seq(5));
        assert_eq!(outcome.consolidated.get(&"k").unwrap().value(), Some(&3));

        let mut windows: Vec<(u64, u64)> = outcome
            .evicted
            .iter()
            .map(|(_, e)| (e.version.sequence().as_u64(), e.superseded_by.as_u64()))
            .collect();
        windows.sort_unstable();
        assert_eq!(windows, vec![(1, 3), (3, 5)]);

        // The previous generation is untouched.
        assert_eq!(base.get(&"k").unwrap().value(), Some(&1));
    }

    #[test]
    fn tombstone_removes_key() {
        let mut first = DifferentialState::new(2);
        first.install("k", put(1, 1));
        let base = ConsolidatedState::empty().merge(&first, seq(1)).consolidated;

        let mut frozen = DifferentialState::new(2);
        frozen.install("k", VersionedValue::tombstone(seq(2), TransactionId::new(2)));

        let outcome = base.merge(&frozen, seq(2));
        assert!(outcome.consolidated.get(&"k").is_none());
        assert_eq!(outcome.evicted.len(), 1);
        assert_eq!(outcome.evicted[0].1.superseded_by, seq(2));
    }

    #[test]
    fn from_entries_drops_tombstones() {
        let state = ConsolidatedState::from_entries(
            CheckpointEpoch::new(4),
            seq(9),
            vec![
                ("a", put(1, 1)),
                ("b", VersionedValue::tombstone(seq(2), TransactionId::new(2))),
            ],
        );
        assert_eq!(state.len(), 1);
        assert_eq!(state.epoch(), CheckpointEpoch::new(4));
    }
}
