//! Differential state: versions written since the last checkpoint.

use super::version::{EvictedVersion, VersionChain, VersionedValue};
use std::collections::BTreeMap;

/// Mutable layer holding recent versions per key.
///
/// Each chain keeps at most `capacity` versions. Pushing past that evicts
/// the oldest version, which the caller either retains for snapshot readers
/// or drops.
#[derive(Debug, Clone)]
pub struct DifferentialState<K, V> {
    chains: BTreeMap<K, VersionChain<V>>,
    capacity: usize,
}

impl<K: Ord, V> DifferentialState<K, V> {
    /// Creates an empty differential state.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            chains: BTreeMap::new(),
            capacity: capacity.max(1),
        }
    }

    /// Installs a committed version for `key`.
    pub fn install(&mut self, key: K, version: VersionedValue<V>) -> Option<EvictedVersion<V>> {
        match self.chains.get_mut(&key) {
            Some(chain) => chain.push(version, self.capacity),
            None => {
                self.chains.insert(key, VersionChain::new(version));
                None
            }
        }
    }

    /// Returns the chain for `key`.
    pub fn get(&self, key: &K) -> Option<&VersionChain<V>> {
        self.chains.get(key)
    }

    /// Returns the newest version of `key`.
    pub fn newest(&self, key: &K) -> Option<&VersionedValue<V>> {
        self.chains.get(key).map(VersionChain::newest)
    }

    /// Iterates chains in key order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &VersionChain<V>)> {
        self.chains.iter()
    }

    /// Returns the per-key version capacity.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Returns the number of keys written.
    pub fn len(&self) -> usize {
        self.chains.len()
    }

    /// Returns true if nothing was written.
    pub fn is_empty(&self) -> bool {
        self.chains.is_empty()
    }
}
