//! Per-key exclusive lock table.
//!
//! Writers (and `ReadRepeatable` readers) serialize on a key through this
//! table. Locks are exclusive, re-entrant for their holder, granted in FIFO
//! order, and waited for with a deadline.

use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use parking_lot::{Condvar, Mutex, MutexGuard};
use std::collections::{BTreeMap, VecDeque};
use std::fmt;
use std::time::{Duration, Instant};

/// Outcome of a successful [`LockTable::acquire`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockGrant {
    /// The lock was taken by this call.
    Acquired,
    /// The caller already held the lock.
    AlreadyHeld,
}

#[derive(Debug, Default)]
struct LockEntry {
    holder: Option<TransactionId>,
    waiters: VecDeque<TransactionId>,
}

impl LockEntry {
    fn is_idle(&self) -> bool {
        self.holder.is_none() && self.waiters.is_empty()
    }

    /// Hands the lock to `txn` if it is free and `txn` is next in line.
    fn try_grant(&mut self, txn: TransactionId) -> bool {
        if self.holder.is_none() && self.waiters.front() == Some(&txn) {
            self.waiters.pop_front();
            self.holder = Some(txn);
            true
        } else {
            false
        }
    }
}

/// Exclusive lock table keyed by store key.
///
/// An entry exists only while some transaction holds or waits for the key.
pub struct LockTable<K> {
    entries: Mutex<BTreeMap<K, LockEntry>>,
    released: Condvar,
}

impl<K: Ord + Clone + fmt::Debug> LockTable<K> {
    /// Creates an empty lock table.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: Mutex::new(BTreeMap::new()),
            released: Condvar::new(),
        }
    }

    /// Acquires the lock on `key` for `txn`.
    ///
    /// Blocks while another transaction holds the key, for at most `timeout`.
    /// A timeout too large for the clock waits indefinitely.
    ///
    /// # Errors
    ///
    /// Returns `LockTimeout` if the lock could not be acquired in time. The
    /// current holder is unaffected.
    pub fn acquire(&self, key: &K, txn: TransactionId, timeout: Duration) -> CoreResult<LockGrant> {
        let mut entries = self.entries.lock();
        let entry = entries.entry(key.clone()).or_default();

        if entry.holder == Some(txn) {
            return Ok(LockGrant::AlreadyHeld);
        }
        if entry.is_idle() {
            entry.holder = Some(txn);
            return Ok(LockGrant::Acquired);
        }
        if timeout.is_zero() {
            return Err(CoreError::lock_timeout(key, timeout));
        }

        entry.waiters.push_back(txn);
        let deadline = Instant::now().checked_add(timeout);

        loop {
            let timed_out = match deadline {
                Some(deadline) => self.released.wait_until(&mut entries, deadline).timed_out(),
                None => {
                    self.released.wait(&mut entries);
                    false
                }
            };

            let entry = entries.entry(key.clone()).or_default();
            if entry.try_grant(txn) {
                return Ok(LockGrant::Acquired);
            }

            if timed_out {
                entry.waiters.retain(|&waiter| waiter != txn);
                if entry.is_idle() {
                    entries.remove(key);
                }
                // Our departure may have put someone else at the head.
                self.released.notify_all();
                tracing::debug!(txn = %txn, key = ?key, ?timeout, "lock wait timed out");
                return Err(CoreError::lock_timeout(key, timeout));
            }
        }
    }

    /// Releases the lock on `key` held by `txn`.
    ///
    /// Releasing a lock the caller does not hold is a programming error.
    pub fn release(&self, key: &K, txn: TransactionId) {
        let mut entries = self.entries.lock();
        if Self::release_locked(&mut entries, key, txn) {
            self.released.notify_all();
        }
    }

    /// Releases every lock in `keys` held by `txn`.
    pub fn release_all<'a, I>(&self, keys: I, txn: TransactionId)
    where
        I: IntoIterator<Item = &'a K>,
        K: 'a,
    {
        let mut entries = self.entries.lock();
        let mut wake = false;
        for key in keys {
            wake |= Self::release_locked(&mut entries, key, txn);
        }
        if wake {
            self.released.notify_all();
        }
    }

    /// Returns true if waiters need waking.
    fn release_locked(
        entries: &mut MutexGuard<'_, BTreeMap<K, LockEntry>>,
        key: &K,
        txn: TransactionId,
    ) -> bool {
        let Some(entry) = entries
            .get_mut(key)
            .filter(|entry| entry.holder == Some(txn))
        else {
            let holder = entries.get(key).and_then(|entry| entry.holder);
            tracing::warn!(txn = %txn, key = ?key, ?holder, "release of a lock not held");
            debug_assert_eq!(holder, Some(txn), "released a lock held by another transaction");
            return false;
        };

        entry.holder = None;
        if entry.waiters.is_empty() {
            entries.remove(key);
            false
        } else {
            true
        }
    }

    /// Returns the current holder of `key`.
    #[must_use]
    pub fn holder(&self, key: &K) -> Option<TransactionId> {
        self.entries.lock().get(key).and_then(|entry| entry.holder)
    }

    /// Returns the number of keys that are held or waited for.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    /// Returns true if no key is held or waited for.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.lock().is_empty()
    }
}

impl<K: Ord + Clone + fmt::Debug> Default for LockTable<K> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K> fmt::Debug for LockTable<K> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LockTable")
            .field("entries", &self.entries.lock().len())
            .finish()
    }
}
