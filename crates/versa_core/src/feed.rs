//! Commit feed for observing committed transactions.
//!
//! Every commit that wrote something is published as a [`CommitRecord`]
//! in the same critical section that makes its versions visible, so records
//! arrive in sequence order. The feed is what a replicator ships to
//! secondaries, which install records with `Store::apply_replicated`.
//!
//! # Usage
//!
//! ```rust
//! use std::sync::Arc;
//! use versa_core::{Config, ReplicaStatus, Store};
//!
//! let gate = Arc::new(ReplicaStatus::primary());
//! let store: Store<String, u32> = Store::new(Config::default(), gate);
//! let records = store.subscribe();
//!
//! let mut txn = store.begin();
//! txn.add("k".to_string(), 1, store.config().default_lock_timeout).unwrap();
//! txn.commit().unwrap();
//!
//! let record = records.recv().unwrap();
//! assert_eq!(record.writes.len(), 1);
//! ```

use crate::types::{SequenceNumber, TransactionId};
use parking_lot::RwLock;
use std::collections::VecDeque;
use std::sync::mpsc::{self, Receiver, Sender};

/// The writes of one committed transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord<K, V> {
    /// Sequence number of the commit.
    pub sequence: SequenceNumber,
    /// Committing transaction.
    pub creator: TransactionId,
    /// Writes in key order; `None` removes the key.
    pub writes: Vec<(K, Option<V>)>,
}

/// Distributes commit records to subscribers and keeps a bounded history.
pub struct CommitFeed<K, V> {
    subscribers: RwLock<Vec<Sender<CommitRecord<K, V>>>>,
    history: RwLock<VecDeque<CommitRecord<K, V>>>,
    max_history: usize,
}

impl<K: Clone, V: Clone> CommitFeed<K, V> {
    /// Creates a feed keeping at most `max_history` records.
    #[must_use]
    pub fn with_max_history(max_history: usize) -> Self {
        Self {
            subscribers: RwLock::new(Vec::new()),
            history: RwLock::new(VecDeque::new()),
            max_history,
        }
    }

    /// Subscribes to all future records.
    pub fn subscribe(&self) -> Receiver<CommitRecord<K, V>> {
        let (tx, rx) = mpsc::channel();
        self.subscribers.write().push(tx);
        rx
    }

    /// Publishes a record. Disconnected subscribers are dropped.
    pub fn emit(&self, record: CommitRecord<K, V>) {
        if self.max_history > 0 {
            let mut history = self.history.write();
            history.push_back(record.clone());
            while history.len() > self.max_history {
                history.pop_front();
            }
        }

        let mut subscribers = self.subscribers.write();
        subscribers.retain(|tx| tx.send(record.clone()).is_ok());
    }

    /// Returns up to `limit` records with sequence greater than `cursor`.
    pub fn poll(&self, cursor: SequenceNumber, limit: usize) -> Vec<CommitRecord<K, V>> {
        self.history
            .read()
            .iter()
            .filter(|record| record.sequence > cursor)
            .take(limit)
            .cloned()
            .collect()
    }

    /// Returns the newest sequence in history.
    pub fn latest_sequence(&self) -> SequenceNumber {
        self.history
            .read()
            .back()
            .map_or(SequenceNumber::ZERO, |record| record.sequence)
    }

    /// Returns the number of live subscribers.
    pub fn subscriber_count(&self) -> usize {
        self.subscribers.read().len()
    }

    /// Returns the number of records in history.
    pub fn history_len(&self) -> usize {
        self.history.read().len()
    }
}

impl<K, V> std::fmt::Debug for CommitFeed<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommitFeed")
            .field("subscribers", &self.subscribers.read().len())
            .field("history", &self.history.read().len())
            .field("max_history", &self.max_history)
            .finish()
    }
}
