//! # Versa Core
//!
//! Transactional, multi-version key-value engine for one replica of a
//! replicated store.
//!
//! This crate provides:
//! - a per-key lock table with FIFO waits and timeouts
//! - a version pipeline: differential state, consolidated state and a
//!   snapshot container for versions still needed by snapshot readers
//! - checkpoints that fold the differential state into a new consolidated
//!   generation, optionally persisted through `versa_storage`
//! - transactions with `ReadRepeatable` and `Snapshot` isolation
//! - admission control driven by the replica's role and access status
//! - a commit feed that secondaries consume through
//!   [`Store::apply_replicated`]
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use std::time::Duration;
//! use versa_core::{Config, IsolationLevel, ReplicaStatus, Store};
//!
//! let gate = Arc::new(ReplicaStatus::primary());
//! let store: Store<String, i64> = Store::new(Config::default(), gate);
//! let timeout = Duration::from_millis(500);
//!
//! let mut txn = store.begin();
//! txn.add("balance".to_string(), 100, timeout)?;
//! txn.commit()?;
//!
//! let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
//! assert_eq!(snapshot.conditional_get(&"balance".to_string(), timeout)?, Some(100));
//! # Ok::<(), versa_core::CoreError>(())
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod checkpoint;
mod config;
mod error;
pub mod feed;
pub mod gate;
pub mod lock;
pub mod serializer;
pub mod state;
mod stats;
mod store;
pub mod transaction;
mod types;

pub use checkpoint::{CheckpointPhase, CheckpointSummary, Persistence};
pub use config::Config;
pub use error::{CoreError, CoreResult};
pub use feed::{CommitFeed, CommitRecord};
pub use gate::{
    check_read_admission, check_write_admission, AccessStatus, AdmissionGate, ReadAdmission,
    ReplicaRole, ReplicaStatus, WriteAdmission,
};
pub use lock::{LockGrant, LockTable};
pub use serializer::{
    BytesSerializer, CborSerializer, StateSerializer, StringSerializer, U32Serializer,
};
pub use stats::{StatsSnapshot, StoreStats};
pub use store::Store;
pub use transaction::{StoreTransaction, TransactionStatus};
pub use types::{
    CheckpointEpoch, IsolationLevel, SequenceNumber, StoreKey, StoreValue, TransactionId,
};
