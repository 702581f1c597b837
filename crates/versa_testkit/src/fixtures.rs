//! Test fixtures and store helpers.
//!
//! Provides convenience functions for setting up test stores and common
//! test scenarios.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tempfile::TempDir;
use versa_core::{
    Config, CoreResult, IsolationLevel, Persistence, ReplicaStatus, SequenceNumber, Store,
    StoreKey, StoreValue, StringSerializer, U32Serializer,
};
use versa_storage::FileStorage;

/// Lock timeout used by the helpers.
pub const TEST_TIMEOUT: Duration = Duration::from_secs(2);

/// Key type of the fixture stores.
pub type TestKey = u32;

/// Value type of the fixture stores.
pub type TestValue = String;

/// Installs a `tracing` subscriber honouring `RUST_LOG`.
///
/// Safe to call from every test; only the first call installs it.
pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// A test store with automatic cleanup.
pub struct TestStore {
    /// The store instance.
    pub store: Store<TestKey, TestValue>,
    /// Gate driving the store's admission checks.
    pub gate: Arc<ReplicaStatus>,
    /// The temporary directory (kept alive to prevent cleanup).
    _temp_dir: Option<TempDir>,
}

impl TestStore {
    /// Creates an in-memory primary store.
    pub fn memory() -> Self {
        Self::memory_with(Config::default())
    }

    /// Creates an in-memory primary store with `config`.
    pub fn memory_with(config: Config) -> Self {
        init_tracing();
        let gate = Arc::new(ReplicaStatus::primary());
        Self {
            store: Store::new(config, gate.clone()),
            gate,
            _temp_dir: None,
        }
    }

    /// Creates a primary store that checkpoints into a temporary file.
    pub fn file() -> Self {
        init_tracing();
        let temp_dir = TempDir::new().expect("Failed to create temp directory");
        let gate = Arc::new(ReplicaStatus::primary());
        let persistence = file_persistence(&image_path(temp_dir.path()));
        Self {
            store: Store::with_persistence(Config::default(), gate.clone(), persistence),
            gate,
            _temp_dir: Some(temp_dir),
        }
    }

    /// Returns the checkpoint image path if file-based.
    pub fn path(&self) -> Option<PathBuf> {
        self._temp_dir.as_ref().map(|dir| image_path(dir.path()))
    }

    /// Drops the store and recovers a new one from its last checkpoint.
    ///
    /// # Panics
    ///
    /// Panics for in-memory stores or if recovery fails.
    pub fn reopen(self) -> Self {
        let temp_dir = self._temp_dir.expect("Only file stores can be reopened");
        let gate = self.gate;
        drop(self.store);

        let persistence = file_persistence(&image_path(temp_dir.path()));
        let store = Store::recover(Config::default(), gate.clone(), persistence)
            .expect("Failed to recover store");
        Self {
            store,
            gate,
            _temp_dir: Some(temp_dir),
        }
    }
}

impl std::ops::Deref for TestStore {
    type Target = Store<TestKey, TestValue>;

    fn deref(&self) -> &Self::Target {
        &self.store
    }
}

fn image_path(dir: &Path) -> PathBuf {
    dir.join("checkpoint.img")
}

/// Builds file-backed persistence for fixture key and value types.
pub fn file_persistence(path: &Path) -> Persistence<TestKey, TestValue> {
    let storage = FileStorage::open(path).expect("Failed to open checkpoint file");
    Persistence::new(
        Arc::new(storage),
        Arc::new(U32Serializer),
        Arc::new(StringSerializer),
    )
}

/// Runs a test with a temporary in-memory store.
///
/// # Example
///
/// ```rust
/// use versa_testkit::{with_store, put};
///
/// with_store(|store| {
///     put(store, 7, "seven".to_string()).unwrap();
/// });
/// ```
pub fn with_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store<TestKey, TestValue>) -> R,
{
    let test_store = TestStore::memory();
    f(&test_store.store)
}

/// Runs a test with a temporary file-backed store.
pub fn with_file_store<F, R>(f: F) -> R
where
    F: FnOnce(&Store<TestKey, TestValue>, &Path) -> R,
{
    let test_store = TestStore::file();
    let path = test_store.path().expect("File store should have a path");
    f(&test_store.store, &path)
}

/// Adds or updates `key` in its own transaction.
pub fn put<K: StoreKey, V: StoreValue>(
    store: &Store<K, V>,
    key: K,
    value: V,
) -> CoreResult<SequenceNumber> {
    let mut txn = store.begin();
    if !txn.conditional_update(key.clone(), value.clone(), TEST_TIMEOUT)? {
        txn.add(key, value, TEST_TIMEOUT)?;
    }
    txn.commit()
}

/// Removes `key` in its own transaction. Returns whether it existed.
pub fn remove<K: StoreKey, V: StoreValue>(store: &Store<K, V>, key: K) -> CoreResult<bool> {
    let mut txn = store.begin();
    let removed = txn.conditional_remove(key, TEST_TIMEOUT)?;
    txn.commit()?;
    Ok(removed)
}

/// Reads the latest committed value of `key`.
pub fn get<K: StoreKey, V: StoreValue>(store: &Store<K, V>, key: &K) -> CoreResult<Option<V>> {
    read_with(store, key, IsolationLevel::ReadRepeatable)
}

/// Reads `key` in a fresh transaction at `isolation`.
pub fn read_with<K: StoreKey, V: StoreValue>(
    store: &Store<K, V>,
    key: &K,
    isolation: IsolationLevel,
) -> CoreResult<Option<V>> {
    let mut txn = store.begin_with(isolation);
    let value = txn.conditional_get(key, TEST_TIMEOUT)?;
    txn.commit()?;
    Ok(value)
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Creates a store with keys `0..count`, each holding `"value-{key}"`.
    pub fn populated_store(count: u32) -> TestStore {
        let test_store = TestStore::memory();
        for key in 0..count {
            put(&test_store.store, key, format!("value-{key}")).expect("Failed to populate store");
        }
        test_store
    }

    /// Creates a store whose keys live in the consolidated state.
    pub fn checkpointed_store(count: u32) -> TestStore {
        let test_store = populated_store(count);
        test_store.store.checkpoint().expect("Failed to checkpoint");
        test_store
    }
}
