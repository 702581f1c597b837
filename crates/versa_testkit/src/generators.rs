//! Property-based test generators using proptest.
//!
//! Provides strategies for random transaction workloads and a reference
//! model that predicts what a single-threaded store must answer.

use crate::fixtures::TEST_TIMEOUT;
use proptest::prelude::*;
use std::collections::BTreeMap;
use versa_core::{CoreError, CoreResult, IsolationLevel, Store};

/// One operation inside a transaction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    /// `add(key, value)`
    Add {
        /// Key
        key: u32,
        /// Value
        value: u32,
    },
    /// `conditional_update(key, value)`
    Update {
        /// Key
        key: u32,
        /// Value
        value: u32,
    },
    /// `conditional_remove(key)`
    Remove {
        /// Key
        key: u32,
    },
    /// `conditional_get(key)`
    Get {
        /// Key
        key: u32,
    },
}

/// A transaction to run against the store.
#[derive(Debug, Clone)]
pub struct TxnPlan {
    /// Isolation level of the transaction.
    pub isolation: IsolationLevel,
    /// Operations, in order.
    pub ops: Vec<StoreOp>,
    /// Commit if true, abort otherwise.
    pub commit: bool,
}

/// One step of a workload.
#[derive(Debug, Clone)]
pub enum WorkloadStep {
    /// Run a transaction.
    Txn(TxnPlan),
    /// Run a checkpoint.
    Checkpoint,
}

/// Observable result of a [`StoreOp`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OpOutcome {
    /// `add` staged the value.
    Added,
    /// `add` found a live value.
    AlreadyExists,
    /// `conditional_update` / `conditional_remove` result.
    Applied(bool),
    /// `conditional_get` result.
    Value(Option<u32>),
}

/// Strategy for keys drawn from a small space so operations collide.
pub fn key_strategy(key_space: u32) -> impl Strategy<Value = u32> {
    0..key_space.max(1)
}

/// Strategy for isolation levels.
pub fn isolation_strategy() -> impl Strategy<Value = IsolationLevel> {
    prop_oneof![
        Just(IsolationLevel::ReadRepeatable),
        Just(IsolationLevel::Snapshot),
    ]
}

/// Strategy for a single operation.
pub fn store_op_strategy(key_space: u32) -> impl Strategy<Value = StoreOp> {
    prop_oneof![
        3 => (key_strategy(key_space), any::<u32>())
            .prop_map(|(key, value)| StoreOp::Add { key, value }),
        2 => (key_strategy(key_space), any::<u32>())
            .prop_map(|(key, value)| StoreOp::Update { key, value }),
        1 => key_strategy(key_space).prop_map(|key| StoreOp::Remove { key }),
        2 => key_strategy(key_space).prop_map(|key| StoreOp::Get { key }),
    ]
}

/// Strategy for a transaction of 1 to `max_ops` operations; one in five aborts.
pub fn txn_plan_strategy(key_space: u32, max_ops: usize) -> impl Strategy<Value = TxnPlan> {
    (
        isolation_strategy(),
        prop::collection::vec(store_op_strategy(key_space), 1..max_ops.max(2)),
        prop::bool::weighted(0.8),
    )
        .prop_map(|(isolation, ops, commit)| TxnPlan {
            isolation,
            ops,
            commit,
        })
}

/// Strategy for a workload of transactions interleaved with checkpoints.
pub fn workload_strategy(
    key_space: u32,
    min_steps: usize,
    max_steps: usize,
) -> impl Strategy<Value = Vec<WorkloadStep>> {
    let step = prop_oneof![
        6 => txn_plan_strategy(key_space, 6).prop_map(WorkloadStep::Txn),
        1 => Just(WorkloadStep::Checkpoint),
    ];
    prop::collection::vec(step, min_steps..max_steps)
}

/// Reference model of the committed store contents.
///
/// Without concurrency every isolation level reads the last committed
/// value overlaid with the transaction's own writes, which is all the
/// model tracks.
#[derive(Debug, Clone, Default)]
pub struct ModelStore {
    committed: BTreeMap<u32, u32>,
    commits: u64,
}

impl ModelStore {
    /// Creates an empty model.
    pub fn new() -> Self {
        Self::default()
    }

    /// Runs `plan` and returns the expected outcome of each operation.
    pub fn run(&mut self, plan: &TxnPlan) -> Vec<OpOutcome> {
        let mut staged: BTreeMap<u32, Option<u32>> = BTreeMap::new();
        let mut outcomes = Vec::with_capacity(plan.ops.len());

        for op in &plan.ops {
            let outcome = match *op {
                StoreOp::Add { key, value } => {
                    if self.live(&staged, key).is_some() {
                        OpOutcome::AlreadyExists
                    } else {
                        staged.insert(key, Some(value));
                        OpOutcome::Added
                    }
                }
                StoreOp::Update { key, value } => {
                    let live = self.live(&staged, key).is_some();
                    if live {
                        staged.insert(key, Some(value));
                    }
                    OpOutcome::Applied(live)
                }
                StoreOp::Remove { key } => {
                    let live = self.live(&staged, key).is_some();
                    if live {
                        staged.insert(key, None);
                    }
                    OpOutcome::Applied(live)
                }
                StoreOp::Get { key } => OpOutcome::Value(self.live(&staged, key)),
            };
            outcomes.push(outcome);
        }

        if plan.commit && !staged.is_empty() {
            for (key, value) in staged {
                match value {
                    Some(value) => self.committed.insert(key, value),
                    None => self.committed.remove(&key),
                };
            }
            self.commits += 1;
        }
        outcomes
    }

    fn live(&self, staged: &BTreeMap<u32, Option<u32>>, key: u32) -> Option<u32> {
        match staged.get(&key) {
            Some(value) => *value,
            None => self.committed.get(&key).copied(),
        }
    }

    /// Returns the committed value of `key`.
    pub fn get(&self, key: u32) -> Option<u32> {
        self.committed.get(&key).copied()
    }

    /// Returns the committed contents.
    pub fn contents(&self) -> &BTreeMap<u32, u32> {
        &self.committed
    }

    /// Returns the number of transactions that took a sequence number.
    pub fn commits(&self) -> u64 {
        self.commits
    }
}

/// Runs `plan` against `store` and returns the outcome of each operation.
///
/// # Errors
///
/// Propagates any store error other than `AlreadyExists`, which is an
/// expected outcome of `add`.
pub fn execute_plan(store: &Store<u32, u32>, plan: &TxnPlan) -> CoreResult<Vec<OpOutcome>> {
    let mut txn = store.begin_with(plan.isolation);
    let mut outcomes = Vec::with_capacity(plan.ops.len());

    for op in &plan.ops {
        let outcome = match *op {
            StoreOp::Add { key, value } => match txn.add(key, value, TEST_TIMEOUT) {
                Ok(()) => OpOutcome::Added,
                Err(CoreError::AlreadyExists { .. }) => OpOutcome::AlreadyExists,
                Err(error) => return Err(error),
            },
            StoreOp::Update { key, value } => {
                OpOutcome::Applied(txn.conditional_update(key, value, TEST_TIMEOUT)?)
            }
            StoreOp::Remove { key } => {
                OpOutcome::Applied(txn.conditional_remove(key, TEST_TIMEOUT)?)
            }
            StoreOp::Get { key } => OpOutcome::Value(txn.conditional_get(&key, TEST_TIMEOUT)?),
        };
        outcomes.push(outcome);
    }

    if plan.commit {
        txn.commit()?;
    } else {
        txn.abort();
    }
    Ok(outcomes)
}

/// Configuration for property tests.
#[derive(Debug, Clone)]
pub struct PropTestConfig {
    /// Number of test cases to run.
    pub cases: u32,
    /// Maximum shrink iterations.
    pub max_shrink_iters: u32,
}

impl Default for PropTestConfig {
    fn default() -> Self {
        Self {
            cases: 256,
            max_shrink_iters: 1000,
        }
    }
}

impl PropTestConfig {
    /// Creates a configuration for quick tests.
    #[must_use]
    pub fn quick() -> Self {
        Self {
            cases: 32,
            max_shrink_iters: 100,
        }
    }

    /// Converts to proptest config.
    #[must_use]
    pub fn to_proptest_config(&self) -> ProptestConfig {
        ProptestConfig {
            cases: self.cases,
            max_shrink_iters: self.max_shrink_iters,
            ..ProptestConfig::default()
        }
    }
}
