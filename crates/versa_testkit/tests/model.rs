//! Model-based property tests.
//!
//! Random single-threaded workloads run against a store and the reference
//! model; every operation outcome and the final contents must agree, with
//! checkpoints interleaved at random.

use proptest::prelude::*;
use std::sync::Arc;
use versa_core::{Config, IsolationLevel, ReplicaStatus, SequenceNumber, Store};
use versa_testkit::{
    execute_plan, workload_strategy, ModelStore, PropTestConfig, ReplicaSet, WorkloadStep,
    TEST_TIMEOUT,
};

const KEY_SPACE: u32 = 8;

fn contents(store: &Store<u32, u32>) -> Vec<(u32, u32)> {
    let mut txn = store.begin_with(IsolationLevel::Snapshot);
    let values = (0..KEY_SPACE)
        .filter_map(|key| {
            txn.conditional_get(&key, TEST_TIMEOUT)
                .unwrap()
                .map(|value| (key, value))
        })
        .collect();
    txn.commit().unwrap();
    values
}

proptest! {
    #![proptest_config(PropTestConfig::quick().to_proptest_config())]

    #[test]
    fn store_matches_model(workload in workload_strategy(KEY_SPACE, 1, 40)) {
        let store: Store<u32, u32> = Store::new(
            Config::default().differential_versions(1),
            Arc::new(ReplicaStatus::primary()),
        );
        let mut model = ModelStore::new();

        for step in &workload {
            match step {
                WorkloadStep::Txn(plan) => {
                    let actual = execute_plan(&store, plan).unwrap();
                    let expected = model.run(plan);
                    prop_assert_eq!(actual, expected, "plan {:?}", plan);
                }
                WorkloadStep::Checkpoint => {
                    store.checkpoint().unwrap();
                }
            }
        }

        let expected: Vec<(u32, u32)> = model.contents().iter().map(|(k, v)| (*k, *v)).collect();
        prop_assert_eq!(contents(&store), expected);
        prop_assert_eq!(store.last_committed(), SequenceNumber::new(model.commits()));
        prop_assert_eq!(store.locked_keys(), 0);
        prop_assert_eq!(store.snapshot_readers(), 0);
        prop_assert_eq!(store.retained_versions(), 0);
    }

    #[test]
    fn secondaries_track_primary(workload in workload_strategy(KEY_SPACE, 1, 30)) {
        let set: ReplicaSet<u32, u32> = ReplicaSet::three();

        for step in &workload {
            match step {
                WorkloadStep::Txn(plan) => {
                    execute_plan(set.primary(), plan).unwrap();
                    set.replicate().unwrap();
                }
                WorkloadStep::Checkpoint => set.checkpoint_all().unwrap(),
            }
        }

        set.assert_converged();
        let primary = contents(set.primary());
        for store in set.secondaries() {
            prop_assert_eq!(contents(store), primary.clone());
        }
    }

    #[test]
    fn snapshot_is_frozen_at_first_read(
        before in workload_strategy(KEY_SPACE, 1, 15),
        after in workload_strategy(KEY_SPACE, 1, 15),
    ) {
        let store: Store<u32, u32> =
            Store::new(Config::default(), Arc::new(ReplicaStatus::primary()));
        run(&store, &before);

        let mut snapshot = store.begin_with(IsolationLevel::Snapshot);
        let seen: Vec<Option<u32>> = (0..KEY_SPACE)
            .map(|key| snapshot.conditional_get(&key, TEST_TIMEOUT).unwrap())
            .collect();

        run(&store, &after);

        let again: Vec<Option<u32>> = (0..KEY_SPACE)
            .map(|key| snapshot.conditional_get(&key, TEST_TIMEOUT).unwrap())
            .collect();
        prop_assert_eq!(seen, again);
        snapshot.abort();
        prop_assert_eq!(store.retained_versions(), 0);
    }
}

fn run(store: &Store<u32, u32>, workload: &[WorkloadStep]) {
    for step in workload {
        match step {
            WorkloadStep::Txn(plan) => {
                execute_plan(store, plan).unwrap();
            }
            WorkloadStep::Checkpoint => {
                store.checkpoint().unwrap();
            }
        }
    }
}
