//! Stress tests for Versa.
//!
//! These runners drive a store from several threads at once. The transfer
//! workload moves value between accounts so that the sum of all balances is
//! an invariant every snapshot must observe.

use crate::fixtures::init_tracing;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};
use versa_core::{Config, CoreError, CoreResult, IsolationLevel, ReplicaStatus, Store};

/// Result of a stress test run.
#[derive(Debug, Clone)]
pub struct StressTestResult {
    /// Total transactions attempted.
    pub total_ops: usize,
    /// Committed transactions.
    pub successful_ops: usize,
    /// Transactions that failed and were aborted.
    pub failed_ops: usize,
    /// Of the failures, lock timeouts.
    pub lock_timeouts: usize,
    /// Checkpoints completed while the workload ran.
    pub checkpoints: usize,
    /// Total duration.
    pub duration: Duration,
    /// Operations per second.
    pub ops_per_second: f64,
}

impl StressTestResult {
    fn new(
        successful: usize,
        failed: usize,
        lock_timeouts: usize,
        checkpoints: usize,
        duration: Duration,
    ) -> Self {
        let total = successful + failed;
        let ops_per_second = if duration.as_secs_f64() > 0.0 {
            total as f64 / duration.as_secs_f64()
        } else {
            0.0
        };

        Self {
            total_ops: total,
            successful_ops: successful,
            failed_ops: failed,
            lock_timeouts,
            checkpoints,
            duration,
            ops_per_second,
        }
    }

    /// Prints a summary of the test.
    pub fn print_summary(&self, name: &str) {
        println!("\n=== {} ===", name);
        println!("Total transactions: {}", self.total_ops);
        println!("Committed: {}", self.successful_ops);
        println!("Failed: {} ({} lock timeouts)", self.failed_ops, self.lock_timeouts);
        println!("Checkpoints: {}", self.checkpoints);
        println!("Duration: {:?}", self.duration);
        println!("Throughput: {:.2} txn/sec", self.ops_per_second);
    }
}

/// Configuration for stress tests.
#[derive(Debug, Clone)]
pub struct StressConfig {
    /// Transfers per worker thread.
    pub transfers_per_thread: usize,
    /// Number of worker threads.
    pub threads: usize,
    /// Number of accounts.
    pub accounts: u32,
    /// Starting balance of each account.
    pub initial_balance: u32,
    /// Lock timeout per operation.
    pub lock_timeout: Duration,
    /// Pause between background checkpoints; `None` disables them.
    pub checkpoint_interval: Option<Duration>,
    /// Seed for the worker RNGs.
    pub seed: u64,
}

impl Default for StressConfig {
    fn default() -> Self {
        Self {
            transfers_per_thread: 500,
            threads: 4,
            accounts: 16,
            initial_balance: 1_000,
            lock_timeout: Duration::from_millis(50),
            checkpoint_interval: Some(Duration::from_millis(5)),
            seed: 0x5eed,
        }
    }
}

impl StressConfig {
    /// Sum of all balances the workload must preserve.
    pub fn expected_total(&self) -> u64 {
        u64::from(self.accounts) * u64::from(self.initial_balance)
    }
}

/// Creates a primary store holding the configured accounts.
///
/// Transfers need two distinct accounts, so fewer than two is rejected.
pub fn transfer_store(config: &StressConfig) -> CoreResult<Store<u32, u32>> {
    init_tracing();
    if config.accounts < 2 {
        return Err(CoreError::invalid_operation(format!(
            "transfer workload needs at least 2 accounts, got {}",
            config.accounts
        )));
    }
    let store = Store::new(Config::default(), Arc::new(ReplicaStatus::primary()));
    let mut txn = store.begin();
    for account in 0..config.accounts {
        txn.add(account, config.initial_balance, config.lock_timeout)?;
    }
    txn.commit()?;
    Ok(store)
}

/// Sums every balance in one snapshot transaction.
pub fn total_balance(store: &Store<u32, u32>, accounts: u32, timeout: Duration) -> CoreResult<u64> {
    let mut txn = store.begin_with(IsolationLevel::Snapshot);
    let mut total = 0u64;
    for account in 0..accounts {
        total += u64::from(txn.conditional_get(&account, timeout)?.unwrap_or(0));
    }
    txn.commit()?;
    Ok(total)
}

fn transfer(
    store: &Store<u32, u32>,
    from: u32,
    to: u32,
    amount: u32,
    timeout: Duration,
) -> CoreResult<bool> {
    if from == to {
        return Ok(false);
    }
    let mut txn = store.begin_with(IsolationLevel::ReadRepeatable);
    let source = txn.conditional_get(&from, timeout)?.unwrap_or(0);
    if source < amount {
        txn.abort();
        return Ok(false);
    }
    let target = txn.conditional_get(&to, timeout)?.unwrap_or(0);
    txn.conditional_update(from, source - amount, timeout)?;
    txn.conditional_update(to, target + amount, timeout)?;
    txn.commit()?;
    Ok(true)
}

/// Runs concurrent transfers, optionally with background checkpoints.
///
/// Lock timeouts count as failed transactions; any other error is returned.
pub fn stress_transfers(
    store: &Store<u32, u32>,
    config: &StressConfig,
) -> CoreResult<StressTestResult> {
    let successful = Arc::new(AtomicUsize::new(0));
    let failed = Arc::new(AtomicUsize::new(0));
    let timeouts = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));
    let start = Instant::now();

    let checkpointer = config.checkpoint_interval.map(|interval| {
        let store = store.clone();
        let done = Arc::clone(&done);
        thread::spawn(move || -> CoreResult<usize> {
            let mut completed = 0;
            loop {
                store.checkpoint()?;
                completed += 1;
                if done.load(Ordering::Acquire) {
                    return Ok(completed);
                }
                thread::sleep(interval);
            }
        })
    });

    let workers: Vec<_> = (0..config.threads)
        .map(|t| {
            let store = store.clone();
            let successful = Arc::clone(&successful);
            let failed = Arc::clone(&failed);
            let timeouts = Arc::clone(&timeouts);
            let config = config.clone();

            thread::spawn(move || -> CoreResult<()> {
                let mut rng = StdRng::seed_from_u64(config.seed.wrapping_add(t as u64));
                for _ in 0..config.transfers_per_thread {
                    let from = rng.gen_range(0..config.accounts);
                    let to = (from + rng.gen_range(1..config.accounts.max(2))) % config.accounts;
                    let amount = rng.gen_range(1..=config.initial_balance / 10 + 1);

                    match transfer(&store, from, to, amount, config.lock_timeout) {
                        Ok(_) => {
                            successful.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(CoreError::LockTimeout { .. }) => {
                            timeouts.fetch_add(1, Ordering::Relaxed);
                            failed.fetch_add(1, Ordering::Relaxed);
                        }
                        Err(error) => return Err(error),
                    }
                }
                Ok(())
            })
        })
        .collect();

    let mut outcome = Ok(());
    for worker in workers {
        let result = worker.join().expect("Worker thread panicked");
        if outcome.is_ok() {
            outcome = result;
        }
    }
    done.store(true, Ordering::Release);

    let checkpoints = match checkpointer {
        Some(handle) => handle.join().expect("Checkpoint thread panicked")?,
        None => 0,
    };
    outcome?;

    Ok(StressTestResult::new(
        successful.load(Ordering::Relaxed),
        failed.load(Ordering::Relaxed),
        timeouts.load(Ordering::Relaxed),
        checkpoints,
        start.elapsed(),
    ))
}

/// Runs snapshot readers concurrently with transfers and checks that each
/// snapshot sees the invariant total.
///
/// Returns the transfer result and the number of snapshots verified.
pub fn stress_snapshot_consistency(
    store: &Store<u32, u32>,
    config: &StressConfig,
    readers: usize,
) -> CoreResult<(StressTestResult, usize)> {
    let done = Arc::new(AtomicBool::new(false));
    let verified = Arc::new(AtomicUsize::new(0));

    let reader_handles: Vec<_> = (0..readers)
        .map(|_| {
            let store = store.clone();
            let done = Arc::clone(&done);
            let verified = Arc::clone(&verified);
            let accounts = config.accounts;
            let expected = config.expected_total();
            let timeout = config.lock_timeout;

            thread::spawn(move || -> CoreResult<()> {
                while !done.load(Ordering::Acquire) {
                    let total = total_balance(&store, accounts, timeout)?;
                    if total != expected {
                        return Err(CoreError::invalid_operation(format!(
                            "snapshot saw total {total}, expected {expected}"
                        )));
                    }
                    verified.fetch_add(1, Ordering::Relaxed);
                }
                Ok(())
            })
        })
        .collect();

    let result = stress_transfers(store, config);
    done.store(true, Ordering::Release);

    for handle in reader_handles {
        handle.join().expect("Reader thread panicked")?;
    }
    Ok((result?, verified.load(Ordering::Relaxed)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn small() -> StressConfig {
        StressConfig {
            transfers_per_thread: 50,
            threads: 2,
            accounts: 4,
            ..StressConfig::default()
        }
    }

    #[test]
    fn transfers_preserve_total() {
        let config = small();
        let store = transfer_store(&config).unwrap();
        let result = stress_transfers(&store, &config).unwrap();

        assert_eq!(result.total_ops, config.threads * config.transfers_per_thread);
        assert_eq!(
            total_balance(&store, config.accounts, config.lock_timeout).unwrap(),
            config.expected_total()
        );
        assert_eq!(store.locked_keys(), 0);
    }

    #[test]
    fn single_account_workload_is_rejected() {
        let config = StressConfig {
            accounts: 1,
            ..small()
        };
        assert!(matches!(
            transfer_store(&config),
            Err(CoreError::InvalidOperation { .. })
        ));
    }

    #[test]
    fn transfer_to_same_account_moves_nothing() {
        let config = small();
        let store = transfer_store(&config).unwrap();
        let moved = transfer(&store, 2, 2, 10, config.lock_timeout).unwrap();
        assert!(!moved);
        assert_eq!(
            total_balance(&store, config.accounts, config.lock_timeout).unwrap(),
            config.expected_total()
        );
    }

    #[test]
    fn transfer_refuses_overdraft() {
        let config = small();
        let store = transfer_store(&config).unwrap();
        let amount = config.initial_balance + 1;
        let moved = transfer(&store, 0, 1, amount, config.lock_timeout).unwrap();
        assert!(!moved);
        assert_eq!(store.stats().aborts, 1);
    }
}
