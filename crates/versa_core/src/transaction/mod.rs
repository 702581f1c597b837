//! Store transactions.
//!
//! Two isolation levels are offered:
//! - **ReadRepeatable**: reads lock the key and see the latest committed
//!   version; the lock is held until the transaction ends
//! - **Snapshot**: reads never lock and see the store as of the
//!   transaction's first operation
//!
//! Writes always take the key lock, whatever the isolation level.

mod coordinator;
mod handle;
mod state;

pub(crate) use coordinator::TransactionCoordinator;
pub use handle::StoreTransaction;
pub use state::TransactionStatus;
