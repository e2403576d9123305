mod gr_lock;
mod lock_table;
mod threadpool;
mod tx;
mod txn_table;

pub use gr_lock::{compatible, GrLock, LockMode};
pub use lock_table::{LockTable, Resource, ResourceKind};
pub use threadpool::ThreadPool;
pub use tx::{Transaction, TxnState};
pub use txn_table::{TxnEntry, TxnTable};
