//! Storage core of an embedded numeric database.
//!
//! The crate stacks five subsystems: a page-indexed file store, a
//! write-ahead log with ARIES restart recovery, a buffer manager
//! with latched page frames, a granular lock table, and rope-
//! structured B+trees of raw byte sequences driven by an explicit
//! cursor state machine. Embedders talk to [`pager::Pager`] for
//! transactions and to [`rptree::RptCursor`] for the byte sequences
//! themselves.

pub mod consts;
pub mod error;
pub mod pager;
pub mod rptree;
pub mod storage;
pub mod transaction;
pub mod types;
pub mod utils;
pub mod variables;
pub mod wal;

pub use error::{DbError, ErrorKind};
pub use pager::{HandleMode, PageHandle, Pager, ROOT_PGNO, VHASH_PGNO};
pub use rptree::RptCursor;
pub use transaction::{LockMode, LockTable, Resource, ThreadPool, Transaction};
pub use types::{BSize, DbResult, Lsn, PSize, Pgno, TxnId, PGNO_NULL};
pub use variables::VarIndex;
