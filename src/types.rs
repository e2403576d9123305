use crate::error::DbError;

/// Page number: the index of a page in the data file.
pub type Pgno = u64;

/// Marker for "no page".
pub const PGNO_NULL: Pgno = u64::MAX;

/// Log sequence number: the byte offset at which a record starts in
/// the WAL file.
pub type Lsn = u64;

/// Transaction id, increases monotonically by 1.
pub type TxnId = u64;

/// A size measured within a single page.
pub type PSize = u32;

/// A size measured across a whole byte sequence.
pub type BSize = u64;

pub type DbResult = Result<(), DbError>;
