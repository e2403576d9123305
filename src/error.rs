use std::{error::Error, fmt};

use log::error;

/// The outcome classes an operation can fail with. Kinds are part of
/// the public contract; the message attached to a `DbError` is for
/// humans only.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// OS-level file error.
    Io,
    /// Checksum, header or invariant check failed.
    Corrupt,
    /// Allocator exhausted.
    NoMem,
    /// Arithmetic on a size would overflow.
    Arith,
    /// The data file reached its maximum page count.
    PagerFull,
    /// The transaction table cap was reached.
    TxnFull,
    /// The dirty page table cap was reached.
    DpgtFull,
    /// The lock table cap was reached.
    VlocktFull,
    /// Requested page is past the end of the file.
    PgOutOfRange,
    /// Unknown transaction id.
    NoTxn,
    /// Caller precondition violated.
    InvalidArgument,
    /// Commit called twice on the same transaction.
    DuplicateCommit,
    /// Cursor descent exceeded the page stack depth.
    RptreePageStackOverflow,
    /// A rope tree invariant is broken.
    RptreeInvalid,
}

#[derive(Debug, Clone)]
pub struct DbError {
    kind: ErrorKind,
    details: String,
}

impl DbError {
    pub fn new(kind: ErrorKind, msg: &str) -> DbError {
        DbError {
            kind,
            details: msg.to_string(),
        }
    }

    pub fn corrupt(msg: &str) -> DbError {
        DbError::new(ErrorKind::Corrupt, msg)
    }

    pub fn io(msg: &str) -> DbError {
        DbError::new(ErrorKind::Io, msg)
    }

    pub fn kind(&self) -> ErrorKind {
        self.kind
    }

    pub fn show_backtrace(&self) {
        let bt = backtrace::Backtrace::new();
        error!("{}, backtrace:\n{:?}", self, bt);
    }
}

impl fmt::Display for DbError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "[{:?}] {}", self.kind, self.details)
    }
}

impl Error for DbError {}

impl From<std::io::Error> for DbError {
    fn from(e: std::io::Error) -> Self {
        DbError::new(ErrorKind::Io, &e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_is_preserved() {
        let e = DbError::new(ErrorKind::PgOutOfRange, "page 42 >= npages 10");
        assert_eq!(e.kind(), ErrorKind::PgOutOfRange);
        assert!(e.to_string().contains("page 42"));
    }
}
