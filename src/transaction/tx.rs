use core::fmt;

use crate::types::TxnId;

/// Transaction states, following the ARIES restart algorithm.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxnState {
    /// Normal forward processing; removed from the table at commit.
    Running,

    /// Seen during restart analysis without a commit record yet; if
    /// it stays like this the transaction is undone.
    CandidateForUndo,

    /// Restart analysis saw the commit record.
    Committed,

    /// Undo finished and the END record was appended; the entry is
    /// dropped right after.
    Done,
}

/// A lightweight handle on a live transaction. All bookkeeping lives
/// in the pager's transaction table; the handle is just the id.
#[derive(Clone, PartialEq, Eq)]
pub struct Transaction {
    id: TxnId,
}

impl Transaction {
    pub(crate) fn new(id: TxnId) -> Self {
        Self { id }
    }

    pub fn get_id(&self) -> TxnId {
        self.id
    }
}

impl std::hash::Hash for Transaction {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl fmt::Display for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "tx_{}", self.id)
    }
}

impl fmt::Debug for Transaction {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        return write!(f, "{}", self);
    }
}
