use std::sync::Arc;

use log::debug;

use crate::{
    consts::PAGE_STACK_DEPTH,
    error::{DbError, ErrorKind},
    pager::{PageHandle, Pager},
    rptree::NodeUpdates,
    storage::{page::PageKind, RptRoot},
    transaction::Transaction,
    types::{BSize, DbResult, PSize, Pgno},
};

/// One frame of the descent path: a latched inner node, the child
/// index the descent took, and the node's own subtree byte total
/// (carried down from the parent so rightmost-child sizes stay
/// computable).
pub(crate) struct StackFrame {
    pub handle: PageHandle,
    pub idx: PSize,
    pub total: BSize,
}

/// Scratch for the strided read/write/remove machines: how many
/// bytes remain in the current run and whether the run copies or
/// skips.
#[derive(Debug, Clone, Copy, PartialEq)]
pub(crate) enum Phase {
    Active,
    Skipping,
}

#[derive(Debug)]
pub struct SeekState {
    pub(crate) remaining: BSize,
    pub(crate) cur_total: BSize,
}

#[derive(Debug)]
pub struct ReadState {
    pub(crate) bsize: u32,
    pub(crate) stride: u32,
    pub(crate) bnext: u64,
    pub(crate) remaining_active: BSize,
    pub(crate) total_read: BSize,
    pub(crate) phase: Phase,
}

#[derive(Debug)]
pub struct WriteState {
    pub(crate) bsize: u32,
    pub(crate) stride: u32,
    pub(crate) bnext: u64,
    pub(crate) total_written: BSize,
    pub(crate) phase: Phase,
}

pub struct InsertState {
    pub(crate) max_write: BSize,
    pub(crate) total_written: BSize,
    // Right half of the seeked leaf, re-appended after the source
    // drains.
    pub(crate) temp: Vec<u8>,
    pub(crate) temp_written: usize,
    pub(crate) right_pg: Pgno,
    pub(crate) made_leaves: bool,
    pub(crate) updates: Vec<crate::rptree::InPair>,
}

/// Cross-chunk scan state of a strided removal. The façade re-seeks
/// between leaves; the run phase carries over so elements spanning a
/// leaf boundary come out whole.
#[derive(Debug, Clone, Copy)]
pub(crate) struct StrideScan {
    pub bnext: u64,
    pub phase: Phase,
    pub remaining_active: BSize,
    pub total_removed: BSize,
    pub total_skipped: BSize,
    pub hit_eof: bool,
}

pub struct RemoveState {
    pub(crate) bsize: u32,
    pub(crate) stride: u32,
    pub(crate) scan: StrideScan,
}

pub struct RebalanceState {
    pub(crate) updates: NodeUpdates,
}

/// The cursor's sub-state machine discriminator, with per-state
/// scratch riding along. `execute` calls resume whichever machine is
/// active and return at page boundaries.
pub enum CursorState {
    Unseeked,
    Seeking(SeekState),
    Seeked,
    DlInserting(InsertState),
    DlRemoving(RemoveState),
    InRebalancing(RebalanceState),
    DlReading(ReadState),
    DlWriting(WriteState),
    Permissive,
}

impl CursorState {
    pub fn name(&self) -> &'static str {
        match self {
            CursorState::Unseeked => "UNSEEKED",
            CursorState::Seeking(_) => "SEEKING",
            CursorState::Seeked => "SEEKED",
            CursorState::DlInserting(_) => "DL_INSERTING",
            CursorState::DlRemoving(_) => "DL_REMOVING",
            CursorState::InRebalancing(_) => "IN_REBALANCING",
            CursorState::DlReading(_) => "DL_READING",
            CursorState::DlWriting(_) => "DL_WRITING",
            CursorState::Permissive => "PERMISSIVE",
        }
    }
}

/// A cursor over one variable's rope tree. All mutation flows
/// through the explicit state machine: seek to a byte offset, enter
/// a sub-state, drive `execute` steps until the cursor returns to
/// `UNSEEKED`.
pub struct RptCursor {
    pub(crate) pager: Arc<Pager>,
    pub(crate) tx: Option<Transaction>,
    /// The RPT_ROOT page naming this tree.
    pub(crate) meta_root: Pgno,
    pub(crate) root: Pgno,
    pub(crate) total_size: BSize,
    /// Byte position within the current leaf.
    pub(crate) lidx: PSize,
    pub(crate) stack: Vec<StackFrame>,
    pub(crate) cur: Option<PageHandle>,
    pub(crate) state: CursorState,
    /// Bytes moved by the last completed read, for the façade.
    pub(crate) last_op_bytes: BSize,
    /// Cross-chunk carry of an in-flight strided removal.
    pub(crate) remove_scan: Option<StrideScan>,
}

impl RptCursor {
    /// Open a cursor over the tree named by an existing RPT_ROOT
    /// page.
    pub fn open(meta_root: Pgno, pager: Arc<Pager>) -> Result<Self, DbError> {
        let h = pager.get(PageKind::RptRoot.bit(), meta_root)?;
        let (root, total_size) = {
            let page = h.read();
            (page.rr_get_root(), page.rr_get_nbytes())
        };
        pager.release(h);

        Ok(Self {
            pager,
            tx: None,
            meta_root,
            root,
            total_size,
            lidx: 0,
            stack: Vec::new(),
            cur: None,
            state: CursorState::Unseeked,
            last_op_bytes: 0,
            remove_scan: None,
        })
    }

    /// Allocate a fresh, empty tree and open a cursor on it. Returns
    /// the cursor; the new RPT_ROOT page number is `meta_root()`.
    pub fn create(tx: &Transaction, pager: Arc<Pager>) -> Result<Self, DbError> {
        let mut h = pager.new_page(tx, PageKind::RptRoot)?;
        let meta_root = h.pgno();
        pager.save(&mut h)?;
        pager.release(h);
        debug!("new rope tree at rpt root {}", meta_root);

        let mut cursor = Self::open(meta_root, pager)?;
        cursor.tx = Some(tx.clone());
        Ok(cursor)
    }

    pub fn meta_root(&self) -> Pgno {
        self.meta_root
    }

    /// Total bytes under the tree, as of the last seek.
    pub fn total_size(&self) -> BSize {
        self.total_size
    }

    pub fn state_name(&self) -> &'static str {
        self.state.name()
    }

    pub fn enter_transaction(&mut self, tx: &Transaction) {
        assert!(matches!(self.state, CursorState::Unseeked));
        self.tx = Some(tx.clone());
    }

    pub fn leave_transaction(&mut self) {
        assert!(matches!(self.state, CursorState::Unseeked));
        self.tx = None;
    }

    /// A cursor must be driven back to `UNSEEKED` before closing.
    pub fn close(self) -> DbResult {
        match self.state {
            CursorState::Unseeked => Ok(()),
            ref s => Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("cursor closed in state {}", s.name()),
            )),
        }
    }

    pub(crate) fn require_tx(&self) -> Result<Transaction, DbError> {
        self.tx.clone().ok_or_else(|| {
            DbError::new(
                ErrorKind::InvalidArgument,
                "mutating cursor operation outside a transaction",
            )
        })
    }

    /// Refresh the cached root and total from the RPT_ROOT page.
    pub(crate) fn refresh_meta(&mut self) -> DbResult {
        let h = self.pager.get(PageKind::RptRoot.bit(), self.meta_root)?;
        {
            let page = h.read();
            self.root = page.rr_get_root();
            self.total_size = page.rr_get_nbytes();
        }
        self.pager.release(h);
        Ok(())
    }

    /// Release the whole descent path and return to `UNSEEKED`.
    pub(crate) fn pop_all(&mut self) {
        while let Some(frame) = self.stack.pop() {
            self.pager.release(frame.handle);
        }
        if let Some(h) = self.cur.take() {
            self.pager.release(h);
        }
        self.lidx = 0;
        self.state = CursorState::Unseeked;
    }

    /// Error path: drop every held handle so a failed operation
    /// cannot leak latches, then report the failure.
    pub(crate) fn fail_release(&mut self) {
        self.stack.clear();
        self.cur = None;
        self.lidx = 0;
        self.state = CursorState::Unseeked;
    }

    pub(crate) fn push_frame(&mut self, frame: StackFrame) -> DbResult {
        if self.stack.len() >= PAGE_STACK_DEPTH {
            return Err(DbError::new(
                ErrorKind::RptreePageStackOverflow,
                &format!("descent deeper than {} levels", PAGE_STACK_DEPTH),
            ));
        }
        self.stack.push(frame);
        Ok(())
    }
}
