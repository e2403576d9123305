use crate::{
    error::{DbError, ErrorKind},
    rptree::cursor::{CursorState, RptCursor, SeekState, StackFrame},
    storage::{page::PageKind, DataList, InnerNode, RptRoot},
    types::{BSize, DbResult, PSize, PGNO_NULL},
};

fn tree_mask() -> u16 {
    PageKind::DataList.bit() | PageKind::InnerNode.bit()
}

impl RptCursor {
    /// `UNSEEKED -> SEEKING`. Refreshes the tree metadata, creating
    /// the first leaf when `create_root` is set and the tree is
    /// empty. Offsets past the end clamp to the end.
    pub fn start_seek(&mut self, loc: BSize, create_root: bool) -> DbResult {
        match self.state {
            CursorState::Unseeked => {}
            ref s => {
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("seek from state {}", s.name()),
                ));
            }
        }

        self.refresh_meta()?;

        if self.root == PGNO_NULL {
            if !create_root {
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    "seek on an empty tree",
                ));
            }
            let tx = self.require_tx()?;

            let mut leaf = self.pager.new_page(&tx, PageKind::DataList)?;
            let leaf_pg = leaf.pgno();
            self.pager.save(&mut leaf)?;

            let mut rr = self
                .pager
                .get_writable(&tx, PageKind::RptRoot.bit(), self.meta_root)?;
            rr.write().rr_set_root(leaf_pg);
            self.pager.save(&mut rr)?;
            self.pager.release(rr);

            self.root = leaf_pg;
            self.total_size = 0;
            self.cur = Some(leaf);
            self.lidx = 0;
            self.state = CursorState::Seeked;
            return Ok(());
        }

        let cur = self.pager.get(tree_mask(), self.root)?;
        self.cur = Some(cur);
        self.state = CursorState::Seeking(SeekState {
            remaining: loc.min(self.total_size),
            cur_total: self.total_size,
        });
        Ok(())
    }

    /// One descent step: on an inner node, pick a child and push the
    /// node onto the stack; on a leaf, land and go `SEEKED`.
    pub fn seeking_execute(&mut self) -> DbResult {
        let (remaining, cur_total) = match &self.state {
            CursorState::Seeking(s) => (s.remaining, s.cur_total),
            s => {
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("seeking_execute from state {}", s.name()),
                ));
            }
        };

        let result = self.seek_step(remaining, cur_total);
        if result.is_err() {
            self.fail_release();
        }
        result
    }

    fn seek_step(&mut self, remaining: BSize, cur_total: BSize) -> DbResult {
        let cur = self.cur.as_ref().expect("seeking cursor holds a page");

        let kind = cur.read().get_kind();
        match kind {
            Some(PageKind::DataList) => {
                let used = cur.read().dl_used() as BSize;
                self.lidx = remaining.min(used) as PSize;
                self.state = CursorState::Seeked;
                Ok(())
            }
            Some(PageKind::InnerNode) => {
                let (idx, left, child, child_total) = {
                    let page = cur.read();
                    let idx = page.in_choose_child(remaining);
                    let left = page.in_left_of(idx);
                    let child = page.in_get_child(idx);
                    let child_total = page.in_child_size(idx, cur_total);
                    (idx, left, child, child_total)
                };

                let handle = self.cur.take().unwrap();
                self.push_frame(StackFrame {
                    handle,
                    idx,
                    total: cur_total,
                })?;

                self.cur = Some(self.pager.get(tree_mask(), child)?);
                self.state = CursorState::Seeking(SeekState {
                    remaining: remaining - left,
                    cur_total: child_total,
                });
                Ok(())
            }
            other => Err(DbError::new(
                ErrorKind::RptreeInvalid,
                &format!("descent hit a {:?} page", other),
            )),
        }
    }

    /// Drive the seek machine to `SEEKED`.
    pub(crate) fn seek_to(&mut self, loc: BSize, create_root: bool) -> DbResult {
        self.start_seek(loc, create_root)?;
        while matches!(self.state, CursorState::Seeking(_)) {
            self.seeking_execute()?;
        }
        Ok(())
    }
}
