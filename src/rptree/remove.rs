use crate::{
    consts::{DL_DATA_SIZE, DL_MERGE_THRESHOLD},
    error::{DbError, ErrorKind},
    rptree::{
        cursor::{CursorState, Phase, RebalanceState, RemoveState, RptCursor, StrideScan},
        InPair, NodeUpdates,
    },
    storage::{page::PageKind, DataList, InnerNode},
    types::{DbResult, PSize, Pgno, PGNO_NULL},
    utils::SliceWriter,
};

impl RptCursor {
    /// `SEEKED -> DL_REMOVING`. The scan state carries across chunk
    /// boundaries so an element spanning two leaves is cut out whole
    /// by consecutive chunks.
    pub(crate) fn seeked_to_remove(
        &mut self,
        scan: StrideScan,
        bsize: u32,
        stride: u32,
    ) -> DbResult {
        if !matches!(self.state, CursorState::Seeked) {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("remove from state {}", self.state.name()),
            ));
        }
        if bsize == 0 || stride == 0 {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "element size and stride must be positive",
            ));
        }
        let tx = self.require_tx()?;

        let cur = self.cur.as_mut().expect("seeked cursor holds a leaf");
        self.pager.make_writable(&tx, cur)?;

        self.state = CursorState::DlRemoving(RemoveState { bsize, stride, scan });
        Ok(())
    }

    /// Cut strided runs out of the current leaf. One chunk consumes
    /// at most this leaf; the façade re-seeks for the next one.
    /// Removed bytes are optionally copied out to `dest`.
    pub fn remove_execute(&mut self, dest: Option<&mut SliceWriter>) -> DbResult {
        let mut st = match std::mem::replace(&mut self.state, CursorState::Permissive) {
            CursorState::DlRemoving(st) => st,
            s => {
                self.state = s;
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("remove_execute from state {}", self.state.name()),
                ));
            }
        };

        match self.remove_step(&mut st, dest) {
            Ok(()) => self.remove_to_rebalancing(st),
            Err(e) => {
                self.fail_release();
                Err(e)
            }
        }
    }

    fn remove_step(&mut self, st: &mut RemoveState, mut dest: Option<&mut SliceWriter>) -> DbResult {
        let cur = self.cur.as_ref().expect("removing cursor holds a leaf");
        let mut page = cur.write();

        loop {
            let used = page.dl_used();
            if self.lidx >= used || st.scan.remaining_active == 0 {
                break;
            }
            let in_page = (used - self.lidx) as u64;

            match st.scan.phase {
                Phase::Active => {
                    let n = st.scan.bnext.min(in_page).min(st.scan.remaining_active);
                    if let Some(sink) = dest.as_mut() {
                        let start = self.lidx as usize;
                        sink.push(&page.dl_data()[start..start + n as usize]);
                    }
                    page.dl_remove_at(self.lidx, n as PSize);
                    st.scan.total_removed += n;
                    st.scan.remaining_active -= n;
                    st.scan.bnext -= n;
                    if st.scan.bnext == 0 {
                        let skip = (st.stride as u64 - 1) * st.bsize as u64;
                        if skip == 0 {
                            st.scan.bnext = st.bsize as u64;
                        } else {
                            st.scan.bnext = skip;
                            st.scan.phase = Phase::Skipping;
                        }
                    }
                }
                Phase::Skipping => {
                    let n = st.scan.bnext.min(in_page);
                    self.lidx += n as PSize;
                    st.scan.total_skipped += n;
                    st.scan.bnext -= n;
                    if st.scan.bnext == 0 {
                        st.scan.bnext = st.bsize as u64;
                        st.scan.phase = Phase::Active;
                    }
                }
            }
        }

        if page.dl_get_next() == PGNO_NULL && self.lidx >= page.dl_used() {
            st.scan.hit_eof = true;
        }
        Ok(())
    }

    /// `DL_REMOVING -> IN_REBALANCING`: merge an underfull leaf into
    /// a same-parent sibling (right preferred), tombstone emptied
    /// pages, and hand the survivors to the rebalance walk.
    fn remove_to_rebalancing(&mut self, st: RemoveState) -> DbResult {
        let tx = self.require_tx()?;
        let mut cur = self.cur.take().expect("removing cursor holds a leaf");
        let used = cur.read().dl_used() as usize;

        let updates;

        if used == 0 {
            self.unlink_leaf(&tx, &cur)?;
            self.pager.delete_and_release(&tx, cur)?;
            updates = NodeUpdates {
                repl: Vec::new(),
                lo_rel: 0,
                hi_rel: 0,
            };
        } else if !self.stack.is_empty() {
            updates = self.try_merge(&tx, cur, used)?;
        } else {
            let pair = InPair {
                pg: cur.pgno(),
                size: used as u64,
            };
            self.pager.save(&mut cur)?;
            self.pager.release(cur);
            updates = NodeUpdates::replacing_self(vec![pair]);
        }

        self.total_size -= st.scan.total_removed.min(self.total_size);
        self.last_op_bytes = st.scan.total_removed;
        self.remove_scan = Some(st.scan);
        self.state = CursorState::InRebalancing(RebalanceState { updates });
        Ok(())
    }

    /// Absorb a same-parent sibling. A pair merges when one of the
    /// two fell below the threshold and the combined payload fits;
    /// the right sibling is preferred.
    fn try_merge(
        &mut self,
        tx: &crate::transaction::Transaction,
        mut cur: crate::pager::PageHandle,
        used: usize,
    ) -> Result<NodeUpdates, DbError> {
        let top = self.stack.last().expect("merge needs a parent");
        let (nkeys, idx) = (top.handle.read().in_nkeys(), top.idx);

        // Right sibling under the same parent, if any.
        if idx < nkeys {
            let right_pg = top.handle.read().in_get_child(idx + 1);
            let right = self
                .pager
                .get_writable(tx, PageKind::DataList.bit(), right_pg)?;
            let right_used = right.read().dl_used() as usize;

            if (used < DL_MERGE_THRESHOLD || right_used < DL_MERGE_THRESHOLD)
                && used + right_used <= DL_DATA_SIZE
            {
                let right_next = right.read().dl_get_next();
                {
                    let mut page = cur.write();
                    let data = right.read().dl_data().to_vec();
                    page.dl_append(&data);
                    page.dl_set_next(right_next);
                }
                self.fix_prev(tx, right_next, cur.pgno())?;

                let pair = InPair {
                    pg: cur.pgno(),
                    size: (used + right_used) as u64,
                };
                self.pager.save(&mut cur)?;
                self.pager.release(cur);
                self.pager.delete_and_release(tx, right)?;
                return Ok(NodeUpdates {
                    repl: vec![pair],
                    lo_rel: 0,
                    hi_rel: 1,
                });
            }
            self.pager.release(right);
        }

        // Otherwise the left sibling.
        if idx > 0 {
            let left_pg = top.handle.read().in_get_child(idx - 1);
            let left = self
                .pager
                .get_writable(tx, PageKind::DataList.bit(), left_pg)?;
            let left_used = left.read().dl_used() as usize;

            if (used < DL_MERGE_THRESHOLD || left_used < DL_MERGE_THRESHOLD)
                && used + left_used <= DL_DATA_SIZE
            {
                let cur_next = cur.read().dl_get_next();
                let mut left = left;
                {
                    let mut page = left.write();
                    let data = cur.read().dl_data().to_vec();
                    page.dl_append(&data);
                    page.dl_set_next(cur_next);
                }
                self.fix_prev(tx, cur_next, left.pgno())?;

                let pair = InPair {
                    pg: left.pgno(),
                    size: (left_used + used) as u64,
                };
                self.pager.save(&mut left)?;
                self.pager.release(left);
                self.pager.delete_and_release(tx, cur)?;
                return Ok(NodeUpdates {
                    repl: vec![pair],
                    lo_rel: -1,
                    hi_rel: 0,
                });
            }
            self.pager.release(left);
        }

        // No mergeable neighbor; the shrunken leaf stands alone.
        let pair = InPair {
            pg: cur.pgno(),
            size: used as u64,
        };
        self.pager.save(&mut cur)?;
        self.pager.release(cur);
        Ok(NodeUpdates::replacing_self(vec![pair]))
    }

    /// Take an emptied leaf out of the sibling chain.
    fn unlink_leaf(
        &self,
        tx: &crate::transaction::Transaction,
        cur: &crate::pager::PageHandle,
    ) -> DbResult {
        let (prev_pg, next_pg) = {
            let page = cur.read();
            (page.dl_get_prev(), page.dl_get_next())
        };

        if prev_pg != PGNO_NULL {
            let mut prev = self
                .pager
                .get_writable(tx, PageKind::DataList.bit(), prev_pg)?;
            prev.write().dl_set_next(next_pg);
            self.pager.save(&mut prev)?;
            self.pager.release(prev);
        }
        if next_pg != PGNO_NULL {
            let mut next = self
                .pager
                .get_writable(tx, PageKind::DataList.bit(), next_pg)?;
            next.write().dl_set_prev(prev_pg);
            self.pager.save(&mut next)?;
            self.pager.release(next);
        }
        Ok(())
    }

    fn fix_prev(
        &self,
        tx: &crate::transaction::Transaction,
        pg: Pgno,
        new_prev: Pgno,
    ) -> DbResult {
        if pg == PGNO_NULL {
            return Ok(());
        }
        let mut h = self.pager.get_writable(tx, PageKind::DataList.bit(), pg)?;
        h.write().dl_set_prev(new_prev);
        self.pager.save(&mut h)?;
        self.pager.release(h);
        Ok(())
    }
}
