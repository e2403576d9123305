use crate::{
    consts::{DL_DATA_SIZE, MAX_NUPD_SIZE},
    error::{DbError, ErrorKind},
    rptree::{
        cursor::{CursorState, InsertState, RebalanceState, RptCursor},
        InPair, NodeUpdates,
    },
    storage::{page::PageKind, DataList},
    types::{BSize, DbResult, PSize},
    utils::SliceReader,
};

impl RptCursor {
    /// `SEEKED -> DL_INSERTING`. The right half of the seeked leaf
    /// moves into a scratch buffer; source bytes then fill forward
    /// from the seek point, spilling into freshly allocated leaves,
    /// and the scratch tail lands last.
    pub fn seeked_to_insert(&mut self, max_write: BSize) -> DbResult {
        if !matches!(self.state, CursorState::Seeked) {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("insert from state {}", self.state.name()),
            ));
        }
        let tx = self.require_tx()?;

        let cur = self.cur.as_mut().expect("seeked cursor holds a leaf");
        self.pager.make_writable(&tx, cur)?;

        let (temp, right_pg) = {
            let mut page = cur.write();
            (page.dl_split_off(self.lidx), page.dl_get_next())
        };

        self.state = CursorState::DlInserting(InsertState {
            max_write,
            total_written: 0,
            temp,
            temp_written: 0,
            right_pg,
            made_leaves: false,
            updates: Vec::new(),
        });
        Ok(())
    }

    /// Fill the current leaf from the source (then from the stashed
    /// tail); when it fills up, thread a fresh leaf into the chain
    /// and continue there.
    pub fn insert_execute(&mut self, src: &mut SliceReader) -> DbResult {
        let mut st = match std::mem::replace(&mut self.state, CursorState::Permissive) {
            CursorState::DlInserting(st) => st,
            s => {
                self.state = s;
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("insert_execute from state {}", self.state.name()),
                ));
            }
        };

        match self.insert_step(&mut st, src) {
            Ok(true) => self.insert_to_rebalancing(st),
            Ok(false) => {
                self.state = CursorState::DlInserting(st);
                Ok(())
            }
            Err(e) => {
                self.fail_release();
                Err(e)
            }
        }
    }

    fn insert_step(&mut self, st: &mut InsertState, src: &mut SliceReader) -> Result<bool, DbError> {
        let cur = self.cur.as_ref().expect("inserting cursor holds a leaf");

        {
            let mut page = cur.write();

            // Source bytes first, bounded by the chunk budget.
            loop {
                let budget = (st.max_write - st.total_written) as usize;
                let n = page
                    .dl_avail()
                    .min(src.remaining().min(budget) as PSize);
                if n == 0 {
                    break;
                }
                let appended = page.dl_append(src.take(n as usize));
                st.total_written += appended as BSize;
            }

            // Then the stashed right half.
            if src.is_empty() || st.total_written == st.max_write {
                let n = page
                    .dl_avail()
                    .min((st.temp.len() - st.temp_written) as PSize);
                if n > 0 {
                    page.dl_append(&st.temp[st.temp_written..st.temp_written + n as usize]);
                    st.temp_written += n as usize;
                }
            }
        }

        let src_done = src.is_empty() || st.total_written == st.max_write;
        if src_done && st.temp_written == st.temp.len() {
            return Ok(true);
        }

        // Leaf is full with bytes still pending: allocate the next
        // leaf and splice it in after the current one.
        // The chunk budget plus the stashed tail bound the fresh
        // leaves one rebalance must absorb.
        assert_eq!(cur.read().dl_avail(), 0);
        assert!(
            st.updates.len() <= MAX_NUPD_SIZE + 2,
            "insert chunk created more leaves than one rebalance can carry"
        );

        let tx = self.require_tx()?;
        let fresh = self.pager.new_page(&tx, PageKind::DataList)?;
        {
            let mut page = fresh.write();
            page.dl_set_prev(cur.pgno());
            page.dl_set_next(st.right_pg);
        }

        let mut old = self.cur.take().unwrap();
        old.write().dl_set_next(fresh.pgno());
        st.updates.push(InPair {
            pg: old.pgno(),
            size: DL_DATA_SIZE as BSize,
        });
        st.made_leaves = true;
        self.pager.save(&mut old)?;
        self.pager.release(old);

        self.cur = Some(fresh);
        self.lidx = 0;
        Ok(false)
    }

    /// `DL_INSERTING -> IN_REBALANCING`: close out the last leaf,
    /// repair the right neighbor's back pointer, and hand the
    /// `(page, size)` run to the rebalance walk.
    fn insert_to_rebalancing(&mut self, mut st: InsertState) -> DbResult {
        let mut cur = self.cur.take().expect("inserting cursor holds a leaf");

        st.updates.push(InPair {
            pg: cur.pgno(),
            size: cur.read().dl_used() as BSize,
        });
        self.pager.save(&mut cur)?;

        if st.made_leaves && st.right_pg != crate::types::PGNO_NULL {
            let tx = self.require_tx()?;
            let mut right =
                self.pager
                    .get_writable(&tx, PageKind::DataList.bit(), st.right_pg)?;
            right.write().dl_set_prev(cur.pgno());
            self.pager.save(&mut right)?;
            self.pager.release(right);
        }

        self.pager.release(cur);

        self.total_size += st.total_written;
        self.last_op_bytes = st.total_written;
        self.state = CursorState::InRebalancing(RebalanceState {
            updates: NodeUpdates::replacing_self(st.updates),
        });
        Ok(())
    }
}
