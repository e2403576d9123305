use crate::{
    error::{DbError, ErrorKind},
    rptree::cursor::{CursorState, Phase, ReadState, RptCursor},
    storage::{page::PageKind, DataList},
    types::{BSize, DbResult, PSize, PGNO_NULL},
};

impl RptCursor {
    /// `SEEKED -> DL_READING`. Reads `nelems` elements of `bsize`
    /// bytes, skipping `stride - 1` elements between them.
    pub fn seeked_to_read(&mut self, nelems: BSize, bsize: u32, stride: u32) -> DbResult {
        if !matches!(self.state, CursorState::Seeked) {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("read from state {}", self.state.name()),
            ));
        }
        if bsize == 0 || stride == 0 {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "element size and stride must be positive",
            ));
        }

        self.last_op_bytes = 0;
        self.state = CursorState::DlReading(ReadState {
            bsize,
            stride,
            bnext: bsize as u64,
            remaining_active: nelems * bsize as BSize,
            total_read: 0,
            phase: Phase::Active,
        });
        Ok(())
    }

    /// Copy out of the current leaf until it is exhausted or the
    /// element budget is met; then advance or finish. Hitting the end
    /// of the sequence is not an error, the element count just comes
    /// up short.
    pub fn read_execute(&mut self, dest: &mut crate::utils::SliceWriter) -> DbResult {
        let mut st = match std::mem::replace(&mut self.state, CursorState::Permissive) {
            CursorState::DlReading(st) => st,
            s => {
                self.state = s;
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("read_execute from state {}", self.state.name()),
                ));
            }
        };

        let result = self.read_step(&mut st, dest);
        match result {
            Ok(done) => {
                if done {
                    self.last_op_bytes = st.total_read;
                    self.state = CursorState::Permissive;
                    self.pop_all();
                } else {
                    self.state = CursorState::DlReading(st);
                }
                Ok(())
            }
            Err(e) => {
                self.fail_release();
                Err(e)
            }
        }
    }

    fn read_step(
        &mut self,
        st: &mut ReadState,
        dest: &mut crate::utils::SliceWriter,
    ) -> Result<bool, DbError> {
        let next_pg;
        {
            let cur = self.cur.as_ref().expect("reading cursor holds a leaf");
            let page = cur.read();
            let used = page.dl_used();
            next_pg = page.dl_get_next();

            while self.lidx < used && st.remaining_active > 0 {
                let in_page = (used - self.lidx) as u64;
                match st.phase {
                    Phase::Active => {
                        let n = st.bnext.min(in_page).min(st.remaining_active);
                        let start = self.lidx as usize;
                        dest.push(&page.dl_data()[start..start + n as usize]);
                        st.total_read += n;
                        st.remaining_active -= n;
                        self.lidx += n as PSize;
                        st.bnext -= n;
                        if st.bnext == 0 {
                            let skip = (st.stride as u64 - 1) * st.bsize as u64;
                            if skip == 0 {
                                st.bnext = st.bsize as u64;
                            } else {
                                st.bnext = skip;
                                st.phase = Phase::Skipping;
                            }
                        }
                    }
                    Phase::Skipping => {
                        let n = st.bnext.min(in_page);
                        self.lidx += n as PSize;
                        st.bnext -= n;
                        if st.bnext == 0 {
                            st.bnext = st.bsize as u64;
                            st.phase = Phase::Active;
                        }
                    }
                }
            }
        }

        if st.remaining_active == 0 || next_pg == PGNO_NULL {
            // Element budget met, or end of the sequence.
            return Ok(true);
        }

        let old = self.cur.take().unwrap();
        self.pager.release(old);
        self.cur = Some(self.pager.get(PageKind::DataList.bit(), next_pg)?);
        self.lidx = 0;
        Ok(false)
    }
}
