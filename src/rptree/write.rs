use crate::{
    error::{DbError, ErrorKind},
    rptree::cursor::{CursorState, Phase, RptCursor, WriteState},
    storage::{page::PageKind, DataList},
    types::{DbResult, PSize, PGNO_NULL},
    utils::SliceReader,
};

impl RptCursor {
    /// `SEEKED -> DL_WRITING`. Overwrites elements in place: `bsize`
    /// bytes copied from the source, then `stride - 1` elements
    /// skipped, repeating until the source drains.
    pub fn seeked_to_write(&mut self, bsize: u32, stride: u32) -> DbResult {
        if !matches!(self.state, CursorState::Seeked) {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("write from state {}", self.state.name()),
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

        self.state = CursorState::DlWriting(WriteState {
            bsize,
            stride,
            bnext: bsize as u64,
            total_written: 0,
            phase: Phase::Active,
        });
        Ok(())
    }

    /// Overwrite within the current leaf, then advance. At the end
    /// of the sequence the bytes written must land on an element
    /// boundary.
    pub fn write_execute(&mut self, src: &mut SliceReader) -> DbResult {
        let mut st = match std::mem::replace(&mut self.state, CursorState::Permissive) {
            CursorState::DlWriting(st) => st,
            s => {
                self.state = s;
                return Err(DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("write_execute from state {}", self.state.name()),
                ));
            }
        };

        match self.write_step(&mut st, src) {
            Ok(true) => self.write_to_unseeked(st),
            Ok(false) => {
                self.state = CursorState::DlWriting(st);
                Ok(())
            }
            Err(e) => {
                self.fail_release();
                Err(e)
            }
        }
    }

    fn write_step(&mut self, st: &mut WriteState, src: &mut SliceReader) -> Result<bool, DbError> {
        let next_pg;
        {
            let cur = self.cur.as_ref().expect("writing cursor holds a leaf");
            let mut page = cur.write();
            let used = page.dl_used();
            next_pg = page.dl_get_next();

            while self.lidx < used && !src.is_empty() {
                let in_page = (used - self.lidx) as u64;
                match st.phase {
                    Phase::Active => {
                        let n = st.bnext.min(in_page).min(src.remaining() as u64);
                        let bytes = src.take(n as usize);
                        page.dl_write_at(self.lidx, bytes);
                        st.total_written += n;
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

        if src.is_empty() {
            return Ok(true);
        }

        if next_pg == PGNO_NULL {
            // Ran off the end with source bytes left. Mid-element it
            // means the sequence no longer holds whole elements;
            // between elements the caller's range was bad. The
            // façade's span validation rejects both up front.
            if st.total_written % st.bsize as u64 != 0 {
                return Err(DbError::corrupt(&format!(
                    "wrote {} bytes to the end of the sequence but elements are {} bytes",
                    st.total_written, st.bsize
                )));
            }
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!(
                    "write ran past the end of the sequence with {} source bytes left",
                    src.remaining()
                ),
            ));
        }

        // Log the finished page, move the exclusive claim forward.
        let tx = self.require_tx()?;
        let mut old = self.cur.take().unwrap();
        self.pager.save(&mut old)?;
        self.pager.release(old);
        self.cur = Some(
            self.pager
                .get_writable(&tx, PageKind::DataList.bit(), next_pg)?,
        );
        self.lidx = 0;
        Ok(false)
    }

    /// `DL_WRITING -> UNSEEKED`: log the last touched page and drop
    /// the descent path.
    fn write_to_unseeked(&mut self, st: WriteState) -> DbResult {
        let mut cur = self.cur.take().expect("writing cursor holds a leaf");
        self.pager.save(&mut cur)?;
        self.pager.release(cur);

        self.last_op_bytes = st.total_written;
        self.state = CursorState::Permissive;
        self.pop_all();
        Ok(())
    }
}
