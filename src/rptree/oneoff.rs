//! The one-off façade: each call opens with a seek, drives the
//! relevant sub-state machine to a terminal state, and loops with
//! re-seeks until the requested byte range is processed. This is the
//! surface the higher layers call; the raw state machine is for
//! callers that need to interleave.

use crate::{
    consts::NUPD_MAX_DATA_LENGTH,
    error::{DbError, ErrorKind},
    rptree::cursor::{CursorState, Phase, RptCursor, StrideScan},
    types::{BSize, DbResult},
    utils::{SliceReader, SliceWriter},
};

/// Last byte (exclusive) a strided scan touches: element `k` starts
/// at `bstart + k * stride * bsize`, so the skip gaps count against
/// the sequence length even though they are never copied.
fn strided_span(bstart: BSize, bsize: u32, stride: u32, nelems: u64) -> BSize {
    if nelems == 0 {
        return bstart;
    }
    bstart + (nelems - 1) * stride as u64 * bsize as u64 + bsize as u64
}

impl RptCursor {
    /// Insert `src` at byte offset `bofst`, shifting everything
    /// after it right. Offsets past the end of the sequence are
    /// rejected.
    pub fn insert(&mut self, src: &[u8], bofst: BSize) -> DbResult {
        self.refresh_meta()?;
        if bofst > self.total_size {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!(
                    "byte offset {} exceeds total length {}",
                    bofst, self.total_size
                ),
            ));
        }

        let mut written: usize = 0;
        while written < src.len() || (src.is_empty() && written == 0) {
            let chunk = (src.len() - written).min(NUPD_MAX_DATA_LENGTH);

            let r = (|| -> DbResult {
                self.seek_to(bofst + written as BSize, true)?;
                self.seeked_to_insert(chunk as BSize)?;

                let mut reader = SliceReader::new(&src[written..written + chunk]);
                while matches!(self.state, CursorState::DlInserting(_)) {
                    self.insert_execute(&mut reader)?;
                }
                while matches!(self.state, CursorState::InRebalancing(_)) {
                    self.rebalance_execute()?;
                }
                Ok(())
            })();
            if let Err(e) = r {
                self.fail_release();
                return Err(e);
            }

            written += chunk;
            if src.is_empty() {
                break;
            }
        }
        Ok(())
    }

    /// Overwrite `src.len() / bsize` elements in place starting at
    /// byte `bstart`, touching every `stride`-th element.
    pub fn write(&mut self, src: &[u8], bsize: u32, bstart: BSize, stride: u32) -> DbResult {
        if bsize == 0 || stride == 0 || src.len() % bsize as usize != 0 {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "source must hold whole elements and stride must be positive",
            ));
        }

        self.refresh_meta()?;
        let nelems = (src.len() / bsize as usize) as u64;
        let span = strided_span(bstart, bsize, stride, nelems);
        if span > self.total_size {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!(
                    "byte range {} exceeds total length {}",
                    span, self.total_size
                ),
            ));
        }

        let r = (|| -> DbResult {
            self.seek_to(bstart, false)?;
            self.seeked_to_write(bsize, stride)?;

            let mut reader = SliceReader::new(src);
            while matches!(self.state, CursorState::DlWriting(_)) {
                self.write_execute(&mut reader)?;
            }
            Ok(())
        })();
        if let Err(e) = r {
            self.fail_release();
            return Err(e);
        }
        Ok(())
    }

    /// Read up to `dest.len() / bsize` elements starting at byte
    /// `bstart`, honoring `stride`. Returns the number of elements
    /// actually read; running off the end is not an error.
    pub fn read(
        &mut self,
        dest: &mut [u8],
        bsize: u32,
        bstart: BSize,
        stride: u32,
    ) -> Result<u64, DbError> {
        if bsize == 0 || stride == 0 || dest.len() % bsize as usize != 0 {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "destination must hold whole elements and stride must be positive",
            ));
        }

        self.refresh_meta()?;
        if self.total_size == 0 {
            return Ok(0);
        }
        let nelems = (dest.len() / bsize as usize) as u64;

        let r = (|| -> Result<u64, DbError> {
            self.seek_to(bstart, false)?;
            self.seeked_to_read(nelems, bsize, stride)?;

            let mut sink = SliceWriter::new(dest);
            while matches!(self.state, CursorState::DlReading(_)) {
                self.read_execute(&mut sink)?;
            }
            Ok(self.last_op_bytes / bsize as u64)
        })();
        match r {
            Ok(n) => Ok(n),
            Err(e) => {
                self.fail_release();
                Err(e)
            }
        }
    }

    /// Remove `nelems` elements starting at byte `bstart`, honoring
    /// `stride`; removed bytes are copied to `dest` when given.
    pub fn remove(
        &mut self,
        mut dest: Option<&mut [u8]>,
        bsize: u32,
        bstart: BSize,
        stride: u32,
        nelems: u64,
    ) -> DbResult {
        if bsize == 0 || stride == 0 {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "element size and stride must be positive",
            ));
        }

        self.refresh_meta()?;
        let span = strided_span(bstart, bsize, stride, nelems);
        if span > self.total_size {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!(
                    "byte range {} exceeds total length {}",
                    span, self.total_size
                ),
            ));
        }

        let mut sink = dest.take().map(SliceWriter::new);
        let mut scan = StrideScan {
            bnext: bsize as u64,
            phase: Phase::Active,
            remaining_active: nelems * bsize as u64,
            total_removed: 0,
            total_skipped: 0,
            hit_eof: false,
        };

        while scan.remaining_active > 0 && !scan.hit_eof {
            let r = (|| -> DbResult {
                self.seek_to(bstart + scan.total_skipped, false)?;
                self.seeked_to_remove(scan, bsize, stride)?;

                while matches!(self.state, CursorState::DlRemoving(_)) {
                    self.remove_execute(sink.as_mut())?;
                }
                while matches!(self.state, CursorState::InRebalancing(_)) {
                    self.rebalance_execute()?;
                }
                Ok(())
            })();
            if let Err(e) = r {
                self.fail_release();
                return Err(e);
            }

            scan = self.remove_scan.take().expect("removal leaves its scan state");
        }

        // The span was validated against the recorded total, so the
        // scan cannot legitimately run out of sequence first.
        if scan.remaining_active > 0 {
            return Err(DbError::corrupt(&format!(
                "sequence ended with {} bytes still to remove",
                scan.remaining_active
            )));
        }
        Ok(())
    }
}
