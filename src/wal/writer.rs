use std::{
    fs::{File, OpenOptions},
    io::{Seek, SeekFrom, Write},
    path::Path,
};

use bytes::BytesMut;
use log::debug;

use crate::{
    consts::WAL_BUFFER_CAP,
    error::DbError,
    types::{DbResult, Lsn},
};

/// Buffered append stream over the WAL file. Bytes accumulate in
/// memory until a flush; the LSN space is the byte offset space of
/// the file, so `next_lsn` is always `flushed + buffered`.
pub struct WalWriter {
    file: File,
    buffer: BytesMut,
    flushed_lsn: Lsn,
}

impl WalWriter {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let mut file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let len = file.seek(SeekFrom::End(0))?;

        Ok(Self {
            file,
            buffer: BytesMut::new(),
            flushed_lsn: len,
        })
    }

    pub fn next_lsn(&self) -> Lsn {
        self.flushed_lsn + self.buffer.len() as u64
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.flushed_lsn
    }

    /// Buffer one encoded record. Spills to disk when the buffer
    /// outgrows its cap, so a single record never partially commits.
    pub fn append(&mut self, record: &[u8]) -> DbResult {
        if self.buffer.len() + record.len() > WAL_BUFFER_CAP {
            self.flush_all()?;
        }
        self.buffer.extend_from_slice(record);
        Ok(())
    }

    /// Ensure the record starting at `lsn` is fully on disk. Flushed
    /// prefixes always end on a record boundary, so a start offset
    /// below `flushed_lsn` means the whole record made it out.
    pub fn flush_to(&mut self, lsn: Lsn) -> DbResult {
        assert!(
            lsn <= self.next_lsn(),
            "flush past the last written lsn: {} > {}",
            lsn,
            self.next_lsn()
        );

        if lsn >= self.flushed_lsn {
            self.flush_all()?;
        } else {
            // Interleaved flushes still need the fsync.
            self.file.sync_data()?;
        }
        Ok(())
    }

    pub fn flush_all(&mut self) -> DbResult {
        if !self.buffer.is_empty() {
            debug!(
                "wal flush: {} bytes at lsn {}",
                self.buffer.len(),
                self.flushed_lsn
            );
            self.file.seek(SeekFrom::Start(self.flushed_lsn))?;
            self.file.write_all(&self.buffer)?;
            self.flushed_lsn += self.buffer.len() as u64;
            self.buffer.clear();
        }
        self.file.sync_data()?;
        Ok(())
    }

    /// Drop buffered bytes without writing them. Simulates losing
    /// power before a flush.
    pub fn crash(&mut self) {
        self.buffer.clear();
    }
}
