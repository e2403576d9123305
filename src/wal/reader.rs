use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom},
    path::Path,
};

use log::debug;

use crate::{
    error::DbError,
    types::{DbResult, Lsn},
    wal::record::{RecordBody, WalRecord, WAL_HEADER_LEN},
};

/// Forward record stream over the WAL file. An incomplete record at
/// the tail (a crash mid-flush) is truncated away; a checksum
/// mismatch in the middle of the log is corruption.
pub struct WalReader {
    file: File,
    pos: Lsn,
    len: u64,
}

impl WalReader {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let file = OpenOptions::new().read(true).write(true).open(path)?;
        let len = file.metadata()?.len();
        Ok(Self { file, pos: 0, len })
    }

    pub fn seek(&mut self, lsn: Lsn) -> DbResult {
        if lsn > self.len {
            return Err(DbError::corrupt(&format!(
                "wal seek to {} past end {}",
                lsn, self.len
            )));
        }
        self.pos = lsn;
        Ok(())
    }

    pub fn pos(&self) -> Lsn {
        self.pos
    }

    /// Read the record starting at the current position. Returns
    /// `None` at end of log (including after tail truncation).
    pub fn next_record(&mut self) -> Result<Option<WalRecord>, DbError> {
        if self.pos >= self.len {
            return Ok(None);
        }

        let mut header = [0u8; WAL_HEADER_LEN];
        if !self.read_exact_or_truncate(self.pos, &mut header)? {
            return Ok(None);
        }

        let tag = header[0];
        if !RecordBody::is_known_tag(tag) {
            return Err(DbError::corrupt(&format!(
                "unknown wal record tag {} at lsn {}",
                tag, self.pos
            )));
        }

        // Variable-length payloads carry a length prefix right after
        // the header.
        let payload_len = match RecordBody::fixed_payload_len(tag) {
            Some(n) => n,
            None => {
                let mut lenbuf = [0u8; 4];
                if !self.read_exact_or_truncate(self.pos + WAL_HEADER_LEN as u64, &mut lenbuf)? {
                    return Ok(None);
                }
                4 + u32::from_le_bytes(lenbuf) as usize
            }
        };

        let total = WAL_HEADER_LEN + payload_len + 4;
        let mut image = vec![0u8; total];
        if !self.read_exact_or_truncate(self.pos, &mut image)? {
            return Ok(None);
        }

        let rec = WalRecord::decode(&image, self.pos)?;
        self.pos += total as u64;
        Ok(Some(rec))
    }

    /// Read `dest.len()` bytes at `at`. A short read means a torn
    /// tail: truncate the file back to the current record boundary
    /// and report end-of-log.
    fn read_exact_or_truncate(&mut self, at: u64, dest: &mut [u8]) -> Result<bool, DbError> {
        if at + dest.len() as u64 > self.len {
            self.truncate_tail()?;
            return Ok(false);
        }
        self.file.seek(SeekFrom::Start(at))?;
        self.file.read_exact(dest)?;
        Ok(true)
    }

    fn truncate_tail(&mut self) -> DbResult {
        debug!("truncating torn wal tail: {} -> {}", self.len, self.pos);
        self.file.set_len(self.pos)?;
        self.file.sync_data()?;
        self.len = self.pos;
        Ok(())
    }
}
