mod reader;
mod record;
mod writer;

pub use reader::WalReader;
pub use record::{RecordBody, WalRecord, WAL_HEADER_LEN};
pub use writer::WalWriter;

use std::{
    path::{Path, PathBuf},
    sync::Mutex,
};

use crate::{
    error::DbError,
    types::{DbResult, Lsn, TxnId},
};

/// The write-ahead log file: an append-only sequence of checksummed
/// records. Appends go through an in-memory buffer; reads always go
/// to disk, so callers that need to read back (rollback, recovery)
/// flush first.
pub struct WalFile {
    path: PathBuf,
    writer: Mutex<WalWriter>,
}

impl WalFile {
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let writer = WalWriter::open(&path)?;
        Ok(Self {
            path: path.as_ref().to_path_buf(),
            writer: Mutex::new(writer),
        })
    }

    /// Append a record, returning the LSN at which it begins. The
    /// record's `lsn` field is assigned here.
    pub fn write(&self, tid: TxnId, prev_lsn: Lsn, body: RecordBody) -> Result<Lsn, DbError> {
        let mut w = self.writer.lock().unwrap();
        let lsn = w.next_lsn();
        let rec = WalRecord {
            lsn,
            tid,
            prev_lsn,
            body,
        };
        w.append(&rec.encode())?;
        Ok(lsn)
    }

    /// Force everything up to and including `lsn` to disk.
    pub fn flush_to(&self, lsn: Lsn) -> DbResult {
        self.writer.lock().unwrap().flush_to(lsn)
    }

    pub fn flush_all(&self) -> DbResult {
        self.writer.lock().unwrap().flush_all()
    }

    pub fn next_lsn(&self) -> Lsn {
        self.writer.lock().unwrap().next_lsn()
    }

    pub fn flushed_lsn(&self) -> Lsn {
        self.writer.lock().unwrap().flushed_lsn()
    }

    /// Open a fresh forward reader over the flushed prefix of the
    /// log.
    pub fn reader(&self) -> Result<WalReader, DbError> {
        WalReader::open(&self.path)
    }

    /// Read the single record starting at `lsn`. The caller must
    /// have flushed at least that far.
    pub fn pread(&self, lsn: Lsn) -> Result<WalRecord, DbError> {
        let mut r = self.reader()?;
        r.seek(lsn)?;
        r.next_record()?
            .ok_or_else(|| DbError::corrupt(&format!("no wal record at lsn {}", lsn)))
    }

    /// Drop all buffered, unflushed bytes. Simulates power loss.
    pub fn crash(&self) {
        self.writer.lock().unwrap().crash();
    }

    /// Record-by-record dump of the flushed log, for debugging.
    pub fn depiction(&self) -> String {
        let mut out = String::new();
        let mut reader = match self.reader() {
            Ok(r) => r,
            Err(e) => return format!("<unreadable wal: {}>", e),
        };
        loop {
            match reader.next_record() {
                Ok(Some(rec)) => {
                    out.push_str(&format!("├── {}\n", rec.depiction()));
                }
                Ok(None) => break,
                Err(e) => {
                    out.push_str(&format!("├── <corrupt: {}>\n", e));
                    break;
                }
            }
        }
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::Page;

    fn temp_wal(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rope_db_wal_{}_{}.wal", name, std::process::id()));
        let _ = std::fs::remove_file(&p);
        p
    }

    #[test]
    fn test_write_flush_read_back() {
        let path = temp_wal("round_trip");
        let wal = WalFile::open(&path).unwrap();

        let begin = wal.write(1, 0, RecordBody::Begin).unwrap();
        let mut before = Page::new_zeroed();
        let mut after = Page::new_zeroed();
        before.raw_mut()[50] = 1;
        after.raw_mut()[50] = 2;
        let update = wal
            .write(
                1,
                begin,
                RecordBody::Update {
                    pg: 9,
                    before,
                    after,
                },
            )
            .unwrap();
        let commit = wal.write(1, update, RecordBody::Commit).unwrap();
        wal.flush_to(commit).unwrap();

        let mut reader = wal.reader().unwrap();
        let r1 = reader.next_record().unwrap().unwrap();
        assert_eq!(r1.lsn, begin);
        let r2 = reader.next_record().unwrap().unwrap();
        assert_eq!((r2.lsn, r2.prev_lsn), (update, begin));
        let r3 = reader.next_record().unwrap().unwrap();
        assert_eq!((r3.lsn, r3.prev_lsn), (commit, update));
        assert!(reader.next_record().unwrap().is_none());

        // Random access by lsn as well.
        let again = wal.pread(update).unwrap();
        match again.body {
            RecordBody::Update { pg, after, .. } => {
                assert_eq!(pg, 9);
                assert_eq!(after.raw()[50], 2);
            }
            _ => panic!("wrong record"),
        }
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_torn_tail_is_truncated() {
        let path = temp_wal("torn_tail");
        let first_len;
        {
            let wal = WalFile::open(&path).unwrap();
            let l1 = wal.write(1, 0, RecordBody::Begin).unwrap();
            let l2 = wal.write(1, l1, RecordBody::Commit).unwrap();
            wal.flush_all().unwrap();
            first_len = l2;
        }

        // Chop the second record in half, as a crash mid-write would.
        let len = std::fs::metadata(&path).unwrap().len();
        let f = std::fs::OpenOptions::new().write(true).open(&path).unwrap();
        f.set_len(first_len + (len - first_len) / 2).unwrap();
        drop(f);

        let wal = WalFile::open(&path).unwrap();
        let mut reader = wal.reader().unwrap();
        let r1 = reader.next_record().unwrap().unwrap();
        assert_eq!(r1.lsn, 0);
        assert!(reader.next_record().unwrap().is_none());

        // The torn bytes are gone from disk.
        assert_eq!(std::fs::metadata(&path).unwrap().len(), first_len);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_unflushed_bytes_die_with_a_crash() {
        let path = temp_wal("crash_buffer");
        let wal = WalFile::open(&path).unwrap();

        let l1 = wal.write(1, 0, RecordBody::Begin).unwrap();
        wal.flush_to(l1).unwrap();
        let flushed = wal.flushed_lsn();

        wal.write(1, l1, RecordBody::Commit).unwrap();
        wal.crash();

        assert_eq!(wal.flushed_lsn(), flushed);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), flushed);
        let _ = std::fs::remove_file(&path);
    }
}
