use std::{
    fs::{File, OpenOptions},
    io::{Read, Seek, SeekFrom, Write},
    path::Path,
    sync::Mutex,
};

use log::debug;

use crate::{
    consts::PAGE_SIZE,
    error::{DbError, ErrorKind},
    storage::page::Page,
    types::{DbResult, Pgno},
};

/// Page-indexed byte container over one regular file. This layer only
/// knows page numbers and raw bytes; free-slot re-use is handled one
/// layer up through the tombstone list.
#[derive(Debug)]
pub struct DiskManager {
    inner: Mutex<DiskInner>,
}

#[derive(Debug)]
struct DiskInner {
    file: File,
    npages: Pgno,
}

impl DiskManager {
    /// Open (creating if absent) the data file. A length that is not
    /// a whole number of pages means someone else wrote to it.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, DbError> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)?;

        let len = file.metadata()?.len();
        if len % PAGE_SIZE as u64 != 0 {
            return Err(DbError::corrupt(&format!(
                "data file length {} is not a multiple of the page size {}",
                len, PAGE_SIZE
            )));
        }

        let npages = len / PAGE_SIZE as u64;
        debug!("data file opened, {} pages", npages);

        Ok(Self {
            inner: Mutex::new(DiskInner { file, npages }),
        })
    }

    pub fn npages(&self) -> Pgno {
        self.inner.lock().unwrap().npages
    }

    pub fn read_page(&self, pg: Pgno, dest: &mut Page) -> DbResult {
        let mut inner = self.inner.lock().unwrap();
        if pg >= inner.npages {
            return Err(DbError::new(
                ErrorKind::PgOutOfRange,
                &format!("page {} >= npages {}", pg, inner.npages),
            ));
        }

        inner.file.seek(SeekFrom::Start(pg * PAGE_SIZE as u64))?;
        inner
            .file
            .read_exact(dest.raw_mut().as_mut())
            .map_err(|e| match e.kind() {
                std::io::ErrorKind::UnexpectedEof => {
                    DbError::corrupt(&format!("short read on page {}", pg))
                }
                _ => DbError::io(&e.to_string()),
            })?;
        Ok(())
    }

    /// Write one page. The caller is responsible for fsync ordering
    /// (WAL before data).
    pub fn write_page(&self, pg: Pgno, src: &Page) -> DbResult {
        let mut inner = self.inner.lock().unwrap();
        if pg >= inner.npages {
            return Err(DbError::new(
                ErrorKind::PgOutOfRange,
                &format!("page {} >= npages {}", pg, inner.npages),
            ));
        }

        inner.file.seek(SeekFrom::Start(pg * PAGE_SIZE as u64))?;
        inner.file.write_all(src.raw().as_ref())?;
        Ok(())
    }

    /// Grow the file by one page and return its number. The new
    /// page's bytes are unspecified until first written.
    pub fn extend(&self) -> Result<Pgno, DbError> {
        let mut inner = self.inner.lock().unwrap();
        let pg = inner.npages;
        let new_len = (pg + 1)
            .checked_mul(PAGE_SIZE as u64)
            .ok_or_else(|| DbError::new(ErrorKind::PagerFull, "file reached max page count"))?;
        inner.file.set_len(new_len)?;
        inner.npages += 1;
        Ok(pg)
    }

    pub fn sync(&self) -> DbResult {
        let inner = self.inner.lock().unwrap();
        inner.file.sync_data()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_path(name: &str) -> std::path::PathBuf {
        let mut p = std::env::temp_dir();
        p.push(format!("rope_db_disk_{}_{}.db", name, std::process::id()));
        let _ = std::fs::remove_file(&p);
        p
    }

    #[test]
    fn test_page_round_trip() {
        let path = temp_path("round_trip");
        let disk = DiskManager::open(&path).unwrap();

        let pg = disk.extend().unwrap();
        let mut page = Page::new_zeroed();
        for (i, b) in page.raw_mut().iter_mut().enumerate() {
            *b = (i % 251) as u8;
        }
        disk.write_page(pg, &page).unwrap();

        let mut back = Page::new_zeroed();
        disk.read_page(pg, &mut back).unwrap();
        assert_eq!(page.raw().as_ref(), back.raw().as_ref());
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_out_of_range_read() {
        let path = temp_path("oob");
        let disk = DiskManager::open(&path).unwrap();
        let mut page = Page::new_zeroed();
        let err = disk.read_page(3, &mut page).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::PgOutOfRange);
        let _ = std::fs::remove_file(&path);
    }

    #[test]
    fn test_rejects_torn_file() {
        let path = temp_path("torn");
        std::fs::write(&path, vec![0u8; PAGE_SIZE + 7]).unwrap();
        let err = DiskManager::open(&path).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::Corrupt);
        let _ = std::fs::remove_file(&path);
    }
}
