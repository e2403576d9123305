use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::{
    consts::MEMORY_PAGE_LEN,
    error::DbError,
    pager::{dirty_table::DirtyTable, frame::Frame},
    storage::{disk::DiskManager, page::Page, PG_ANY},
    types::{DbResult, Pgno},
    utils::HandyRwLock,
    wal::WalFile,
};

struct PoolInner {
    frames: HashMap<Pgno, Arc<Frame>>,
    // Clock order over resident pages; the hand sweeps this ring.
    ring: Vec<Pgno>,
    hand: usize,
}

/// Fixed-capacity set of page frames with clock eviction. Lookup and
/// pinning happen atomically under the pool latch, so a frame cannot
/// be evicted between being found and being pinned. Dirty victims are
/// WAL-flushed to their page LSN and written out before they leave
/// the pool.
pub(crate) struct BufferPool {
    inner: Mutex<PoolInner>,
}

impl BufferPool {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(PoolInner {
                frames: HashMap::new(),
                ring: Vec::new(),
                hand: 0,
            }),
        }
    }

    /// Fetch the frame for `pg`, loading from disk on a miss. The
    /// returned frame is pinned; the caller latches it.
    pub fn fetch(
        &self,
        pg: Pgno,
        disk: &DiskManager,
        wal: &WalFile,
        dpt: &Mutex<DirtyTable>,
    ) -> Result<Arc<Frame>, DbError> {
        let mut inner = self.inner.lock().unwrap();

        if let Some(frame) = inner.frames.get(&pg) {
            let frame = Arc::clone(frame);
            let mut meta = frame.meta.lock().unwrap();
            meta.pins += 1;
            meta.clock_ref = true;
            drop(meta);
            return Ok(frame);
        }

        Self::make_room(&mut inner, disk, wal, dpt)?;

        let mut page = Page::new_zeroed();
        disk.read_page(pg, &mut page)?;
        page.validate_for_db(PG_ANY)?;

        let frame = Arc::new(Frame::new(pg, page));
        frame.meta.lock().unwrap().pins = 1;
        inner.frames.insert(pg, Arc::clone(&frame));
        inner.ring.push(pg);
        Ok(frame)
    }

    /// Install a brand-new page (not yet on disk in any valid form).
    /// The returned frame is pinned.
    pub fn install(
        &self,
        pg: Pgno,
        page: Page,
        disk: &DiskManager,
        wal: &WalFile,
        dpt: &Mutex<DirtyTable>,
    ) -> Result<Arc<Frame>, DbError> {
        let mut inner = self.inner.lock().unwrap();
        assert!(
            !inner.frames.contains_key(&pg),
            "page {} is already resident",
            pg
        );

        Self::make_room(&mut inner, disk, wal, dpt)?;

        let frame = Arc::new(Frame::new(pg, page));
        frame.meta.lock().unwrap().pins = 1;
        inner.frames.insert(pg, Arc::clone(&frame));
        inner.ring.push(pg);
        Ok(frame)
    }

    /// Clock sweep: skip pinned frames, give referenced frames a
    /// second chance, flush a dirty victim before dropping it.
    fn make_room(
        inner: &mut PoolInner,
        disk: &DiskManager,
        wal: &WalFile,
        dpt: &Mutex<DirtyTable>,
    ) -> DbResult {
        if inner.frames.len() < MEMORY_PAGE_LEN {
            return Ok(());
        }

        let len = inner.ring.len();
        let mut victim: Option<Pgno> = None;

        // Two full sweeps: the first pass clears reference bits, the
        // second must find any unpinned frame.
        for _ in 0..2 * len {
            let pg = inner.ring[inner.hand % len];
            inner.hand = (inner.hand + 1) % len;

            let frame = inner.frames.get(&pg).expect("ring entry must be resident");
            let mut meta = frame.meta.lock().unwrap();
            if meta.pins > 0 {
                continue;
            }
            if meta.clock_ref {
                meta.clock_ref = false;
                continue;
            }
            victim = Some(pg);
            break;
        }

        let victim = match victim {
            Some(v) => v,
            None => {
                // Every frame is pinned; the pool is at its cap and
                // nothing can leave.
                return Err(DbError::new(
                    crate::error::ErrorKind::NoMem,
                    "buffer pool exhausted: every frame is pinned",
                ));
            }
        };

        let frame = inner.frames.get(&victim).map(Arc::clone).unwrap();
        {
            let meta = frame.meta.lock().unwrap();
            if meta.dirty {
                drop(meta);
                Self::flush_frame(&frame, disk, wal, dpt)?;
            }
        }

        debug!("evicting page {}", victim);
        inner.frames.remove(&victim);
        inner.ring.retain(|p| *p != victim);
        if !inner.ring.is_empty() {
            inner.hand %= inner.ring.len();
        } else {
            inner.hand = 0;
        }
        Ok(())
    }

    /// Write one dirty frame out, honoring WAL-before-data.
    pub fn flush_frame(
        frame: &Arc<Frame>,
        disk: &DiskManager,
        wal: &WalFile,
        dpt: &Mutex<DirtyTable>,
    ) -> DbResult {
        let mut copy = frame.page.rl().clone();
        wal.flush_to(copy.get_page_lsn())?;
        copy.update_checksum();
        disk.write_page(frame.pg, &copy)?;

        frame.meta.lock().unwrap().dirty = false;
        dpt.lock().unwrap().remove(frame.pg);
        Ok(())
    }

    /// Flush every dirty frame (used by close and by tests forcing a
    /// steal).
    pub fn flush_all(
        &self,
        disk: &DiskManager,
        wal: &WalFile,
        dpt: &Mutex<DirtyTable>,
    ) -> DbResult {
        let frames: Vec<Arc<Frame>> = {
            let inner = self.inner.lock().unwrap();
            inner.frames.values().cloned().collect()
        };
        for frame in frames {
            let dirty = frame.meta.lock().unwrap().dirty;
            if dirty {
                Self::flush_frame(&frame, disk, wal, dpt)?;
            }
        }
        Ok(())
    }

    /// Drop every frame without flushing. Simulates power loss.
    pub fn crash_clear(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.frames.clear();
        inner.ring.clear();
        inner.hand = 0;
    }
}
