mod buffer_pool;
mod dirty_table;
mod frame;
mod recovery;

pub use dirty_table::DirtyTable;
pub use frame::{HandleMode, PageHandle};

use std::{
    path::Path,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc, Mutex,
    },
};

use log::{debug, info};

use crate::{
    error::{DbError, ErrorKind},
    pager::buffer_pool::BufferPool,
    storage::{
        disk::DiskManager,
        page::{Page, PageKind},
        RootNode, Tombstone,
    },
    transaction::{LockTable, ThreadPool, Transaction, TxnEntry, TxnState, TxnTable},
    types::{DbResult, Lsn, Pgno, TxnId, PGNO_NULL},
    utils::HandyRwLock,
    wal::{RecordBody, WalFile},
};

/// Page 0: the database header.
pub const ROOT_PGNO: Pgno = 0;

/// Page 1: the variable hash index root.
pub const VHASH_PGNO: Pgno = 1;

/// The pager ties the subsystems together: file I/O, WAL, buffer
/// pool, transaction and dirty page tables, and the lock table. All
/// page access and all transaction control go through here.
pub struct Pager {
    pub(crate) disk: DiskManager,
    pub(crate) wal: WalFile,
    pub(crate) pool: BufferPool,
    pub(crate) dpt: Mutex<DirtyTable>,
    pub(crate) txns: Mutex<TxnTable>,
    pub(crate) lockt: Arc<LockTable>,
    pub(crate) workers: Arc<ThreadPool>,
    next_tid: AtomicU64,
    ckpt_latch: Mutex<()>,
}

impl Pager {
    /// Open (or create) a database. Runs crash recovery when the WAL
    /// holds records; corruption found during recovery refuses the
    /// open.
    pub fn open<P: AsRef<Path>, Q: AsRef<Path>>(
        data_path: P,
        wal_path: Q,
        lockt: Arc<LockTable>,
        workers: Arc<ThreadPool>,
    ) -> Result<Arc<Pager>, DbError> {
        let disk = DiskManager::open(data_path)?;
        let wal = WalFile::open(wal_path)?;

        let pager = Pager {
            disk,
            wal,
            pool: BufferPool::new(),
            dpt: Mutex::new(DirtyTable::new()),
            txns: Mutex::new(TxnTable::new()),
            lockt,
            workers,
            next_tid: AtomicU64::new(1),
            ckpt_latch: Mutex::new(()),
        };

        if pager.disk.npages() == 0 {
            pager.bootstrap()?;
        } else {
            let mut page0 = Page::new_zeroed();
            pager.disk.read_page(ROOT_PGNO, &mut page0)?;
            page0.validate_for_db(PageKind::RootNode.bit())?;
        }

        let max_tid = recovery::run(&pager)?;
        pager.next_tid.store(max_tid + 1, Ordering::SeqCst);

        info!("database open, {} pages", pager.disk.npages());
        Ok(Arc::new(pager))
    }

    /// Lay down the two fixed pages of a fresh database: the header
    /// and the variable hash index root.
    fn bootstrap(&self) -> DbResult {
        debug!("bootstrapping empty database");

        let pg0 = self.disk.extend()?;
        assert_eq!(pg0, ROOT_PGNO);
        let mut page0 = Page::new_zeroed();
        page0.init_empty(PageKind::RootNode);
        page0.update_checksum();
        self.disk.write_page(ROOT_PGNO, &page0)?;

        let pg1 = self.disk.extend()?;
        assert_eq!(pg1, VHASH_PGNO);
        let mut page1 = Page::new_zeroed();
        page1.init_empty(PageKind::VarHashPage);
        page1.update_checksum();
        self.disk.write_page(VHASH_PGNO, &page1)?;

        self.disk.sync()
    }

    pub fn npages(&self) -> Pgno {
        self.disk.npages()
    }

    pub fn lock_table(&self) -> &Arc<LockTable> {
        &self.lockt
    }

    ////////////////////////////////////////////////////////////
    // Transaction control

    pub fn begin_txn(&self) -> Result<Transaction, DbError> {
        let tid = self.next_tid.fetch_add(1, Ordering::SeqCst);

        {
            let mut txns = self.txns.lock().unwrap();
            txns.insert(
                tid,
                TxnEntry {
                    state: TxnState::Running,
                    last_lsn: 0,
                    undo_next_lsn: 0,
                },
            )?;
        }

        let lsn = self.wal.write(tid, 0, RecordBody::Begin)?;
        {
            let mut txns = self.txns.lock().unwrap();
            let entry = txns.expect_mut(tid)?;
            entry.last_lsn = lsn;
            entry.undo_next_lsn = lsn;
        }

        debug!("tx_{} begun at lsn {}", tid, lsn);
        Ok(Transaction::new(tid))
    }

    /// Append the commit record, make it durable, then drop the
    /// transaction's table entry and locks.
    pub fn commit(&self, tx: &Transaction) -> DbResult {
        let tid = tx.get_id();
        let prev = {
            let txns = self.txns.lock().unwrap();
            match txns.get(tid) {
                Some(e) => e.last_lsn,
                None => {
                    // A tid below the allocator that has no entry was
                    // already finished.
                    if tid < self.next_tid.load(Ordering::SeqCst) {
                        return Err(DbError::new(
                            ErrorKind::DuplicateCommit,
                            &format!("{} was already committed or rolled back", tx),
                        ));
                    }
                    return Err(DbError::new(ErrorKind::NoTxn, &format!("no {}", tx)));
                }
            }
        };

        let lsn = self.wal.write(tid, prev, RecordBody::Commit)?;
        self.wal.flush_to(lsn)?;

        self.txns.lock().unwrap().remove(tid);
        self.lockt.unlock_all(tx);
        debug!("{} committed at lsn {}", tx, lsn);
        Ok(())
    }

    /// Undo the transaction's effects back to `save_lsn` (0 for a
    /// full rollback), writing a compensation record per undone
    /// update. A full rollback ends the transaction.
    pub fn rollback(&self, tx: &Transaction, save_lsn: Lsn) -> DbResult {
        let tid = tx.get_id();

        // The undo walk reads records back, so everything buffered
        // must be on disk first.
        self.wal.flush_all()?;

        let mut cur = {
            let txns = self.txns.lock().unwrap();
            txns.get(tid)
                .ok_or_else(|| DbError::new(ErrorKind::NoTxn, &format!("no {}", tx)))?
                .undo_next_lsn
        };

        while cur > save_lsn && cur != 0 {
            let rec = self.wal.pread(cur)?;
            if rec.tid != tid {
                return Err(DbError::corrupt(&format!(
                    "undo chain of {} reached a record of tx_{}",
                    tx, rec.tid
                )));
            }

            match rec.body {
                RecordBody::Begin => break,
                RecordBody::Compensation { undo_next_lsn, .. } => {
                    cur = undo_next_lsn;
                }
                RecordBody::Update { pg, before, .. } => {
                    self.undo_one(tx, pg, &before, rec.prev_lsn)?;
                    cur = rec.prev_lsn;
                }
                _ => {
                    return Err(DbError::corrupt(&format!(
                        "unexpected {} record in the undo chain of {}",
                        rec.body.name(),
                        tx
                    )));
                }
            }

            let mut txns = self.txns.lock().unwrap();
            txns.expect_mut(tid)?.undo_next_lsn = cur;
        }

        if save_lsn == 0 {
            let prev = self.txns.lock().unwrap().expect_mut(tid)?.last_lsn;
            let lsn = self.wal.write(tid, prev, RecordBody::End)?;
            self.txns.lock().unwrap().remove(tid);
            self.lockt.unlock_all(tx);
            debug!("{} rolled back, end at lsn {}", tx, lsn);
        }
        Ok(())
    }

    /// Full rollback.
    pub fn abort(&self, tx: &Transaction) -> DbResult {
        self.rollback(tx, 0)
    }

    /// The LSN of the transaction's most recent log record. Callers
    /// use it as a savepoint for partial rollback.
    pub fn txn_last_lsn(&self, tx: &Transaction) -> Result<Lsn, DbError> {
        let txns = self.txns.lock().unwrap();
        txns.get(tx.get_id())
            .map(|e| e.last_lsn)
            .ok_or_else(|| DbError::new(ErrorKind::NoTxn, &format!("no {}", tx)))
    }

    /// Restore one page to its before image and log the CLR.
    fn undo_one(&self, tx: &Transaction, pg: Pgno, before: &Page, undo_next: Lsn) -> DbResult {
        let tid = tx.get_id();

        let frame = self.pool.fetch(pg, &self.disk, &self.wal, &self.dpt)?;
        frame.latch_x();

        let result = (|| -> DbResult {
            {
                let mut dpt = self.dpt.lock().unwrap();
                if dpt.get(pg).is_none() && dpt.len() >= crate::consts::MEMORY_PAGE_LEN {
                    return Err(DbError::new(ErrorKind::DpgtFull, "dirty page table full"));
                }
            }

            let prev = self.txns.lock().unwrap().expect_mut(tid)?.last_lsn;
            let clr_lsn = self.wal.write(
                tid,
                prev,
                RecordBody::Compensation {
                    pg,
                    undo_next_lsn: undo_next,
                    after: before.clone(),
                },
            )?;

            {
                let mut page = frame.page.wl();
                *page = before.clone();
                page.set_page_lsn(clr_lsn);
            }
            frame.meta.lock().unwrap().dirty = true;
            self.dpt.lock().unwrap().add_if_absent(pg, clr_lsn)?;

            let mut txns = self.txns.lock().unwrap();
            let entry = txns.expect_mut(tid)?;
            entry.last_lsn = clr_lsn;
            Ok(())
        })();

        frame.unlatch_x();
        frame.unpin();
        result
    }

    ////////////////////////////////////////////////////////////
    // Page access

    /// Acquire a shared handle on `pg`, checking its type tag against
    /// the caller's accept mask.
    pub fn get(&self, accept: u16, pg: Pgno) -> Result<PageHandle, DbError> {
        let frame = self.pool.fetch(pg, &self.disk, &self.wal, &self.dpt)?;
        frame.latch_s();
        let h = PageHandle {
            frame,
            mode: HandleMode::S,
            tid: None,
        };
        self.check_kind(&h, accept)?;
        Ok(h)
    }

    /// Acquire an exclusive handle on `pg` for `tx`, snapshotting the
    /// before image for the eventual `save`.
    pub fn get_writable(
        &self,
        tx: &Transaction,
        accept: u16,
        pg: Pgno,
    ) -> Result<PageHandle, DbError> {
        let frame = self.pool.fetch(pg, &self.disk, &self.wal, &self.dpt)?;
        frame.latch_x();
        {
            let snapshot = frame.page.rl().clone();
            frame.meta.lock().unwrap().before = Some(snapshot);
        }
        let h = PageHandle {
            frame,
            mode: HandleMode::X,
            tid: Some(tx.get_id()),
        };
        self.check_kind(&h, accept)?;
        Ok(h)
    }

    /// Upgrade a shared handle in place.
    pub fn make_writable(&self, tx: &Transaction, h: &mut PageHandle) -> DbResult {
        if h.mode == HandleMode::X {
            return Ok(());
        }
        h.frame.upgrade_s_to_x();
        let snapshot = h.frame.page.rl().clone();
        h.frame.meta.lock().unwrap().before = Some(snapshot);
        h.mode = HandleMode::X;
        h.tid = Some(tx.get_id());
        Ok(())
    }

    fn check_kind(&self, h: &PageHandle, accept: u16) -> DbResult {
        let page = h.read();
        match page.get_kind() {
            Some(kind) if kind.bit() & accept != 0 => Ok(()),
            other => Err(DbError::corrupt(&format!(
                "page {} has kind {:?}, accept mask {:#04x}",
                h.pgno(),
                other,
                accept
            ))),
        }
    }

    /// Allocate a page: pop the tombstone list head, else extend the
    /// file. Returns an exclusive, initialized, not-yet-saved handle;
    /// the undo image of the eventual save is the popped tombstone.
    pub fn new_page(&self, tx: &Transaction, kind: PageKind) -> Result<PageHandle, DbError> {
        let mut rn = self.get_writable(tx, PageKind::RootNode.bit(), ROOT_PGNO)?;
        let first = rn.read().rn_get_first_tombstone();

        if first != PGNO_NULL {
            let h = self.get_writable(tx, PageKind::Tombstone.bit(), first)?;
            let next = h.read().ts_get_next();
            rn.write().rn_set_first_tombstone(next);
            self.save(&mut rn)?;
            drop(rn);

            h.write().init_empty(kind);
            debug!("page {} reused from the tombstone list", h.pgno());
            return Ok(h);
        }

        // Nothing to pop; the header page goes back untouched.
        drop(rn);

        let pg = self.disk.extend()?;
        let page = Page::new_zeroed();
        let frame = self
            .pool
            .install(pg, page, &self.disk, &self.wal, &self.dpt)?;
        frame.latch_x();
        {
            let snapshot = frame.page.rl().clone();
            frame.meta.lock().unwrap().before = Some(snapshot);
        }
        let h = PageHandle {
            frame,
            mode: HandleMode::X,
            tid: Some(tx.get_id()),
        };
        h.write().init_empty(kind);
        debug!("page {} freshly allocated", pg);
        Ok(h)
    }

    /// Log the in-place changes of an exclusive handle: one UPDATE
    /// record with before/after images, page LSN stamped, dirty page
    /// table updated, handle downgraded to shared.
    pub fn save(&self, h: &mut PageHandle) -> DbResult {
        if h.mode != HandleMode::X {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                "save requires an exclusive handle",
            ));
        }
        let tid = h.tid.ok_or_else(|| {
            DbError::new(ErrorKind::InvalidArgument, "save requires a transaction")
        })?;
        let pg = h.pgno();

        {
            let dpt = self.dpt.lock().unwrap();
            if dpt.get(pg).is_none() && dpt.len() >= crate::consts::MEMORY_PAGE_LEN {
                return Err(DbError::new(ErrorKind::DpgtFull, "dirty page table full"));
            }
        }

        let before = h
            .frame
            .meta
            .lock()
            .unwrap()
            .before
            .take()
            .expect("exclusive handle must carry a before image");
        let after = h.read().clone();

        let prev = self.txns.lock().unwrap().expect_mut(tid)?.last_lsn;
        let lsn = self
            .wal
            .write(tid, prev, RecordBody::Update { pg, before, after })?;

        {
            let mut txns = self.txns.lock().unwrap();
            let entry = txns.expect_mut(tid)?;
            entry.last_lsn = lsn;
            entry.undo_next_lsn = lsn;
        }

        h.write().set_page_lsn(lsn);
        h.frame.meta.lock().unwrap().dirty = true;
        self.dpt.lock().unwrap().add_if_absent(pg, lsn)?;

        h.frame.downgrade_x_to_s();
        h.mode = HandleMode::S;
        h.tid = None;
        Ok(())
    }

    /// Unpin and unlatch. Dropping the handle does the same; the
    /// explicit call keeps call sites symmetrical with `get`.
    pub fn release(&self, h: PageHandle) {
        drop(h);
    }

    /// Rewrite the page as a tombstone, push it onto the free list
    /// and release it.
    pub fn delete_and_release(&self, tx: &Transaction, mut h: PageHandle) -> DbResult {
        self.make_writable(tx, &mut h)?;
        let pg = h.pgno();

        let mut rn = self.get_writable(tx, PageKind::RootNode.bit(), ROOT_PGNO)?;
        let old_first = rn.read().rn_get_first_tombstone();

        {
            let mut page = h.write();
            page.init_empty(PageKind::Tombstone);
            page.ts_set_next(old_first);
        }
        rn.write().rn_set_first_tombstone(pg);

        self.save(&mut h)?;
        self.save(&mut rn)?;
        debug!("page {} tombstoned", pg);
        Ok(())
    }

    ////////////////////////////////////////////////////////////
    // Checkpoint and shutdown

    /// Fuzzy checkpoint: snapshot the transaction and dirty page
    /// tables into the log, flush, and point the header's master LSN
    /// at the CHECKPOINT_BEGIN record. Blocking.
    pub fn checkpoint(&self) -> DbResult {
        let _guard = self.ckpt_latch.lock().unwrap();

        let begin_lsn = self.wal.write(0, 0, RecordBody::CheckpointBegin)?;

        let payload = {
            let txns = self.txns.lock().unwrap();
            let dpt = self.dpt.lock().unwrap();
            let mut buf = bytes::BytesMut::new();
            buf.extend_from_slice(&txns.serialize());
            buf.extend_from_slice(&dpt.serialize());
            buf.freeze()
        };
        self.wal.write(0, 0, RecordBody::CheckpointEnd { payload })?;
        self.wal.flush_all()?;

        self.write_master_lsn(begin_lsn)?;
        info!("checkpoint at lsn {}", begin_lsn);
        Ok(())
    }

    /// Run a checkpoint on a pool worker.
    pub fn checkpoint_async(self: &Arc<Self>) {
        let pager = Arc::clone(self);
        let workers = Arc::clone(&self.workers);
        workers.execute(move || {
            if let Err(e) = pager.checkpoint() {
                e.show_backtrace();
            }
        });
    }

    /// Stamp the header's master LSN and force the page to disk. Not
    /// WAL-logged: losing the stamp only means recovering from the
    /// previous checkpoint.
    fn write_master_lsn(&self, lsn: Lsn) -> DbResult {
        let frame = self
            .pool
            .fetch(ROOT_PGNO, &self.disk, &self.wal, &self.dpt)?;
        frame.latch_x();
        let result = (|| -> DbResult {
            let mut copy = {
                let mut page = frame.page.wl();
                page.rn_set_master_lsn(lsn);
                page.clone()
            };
            copy.update_checksum();
            self.disk.write_page(ROOT_PGNO, &copy)?;
            self.disk.sync()
        })();
        frame.unlatch_x();
        frame.unpin();
        result
    }

    /// Force every dirty page out (WAL first). Used by shutdown and
    /// by tests exercising the steal policy.
    pub fn flush_all_pages(&self) -> DbResult {
        self.wal.flush_all()?;
        self.pool.flush_all(&self.disk, &self.wal, &self.dpt)?;
        self.disk.sync()
    }

    pub fn flush_wal(&self) -> DbResult {
        self.wal.flush_all()
    }

    /// Graceful shutdown: make everything durable.
    pub fn close(&self) -> DbResult {
        self.flush_all_pages()?;
        info!("database closed");
        Ok(())
    }

    /// Simulated power loss: buffered WAL bytes and every in-memory
    /// page are gone; nothing is flushed. Reopen to recover.
    pub fn crash(&self) {
        self.wal.crash();
        self.pool.crash_clear();
        self.dpt.lock().unwrap().clear();
        // The transaction table dies with the process; recovery
        // rebuilds it from the log.
        self.txns.lock().unwrap().clear();
    }

    /// Record-by-record dump of the flushed WAL.
    pub fn wal_depiction(&self) -> String {
        self.wal.depiction()
    }
}
