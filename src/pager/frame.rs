use std::sync::{Condvar, Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::{
    storage::page::Page,
    types::{Pgno, TxnId},
    utils::HandyRwLock,
};

/// Latch/pin bookkeeping of one frame. The before image is captured
/// when a handle goes exclusive and consumed by `save`; a dropped
/// exclusive handle that never saved restores it, so unlogged edits
/// cannot leak into the pool.
pub(crate) struct FrameMeta {
    pub pins: u32,
    pub dirty: bool,
    pub s_count: u32,
    pub x_held: bool,
    pub clock_ref: bool,
    pub before: Option<Page>,
}

/// One buffer-pool slot: the page payload plus its latch state.
pub(crate) struct Frame {
    pub pg: Pgno,
    pub page: RwLock<Page>,
    pub meta: Mutex<FrameMeta>,
    cond: Condvar,
}

impl Frame {
    pub fn new(pg: Pgno, page: Page) -> Self {
        Self {
            pg,
            page: RwLock::new(page),
            meta: Mutex::new(FrameMeta {
                pins: 0,
                dirty: false,
                s_count: 0,
                x_held: false,
                clock_ref: true,
                before: None,
            }),
            cond: Condvar::new(),
        }
    }

    pub fn latch_s(&self) {
        let mut meta = self.meta.lock().unwrap();
        while meta.x_held {
            meta = self.cond.wait(meta).unwrap();
        }
        meta.s_count += 1;
    }

    pub fn latch_x(&self) {
        let mut meta = self.meta.lock().unwrap();
        while meta.x_held || meta.s_count > 0 {
            meta = self.cond.wait(meta).unwrap();
        }
        meta.x_held = true;
    }

    /// Upgrade the caller's own S latch to X, waiting out the other
    /// readers.
    pub fn upgrade_s_to_x(&self) {
        let mut meta = self.meta.lock().unwrap();
        assert!(meta.s_count > 0);
        while meta.x_held || meta.s_count > 1 {
            meta = self.cond.wait(meta).unwrap();
        }
        meta.s_count -= 1;
        meta.x_held = true;
    }

    pub fn downgrade_x_to_s(&self) {
        let mut meta = self.meta.lock().unwrap();
        assert!(meta.x_held);
        meta.x_held = false;
        meta.s_count += 1;
        self.cond.notify_all();
    }

    pub fn unlatch_s(&self) {
        let mut meta = self.meta.lock().unwrap();
        assert!(meta.s_count > 0);
        meta.s_count -= 1;
        self.cond.notify_all();
    }

    pub fn unlatch_x(&self) {
        let mut meta = self.meta.lock().unwrap();
        assert!(meta.x_held);
        meta.x_held = false;
        self.cond.notify_all();
    }

    pub fn unpin(&self) {
        let mut meta = self.meta.lock().unwrap();
        assert!(meta.pins > 0);
        meta.pins -= 1;
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HandleMode {
    S,
    X,
}

/// An owning reference to a pinned, latched page frame. `S` handles
/// expose a read-only view; `X` handles a mutable one plus the
/// transaction that will log the change.
pub struct PageHandle {
    pub(crate) frame: std::sync::Arc<Frame>,
    pub(crate) mode: HandleMode,
    pub(crate) tid: Option<TxnId>,
}

impl std::fmt::Debug for PageHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PageHandle")
            .field("pgno", &self.frame.pg)
            .field("mode", &self.mode)
            .field("tid", &self.tid)
            .finish()
    }
}

impl PageHandle {
    pub fn pgno(&self) -> Pgno {
        self.frame.pg
    }

    pub fn mode(&self) -> HandleMode {
        self.mode
    }

    pub fn tid(&self) -> Option<TxnId> {
        self.tid
    }

    pub fn read(&self) -> RwLockReadGuard<'_, Page> {
        self.frame.page.rl()
    }

    pub fn write(&self) -> RwLockWriteGuard<'_, Page> {
        assert_eq!(self.mode, HandleMode::X, "write view needs an X handle");
        self.frame.page.wl()
    }
}

impl Drop for PageHandle {
    fn drop(&mut self) {
        match self.mode {
            HandleMode::S => self.frame.unlatch_s(),
            HandleMode::X => {
                // An exclusive handle dropped without save: throw the
                // unlogged edits away by restoring the before image.
                let before = {
                    let mut meta = self.frame.meta.lock().unwrap();
                    meta.before.take()
                };
                if let Some(before) = before {
                    *self.frame.page.wl() = before;
                }
                self.frame.unlatch_x();
            }
        }
        self.frame.unpin();
    }
}
