use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
};

use log::debug;

use crate::{
    consts::LOCK_TABLE_CAP,
    error::{DbError, ErrorKind},
    transaction::{
        gr_lock::{GrLock, LockMode},
        tx::Transaction,
    },
    types::{DbResult, Pgno, TxnId},
};

/// What a lock protects. The engine does not force one granularity;
/// callers pick the level that matches their operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceKind {
    Table,
    Page,
    Row,
}

/// A lockable resource: kind plus a key within that kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Resource {
    pub kind: ResourceKind,
    pub key: u64,
}

impl Resource {
    pub fn table() -> Self {
        Self {
            kind: ResourceKind::Table,
            key: 0,
        }
    }

    pub fn page(pg: Pgno) -> Self {
        Self {
            kind: ResourceKind::Page,
            key: pg,
        }
    }

    pub fn row(id: u64) -> Self {
        Self {
            kind: ResourceKind::Row,
            key: id,
        }
    }
}

struct LtInner {
    locks: HashMap<Resource, Arc<GrLock>>,
    held: HashMap<TxnId, Vec<(Resource, LockMode)>>,
}

/// Transaction-scoped granular locks over arbitrary resources.
/// Blocking happens inside the individual `GrLock`, never while the
/// table map is held.
pub struct LockTable {
    inner: Mutex<LtInner>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            inner: Mutex::new(LtInner {
                locks: HashMap::new(),
                held: HashMap::new(),
            }),
        }
    }

    fn entry(&self, res: Resource) -> Result<Arc<GrLock>, DbError> {
        let mut inner = self.inner.lock().unwrap();
        if let Some(l) = inner.locks.get(&res) {
            return Ok(Arc::clone(l));
        }
        if inner.locks.len() >= LOCK_TABLE_CAP {
            return Err(DbError::new(
                ErrorKind::VlocktFull,
                &format!("lock table is full ({} resources)", LOCK_TABLE_CAP),
            ));
        }
        let l = Arc::new(GrLock::new());
        inner.locks.insert(res, Arc::clone(&l));
        Ok(l)
    }

    fn record(&self, tx: &Transaction, res: Resource, mode: LockMode) {
        let mut inner = self.inner.lock().unwrap();
        inner
            .held
            .entry(tx.get_id())
            .or_insert_with(Vec::new)
            .push((res, mode));
    }

    /// Acquire `mode` on `res` for `tx`, blocking in FIFO order.
    pub fn lock(&self, tx: &Transaction, res: Resource, mode: LockMode) -> DbResult {
        let l = self.entry(res)?;
        l.lock(mode);
        self.record(tx, res, mode);
        debug!("{} locked {:?} in {:?}", tx, res, mode);
        Ok(())
    }

    /// Acquire without blocking; false when the lock is busy.
    pub fn try_lock(&self, tx: &Transaction, res: Resource, mode: LockMode) -> Result<bool, DbError> {
        let l = self.entry(res)?;
        if l.try_lock(mode) {
            self.record(tx, res, mode);
            return Ok(true);
        }
        Ok(false)
    }

    /// Trade a held mode for a stronger one, blocking if needed.
    pub fn upgrade(&self, tx: &Transaction, res: Resource, new_mode: LockMode) -> DbResult {
        let (l, old_mode) = {
            let mut inner = self.inner.lock().unwrap();
            let held = inner.held.get_mut(&tx.get_id()).ok_or_else(|| {
                DbError::new(ErrorKind::NoTxn, &format!("{} holds no locks", tx))
            })?;
            let slot = held.iter_mut().find(|(r, _)| *r == res).ok_or_else(|| {
                DbError::new(
                    ErrorKind::InvalidArgument,
                    &format!("{} does not hold {:?}", tx, res),
                )
            })?;
            let old = slot.1;
            slot.1 = new_mode;
            let l = Arc::clone(inner.locks.get(&res).expect("held lock must exist"));
            (l, old)
        };
        l.upgrade(old_mode, new_mode);
        Ok(())
    }

    /// Release everything `tx` holds, dropping locks nobody uses.
    pub fn unlock_all(&self, tx: &Transaction) {
        let held = {
            let mut inner = self.inner.lock().unwrap();
            inner.held.remove(&tx.get_id()).unwrap_or_default()
        };

        for (res, mode) in held {
            let l = {
                let inner = self.inner.lock().unwrap();
                inner.locks.get(&res).map(Arc::clone)
            };
            if let Some(l) = l {
                let idle = l.unlock(mode);
                if idle {
                    let mut inner = self.inner.lock().unwrap();
                    // Re-check: a new waiter may have slipped in.
                    if let Some(l2) = inner.locks.get(&res) {
                        if Arc::strong_count(l2) == 2 {
                            inner.locks.remove(&res);
                        }
                    }
                }
            }
        }
        debug!("{} released all locks", tx);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc as StdArc;

    #[test]
    fn test_lock_and_release_cycle() {
        let lt = LockTable::new();
        let t1 = Transaction::new(1);
        let t2 = Transaction::new(2);

        lt.lock(&t1, Resource::table(), LockMode::Ix).unwrap();
        lt.lock(&t1, Resource::page(5), LockMode::X).unwrap();

        assert!(lt.try_lock(&t2, Resource::page(5), LockMode::S).unwrap() == false);
        assert!(lt.try_lock(&t2, Resource::table(), LockMode::Is).unwrap());

        lt.unlock_all(&t1);
        assert!(lt.try_lock(&t2, Resource::page(5), LockMode::S).unwrap());
        lt.unlock_all(&t2);
    }

    #[test]
    fn test_blocking_lock_is_fifo() {
        let lt = StdArc::new(LockTable::new());
        let t1 = Transaction::new(10);
        lt.lock(&t1, Resource::page(1), LockMode::X).unwrap();

        let lt2 = StdArc::clone(&lt);
        let waiter = std::thread::spawn(move || {
            let t2 = Transaction::new(11);
            lt2.lock(&t2, Resource::page(1), LockMode::X).unwrap();
            lt2.unlock_all(&t2);
        });

        std::thread::sleep(std::time::Duration::from_millis(20));
        lt.unlock_all(&t1);
        waiter.join().unwrap();
    }

    #[test]
    fn test_upgrade_while_sole_holder() {
        let lt = LockTable::new();
        let t1 = Transaction::new(20);
        lt.lock(&t1, Resource::page(2), LockMode::S).unwrap();
        lt.upgrade(&t1, Resource::page(2), LockMode::X).unwrap();

        let t2 = Transaction::new(21);
        assert!(!lt.try_lock(&t2, Resource::page(2), LockMode::S).unwrap());
        lt.unlock_all(&t1);
    }
}
