//! Restart recovery: the ARIES analysis / redo / undo passes.
//!
//! Recovery runs at open, before any transaction starts, and works
//! directly against the data file; the buffer pool is empty
//! throughout. Redo re-applies after images whose LSN beats the
//! stored page LSN, so running it twice produces the same state.

use log::{debug, info};

use crate::{
    error::DbError,
    pager::{DirtyTable, Pager, ROOT_PGNO},
    storage::{page::Page, RootNode},
    transaction::{TxnEntry, TxnState, TxnTable},
    types::{DbResult, Lsn, TxnId},
    wal::RecordBody,
};

/// Run recovery; returns the largest transaction id seen so the tid
/// allocator can continue past it.
pub(crate) fn run(pager: &Pager) -> Result<TxnId, DbError> {
    if pager.wal.flushed_lsn() == 0 && pager.wal.next_lsn() == 0 {
        return Ok(0);
    }

    let mut page0 = Page::new_zeroed();
    pager.disk.read_page(ROOT_PGNO, &mut page0)?;
    page0.validate_for_db(crate::storage::page::PageKind::RootNode.bit())?;
    let master_lsn = page0.rn_get_master_lsn();

    let (txns, dpt, mut max_tid) = analysis(pager, master_lsn)?;
    max_tid = max_tid.max(txns.max_tid().unwrap_or(0));
    redo(pager, &dpt)?;
    undo(pager, txns)?;

    pager.wal.flush_all()?;
    pager.disk.sync()?;
    info!("recovery complete, max tid {}", max_tid);
    Ok(max_tid)
}

/// Reconstruct the transaction and dirty page tables by scanning
/// forward from the last checkpoint (or the start of the log).
fn analysis(pager: &Pager, master_lsn: Lsn) -> Result<(TxnTable, DirtyTable, TxnId), DbError> {
    let mut txns = TxnTable::new();
    let mut dpt = DirtyTable::new();
    let mut max_tid: TxnId = 0;

    let mut reader = pager.wal.reader()?;
    reader.seek(master_lsn)?;

    let mut first = master_lsn != 0;
    let mut seeded = false;

    while let Some(rec) = reader.next_record()? {
        if first {
            match rec.body {
                RecordBody::CheckpointBegin => {}
                _ => {
                    return Err(DbError::corrupt(&format!(
                        "master lsn {} does not point at a checkpoint",
                        master_lsn
                    )));
                }
            }
            first = false;
        }

        max_tid = max_tid.max(rec.tid);
        let tid = rec.tid;

        match rec.body {
            RecordBody::Begin => {
                txns.insert(
                    tid,
                    TxnEntry {
                        state: TxnState::CandidateForUndo,
                        last_lsn: rec.lsn,
                        undo_next_lsn: rec.lsn,
                    },
                )?;
            }
            RecordBody::Update { pg, .. } => {
                touch(&mut txns, tid, rec.lsn)?;
                let entry = txns.expect_mut(tid)?;
                entry.last_lsn = rec.lsn;
                entry.undo_next_lsn = rec.lsn;
                dpt.add_if_absent(pg, rec.lsn)?;
            }
            RecordBody::Compensation {
                pg, undo_next_lsn, ..
            } => {
                touch(&mut txns, tid, rec.lsn)?;
                let entry = txns.expect_mut(tid)?;
                entry.last_lsn = rec.lsn;
                entry.undo_next_lsn = undo_next_lsn;
                dpt.add_if_absent(pg, rec.lsn)?;
            }
            RecordBody::Commit => {
                touch(&mut txns, tid, rec.lsn)?;
                txns.expect_mut(tid)?.state = TxnState::Committed;
            }
            RecordBody::End => {
                txns.remove(tid);
            }
            RecordBody::CheckpointBegin => {}
            RecordBody::CheckpointEnd { ref payload } => {
                if !seeded {
                    let (ck_txns, used) = TxnTable::deserialize(payload)?;
                    let (ck_dpt, _) = DirtyTable::deserialize(&payload[used..])?;
                    merge_snapshot(&mut txns, &ck_txns)?;
                    dpt.merge_keep_min(&ck_dpt)?;
                    seeded = true;
                }
            }
        }
    }

    debug!(
        "analysis: {} live transactions, {} dirty pages",
        txns.len(),
        dpt.len()
    );
    Ok((txns, dpt, max_tid))
}

/// A record for a transaction whose BEGIN predates the scan window:
/// the checkpoint snapshot normally covers it, but be tolerant and
/// resurrect it as an undo candidate.
fn touch(txns: &mut TxnTable, tid: TxnId, lsn: Lsn) -> DbResult {
    if txns.get(tid).is_none() {
        txns.insert(
            tid,
            TxnEntry {
                state: TxnState::CandidateForUndo,
                last_lsn: lsn,
                undo_next_lsn: lsn,
            },
        )?;
    }
    Ok(())
}

fn merge_snapshot(live: &mut TxnTable, snapshot: &TxnTable) -> DbResult {
    for (tid, e) in snapshot.iter() {
        match live.get_mut(*tid) {
            Some(cur) => {
                if e.last_lsn > cur.last_lsn {
                    cur.last_lsn = e.last_lsn;
                    cur.undo_next_lsn = e.undo_next_lsn;
                }
                if e.state == TxnState::Committed {
                    cur.state = TxnState::Committed;
                }
            }
            None => {
                let mut entry = *e;
                if entry.state == TxnState::Running {
                    entry.state = TxnState::CandidateForUndo;
                }
                live.insert(*tid, entry)?;
            }
        }
    }
    Ok(())
}

/// Re-apply every update whose LSN beats the on-disk page LSN,
/// starting from the oldest rec_lsn in the dirty page table.
fn redo(pager: &Pager, dpt: &DirtyTable) -> DbResult {
    let start = match dpt.min_rec_lsn() {
        Some(l) => l,
        None => return Ok(()),
    };

    let mut reader = pager.wal.reader()?;
    reader.seek(start)?;

    while let Some(rec) = reader.next_record()? {
        let (pg, after) = match &rec.body {
            RecordBody::Update { pg, after, .. } => (*pg, after),
            RecordBody::Compensation { pg, after, .. } => (*pg, after),
            _ => continue,
        };

        let rec_lsn = match dpt.get(pg) {
            Some(l) => l,
            None => continue,
        };
        if rec.lsn < rec_lsn {
            continue;
        }

        // An update may postdate the file's end if the crash hit
        // between the extend and any flush; regrow first.
        while pg >= pager.disk.npages() {
            pager.disk.extend()?;
        }

        let mut on_disk = Page::new_zeroed();
        pager.disk.read_page(pg, &mut on_disk)?;
        if on_disk.get_page_lsn() >= rec.lsn && on_disk.validate_for_db(crate::storage::PG_ANY).is_ok()
        {
            continue;
        }

        let mut restored = after.clone();
        restored.set_page_lsn(rec.lsn);
        restored.update_checksum();
        pager.disk.write_page(pg, &restored)?;
        debug!("redo: page {} to lsn {}", pg, rec.lsn);
    }
    Ok(())
}

/// Roll every loser back along its LSN chain, writing compensation
/// records, then close it with an END record.
fn undo(pager: &Pager, txns: TxnTable) -> DbResult {
    for tid in txns.tids() {
        let entry = *txns.get(tid).unwrap();
        match entry.state {
            TxnState::Committed => {
                // Commit made it to the log but END did not.
                pager.wal.write(tid, entry.last_lsn, RecordBody::End)?;
                continue;
            }
            TxnState::Done => continue,
            TxnState::Running | TxnState::CandidateForUndo => {}
        }

        debug!("undo: tx_{} from lsn {}", tid, entry.undo_next_lsn);
        let mut last_lsn = entry.last_lsn;
        let mut cur = entry.undo_next_lsn;

        while cur != 0 {
            let rec = pager.wal.pread(cur)?;
            match rec.body {
                RecordBody::Begin => break,
                RecordBody::Compensation { undo_next_lsn, .. } => {
                    cur = undo_next_lsn;
                }
                RecordBody::Update { pg, ref before, .. } => {
                    let clr_lsn = pager.wal.write(
                        tid,
                        last_lsn,
                        RecordBody::Compensation {
                            pg,
                            undo_next_lsn: rec.prev_lsn,
                            after: before.clone(),
                        },
                    )?;
                    last_lsn = clr_lsn;

                    while pg >= pager.disk.npages() {
                        pager.disk.extend()?;
                    }
                    let mut restored = before.clone();
                    restored.set_page_lsn(clr_lsn);
                    restored.update_checksum();
                    pager.disk.write_page(pg, &restored)?;
                    cur = rec.prev_lsn;
                }
                _ => {
                    return Err(DbError::corrupt(&format!(
                        "unexpected {} record in the undo chain of tx_{}",
                        rec.body.name(),
                        tid
                    )));
                }
            }
            // CLRs must be readable if we crash again mid-undo.
            pager.wal.flush_all()?;
        }

        pager.wal.write(tid, last_lsn, RecordBody::End)?;
    }
    Ok(())
}
