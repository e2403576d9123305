//! The on-disk variable index: a fixed-bucket hash table rooted at
//! page 1 mapping variable names to their type descriptor bytes and
//! the RPT_ROOT page of their byte sequence. Chains are singly
//! linked VAR_PAGE records; descriptors too large for one record
//! spill into VAR_TAIL overflow pages.

use std::sync::Arc;

use log::debug;

use crate::{
    consts::VT_DATA_SIZE,
    error::{DbError, ErrorKind},
    pager::{Pager, VHASH_PGNO},
    storage::{
        page::PageKind,
        var_index::{VarHash, VarPage, VarTail},
    },
    transaction::Transaction,
    types::{DbResult, Pgno, PGNO_NULL},
};

pub struct VarIndex;

impl VarIndex {
    /// Register a variable, allocating its (empty) tree. Returns the
    /// RPT_ROOT page number callers open cursors on.
    pub fn create(
        pager: &Arc<Pager>,
        tx: &Transaction,
        name: &str,
        type_desc: &[u8],
    ) -> Result<Pgno, DbError> {
        if Self::lookup(pager, name)?.is_some() {
            return Err(DbError::new(
                ErrorKind::InvalidArgument,
                &format!("variable {:?} already exists", name),
            ));
        }

        let mut rr = pager.new_page(tx, PageKind::RptRoot)?;
        let rr_pg = rr.pgno();
        pager.save(&mut rr)?;
        pager.release(rr);

        let mut vp = pager.new_page(tx, PageKind::VarPage)?;
        let taken = {
            let mut page = vp.write();
            let taken = page.vp_fill(name, type_desc);
            page.vp_set_root(rr_pg);
            taken as usize
        };

        // Overflow tails are built back to front so each link knows
        // its successor.
        let mut tail_pg = PGNO_NULL;
        let spill = &type_desc[taken..];
        let chunks: Vec<&[u8]> = spill.chunks(VT_DATA_SIZE).collect();
        for chunk in chunks.into_iter().rev() {
            let mut t = pager.new_page(tx, PageKind::VarTail)?;
            {
                let mut page = t.write();
                page.vt_fill(chunk);
                page.vt_set_next(tail_pg);
            }
            tail_pg = t.pgno();
            pager.save(&mut t)?;
            pager.release(t);
        }
        vp.write().vp_set_tail(tail_pg);

        let mut hb = pager.get_writable(tx, PageKind::VarHashPage.bit(), VHASH_PGNO)?;
        let bucket = hb.read().vh_bucket_of(name);
        let head = hb.read().vh_get_bucket(bucket);

        vp.write().vp_set_next(head);
        let vp_pg = vp.pgno();
        pager.save(&mut vp)?;
        pager.release(vp);

        hb.write().vh_set_bucket(bucket, vp_pg);
        pager.save(&mut hb)?;
        pager.release(hb);

        debug!("variable {:?} created, rpt root {}", name, rr_pg);
        Ok(rr_pg)
    }

    /// Find a variable: its full type descriptor and RPT_ROOT page.
    pub fn lookup(pager: &Arc<Pager>, name: &str) -> Result<Option<(Vec<u8>, Pgno)>, DbError> {
        let hb = pager.get(PageKind::VarHashPage.bit(), VHASH_PGNO)?;
        let bucket = hb.read().vh_bucket_of(name);
        let mut cur = hb.read().vh_get_bucket(bucket);
        pager.release(hb);

        while cur != PGNO_NULL {
            let vp = pager.get(PageKind::VarPage.bit(), cur)?;
            let matches = vp.read().vp_name() == name.as_bytes();
            if !matches {
                cur = vp.read().vp_get_next();
                pager.release(vp);
                continue;
            }

            let (mut desc, want, root, mut tail) = {
                let page = vp.read();
                (
                    page.vp_type_head().to_vec(),
                    page.vp_type_len() as usize,
                    page.vp_get_root(),
                    page.vp_get_tail(),
                )
            };
            pager.release(vp);

            while desc.len() < want && tail != PGNO_NULL {
                let t = pager.get(PageKind::VarTail.bit(), tail)?;
                desc.extend_from_slice(t.read().vt_data());
                tail = t.read().vt_get_next();
                pager.release(t);
            }
            if desc.len() != want {
                return Err(DbError::corrupt(&format!(
                    "variable {:?}: descriptor is {} bytes, expected {}",
                    name,
                    desc.len(),
                    want
                )));
            }
            return Ok(Some((desc, root)));
        }
        Ok(None)
    }

    /// Unlink a variable's record and tombstone it with its tails.
    /// The variable's tree itself is the caller's to dispose of.
    pub fn remove(pager: &Arc<Pager>, tx: &Transaction, name: &str) -> DbResult {
        let mut hb = pager.get_writable(tx, PageKind::VarHashPage.bit(), VHASH_PGNO)?;
        let bucket = hb.read().vh_bucket_of(name);
        let head = hb.read().vh_get_bucket(bucket);

        let mut prev: Option<Pgno> = None;
        let mut cur = head;
        while cur != PGNO_NULL {
            let vp = pager.get(PageKind::VarPage.bit(), cur)?;
            let (is_match, next, tail) = {
                let page = vp.read();
                (
                    page.vp_name() == name.as_bytes(),
                    page.vp_get_next(),
                    page.vp_get_tail(),
                )
            };

            if !is_match {
                pager.release(vp);
                prev = Some(cur);
                cur = next;
                continue;
            }

            // Splice the record out of its chain.
            match prev {
                None => {
                    hb.write().vh_set_bucket(bucket, next);
                    pager.save(&mut hb)?;
                    pager.release(hb);
                }
                Some(prev_pg) => {
                    pager.release(hb);
                    let mut ph = pager.get_writable(tx, PageKind::VarPage.bit(), prev_pg)?;
                    ph.write().vp_set_next(next);
                    pager.save(&mut ph)?;
                    pager.release(ph);
                }
            }

            pager.delete_and_release(tx, vp)?;

            let mut t = tail;
            while t != PGNO_NULL {
                let th = pager.get(PageKind::VarTail.bit(), t)?;
                let next_t = th.read().vt_get_next();
                pager.delete_and_release(tx, th)?;
                t = next_t;
            }

            debug!("variable {:?} removed", name);
            return Ok(());
        }

        pager.release(hb);
        Err(DbError::new(
            ErrorKind::InvalidArgument,
            &format!("variable {:?} does not exist", name),
        ))
    }
}
