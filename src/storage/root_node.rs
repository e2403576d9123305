use crate::{
    consts::{RN_FSTS_OFST, RN_MLSN_OFST},
    storage::page::Page,
    types::{Lsn, Pgno, PGNO_NULL},
};

pub(crate) fn init_empty(p: &mut Page) {
    p.put_u64(RN_FSTS_OFST, PGNO_NULL);
    p.put_u64(RN_MLSN_OFST, 0);
}

/// Typed view over the ROOT_NODE page (page 0): the database header
/// holding the tombstone free list anchor and the checkpoint master
/// LSN.
pub trait RootNode {
    fn rn_get_first_tombstone(&self) -> Pgno;
    fn rn_set_first_tombstone(&mut self, pg: Pgno);
    fn rn_get_master_lsn(&self) -> Lsn;
    fn rn_set_master_lsn(&mut self, lsn: Lsn);
}

impl RootNode for Page {
    fn rn_get_first_tombstone(&self) -> Pgno {
        self.get_u64(RN_FSTS_OFST)
    }

    fn rn_set_first_tombstone(&mut self, pg: Pgno) {
        self.put_u64(RN_FSTS_OFST, pg);
    }

    fn rn_get_master_lsn(&self) -> Lsn {
        self.get_u64(RN_MLSN_OFST)
    }

    fn rn_set_master_lsn(&mut self, lsn: Lsn) {
        self.put_u64(RN_MLSN_OFST, lsn);
    }
}
