use crate::{
    consts::{RR_NBYT_OFST, RR_ROOT_OFST},
    storage::page::Page,
    types::{BSize, Pgno, PGNO_NULL},
};

pub(crate) fn init_empty(p: &mut Page) {
    p.put_u64(RR_ROOT_OFST, PGNO_NULL);
    p.put_u64(RR_NBYT_OFST, 0);
}

/// Typed view over an RPT_ROOT page: names the root of one
/// variable's rope tree and caches its total byte count.
pub trait RptRoot {
    fn rr_get_root(&self) -> Pgno;
    fn rr_set_root(&mut self, pg: Pgno);
    fn rr_get_nbytes(&self) -> BSize;
    fn rr_set_nbytes(&mut self, n: BSize);
}

impl RptRoot for Page {
    fn rr_get_root(&self) -> Pgno {
        self.get_u64(RR_ROOT_OFST)
    }

    fn rr_set_root(&mut self, pg: Pgno) {
        self.put_u64(RR_ROOT_OFST, pg);
    }

    fn rr_get_nbytes(&self) -> BSize {
        self.get_u64(RR_NBYT_OFST)
    }

    fn rr_set_nbytes(&mut self, n: BSize) {
        self.put_u64(RR_NBYT_OFST, n);
    }
}
