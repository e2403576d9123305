use crate::{
    consts::TS_NEXT_OFST,
    storage::page::Page,
    types::{Pgno, PGNO_NULL},
};

pub(crate) fn init_empty(p: &mut Page) {
    p.put_u64(TS_NEXT_OFST, PGNO_NULL);
}

/// Typed view over a TOMBSTONE page: one link of the free list
/// anchored at the root node.
pub trait Tombstone {
    fn ts_get_next(&self) -> Pgno;
    fn ts_set_next(&mut self, pg: Pgno);
}

impl Tombstone for Page {
    fn ts_get_next(&self) -> Pgno {
        self.get_u64(TS_NEXT_OFST)
    }

    fn ts_set_next(&mut self, pg: Pgno) {
        self.put_u64(TS_NEXT_OFST, pg);
    }
}
