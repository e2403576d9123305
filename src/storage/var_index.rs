use crate::{
    consts::{
        VH_BKTS_OFST, VH_NBKT_OFST, VH_NBUCKETS, VP_DATA_OFST, VP_DATA_SIZE, VP_NEXT_OFST,
        VP_NLEN_OFST, VP_ROOT_OFST, VP_TAIL_OFST, VP_TLEN_OFST, VT_DATA_OFST, VT_DATA_SIZE,
        VT_NEXT_OFST, VT_USED_OFST,
    },
    storage::page::Page,
    types::{PSize, Pgno, PGNO_NULL},
};

pub(crate) fn init_hash_empty(p: &mut Page) {
    p.put_u32(VH_NBKT_OFST, VH_NBUCKETS as u32);
    for i in 0..VH_NBUCKETS {
        p.put_u64(VH_BKTS_OFST + 8 * i, PGNO_NULL);
    }
}

pub(crate) fn init_var_empty(p: &mut Page) {
    p.put_u64(VP_NEXT_OFST, PGNO_NULL);
    p.put_u64(VP_ROOT_OFST, PGNO_NULL);
    p.put_u64(VP_TAIL_OFST, PGNO_NULL);
    p.put_u32(VP_NLEN_OFST, 0);
    p.put_u32(VP_TLEN_OFST, 0);
}

pub(crate) fn init_tail_empty(p: &mut Page) {
    p.put_u64(VT_NEXT_OFST, PGNO_NULL);
    p.put_u32(VT_USED_OFST, 0);
}

/// Typed view over the VAR_HASH_PAGE bucket array (page 1).
pub trait VarHash {
    fn vh_nbuckets(&self) -> PSize;
    fn vh_get_bucket(&self, idx: PSize) -> Pgno;
    fn vh_set_bucket(&mut self, idx: PSize, pg: Pgno);
    fn vh_bucket_of(&self, name: &str) -> PSize;
}

impl VarHash for Page {
    fn vh_nbuckets(&self) -> PSize {
        self.get_u32(VH_NBKT_OFST)
    }

    fn vh_get_bucket(&self, idx: PSize) -> Pgno {
        assert!(idx < self.vh_nbuckets());
        self.get_u64(VH_BKTS_OFST + 8 * idx as usize)
    }

    fn vh_set_bucket(&mut self, idx: PSize, pg: Pgno) {
        assert!(idx < self.vh_nbuckets());
        self.put_u64(VH_BKTS_OFST + 8 * idx as usize, pg);
    }

    fn vh_bucket_of(&self, name: &str) -> PSize {
        (fnv1a(name.as_bytes()) % self.vh_nbuckets() as u64) as PSize
    }
}

// FNV-1a, the usual pick for short ascii keys.
fn fnv1a(bytes: &[u8]) -> u64 {
    let mut h: u64 = 0xcbf29ce484222325;
    for b in bytes {
        h ^= *b as u64;
        h = h.wrapping_mul(0x100000001b3);
    }
    h
}

/// Typed view over a VAR_PAGE: one variable record in a hash chain.
/// The record stores the name and the head of the type descriptor
/// inline; oversized descriptors continue in VAR_TAIL pages.
pub trait VarPage {
    fn vp_get_next(&self) -> Pgno;
    fn vp_set_next(&mut self, pg: Pgno);
    fn vp_get_root(&self) -> Pgno;
    fn vp_set_root(&mut self, pg: Pgno);
    fn vp_get_tail(&self) -> Pgno;
    fn vp_set_tail(&mut self, pg: Pgno);
    fn vp_name(&self) -> &[u8];
    fn vp_type_head(&self) -> &[u8];
    fn vp_type_len(&self) -> PSize;

    /// Store the name plus the leading part of `type_desc` that fits
    /// on this page; returns how many descriptor bytes were taken.
    fn vp_fill(&mut self, name: &str, type_desc: &[u8]) -> PSize;
}

impl VarPage for Page {
    fn vp_get_next(&self) -> Pgno {
        self.get_u64(VP_NEXT_OFST)
    }

    fn vp_set_next(&mut self, pg: Pgno) {
        self.put_u64(VP_NEXT_OFST, pg);
    }

    fn vp_get_root(&self) -> Pgno {
        self.get_u64(VP_ROOT_OFST)
    }

    fn vp_set_root(&mut self, pg: Pgno) {
        self.put_u64(VP_ROOT_OFST, pg);
    }

    fn vp_get_tail(&self) -> Pgno {
        self.get_u64(VP_TAIL_OFST)
    }

    fn vp_set_tail(&mut self, pg: Pgno) {
        self.put_u64(VP_TAIL_OFST, pg);
    }

    fn vp_name(&self) -> &[u8] {
        let nlen = self.get_u32(VP_NLEN_OFST) as usize;
        &self.raw()[VP_DATA_OFST..VP_DATA_OFST + nlen]
    }

    fn vp_type_head(&self) -> &[u8] {
        let nlen = self.get_u32(VP_NLEN_OFST) as usize;
        let inline = (self.get_u32(VP_TLEN_OFST) as usize).min(VP_DATA_SIZE - nlen);
        &self.raw()[VP_DATA_OFST + nlen..VP_DATA_OFST + nlen + inline]
    }

    fn vp_type_len(&self) -> PSize {
        self.get_u32(VP_TLEN_OFST)
    }

    fn vp_fill(&mut self, name: &str, type_desc: &[u8]) -> PSize {
        let name = name.as_bytes();
        assert!(name.len() < VP_DATA_SIZE);
        let inline = type_desc.len().min(VP_DATA_SIZE - name.len());

        self.put_u32(VP_NLEN_OFST, name.len() as u32);
        self.put_u32(VP_TLEN_OFST, type_desc.len() as u32);
        self.raw_mut()[VP_DATA_OFST..VP_DATA_OFST + name.len()].copy_from_slice(name);
        self.raw_mut()[VP_DATA_OFST + name.len()..VP_DATA_OFST + name.len() + inline]
            .copy_from_slice(&type_desc[..inline]);
        inline as PSize
    }
}

/// Typed view over a VAR_TAIL overflow page.
pub trait VarTail {
    fn vt_get_next(&self) -> Pgno;
    fn vt_set_next(&mut self, pg: Pgno);
    fn vt_used(&self) -> PSize;
    fn vt_data(&self) -> &[u8];
    fn vt_fill(&mut self, src: &[u8]) -> PSize;
}

impl VarTail for Page {
    fn vt_get_next(&self) -> Pgno {
        self.get_u64(VT_NEXT_OFST)
    }

    fn vt_set_next(&mut self, pg: Pgno) {
        self.put_u64(VT_NEXT_OFST, pg);
    }

    fn vt_used(&self) -> PSize {
        self.get_u32(VT_USED_OFST)
    }

    fn vt_data(&self) -> &[u8] {
        let used = self.vt_used() as usize;
        &self.raw()[VT_DATA_OFST..VT_DATA_OFST + used]
    }

    fn vt_fill(&mut self, src: &[u8]) -> PSize {
        let n = src.len().min(VT_DATA_SIZE);
        self.put_u32(VT_USED_OFST, n as u32);
        self.raw_mut()[VT_DATA_OFST..VT_DATA_OFST + n].copy_from_slice(&src[..n]);
        n as PSize
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageKind;

    #[test]
    fn test_hash_page_buckets() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::VarHashPage);
        assert_eq!(p.vh_nbuckets() as usize, VH_NBUCKETS);
        assert_eq!(p.vh_get_bucket(0), PGNO_NULL);
        p.vh_set_bucket(3, 42);
        assert_eq!(p.vh_get_bucket(3), 42);

        let b = p.vh_bucket_of("temperature");
        assert!(b < p.vh_nbuckets());
        assert_eq!(b, p.vh_bucket_of("temperature"));
    }

    #[test]
    fn test_var_page_inline_record() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::VarPage);
        let taken = p.vp_fill("pressure", &[1, 2, 3, 4]);
        assert_eq!(taken, 4);
        assert_eq!(p.vp_name(), b"pressure");
        assert_eq!(p.vp_type_head(), &[1, 2, 3, 4]);
        assert_eq!(p.vp_type_len(), 4);
    }

    #[test]
    fn test_var_page_spills_large_descriptor() {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::VarPage);
        let desc = vec![7u8; VP_DATA_SIZE + 100];
        let taken = p.vp_fill("v", &desc) as usize;
        assert_eq!(taken, VP_DATA_SIZE - 1);
        assert_eq!(p.vp_type_len() as usize, desc.len());

        let mut t = Page::new_zeroed();
        t.init_empty(PageKind::VarTail);
        let spilled = t.vt_fill(&desc[taken..]) as usize;
        assert_eq!(spilled, desc.len() - taken);
        assert_eq!(t.vt_data(), &desc[taken..]);
    }
}
