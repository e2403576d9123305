use crate::{
    consts::{DL_DATA_OFST, DL_DATA_SIZE, DL_NEXT_OFST, DL_PREV_OFST, DL_USED_OFST},
    storage::page::Page,
    types::{PSize, Pgno, PGNO_NULL},
};

pub(crate) fn init_empty(p: &mut Page) {
    p.put_u64(DL_NEXT_OFST, PGNO_NULL);
    p.put_u64(DL_PREV_OFST, PGNO_NULL);
    p.put_u32(DL_USED_OFST, 0);
}

/// Typed view over a DATA_LIST page: a contiguous run of payload
/// bytes plus doubly-linked sibling pointers.
pub trait DataList {
    fn dl_get_next(&self) -> Pgno;
    fn dl_set_next(&mut self, pg: Pgno);
    fn dl_get_prev(&self) -> Pgno;
    fn dl_set_prev(&mut self, pg: Pgno);
    fn dl_used(&self) -> PSize;
    fn dl_set_used(&mut self, used: PSize);
    fn dl_avail(&self) -> PSize;
    fn dl_data(&self) -> &[u8];

    /// Append bytes at the end of the payload; returns how many fit.
    fn dl_append(&mut self, src: &[u8]) -> PSize;

    /// Overwrite payload bytes starting at `ofst`; the range must be
    /// within `used`.
    fn dl_write_at(&mut self, ofst: PSize, src: &[u8]);

    /// Cut `len` bytes out of the payload at `ofst`, shifting the
    /// tail left.
    fn dl_remove_at(&mut self, ofst: PSize, len: PSize);

    /// Truncate the payload to `len` bytes, returning the cut tail.
    fn dl_split_off(&mut self, len: PSize) -> Vec<u8>;
}

impl DataList for Page {
    fn dl_get_next(&self) -> Pgno {
        self.get_u64(DL_NEXT_OFST)
    }

    fn dl_set_next(&mut self, pg: Pgno) {
        self.put_u64(DL_NEXT_OFST, pg);
    }

    fn dl_get_prev(&self) -> Pgno {
        self.get_u64(DL_PREV_OFST)
    }

    fn dl_set_prev(&mut self, pg: Pgno) {
        self.put_u64(DL_PREV_OFST, pg);
    }

    fn dl_used(&self) -> PSize {
        self.get_u32(DL_USED_OFST)
    }

    fn dl_set_used(&mut self, used: PSize) {
        assert!(used as usize <= DL_DATA_SIZE);
        self.put_u32(DL_USED_OFST, used);
    }

    fn dl_avail(&self) -> PSize {
        (DL_DATA_SIZE - self.dl_used() as usize) as PSize
    }

    fn dl_data(&self) -> &[u8] {
        let used = self.dl_used() as usize;
        &self.raw()[DL_DATA_OFST..DL_DATA_OFST + used]
    }

    fn dl_append(&mut self, src: &[u8]) -> PSize {
        let used = self.dl_used() as usize;
        let n = src.len().min(DL_DATA_SIZE - used);
        let start = DL_DATA_OFST + used;
        self.raw_mut()[start..start + n].copy_from_slice(&src[..n]);
        self.dl_set_used((used + n) as PSize);
        n as PSize
    }

    fn dl_write_at(&mut self, ofst: PSize, src: &[u8]) {
        let used = self.dl_used() as usize;
        let start = DL_DATA_OFST + ofst as usize;
        assert!(ofst as usize + src.len() <= used);
        self.raw_mut()[start..start + src.len()].copy_from_slice(src);
    }

    fn dl_remove_at(&mut self, ofst: PSize, len: PSize) {
        let used = self.dl_used() as usize;
        let ofst = ofst as usize;
        let len = len as usize;
        assert!(ofst + len <= used);
        self.raw_mut()
            .copy_within(DL_DATA_OFST + ofst + len..DL_DATA_OFST + used, DL_DATA_OFST + ofst);
        self.dl_set_used((used - len) as PSize);
    }

    fn dl_split_off(&mut self, len: PSize) -> Vec<u8> {
        let used = self.dl_used();
        assert!(len <= used);
        let tail = self.dl_data()[len as usize..].to_vec();
        self.dl_set_used(len);
        tail
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageKind;

    fn leaf() -> Page {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::DataList);
        p
    }

    #[test]
    fn test_append_and_read_back() {
        let mut p = leaf();
        assert_eq!(p.dl_append(&[1, 2, 3]), 3);
        assert_eq!(p.dl_used(), 3);
        assert_eq!(p.dl_data(), &[1, 2, 3]);
        assert_eq!(p.dl_get_next(), PGNO_NULL);
        assert_eq!(p.dl_get_prev(), PGNO_NULL);
    }

    #[test]
    fn test_append_stops_at_capacity() {
        let mut p = leaf();
        let big = vec![7u8; DL_DATA_SIZE + 100];
        assert_eq!(p.dl_append(&big) as usize, DL_DATA_SIZE);
        assert_eq!(p.dl_avail(), 0);
        assert_eq!(p.dl_append(&[1]), 0);
    }

    #[test]
    fn test_remove_shifts_tail_left() {
        let mut p = leaf();
        p.dl_append(&[0, 1, 2, 3, 4, 5]);
        p.dl_remove_at(1, 3);
        assert_eq!(p.dl_data(), &[0, 4, 5]);
    }

    #[test]
    fn test_split_off_keeps_prefix() {
        let mut p = leaf();
        p.dl_append(&[9, 8, 7, 6]);
        let tail = p.dl_split_off(1);
        assert_eq!(tail, vec![8, 7, 6]);
        assert_eq!(p.dl_data(), &[9]);
    }
}
