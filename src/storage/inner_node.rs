use crate::{
    consts::{IN_LEAF_OFST, IN_MAX_KEYS, IN_NEXT_OFST, IN_NKEY_OFST, IN_PREV_OFST, PAGE_SIZE},
    storage::page::Page,
    types::{BSize, PSize, Pgno, PGNO_NULL},
};

pub(crate) fn init_empty(p: &mut Page) {
    p.put_u64(IN_NEXT_OFST, PGNO_NULL);
    p.put_u64(IN_PREV_OFST, PGNO_NULL);
    p.put_u32(IN_NKEY_OFST, 0);
}

/// Typed view over an INNER_NODE page.
///
/// The node stores `nkeys + 1` child page numbers growing up from the
/// front and `nkeys` keys growing down from the page end (key 0 is
/// the last 8 bytes). Key `i` is the cumulative byte count of the
/// subtrees under children `0..=i`; the rightmost child is unkeyed.
pub trait InnerNode {
    fn in_get_next(&self) -> Pgno;
    fn in_set_next(&mut self, pg: Pgno);
    fn in_get_prev(&self) -> Pgno;
    fn in_set_prev(&mut self, pg: Pgno);
    fn in_nkeys(&self) -> PSize;
    fn in_get_key(&self, idx: PSize) -> BSize;
    fn in_get_child(&self, idx: PSize) -> Pgno;
    fn in_children(&self) -> Vec<Pgno>;

    /// Pick the child to descend into for byte offset `loc`: the
    /// leftmost child whose cumulative key is strictly greater than
    /// `loc`, so a seek to an exact boundary lands at the start of
    /// the right-hand subtree.
    fn in_choose_child(&self, loc: BSize) -> PSize;

    /// Cumulative bytes to the left of child `idx`.
    fn in_left_of(&self, idx: PSize) -> BSize;

    /// Byte size of the subtree under child `idx`. The rightmost
    /// child's size is not stored locally, so the caller must pass
    /// the node's own subtree total.
    fn in_child_size(&self, idx: PSize, node_total: BSize) -> BSize;

    /// Replace the whole fanout with `children` and their subtree
    /// sizes. `children.len()` must be `sizes.len()` and at most
    /// `IN_MAX_KEYS + 1`; keys are rebuilt as prefix sums.
    fn in_set_fanout(&mut self, children: &[Pgno], sizes: &[BSize]);
}

impl InnerNode for Page {
    fn in_get_next(&self) -> Pgno {
        self.get_u64(IN_NEXT_OFST)
    }

    fn in_set_next(&mut self, pg: Pgno) {
        self.put_u64(IN_NEXT_OFST, pg);
    }

    fn in_get_prev(&self) -> Pgno {
        self.get_u64(IN_PREV_OFST)
    }

    fn in_set_prev(&mut self, pg: Pgno) {
        self.put_u64(IN_PREV_OFST, pg);
    }

    fn in_nkeys(&self) -> PSize {
        self.get_u32(IN_NKEY_OFST)
    }

    fn in_get_key(&self, idx: PSize) -> BSize {
        assert!(idx < self.in_nkeys());
        self.get_u64(PAGE_SIZE - 8 * (idx as usize + 1))
    }

    fn in_get_child(&self, idx: PSize) -> Pgno {
        assert!(idx <= self.in_nkeys());
        self.get_u64(IN_LEAF_OFST + 8 * idx as usize)
    }

    fn in_children(&self) -> Vec<Pgno> {
        (0..=self.in_nkeys()).map(|i| self.in_get_child(i)).collect()
    }

    fn in_choose_child(&self, loc: BSize) -> PSize {
        let nkeys = self.in_nkeys();
        for i in 0..nkeys {
            if self.in_get_key(i) > loc {
                return i;
            }
        }
        nkeys
    }

    fn in_left_of(&self, idx: PSize) -> BSize {
        if idx == 0 {
            0
        } else {
            self.in_get_key(idx - 1)
        }
    }

    fn in_child_size(&self, idx: PSize, node_total: BSize) -> BSize {
        let nkeys = self.in_nkeys();
        if idx < nkeys {
            self.in_get_key(idx) - self.in_left_of(idx)
        } else {
            node_total - self.in_left_of(nkeys)
        }
    }

    fn in_set_fanout(&mut self, children: &[Pgno], sizes: &[BSize]) {
        assert_eq!(children.len(), sizes.len());
        assert!(!children.is_empty());
        assert!(children.len() <= IN_MAX_KEYS + 1);

        let nkeys = children.len() - 1;
        self.put_u32(IN_NKEY_OFST, nkeys as PSize);
        for (i, pg) in children.iter().enumerate() {
            self.put_u64(IN_LEAF_OFST + 8 * i, *pg);
        }

        let mut cum = 0;
        for i in 0..nkeys {
            cum += sizes[i];
            self.put_u64(PAGE_SIZE - 8 * (i + 1), cum);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::page::PageKind;

    fn node(children: &[Pgno], sizes: &[BSize]) -> Page {
        let mut p = Page::new_zeroed();
        p.init_empty(PageKind::InnerNode);
        p.in_set_fanout(children, sizes);
        p
    }

    #[test]
    fn test_keys_are_prefix_sums() {
        let p = node(&[10, 11, 12, 13], &[1, 4, 5, 2]);
        assert_eq!(p.in_nkeys(), 3);
        assert_eq!(p.in_get_key(0), 1);
        assert_eq!(p.in_get_key(1), 5);
        assert_eq!(p.in_get_key(2), 10);
        assert_eq!(p.in_children(), vec![10, 11, 12, 13]);
    }

    #[test]
    fn test_choose_child_boundaries() {
        // keys 1, 5, 10 over children a b c d
        let p = node(&[1, 2, 3, 4], &[1, 4, 5, 2]);
        assert_eq!(p.in_choose_child(0), 0);
        assert_eq!(p.in_choose_child(1), 1);
        assert_eq!(p.in_choose_child(2), 1);
        assert_eq!(p.in_choose_child(7), 2);
        assert_eq!(p.in_choose_child(11), 3);
    }

    #[test]
    fn test_child_sizes_need_total_for_rightmost() {
        let p = node(&[1, 2, 3], &[6, 3, 8]);
        let total = 6 + 3 + 8;
        assert_eq!(p.in_child_size(0, total), 6);
        assert_eq!(p.in_child_size(1, total), 3);
        assert_eq!(p.in_child_size(2, total), 8);
    }

    #[test]
    fn test_max_fanout_fits_in_page() {
        let children: Vec<Pgno> = (0..=IN_MAX_KEYS as u64).collect();
        let sizes: Vec<BSize> = vec![1; IN_MAX_KEYS + 1];
        let p = node(&children, &sizes);
        assert_eq!(p.in_nkeys() as usize, IN_MAX_KEYS);
        assert_eq!(p.in_get_child(IN_MAX_KEYS as PSize), IN_MAX_KEYS as u64);
        assert_eq!(p.in_get_key(IN_MAX_KEYS as PSize - 1), IN_MAX_KEYS as u64);
        // key array must not collide with the child array
        assert!(IN_LEAF_OFST + 8 * (IN_MAX_KEYS + 1) <= PAGE_SIZE - 8 * IN_MAX_KEYS);
    }
}
