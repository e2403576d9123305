use std::{collections::HashMap, convert::TryInto};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    consts::MEMORY_PAGE_LEN,
    error::{DbError, ErrorKind},
    types::{DbResult, Lsn, Pgno},
};

/// The dirty page table: for every page whose in-memory copy differs
/// from disk, the LSN at which it first became dirty. `rec_lsn` never
/// moves forward while the page stays dirty; redo starts at the
/// minimum over the table.
pub struct DirtyTable {
    entries: HashMap<Pgno, Lsn>,
}

impl DirtyTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn add_if_absent(&mut self, pg: Pgno, rec_lsn: Lsn) -> DbResult {
        if self.entries.contains_key(&pg) {
            return Ok(());
        }
        if self.entries.len() >= MEMORY_PAGE_LEN {
            return Err(DbError::new(
                ErrorKind::DpgtFull,
                &format!("dirty page table is full ({} entries)", MEMORY_PAGE_LEN),
            ));
        }
        self.entries.insert(pg, rec_lsn);
        Ok(())
    }

    /// Merge a checkpoint snapshot in, keeping the earliest rec_lsn
    /// for pages present in both.
    pub fn merge_keep_min(&mut self, other: &DirtyTable) -> DbResult {
        for (pg, lsn) in &other.entries {
            match self.entries.get_mut(pg) {
                Some(cur) => {
                    if *lsn < *cur {
                        *cur = *lsn;
                    }
                }
                None => {
                    self.add_if_absent(*pg, *lsn)?;
                }
            }
        }
        Ok(())
    }

    pub fn get(&self, pg: Pgno) -> Option<Lsn> {
        self.entries.get(&pg).copied()
    }

    pub fn remove(&mut self, pg: Pgno) {
        self.entries.remove(&pg);
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn min_rec_lsn(&self) -> Option<Lsn> {
        self.entries.values().min().copied()
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.entries.len() as u32);
        for (pg, lsn) in &self.entries {
            buf.put_u64_le(*pg);
            buf.put_u64_le(*lsn);
        }
        buf.freeze()
    }

    /// Deserialize from a checkpoint payload, returning the table
    /// and the number of bytes consumed.
    pub fn deserialize(src: &[u8]) -> Result<(Self, usize), DbError> {
        if src.len() < 4 {
            return Err(DbError::corrupt("truncated dirty page table"));
        }
        let count = u32::from_le_bytes(src[..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut table = DirtyTable::new();
        for _ in 0..count {
            if pos + 16 > src.len() {
                return Err(DbError::corrupt("truncated dirty page entry"));
            }
            let pg = u64::from_le_bytes(src[pos..pos + 8].try_into().unwrap());
            let lsn = u64::from_le_bytes(src[pos + 8..pos + 16].try_into().unwrap());
            table.add_if_absent(pg, lsn)?;
            pos += 16;
        }
        Ok((table, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rec_lsn_never_advances() {
        let mut t = DirtyTable::new();
        t.add_if_absent(7, 100).unwrap();
        t.add_if_absent(7, 200).unwrap();
        assert_eq!(t.get(7), Some(100));
    }

    #[test]
    fn test_min_rec_lsn() {
        let mut t = DirtyTable::new();
        assert_eq!(t.min_rec_lsn(), None);
        t.add_if_absent(1, 300).unwrap();
        t.add_if_absent(2, 120).unwrap();
        t.add_if_absent(3, 500).unwrap();
        assert_eq!(t.min_rec_lsn(), Some(120));
    }

    #[test]
    fn test_serialize_round_trip() {
        let mut t = DirtyTable::new();
        t.add_if_absent(4, 44).unwrap();
        t.add_if_absent(9, 99).unwrap();
        let bytes = t.serialize();
        let (back, used) = DirtyTable::deserialize(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back.get(4), Some(44));
        assert_eq!(back.get(9), Some(99));
        assert_eq!(back.len(), 2);
    }
}
