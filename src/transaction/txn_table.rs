use std::{collections::HashMap, convert::TryInto};

use bytes::{BufMut, Bytes, BytesMut};

use crate::{
    consts::MAX_TIDS,
    error::{DbError, ErrorKind},
    transaction::tx::TxnState,
    types::{DbResult, Lsn, TxnId},
};

/// Per-transaction bookkeeping: state plus the LSN chain used for
/// undo. `last_lsn` is the most recent record carrying this tid;
/// `undo_next_lsn` is where rollback continues (CLRs move it past
/// already-compensated records).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TxnEntry {
    pub state: TxnState,
    pub last_lsn: Lsn,
    pub undo_next_lsn: Lsn,
}

/// The transaction table, keyed by tid. Lives in memory and is
/// serialized into CHECKPOINT_END records.
pub struct TxnTable {
    entries: HashMap<TxnId, TxnEntry>,
}

impl TxnTable {
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn insert(&mut self, tid: TxnId, entry: TxnEntry) -> DbResult {
        if !self.entries.contains_key(&tid) && self.entries.len() >= MAX_TIDS {
            return Err(DbError::new(
                ErrorKind::TxnFull,
                &format!("transaction table is full ({} entries)", MAX_TIDS),
            ));
        }
        self.entries.insert(tid, entry);
        Ok(())
    }

    pub fn get(&self, tid: TxnId) -> Option<&TxnEntry> {
        self.entries.get(&tid)
    }

    pub fn get_mut(&mut self, tid: TxnId) -> Option<&mut TxnEntry> {
        self.entries.get_mut(&tid)
    }

    pub fn expect_mut(&mut self, tid: TxnId) -> Result<&mut TxnEntry, DbError> {
        self.entries
            .get_mut(&tid)
            .ok_or_else(|| DbError::new(ErrorKind::NoTxn, &format!("no transaction {}", tid)))
    }

    pub fn remove(&mut self, tid: TxnId) -> Option<TxnEntry> {
        self.entries.remove(&tid)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn tids(&self) -> Vec<TxnId> {
        self.entries.keys().copied().collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&TxnId, &TxnEntry)> {
        self.entries.iter()
    }

    pub fn max_tid(&self) -> Option<TxnId> {
        self.entries.keys().max().copied()
    }

    pub fn serialize(&self) -> Bytes {
        let mut buf = BytesMut::new();
        buf.put_u32_le(self.entries.len() as u32);
        for (tid, e) in &self.entries {
            buf.put_u64_le(*tid);
            buf.put_u8(match e.state {
                TxnState::Running => 0,
                TxnState::CandidateForUndo => 1,
                TxnState::Committed => 2,
                TxnState::Done => 3,
            });
            buf.put_u64_le(e.last_lsn);
            buf.put_u64_le(e.undo_next_lsn);
        }
        buf.freeze()
    }

    /// Deserialize from a checkpoint payload, returning the table
    /// and the number of bytes consumed.
    pub fn deserialize(src: &[u8]) -> Result<(Self, usize), DbError> {
        if src.len() < 4 {
            return Err(DbError::corrupt("truncated transaction table"));
        }
        let count = u32::from_le_bytes(src[..4].try_into().unwrap()) as usize;
        let mut pos = 4;
        let mut table = TxnTable::new();
        for _ in 0..count {
            if pos + 25 > src.len() {
                return Err(DbError::corrupt("truncated transaction table entry"));
            }
            let tid = u64::from_le_bytes(src[pos..pos + 8].try_into().unwrap());
            let state = match src[pos + 8] {
                0 => TxnState::Running,
                1 => TxnState::CandidateForUndo,
                2 => TxnState::Committed,
                3 => TxnState::Done,
                v => {
                    return Err(DbError::corrupt(&format!("bad transaction state {}", v)));
                }
            };
            let last_lsn = u64::from_le_bytes(src[pos + 9..pos + 17].try_into().unwrap());
            let undo_next_lsn = u64::from_le_bytes(src[pos + 17..pos + 25].try_into().unwrap());
            table.insert(
                tid,
                TxnEntry {
                    state,
                    last_lsn,
                    undo_next_lsn,
                },
            )?;
            pos += 25;
        }
        Ok((table, pos))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_serialize_round_trip() {
        let mut t = TxnTable::new();
        t.insert(
            3,
            TxnEntry {
                state: TxnState::Running,
                last_lsn: 100,
                undo_next_lsn: 100,
            },
        )
        .unwrap();
        t.insert(
            9,
            TxnEntry {
                state: TxnState::Committed,
                last_lsn: 220,
                undo_next_lsn: 180,
            },
        )
        .unwrap();

        let bytes = t.serialize();
        let (back, used) = TxnTable::deserialize(&bytes).unwrap();
        assert_eq!(used, bytes.len());
        assert_eq!(back.len(), 2);
        assert_eq!(back.get(3), t.get(3));
        assert_eq!(back.get(9).unwrap().last_lsn, 220);
    }

    #[test]
    fn test_cap_is_enforced() {
        let mut t = TxnTable::new();
        let entry = TxnEntry {
            state: TxnState::Running,
            last_lsn: 0,
            undo_next_lsn: 0,
        };
        for tid in 0..MAX_TIDS as u64 {
            t.insert(tid, entry).unwrap();
        }
        let err = t.insert(MAX_TIDS as u64, entry).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::TxnFull);
    }
}
