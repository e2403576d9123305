//! Tunable constants for the storage engine.
//!
//! Every on-disk offset below is little-endian and derived from
//! `PAGE_SIZE`; changing `PAGE_SIZE` changes the file format.

/// Size of a single page on disk, in bytes.
pub const PAGE_SIZE: usize = 2048;

/// Number of page frames held by the buffer pool.
pub const MEMORY_PAGE_LEN: usize = 100;

/// Capacity of the in-memory WAL append buffer, in bytes.
pub const WAL_BUFFER_CAP: usize = 1_000_000;

/// Maximum number of fresh leaves a single insert chunk may create.
pub const MAX_NUPD_SIZE: usize = 200;

/// Maximum number of live transactions.
pub const MAX_TIDS: usize = 1000;

/// Maximum number of distinct resources in the lock table.
pub const LOCK_TABLE_CAP: usize = 4096;

/// Maximum depth of a cursor's descent stack.
pub const PAGE_STACK_DEPTH: usize = 20;

// Common page header: checksum (u32), type tag (u8), page lsn (u64).
pub const PG_CKSM_OFST: usize = 0;
pub const PG_TYPE_OFST: usize = 4;
pub const PG_PLSN_OFST: usize = 5;
pub const PG_COMMON_END: usize = PG_PLSN_OFST + 8;

// DATA_LIST layout: next, prev, used, raw bytes.
pub const DL_NEXT_OFST: usize = PG_COMMON_END;
pub const DL_PREV_OFST: usize = DL_NEXT_OFST + 8;
pub const DL_USED_OFST: usize = DL_PREV_OFST + 8;
pub const DL_DATA_OFST: usize = DL_USED_OFST + 4;

/// Payload capacity of one data list leaf.
pub const DL_DATA_SIZE: usize = PAGE_SIZE - DL_DATA_OFST;

/// A leaf holding fewer bytes than this is a merge candidate.
pub const DL_MERGE_THRESHOLD: usize = DL_DATA_SIZE / 2;

// INNER_NODE layout: next, prev, nkeys, children upward, keys growing
// down from the page end.
pub const IN_NEXT_OFST: usize = PG_COMMON_END;
pub const IN_PREV_OFST: usize = IN_NEXT_OFST + 8;
pub const IN_NKEY_OFST: usize = IN_PREV_OFST + 8;
pub const IN_LEAF_OFST: usize = IN_NKEY_OFST + 4;

/// Maximum number of keys in one inner node. An inner node stores
/// `nkeys + 1` child page numbers and `nkeys` cumulative keys, so the
/// capacity is `(space - one pgno) / (pgno + key)`.
pub const IN_MAX_KEYS: usize = (PAGE_SIZE - IN_LEAF_OFST - 8) / 16;

// ROOT_NODE layout: first tombstone, master lsn.
pub const RN_FSTS_OFST: usize = PG_COMMON_END;
pub const RN_MLSN_OFST: usize = RN_FSTS_OFST + 8;

// TOMBSTONE layout: next free page.
pub const TS_NEXT_OFST: usize = PG_COMMON_END;

// RPT_ROOT layout: tree root, total bytes.
pub const RR_ROOT_OFST: usize = PG_COMMON_END;
pub const RR_NBYT_OFST: usize = RR_ROOT_OFST + 8;

// VAR_HASH_PAGE layout: bucket count, chain heads.
pub const VH_NBKT_OFST: usize = PG_COMMON_END;
pub const VH_BKTS_OFST: usize = VH_NBKT_OFST + 4;
pub const VH_NBUCKETS: usize = (PAGE_SIZE - VH_BKTS_OFST) / 8;

// VAR_PAGE layout: chain next, rpt root, tail, name len, type len,
// then name bytes followed by type descriptor bytes.
pub const VP_NEXT_OFST: usize = PG_COMMON_END;
pub const VP_ROOT_OFST: usize = VP_NEXT_OFST + 8;
pub const VP_TAIL_OFST: usize = VP_ROOT_OFST + 8;
pub const VP_NLEN_OFST: usize = VP_TAIL_OFST + 8;
pub const VP_TLEN_OFST: usize = VP_NLEN_OFST + 4;
pub const VP_DATA_OFST: usize = VP_TLEN_OFST + 4;
pub const VP_DATA_SIZE: usize = PAGE_SIZE - VP_DATA_OFST;

// VAR_TAIL layout: overflow next, used, payload.
pub const VT_NEXT_OFST: usize = PG_COMMON_END;
pub const VT_USED_OFST: usize = VT_NEXT_OFST + 8;
pub const VT_DATA_OFST: usize = VT_USED_OFST + 4;
pub const VT_DATA_SIZE: usize = PAGE_SIZE - VT_DATA_OFST;

/// Largest number of payload bytes one insert or remove chunk touches
/// before the driver loop re-seeks.
pub const NUPD_MAX_DATA_LENGTH: usize = MAX_NUPD_SIZE * DL_DATA_SIZE;
