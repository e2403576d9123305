mod common;

use rope_db::{
    consts::DL_DATA_SIZE,
    storage::{page::PageKind, RptRoot},
    Pgno, RptCursor, PGNO_NULL,
};

use crate::common::{new_db, pattern, TestDb};

fn create_tree(db: &TestDb) -> Pgno {
    let tx = db.pager.begin_txn().unwrap();
    let cursor = RptCursor::create(&tx, db.pager.clone()).unwrap();
    let meta = cursor.meta_root();
    cursor.close().unwrap();
    db.pager.commit(&tx).unwrap();
    meta
}

fn insert_committed(db: &TestDb, meta: Pgno, data: &[u8], ofst: u64) {
    let tx = db.pager.begin_txn().unwrap();
    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    cursor.enter_transaction(&tx);
    cursor.insert(data, ofst).unwrap();
    cursor.leave_transaction();
    cursor.close().unwrap();
    db.pager.commit(&tx).unwrap();
}

fn remove_committed(
    db: &TestDb,
    meta: Pgno,
    dest: Option<&mut [u8]>,
    bsize: u32,
    bstart: u64,
    stride: u32,
    nelems: u64,
) {
    let tx = db.pager.begin_txn().unwrap();
    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    cursor.enter_transaction(&tx);
    cursor.remove(dest, bsize, bstart, stride, nelems).unwrap();
    cursor.leave_transaction();
    cursor.close().unwrap();
    db.pager.commit(&tx).unwrap();
}

fn read_all(db: &TestDb, meta: Pgno) -> Vec<u8> {
    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    let total = cursor.total_size() as usize;
    let mut dest = vec![0u8; total];
    let n = cursor.read(&mut dest, 1, 0, 1).unwrap();
    assert_eq!(n as usize, total);
    cursor.close().unwrap();
    dest
}

#[test]
fn test_remove_prefix() {
    let db = new_db("rm_prefix");
    let meta = create_tree(&db);

    let data = pattern(5000, 1);
    insert_committed(&db, meta, &data, 0);

    remove_committed(&db, meta, None, 1, 0, 1, 1200);
    assert_eq!(read_all(&db, meta), &data[1200..]);
}

#[test]
fn test_remove_suffix() {
    let db = new_db("rm_suffix");
    let meta = create_tree(&db);

    let data = pattern(5000, 2);
    insert_committed(&db, meta, &data, 0);

    remove_committed(&db, meta, None, 1, 3000, 1, 2000);
    assert_eq!(read_all(&db, meta), &data[..3000]);
}

#[test]
fn test_remove_interior_across_leaves() {
    let db = new_db("rm_interior");
    let meta = create_tree(&db);

    let data = pattern(4 * DL_DATA_SIZE, 3);
    insert_committed(&db, meta, &data, 0);

    // Cut a range that starts mid-leaf, swallows whole leaves and
    // ends mid-leaf.
    let start = 900u64;
    let count = (2 * DL_DATA_SIZE + 500) as u64;
    remove_committed(&db, meta, None, 1, start, 1, count);

    let mut expected = data[..start as usize].to_vec();
    expected.extend_from_slice(&data[start as usize + count as usize..]);
    assert_eq!(read_all(&db, meta), expected);
}

#[test]
fn test_remove_everything_resets_the_tree() {
    let db = new_db("rm_everything");
    let meta = create_tree(&db);

    let data = pattern(2 * DL_DATA_SIZE + 600, 4);
    insert_committed(&db, meta, &data, 0);

    remove_committed(&db, meta, None, 1, 0, 1, data.len() as u64);

    let h = db.pager.get(PageKind::RptRoot.bit(), meta).unwrap();
    assert_eq!(h.read().rr_get_root(), PGNO_NULL);
    assert_eq!(h.read().rr_get_nbytes(), 0);
    db.pager.release(h);

    // The tree is usable again afterwards.
    let again = pattern(800, 5);
    insert_committed(&db, meta, &again, 0);
    assert_eq!(read_all(&db, meta), again);
}

#[test]
fn test_remove_captures_bytes() {
    let db = new_db("rm_capture");
    let meta = create_tree(&db);

    let data = pattern(3000, 6);
    insert_committed(&db, meta, &data, 0);

    let mut taken = vec![0u8; 700];
    remove_committed(&db, meta, Some(&mut taken), 1, 1100, 1, 700);

    assert_eq!(taken, &data[1100..1800]);
    let mut expected = data[..1100].to_vec();
    expected.extend_from_slice(&data[1800..]);
    assert_eq!(read_all(&db, meta), expected);
}

#[test]
fn test_strided_remove() {
    let db = new_db("rm_strided");
    let meta = create_tree(&db);

    // Ten 4-byte elements 0..10.
    let mut data = Vec::new();
    for i in 0u32..10 {
        data.extend_from_slice(&i.to_le_bytes());
    }
    insert_committed(&db, meta, &data, 0);

    // Remove elements 0, 2 and 4 (every other one, three in total).
    let mut taken = vec![0u8; 12];
    remove_committed(&db, meta, Some(&mut taken), 4, 0, 2, 3);

    let removed: Vec<u32> = taken
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(removed, vec![0, 2, 4]);

    let back = read_all(&db, meta);
    let kept: Vec<u32> = back
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(kept, vec![1, 3, 5, 6, 7, 8, 9]);
}

#[test]
fn test_strided_remove_span_past_end_rejected() {
    let db = new_db("rm_span_past_end");
    let meta = create_tree(&db);

    // Ten 4-byte elements. Four elements at stride 2 from byte 16
    // only remove 16 bytes, but the fourth sits at byte 40, past
    // the end.
    let mut data = Vec::new();
    for i in 0u32..10 {
        data.extend_from_slice(&i.to_le_bytes());
    }
    insert_committed(&db, meta, &data, 0);

    let tx = db.pager.begin_txn().unwrap();
    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    cursor.enter_transaction(&tx);
    let err = cursor.remove(None, 4, 16, 2, 4).unwrap_err();
    assert_eq!(err.kind(), rope_db::ErrorKind::InvalidArgument);

    // Three elements end exactly on the last byte and go through.
    cursor.remove(None, 4, 16, 2, 3).unwrap();
    cursor.leave_transaction();
    cursor.close().unwrap();
    db.pager.commit(&tx).unwrap();

    // Elements 4, 6 and 8 are gone; the rest survive in order.
    let back = read_all(&db, meta);
    let kept: Vec<u32> = back
        .chunks(4)
        .map(|c| u32::from_le_bytes([c[0], c[1], c[2], c[3]]))
        .collect();
    assert_eq!(kept, vec![0, 1, 2, 3, 5, 7, 9]);
}

#[test]
fn test_element_spanning_leaf_boundary() {
    let db = new_db("rm_spanning");
    let meta = create_tree(&db);

    // Element size 48 does not divide the leaf payload, so some
    // element straddles two leaves.
    let bsize = 48u32;
    let nelems = (3 * DL_DATA_SIZE / 48) as u64;
    let data = pattern(nelems as usize * 48, 7);
    insert_committed(&db, meta, &data, 0);

    // Remove one element right at the first leaf boundary.
    let straddler = (DL_DATA_SIZE / 48) as u64;
    let start = straddler * 48;
    let mut taken = vec![0u8; 48];
    remove_committed(&db, meta, Some(&mut taken), bsize, start, 1, 1);

    assert_eq!(taken, &data[start as usize..start as usize + 48]);
    let mut expected = data[..start as usize].to_vec();
    expected.extend_from_slice(&data[start as usize + 48..]);
    assert_eq!(read_all(&db, meta), expected);
}
