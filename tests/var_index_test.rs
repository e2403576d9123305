mod common;

use rope_db::{consts::VP_DATA_SIZE, ErrorKind, RptCursor, VarIndex};

use crate::common::{new_db, pattern};

#[test]
fn test_create_lookup_remove() {
    let db = new_db("var_basic");

    // step 1: register two variables with small descriptors
    let tx = db.pager.begin_txn().unwrap();
    let root_a = VarIndex::create(&db.pager, &tx, "temperature", &[1, 8]).unwrap();
    let root_b = VarIndex::create(&db.pager, &tx, "pressure", &[2, 4, 4]).unwrap();
    db.pager.commit(&tx).unwrap();

    // step 2: both resolve, with their own trees
    let (desc_a, found_a) = VarIndex::lookup(&db.pager, "temperature").unwrap().unwrap();
    assert_eq!(desc_a, vec![1, 8]);
    assert_eq!(found_a, root_a);

    let (desc_b, found_b) = VarIndex::lookup(&db.pager, "pressure").unwrap().unwrap();
    assert_eq!(desc_b, vec![2, 4, 4]);
    assert_eq!(found_b, root_b);
    assert_ne!(root_a, root_b);

    assert!(VarIndex::lookup(&db.pager, "humidity").unwrap().is_none());

    // step 3: removal unlinks only the named variable
    let tx = db.pager.begin_txn().unwrap();
    VarIndex::remove(&db.pager, &tx, "temperature").unwrap();
    db.pager.commit(&tx).unwrap();

    assert!(VarIndex::lookup(&db.pager, "temperature").unwrap().is_none());
    assert!(VarIndex::lookup(&db.pager, "pressure").unwrap().is_some());
}

#[test]
fn test_duplicate_name_rejected() {
    let db = new_db("var_duplicate");

    let tx = db.pager.begin_txn().unwrap();
    VarIndex::create(&db.pager, &tx, "v", &[1]).unwrap();
    let err = VarIndex::create(&db.pager, &tx, "v", &[2]).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::InvalidArgument);
    db.pager.commit(&tx).unwrap();
}

#[test]
fn test_oversized_descriptor_spills_to_tails() {
    let mut db = new_db("var_tails");

    // A descriptor bigger than one record page plus one overflow.
    let desc = pattern(VP_DATA_SIZE * 2 + 500, 90);
    let tx = db.pager.begin_txn().unwrap();
    VarIndex::create(&db.pager, &tx, "wide", &desc).unwrap();
    db.pager.commit(&tx).unwrap();

    let (back, _) = VarIndex::lookup(&db.pager, "wide").unwrap().unwrap();
    assert_eq!(back, desc);

    // And it survives a restart.
    db.crash();
    let (back, _) = VarIndex::lookup(&db.pager, "wide").unwrap().unwrap();
    assert_eq!(back, desc);
}

#[test]
fn test_variable_backs_a_sequence() {
    let db = new_db("var_sequence");

    // The index hands out the tree root that cursors open.
    let tx = db.pager.begin_txn().unwrap();
    let root = VarIndex::create(&db.pager, &tx, "samples", &[3, 8]).unwrap();
    db.pager.commit(&tx).unwrap();

    let data = pattern(4000, 91);
    let tx = db.pager.begin_txn().unwrap();
    let mut cursor = RptCursor::open(root, db.pager.clone()).unwrap();
    cursor.enter_transaction(&tx);
    cursor.insert(&data, 0).unwrap();
    cursor.leave_transaction();
    cursor.close().unwrap();
    db.pager.commit(&tx).unwrap();

    let (_, found) = VarIndex::lookup(&db.pager, "samples").unwrap().unwrap();
    let mut cursor = RptCursor::open(found, db.pager.clone()).unwrap();
    let mut dest = vec![0u8; data.len()];
    let n = cursor.read(&mut dest, 1, 0, 1).unwrap();
    assert_eq!(n as usize, data.len());
    assert_eq!(dest, data);
    cursor.close().unwrap();
}
