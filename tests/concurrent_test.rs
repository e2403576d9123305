mod common;

use std::sync::Arc;

use rope_db::{LockMode, Resource, RptCursor};

use crate::common::{new_db, pattern};

#[test]
fn test_concurrent_readers_over_stable_prefix() {
    let db = new_db("concurrent_readers");

    // step 1: a committed base sequence
    let meta = {
        let tx = db.pager.begin_txn().unwrap();
        let cursor = RptCursor::create(&tx, db.pager.clone()).unwrap();
        let meta = cursor.meta_root();
        cursor.close().unwrap();
        db.pager.commit(&tx).unwrap();
        meta
    };
    let base = pattern(6000, 70);
    {
        let tx = db.pager.begin_txn().unwrap();
        let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
        cursor.enter_transaction(&tx);
        cursor.insert(&base, 0).unwrap();
        cursor.leave_transaction();
        cursor.close().unwrap();
        db.pager.commit(&tx).unwrap();
    }
    let boundary = base.len() as u64;

    // step 2: eight readers scan [0, boundary) under shared locks
    // while a writer appends at the boundary under an exclusive one
    let pager = db.pager.clone();
    let expected = Arc::new(base);

    let mut readers = Vec::new();
    for r in 0..8 {
        let pager = pager.clone();
        let expected = Arc::clone(&expected);
        readers.push(std::thread::spawn(move || {
            for round in 0..10 {
                let tx = pager.begin_txn().unwrap();
                pager
                    .lock_table()
                    .lock(&tx, Resource::page(meta), LockMode::S)
                    .unwrap();

                let mut cursor = RptCursor::open(meta, pager.clone()).unwrap();
                let mut dest = vec![0u8; expected.len()];
                let n = cursor.read(&mut dest, 1, 0, 1).unwrap();
                assert_eq!(n as usize, expected.len(), "reader {} round {}", r, round);
                assert_eq!(&dest, expected.as_ref(), "reader {} round {}", r, round);
                cursor.close().unwrap();

                pager.commit(&tx).unwrap();
            }
        }));
    }

    // step 3: the writer inserts at the boundary, never before it
    let writer = {
        let pager = pager.clone();
        std::thread::spawn(move || {
            for i in 0u8..5 {
                let tx = pager.begin_txn().unwrap();
                pager
                    .lock_table()
                    .lock(&tx, Resource::page(meta), LockMode::X)
                    .unwrap();

                let mut cursor = RptCursor::open(meta, pager.clone()).unwrap();
                cursor.enter_transaction(&tx);
                cursor
                    .insert(&pattern(500, 71 + i), boundary + i as u64 * 500)
                    .unwrap();
                cursor.leave_transaction();
                cursor.close().unwrap();

                pager.commit(&tx).unwrap();
            }
        })
    };

    for t in readers {
        t.join().unwrap();
    }
    writer.join().unwrap();

    // step 4: the appended bytes are all there
    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    assert_eq!(cursor.total_size(), boundary + 5 * 500);
    cursor.close().unwrap();
}

#[test]
fn test_writers_serialize_on_the_lock_table() {
    let db = new_db("concurrent_writers");

    let meta = {
        let tx = db.pager.begin_txn().unwrap();
        let cursor = RptCursor::create(&tx, db.pager.clone()).unwrap();
        let meta = cursor.meta_root();
        cursor.close().unwrap();
        db.pager.commit(&tx).unwrap();
        meta
    };

    // Two appenders race; the lock table serializes them, so every
    // byte of both lands.
    let mut writers = Vec::new();
    for w in 0u8..2 {
        let pager = db.pager.clone();
        writers.push(std::thread::spawn(move || {
            for i in 0u8..8 {
                let tx = pager.begin_txn().unwrap();
                pager
                    .lock_table()
                    .lock(&tx, Resource::page(meta), LockMode::X)
                    .unwrap();

                let mut cursor = RptCursor::open(meta, pager.clone()).unwrap();
                cursor.enter_transaction(&tx);
                let end = cursor.total_size();
                cursor.insert(&pattern(300, w * 16 + i), end).unwrap();
                cursor.leave_transaction();
                cursor.close().unwrap();

                pager.commit(&tx).unwrap();
            }
        }));
    }
    for t in writers {
        t.join().unwrap();
    }

    let mut cursor = RptCursor::open(meta, db.pager.clone()).unwrap();
    assert_eq!(cursor.total_size(), 2 * 8 * 300);
    cursor.close().unwrap();
}
