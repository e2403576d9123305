mod common;

use std::io::{Read, Seek, SeekFrom, Write};

use rope_db::{
    consts::PAGE_SIZE,
    storage::{page::PageKind, DataList, PG_ANY},
    ErrorKind,
};

use crate::common::new_db;

#[test]
fn test_bootstrap_layout() {
    let db = new_db("bootstrap_layout");

    // A fresh database holds exactly the header page and the
    // variable hash root.
    assert_eq!(db.pager.npages(), 2);

    let h = db.pager.get(PageKind::RootNode.bit(), rope_db::ROOT_PGNO).unwrap();
    db.pager.release(h);
    let h = db
        .pager
        .get(PageKind::VarHashPage.bit(), rope_db::VHASH_PGNO)
        .unwrap();
    db.pager.release(h);
}

#[test]
fn test_page_round_trip() {
    let mut db = new_db("page_round_trip");

    // step 1: allocate a leaf and fill it with a pattern
    let tx = db.pager.begin_txn().unwrap();
    let mut h = db.pager.new_page(&tx, PageKind::DataList).unwrap();
    let pg = h.pgno();
    let payload = common::pattern(100, 7);
    h.write().dl_append(&payload);
    db.pager.save(&mut h).unwrap();
    db.pager.release(h);
    db.pager.commit(&tx).unwrap();

    // step 2: force it to disk and reopen cold
    db.pager.flush_all_pages().unwrap();
    db.reopen();

    // step 3: the bytes come back exactly
    let h = db.pager.get(PageKind::DataList.bit(), pg).unwrap();
    assert_eq!(h.read().dl_data(), payload.as_slice());
    db.pager.release(h);
}

#[test]
fn test_checksum_detects_disk_corruption() {
    let mut db = new_db("checksum_corruption");

    // step 1: persist a page
    let tx = db.pager.begin_txn().unwrap();
    let mut h = db.pager.new_page(&tx, PageKind::DataList).unwrap();
    let pg = h.pgno();
    h.write().dl_append(&common::pattern(64, 3));
    db.pager.save(&mut h).unwrap();
    db.pager.release(h);
    db.pager.commit(&tx).unwrap();

    // A checkpoint after the flush empties the dirty page table, so
    // restart redo has nothing to repair the flip with.
    db.pager.flush_all_pages().unwrap();
    db.pager.checkpoint().unwrap();
    db.reopen();

    // step 2: flip one payload byte on disk
    let mut f = std::fs::OpenOptions::new()
        .read(true)
        .write(true)
        .open(&db.data_path)
        .unwrap();
    let ofst = pg as u64 * PAGE_SIZE as u64 + 200;
    f.seek(SeekFrom::Start(ofst)).unwrap();
    let mut b = [0u8; 1];
    f.read_exact(&mut b).unwrap();
    f.seek(SeekFrom::Start(ofst)).unwrap();
    f.write_all(&[b[0] ^ 0x01]).unwrap();
    drop(f);

    // step 3: the next read refuses the page
    db.reopen();
    let err = db.pager.get(PG_ANY, pg).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn test_tombstone_reuse() {
    let db = new_db("tombstone_reuse");

    // step 1: allocate and drop a page
    let tx = db.pager.begin_txn().unwrap();
    let mut h = db.pager.new_page(&tx, PageKind::DataList).unwrap();
    let pg = h.pgno();
    db.pager.save(&mut h).unwrap();
    db.pager.delete_and_release(&tx, h).unwrap();
    db.pager.commit(&tx).unwrap();

    let npages_after_delete = db.pager.npages();

    // step 2: the next allocation pops the tombstone instead of
    // growing the file
    let tx = db.pager.begin_txn().unwrap();
    let mut h = db.pager.new_page(&tx, PageKind::DataList).unwrap();
    assert_eq!(h.pgno(), pg);
    db.pager.save(&mut h).unwrap();
    db.pager.release(h);
    db.pager.commit(&tx).unwrap();

    assert_eq!(db.pager.npages(), npages_after_delete);
}

#[test]
fn test_get_rejects_wrong_kind() {
    let db = new_db("wrong_kind");

    let err = db
        .pager
        .get(PageKind::DataList.bit(), rope_db::ROOT_PGNO)
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Corrupt);
}

#[test]
fn test_get_out_of_range() {
    let db = new_db("out_of_range");

    let err = db.pager.get(PG_ANY, 999).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::PgOutOfRange);
}

#[test]
fn test_duplicate_commit() {
    let db = new_db("duplicate_commit");

    let tx = db.pager.begin_txn().unwrap();
    db.pager.commit(&tx).unwrap();
    let err = db.pager.commit(&tx).unwrap_err();
    assert_eq!(err.kind(), ErrorKind::DuplicateCommit);
}
