use std::{path::PathBuf, sync::Arc};

use rope_db::{utils, LockTable, Pager, ThreadPool};

/// Conduct the per-test initialization: logging only, every test
/// works on its own database files.
pub fn setup() {
    utils::init_log();
}

/// One test database: unique file pair plus the open pager.
pub struct TestDb {
    pub data_path: PathBuf,
    pub wal_path: PathBuf,
    pub pager: Arc<Pager>,
}

fn unique_path(name: &str, suffix: &str) -> PathBuf {
    let mut p = std::env::temp_dir();
    p.push(format!("rope_db_{}_{}.{}", name, std::process::id(), suffix));
    p
}

pub fn new_db(name: &str) -> TestDb {
    setup();

    let data_path = unique_path(name, "db");
    let wal_path = unique_path(name, "wal");
    let _ = std::fs::remove_file(&data_path);
    let _ = std::fs::remove_file(&wal_path);

    let pager = Pager::open(
        &data_path,
        &wal_path,
        Arc::new(LockTable::new()),
        Arc::new(ThreadPool::new(2)),
    )
    .expect("open fresh database");

    TestDb {
        data_path,
        wal_path,
        pager,
    }
}

impl TestDb {
    /// Reopen from the files on disk, running recovery. All cursors
    /// and transactions on the old pager must be gone.
    pub fn reopen(&mut self) {
        self.pager = Pager::open(
            &self.data_path,
            &self.wal_path,
            Arc::new(LockTable::new()),
            Arc::new(ThreadPool::new(2)),
        )
        .expect("reopen database");
    }

    /// Simulated power loss followed by restart recovery.
    pub fn crash(&mut self) {
        self.pager.crash();
        self.reopen();
    }
}

/// A recognizable byte pattern for round-trip checks.
pub fn pattern(len: usize, seed: u8) -> Vec<u8> {
    (0..len)
        .map(|i| (i as u8).wrapping_mul(31).wrapping_add(seed))
        .collect()
}
