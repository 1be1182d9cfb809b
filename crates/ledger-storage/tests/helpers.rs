#![allow(dead_code)]

use ledger_core::{Block, Transaction};
use ledger_storage::SledStore;
use std::fs;
use tempfile::{tempdir, TempDir};

pub fn create_temp_dir() -> (TempDir, std::path::PathBuf) {
    // Create a temporary directory for the sled database
    let temp_dir = tempdir().expect("Failed to create temp dir");
    let db_path = temp_dir.path().to_path_buf();
    (temp_dir, db_path)
}

pub fn create_temp_store() -> (TempDir, SledStore) {
    let (temp_dir, db_path) = create_temp_dir();
    (
        temp_dir,
        SledStore::open(&db_path).expect("Failed to open SledStore"),
    )
}

pub fn teardown_store(temp_dir: TempDir, store: SledStore) {
    let db_path = temp_dir.path().to_path_buf();
    drop(store);
    temp_dir.close().expect("Failed to delete temp dir");
    let _ = fs::remove_dir_all(&db_path);
    // Verify the directory is removed
    assert!(!db_path.exists(), "Database directory should be removed");
}

/// Unlinked block for raw store tests; only `index` and `transactions` matter.
pub fn block(index: u64, txs: Vec<Transaction>) -> Block {
    Block {
        index,
        timestamp: 1_700_000_000.0 + index as f64,
        transactions: txs,
        proof: index * 7,
        previous_hash: format!("{index:064x}"),
    }
}
