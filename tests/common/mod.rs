#![allow(dead_code)]

use std::path::Path;

use anyhow::Result;

use simpledbm::index::btree::{BTreeConfig, RowLocationFactory, ROW_LOCATION_TYPE, STRING_KEY_TYPE};
use simpledbm::{BTreeIndex, Database, DatabaseConfig, IsolationMode, LockMode};

/// Container id used for the index in most tests
pub const INDEX: i32 = 5;

/// Open a database in `dir` with small nodes so a few keys build a tall tree
pub fn open_db(dir: &Path) -> Result<Database> {
    let mut config = DatabaseConfig::in_dir(dir).with_buffer_pool_size(64);
    config.btree = BTreeConfig {
        max_items_per_node: 4,
        ..BTreeConfig::default()
    };
    Ok(Database::open(config)?)
}

pub fn key(i: usize) -> String {
    format!("key{:05}", i)
}

pub fn create_index(db: &Database, container_id: i32) -> Result<BTreeIndex> {
    let trx = db.begin(IsolationMode::default())?;
    let index = db
        .btree()
        .create_index(&trx, container_id, STRING_KEY_TYPE, ROW_LOCATION_TYPE, false)?;
    trx.commit()?;
    Ok(index)
}

/// Insert `key(i) -> row i` for every `i`, all in one committed transaction
pub fn insert_keys(db: &Database, index: &BTreeIndex, keys: impl IntoIterator<Item = usize>) -> Result<()> {
    let trx = db.begin(IsolationMode::default())?;
    for i in keys {
        index.insert(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))?;
    }
    trx.commit()?;
    Ok(())
}

/// Keys returned by a read-committed scan over the whole index
pub fn scan_keys(db: &Database, index: &BTreeIndex) -> Result<Vec<String>> {
    let trx = db.begin(IsolationMode::ReadCommitted)?;
    let keys = scan_with(&trx, index)?;
    trx.commit()?;
    Ok(keys)
}

pub fn scan_with(trx: &simpledbm::Transaction, index: &BTreeIndex) -> Result<Vec<String>> {
    let mut scan = index.open_scan(None, None, LockMode::Shared);
    let mut keys = Vec::new();
    while scan.fetch_next(trx)? {
        if let Some(current) = scan.current_key() {
            keys.push(String::from_utf8_lossy(current).into_owned());
        }
    }
    scan.close(trx)?;
    Ok(keys)
}

pub fn expected(keys: impl IntoIterator<Item = usize>) -> Vec<String> {
    let mut expected: Vec<String> = keys.into_iter().map(key).collect();
    expected.sort();
    expected
}
