// Database Integration Tests

use anyhow::Result;
use tempfile::TempDir;

use simpledbm::index::btree::{IntKeyFactory, RowLocationFactory, INT_KEY_TYPE, ROW_LOCATION_TYPE};
use simpledbm::{BTreeError, IsolationMode, LockMode};

#[path = "../common/mod.rs"]
mod common;
use common::{create_index, expected, insert_keys, key, open_db, scan_keys, INDEX};

#[test]
fn test_database_end_to_end() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, 0..100)?;

        let trx = db.begin(IsolationMode::default())?;
        for i in (0..100).step_by(3) {
            index.delete(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))?;
        }
        trx.commit()?;
        drop(index);
        db.shutdown()?;
    }

    let db = open_db(dir.path())?;
    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected((0..100).filter(|i| i % 3 != 0)));
    index.verify(0)?;
    Ok(())
}

#[test]
fn test_scan_from_start_key() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, 0..20)?;

    let trx = db.begin(IsolationMode::ReadCommitted)?;
    let start = key(12);
    let mut scan = index.open_scan(Some(start.as_bytes()), None, LockMode::Shared);
    let mut rows = Vec::new();
    while scan.fetch_next(&trx)? {
        if let Some(location) = scan.current_location() {
            rows.push(RowLocationFactory::decode(location.as_bytes()));
        }
    }
    assert!(scan.is_eof());
    scan.close(&trx)?;
    trx.commit()?;
    assert_eq!(rows, (12..20).collect::<Vec<u64>>());
    Ok(())
}

#[test]
fn test_integer_keys_sort_numerically() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let trx = db.begin(IsolationMode::default())?;
    let index = db
        .btree()
        .create_index(&trx, INDEX, INT_KEY_TYPE, ROW_LOCATION_TYPE, true)?;
    for (row, value) in [42i64, -7, 1000, 3, 0, -250].iter().enumerate() {
        index.insert(&trx, &IntKeyFactory::encode(*value), &RowLocationFactory::encode(row as u64))?;
    }
    trx.commit()?;

    assert_eq!(index.keys(0)?, vec!["-250", "-7", "0", "3", "42", "1000"]);
    Ok(())
}

#[test]
fn test_indexes_are_independent() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let first = create_index(&db, INDEX)?;
    let second = create_index(&db, INDEX + 1)?;
    insert_keys(&db, &first, 0..10)?;
    insert_keys(&db, &second, 10..15)?;

    assert_eq!(scan_keys(&db, &first)?, expected(0..10));
    assert_eq!(scan_keys(&db, &second)?, expected(10..15));
    assert!(matches!(db.open_index(INDEX + 2), Err(BTreeError::NoIndex(_))));
    Ok(())
}

#[test]
fn test_index_pages_come_from_space_map() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    let empty = db.space().allocated_count(0, INDEX)?;
    insert_keys(&db, &index, 0..60)?;
    let stats = index.verify(0)?;
    let grown = db.space().allocated_count(0, INDEX)?;
    assert_eq!((grown - empty) as usize, stats.leaf_pages + stats.branch_pages - 1);
    Ok(())
}

#[test]
fn test_statistics_cover_every_manager() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, 0..5)?;
    db.checkpoint()?;

    let stats = db.statistics();
    let value = |name: &str| stats.iter().find(|s| s.name == name).map(|s| s.value);
    assert!(value("log.inserts").unwrap_or(0) > 0);
    assert!(value("buffer.fixes").unwrap_or(0) > 0);
    assert!(value("lock.requests").unwrap_or(0) > 0);
    assert!(value("txn.committed").unwrap_or(0) >= 2);
    assert!(value("txn.checkpoints").unwrap_or(0) >= 1);
    let touched = stats.iter().find(|s| s.name == "txn.begun").and_then(|s| s.last_updated);
    assert!(touched.is_some());
    Ok(())
}
