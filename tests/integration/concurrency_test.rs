// Concurrency Integration Tests
//
// Several transactions work on one index from separate threads. Lock waits
// happen with no latch held, so these tests finish only if the latch and
// lock ordering rules hold.

use std::sync::mpsc;
use std::thread;
use std::time::Duration;

use anyhow::Result;
use tempfile::TempDir;

use simpledbm::index::btree::{RowLocationFactory, ROW_LOCATION_TYPE, STRING_KEY_TYPE};
use simpledbm::{BTreeError, IsolationMode};

#[path = "../common/mod.rs"]
mod common;
use common::{create_index, expected, insert_keys, key, open_db, scan_keys, scan_with, INDEX};

const THREADS: usize = 4;
const KEYS_PER_THREAD: usize = 60;

#[test]
fn test_concurrent_inserts_build_a_valid_tree() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;

    thread::scope(|s| {
        for t in 0..THREADS {
            let (db, index) = (&db, &index);
            s.spawn(move || {
                // Interleave the key ranges so threads split the same nodes
                for n in 0..KEYS_PER_THREAD {
                    let i = n * THREADS + t;
                    let trx = db.begin(IsolationMode::default()).unwrap();
                    index
                        .insert(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))
                        .unwrap();
                    trx.commit().unwrap();
                }
            });
        }
    });

    let stats = index.verify(0)?;
    assert_eq!(stats.keys, THREADS * KEYS_PER_THREAD);
    assert_eq!(scan_keys(&db, &index)?, expected(0..THREADS * KEYS_PER_THREAD));
    Ok(())
}

#[test]
fn test_concurrent_inserts_and_deletes() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, (0..200).filter(|i| i % 2 == 0))?;

    thread::scope(|s| {
        let (db_ref, index_ref) = (&db, &index);
        // Deleter removes the multiples of four
        s.spawn(move || {
            for i in (0..200).step_by(4) {
                let trx = db_ref.begin(IsolationMode::default()).unwrap();
                index_ref
                    .delete(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))
                    .unwrap();
                trx.commit().unwrap();
            }
        });
        // Inserter adds the odd keys
        s.spawn(move || {
            for i in (1..200).step_by(2) {
                let trx = db_ref.begin(IsolationMode::default()).unwrap();
                index_ref
                    .insert(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))
                    .unwrap();
                trx.commit().unwrap();
            }
        });
    });

    index.verify(0)?;
    assert_eq!(scan_keys(&db, &index)?, expected((0..200).filter(|i| i % 4 != 0)));
    Ok(())
}

#[test]
fn test_scan_waits_for_uncommitted_delete() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, 0..10)?;

    let deleter = db.begin(IsolationMode::default())?;
    index.delete(&deleter, key(5).as_bytes(), &RowLocationFactory::encode(5))?;

    let seen = thread::scope(|s| {
        let (db, index) = (&db, &index);
        let scanner = s.spawn(move || {
            let trx = db.begin(IsolationMode::CursorStability).unwrap();
            let keys = scan_with(&trx, index).unwrap();
            trx.commit().unwrap();
            keys
        });
        // The scanner blocks on the next key the deleter holds
        thread::sleep(Duration::from_millis(100));
        assert!(!scanner.is_finished());
        deleter.commit().unwrap();
        scanner.join().unwrap()
    });

    assert_eq!(seen, expected((0..10).filter(|i| *i != 5)));
    Ok(())
}

#[test]
fn test_scan_sees_key_restored_by_abort() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, 0..10)?;

    let deleter = db.begin(IsolationMode::default())?;
    index.delete(&deleter, key(5).as_bytes(), &RowLocationFactory::encode(5))?;

    let seen = thread::scope(|s| {
        let (db, index) = (&db, &index);
        let scanner = s.spawn(move || {
            let trx = db.begin(IsolationMode::RepeatableRead).unwrap();
            let keys = scan_with(&trx, index).unwrap();
            trx.commit().unwrap();
            keys
        });
        thread::sleep(Duration::from_millis(100));
        deleter.abort().unwrap();
        scanner.join().unwrap()
    });

    assert_eq!(seen, expected(0..10));
    Ok(())
}

#[test]
fn test_unique_insert_waits_for_deleter_outcome() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let trx = db.begin(IsolationMode::default())?;
    let index = db
        .btree()
        .create_index(&trx, INDEX, STRING_KEY_TYPE, ROW_LOCATION_TYPE, true)?;
    for (row, name) in ["apple", "mango", "peach"].iter().enumerate() {
        index.insert(&trx, name.as_bytes(), &RowLocationFactory::encode(row as u64))?;
    }
    trx.commit()?;

    let deleter = db.begin(IsolationMode::default())?;
    index.delete(&deleter, b"mango", &RowLocationFactory::encode(1))?;

    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        let (db, index) = (&db, &index);
        s.spawn(move || {
            let trx = db.begin(IsolationMode::default()).unwrap();
            let result = index.insert(&trx, b"mango", &RowLocationFactory::encode(77));
            tx.send(matches!(result, Err(BTreeError::UniqueConstraintViolation(_)))).unwrap();
            trx.abort().unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        // Still waiting on the lock the deleter holds
        assert!(rx.try_recv().is_err());
        deleter.abort().unwrap();
    });

    // The deleted key came back, so the insert must be rejected
    assert!(rx.recv()?);
    assert_eq!(scan_keys(&db, &index)?, vec!["apple", "mango", "peach"]);
    Ok(())
}

fn fruit_index(db: &simpledbm::Database) -> Result<simpledbm::BTreeIndex> {
    let trx = db.begin(IsolationMode::default())?;
    let index = db
        .btree()
        .create_index(&trx, INDEX, STRING_KEY_TYPE, ROW_LOCATION_TYPE, true)?;
    for (row, name) in ["apple", "mango", "peach"].iter().enumerate() {
        index.insert(&trx, name.as_bytes(), &RowLocationFactory::encode(row as u64))?;
    }
    trx.commit()?;
    Ok(index)
}

#[test]
fn test_delete_waits_for_uncommitted_delete_to_abort() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = fruit_index(&db)?;

    let first = db.begin(IsolationMode::default())?;
    index.delete(&first, b"mango", &RowLocationFactory::encode(1))?;

    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        let (db, index) = (&db, &index);
        s.spawn(move || {
            let trx = db.begin(IsolationMode::default()).unwrap();
            let result = index.delete(&trx, b"mango", &RowLocationFactory::encode(1));
            tx.send(result.is_ok()).unwrap();
            trx.commit().unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        // The entry is missing, but not yet for good
        assert!(rx.try_recv().is_err());
        first.abort().unwrap();
    });

    assert!(rx.recv()?);
    assert_eq!(scan_keys(&db, &index)?, vec!["apple", "peach"]);
    Ok(())
}

#[test]
fn test_delete_of_entry_removed_by_committed_transaction_fails() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = fruit_index(&db)?;

    let first = db.begin(IsolationMode::default())?;
    index.delete(&first, b"mango", &RowLocationFactory::encode(1))?;

    let (tx, rx) = mpsc::channel();
    thread::scope(|s| {
        let (db, index) = (&db, &index);
        s.spawn(move || {
            let trx = db.begin(IsolationMode::default()).unwrap();
            let result = index.delete(&trx, b"mango", &RowLocationFactory::encode(1));
            tx.send(matches!(result, Err(BTreeError::KeyNotFound))).unwrap();
            trx.abort().unwrap();
        });
        thread::sleep(Duration::from_millis(100));
        assert!(rx.try_recv().is_err());
        first.commit().unwrap();
    });

    assert!(rx.recv()?);
    assert_eq!(scan_keys(&db, &index)?, vec!["apple", "peach"]);
    Ok(())
}
