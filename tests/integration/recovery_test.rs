// Recovery Integration Tests
//
// A crash is simulated by dropping the database without calling shutdown:
// nothing is written beyond what the log and buffer writer already made
// durable.

use anyhow::Result;
use tempfile::TempDir;

use simpledbm::index::btree::RowLocationFactory;
use simpledbm::{IsolationMode, LockDuration, LockMode, Lockable};

#[path = "../common/mod.rs"]
mod common;
use common::{create_index, expected, insert_keys, key, open_db, scan_keys, INDEX};

#[test]
fn test_committed_inserts_survive_crash() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, 0..50)?;
    }

    let db = open_db(dir.path())?;
    assert!(db.restart_summary().losers.is_empty());
    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected(0..50));
    assert_eq!(index.verify(0)?.keys, 50);
    Ok(())
}

#[test]
fn test_loser_is_rolled_back_after_crash() -> Result<()> {
    let dir = TempDir::new()?;
    let loser_id = {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, (0..40).step_by(2))?;

        let loser = db.begin(IsolationMode::default())?;
        for i in (1..40).step_by(2) {
            index.insert(&loser, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))?;
        }
        index.delete(&loser, key(0).as_bytes(), &RowLocationFactory::encode(0))?;
        // Make the loser's changes durable on both sides of the WAL
        db.log().flush_all()?;
        db.buffers().write_buffers()?;
        loser.id()
    };

    let db = open_db(dir.path())?;
    assert_eq!(db.restart_summary().losers, vec![loser_id]);
    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected((0..40).step_by(2)));
    index.verify(0)?;

    // A second restart has nothing left to undo
    drop(index);
    db.shutdown()?;
    let db = open_db(dir.path())?;
    assert!(db.restart_summary().losers.is_empty());
    Ok(())
}

#[test]
fn test_clean_shutdown_leaves_nothing_to_redo() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, 0..30)?;
        drop(index);
        db.shutdown()?;
    }

    let db = open_db(dir.path())?;
    let summary = db.restart_summary();
    assert_eq!(summary.records_redone, 0);
    assert!(summary.losers.is_empty());
    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected(0..30));
    Ok(())
}

#[test]
fn test_prepared_transaction_can_commit_after_restart() -> Result<()> {
    let dir = TempDir::new()?;
    let prepared_id = {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, 0..10)?;
        let trx = db.begin(IsolationMode::default())?;
        for i in 10..20 {
            index.insert(&trx, key(i).as_bytes(), &RowLocationFactory::encode(i as u64))?;
        }
        trx.prepare()?;
        trx.id()
    };

    let db = open_db(dir.path())?;
    assert_eq!(db.restart_summary().in_doubt, vec![prepared_id]);

    // The in-doubt inserts stay locked against new transactions
    let reader = db.begin(IsolationMode::default())?;
    let inserted = Lockable::Location(INDEX, RowLocationFactory::encode(10).as_bytes().to_vec());
    assert!(reader
        .acquire_lock_nowait(&inserted, LockMode::Shared, LockDuration::Instant)
        .is_err());
    reader.commit()?;

    let in_doubt = db.in_doubt();
    assert_eq!(in_doubt.len(), 1);
    in_doubt[0].commit()?;
    drop(in_doubt);

    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected(0..20));
    assert!(db.in_doubt().is_empty());
    Ok(())
}

#[test]
fn test_crash_after_checkpoint_redoes_later_changes() -> Result<()> {
    let dir = TempDir::new()?;
    {
        let db = open_db(dir.path())?;
        let index = create_index(&db, INDEX)?;
        insert_keys(&db, &index, 0..20)?;
        db.checkpoint()?;
        insert_keys(&db, &index, 20..40)?;
    }

    let db = open_db(dir.path())?;
    let summary = db.restart_summary().clone();
    assert!(summary.analysis_start > simpledbm::Lsn::NULL);
    assert!(summary.redo_start <= summary.end_of_log);
    let index = db.open_index(INDEX)?;
    assert_eq!(scan_keys(&db, &index)?, expected(0..40));
    index.verify(0)?;
    Ok(())
}
