// Write-Ahead Log Integration Tests

use anyhow::Result;
use tempfile::TempDir;

use simpledbm::transaction::wal::{LogManager, LogManagerConfig, LogRecord, LogRecordKind};
use simpledbm::{IsolationMode, Lsn};

#[path = "../common/mod.rs"]
mod common;
use common::{create_index, insert_keys, open_db, INDEX};

/// Two mirrored groups and files small enough to rotate every few records
fn small_file_config(dir: &TempDir) -> LogManagerConfig {
    LogManagerConfig {
        log_dirs: vec![dir.path().join("group1"), dir.path().join("group2")],
        archive_dir: dir.path().join("archive"),
        max_log_file_size: 512,
        online_files: 2,
        ..LogManagerConfig::default()
    }
}

fn payload_record(txn_id: u64, fill: u8) -> Result<LogRecord> {
    let mut record = LogRecord::for_module(1, 1, LogRecordKind::Redo, &vec![fill; 40])?;
    record.txn_id = txn_id;
    Ok(record)
}

#[test]
fn test_records_cross_files_and_archive() -> Result<()> {
    let dir = TempDir::new()?;
    let config = small_file_config(&dir);
    let lsns = {
        let log = LogManager::open(config.clone())?;
        let mut lsns = Vec::new();
        for txn in 1..=40u64 {
            lsns.push(log.insert(&mut payload_record(txn, txn as u8)?)?);
        }
        log.flush_all()?;
        assert_eq!(log.durable_lsn(), lsns[39]);
        lsns
    };
    assert!(lsns.last().map(|l| l.index).unwrap_or(0) > 3);

    // Old files were moved out of the groups into the archive
    let archived = std::fs::read_dir(dir.path().join("archive"))?.count();
    assert!(archived > 0);
    let online = std::fs::read_dir(dir.path().join("group2"))?
        .filter_map(|e| e.ok())
        .filter(|e| e.path().extension().map(|x| x == "log").unwrap_or(false))
        .count();
    assert!(online <= 2);

    let log = LogManager::open(config)?;
    let txns: Vec<u64> = log
        .iter_from(Lsn::NULL)?
        .map(|r| r.map(|r| r.txn_id))
        .collect::<std::result::Result<_, _>>()?;
    assert_eq!(txns, (1..=40).collect::<Vec<u64>>());

    let record = log.read(lsns[7])?;
    assert_eq!(record.txn_id, 8);
    let payload: Vec<u8> = record.decode()?;
    assert_eq!(payload, vec![8u8; 40]);
    Ok(())
}

#[test]
fn test_iteration_from_middle_of_log() -> Result<()> {
    let dir = TempDir::new()?;
    let log = LogManager::open(small_file_config(&dir))?;
    let mut lsns = Vec::new();
    for txn in 1..=20u64 {
        lsns.push(log.insert(&mut payload_record(txn, 0)?)?);
    }
    log.flush_all()?;

    let from: Vec<Lsn> = log.iter_from(lsns[12])?.map(|r| r.map(|r| r.lsn)).collect::<std::result::Result<_, _>>()?;
    assert_eq!(from, lsns[12..].to_vec());
    Ok(())
}

#[test]
fn test_commit_forces_the_log() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;

    let trx = db.begin(IsolationMode::default())?;
    let before = db.log().durable_lsn();
    index.insert(&trx, b"alpha", &simpledbm::index::btree::RowLocationFactory::encode(1))?;
    let last = trx.last_lsn();
    trx.commit()?;
    assert!(db.log().durable_lsn() > last);
    assert!(db.log().durable_lsn() > before);
    Ok(())
}

#[test]
fn test_transaction_chain_is_linked_through_prev_lsn() -> Result<()> {
    let dir = TempDir::new()?;
    let db = open_db(dir.path())?;
    let index = create_index(&db, INDEX)?;
    insert_keys(&db, &index, 0..3)?;

    let trx = db.begin(IsolationMode::default())?;
    index.insert(&trx, b"zulu", &simpledbm::index::btree::RowLocationFactory::encode(99))?;
    let id = trx.id();
    let mut lsn = trx.last_lsn();
    trx.abort()?;
    db.log().flush_all()?;

    // Walk the forward records of the transaction back to its Begin record
    let mut kinds = Vec::new();
    while !lsn.is_null() {
        let record = db.log().read(lsn)?;
        assert_eq!(record.txn_id, id);
        kinds.push(record.kind);
        lsn = record.prev_lsn;
    }
    assert_eq!(kinds.last(), Some(&LogRecordKind::Begin));
    assert!(kinds.contains(&LogRecordKind::Undoable));

    // The rollback wrote a compensation record pointing past the insert
    let compensations = db
        .log()
        .iter_from(Lsn::NULL)?
        .filter_map(|r| r.ok())
        .filter(|r| r.txn_id == id && matches!(r.kind, LogRecordKind::Compensation { .. }))
        .count();
    assert_eq!(compensations, 1);
    Ok(())
}

#[test]
fn test_torn_tail_is_ignored() -> Result<()> {
    let dir = TempDir::new()?;
    let config = LogManagerConfig::in_dir(dir.path());
    let lsns = {
        let log = LogManager::open(config.clone())?;
        let mut lsns = Vec::new();
        for txn in 1..=5u64 {
            lsns.push(log.insert(&mut payload_record(txn, 1)?)?);
        }
        log.flush_all()?;
        lsns
    };

    // Cut the last frame in half, as a crash in the middle of a write would
    let file = dir.path().join("log").join("simpledbm_000001.log");
    let len = std::fs::metadata(&file)?.len();
    std::fs::OpenOptions::new().write(true).open(&file)?.set_len(len - 20)?;

    let log = LogManager::open(config)?;
    assert_eq!(log.iter_from(Lsn::NULL)?.count(), 4);
    // New records go where the torn one was
    let lsn = log.insert(&mut payload_record(6, 1)?)?;
    assert_eq!(lsn, lsns[4]);
    Ok(())
}
