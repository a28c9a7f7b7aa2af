//! Crash recovery tests.
//!
//! A crash is simulated by dropping a `Database` without closing it: dirty
//! pages are lost and the checkpoint page keeps its open stamp.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use tempfile::tempdir;
use txstore::{Config, Database, Error, IsolationLevel, Uid, PAGE_SIZE};

fn config() -> Config {
    Config::new().memory(PAGE_SIZE as u64 * 64)
}

fn file(path: &Path, suffix: &str) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(suffix);
    PathBuf::from(name)
}

fn read_committed(db: &Database, uid: Uid) -> Option<Vec<u8>> {
    let xid = db.begin_with(IsolationLevel::ReadCommitted).unwrap();
    let data = db.read(xid, uid).unwrap();
    db.commit(xid).unwrap();
    data
}

#[test]
fn test_clean_close_skips_recovery() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let uid = {
        let db = Database::create(&path, &config()).unwrap();
        let xid = db.begin().unwrap();
        let uid = db.insert(xid, b"kept").unwrap();
        db.commit(xid).unwrap();
        db.close().unwrap();
        uid
    };

    let db = Database::open(&path, &config()).unwrap();
    assert!(db.recovery_report().is_none());
    assert_eq!(read_committed(&db, uid), Some(b"kept".to_vec()));
}

#[test]
fn test_committed_insert_survives_crash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let (uid, bootstrap) = {
        let db = Database::create(&path, &config()).unwrap();
        let xid = db.begin().unwrap();
        let uid = db.insert(xid, b"durable").unwrap();
        db.commit(xid).unwrap();
        (uid, db.bootstrap_uid())
    };

    let db = Database::open(&path, &config()).unwrap();
    let report = db.recovery_report().unwrap();
    assert!(report.inserts >= 2);
    assert_eq!(db.bootstrap_uid(), bootstrap);
    assert_eq!(read_committed(&db, uid), Some(b"durable".to_vec()));
    assert_eq!(read_committed(&db, bootstrap), Some(vec![0u8; 8]));
}

#[test]
fn test_uncommitted_work_is_rolled_back() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let (kept, lost, xid) = {
        let db = Database::create(&path, &config()).unwrap();
        let t1 = db.begin().unwrap();
        let kept = db.insert(t1, b"committed").unwrap();
        db.commit(t1).unwrap();

        let t2 = db.begin().unwrap();
        let lost = db.insert(t2, b"in flight").unwrap();
        assert!(db.delete(t2, kept).unwrap());
        (kept, lost, t2)
    };

    let db = Database::open(&path, &config()).unwrap();
    assert_eq!(db.recovery_report().unwrap().aborted, 1);
    assert!(db.transaction_manager().is_aborted(xid).unwrap());

    assert_eq!(read_committed(&db, kept), Some(b"committed".to_vec()));
    assert_eq!(read_committed(&db, lost), None);
}

#[test]
fn test_committed_delete_survives_crash() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let uid = {
        let db = Database::create(&path, &config()).unwrap();
        let t1 = db.begin().unwrap();
        let uid = db.insert(t1, b"doomed").unwrap();
        db.commit(t1).unwrap();

        let t2 = db.begin().unwrap();
        assert!(db.delete(t2, uid).unwrap());
        db.commit(t2).unwrap();
        uid
    };

    let db = Database::open(&path, &config()).unwrap();
    assert!(db.recovery_report().is_some());
    assert_eq!(read_committed(&db, uid), None);
}

#[test]
fn test_repeated_crash_is_idempotent() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let uids: Vec<Uid> = {
        let db = Database::create(&path, &config()).unwrap();
        let xid = db.begin().unwrap();
        let uids = (0..10u8).map(|i| db.insert(xid, &[i; 50]).unwrap()).collect();
        db.commit(xid).unwrap();
        uids
    };

    // Crash again right after recovery
    drop(Database::open(&path, &config()).unwrap());
    let page_file = std::fs::read(file(&path, ".db")).unwrap();

    let db = Database::open(&path, &config()).unwrap();
    assert!(db.recovery_report().is_some());

    // Data pages match the first recovery byte for byte
    let replayed = std::fs::read(file(&path, ".db")).unwrap();
    assert_eq!(replayed.len(), page_file.len());
    assert_eq!(replayed[PAGE_SIZE..], page_file[PAGE_SIZE..]);

    for (i, &uid) in uids.iter().enumerate() {
        assert_eq!(read_committed(&db, uid), Some(vec![i as u8; 50]));
    }

    // New inserts land after the recovered ones
    let xid = db.begin().unwrap();
    let next = db.insert(xid, b"next").unwrap();
    assert!(!uids.contains(&next));
    db.commit(xid).unwrap();
    db.close().unwrap();
}

#[test]
fn test_torn_log_tail_is_truncated() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");

    let uid = {
        let db = Database::create(&path, &config()).unwrap();
        let xid = db.begin().unwrap();
        let uid = db.insert(xid, b"before tear").unwrap();
        db.commit(xid).unwrap();
        uid
    };
    let log_path = file(&path, ".log");
    let valid_len = std::fs::metadata(&log_path).unwrap().len();

    // A record cut off halfway through its payload
    let mut log = OpenOptions::new().append(true).open(&log_path).unwrap();
    log.write_all(&64u32.to_le_bytes()).unwrap();
    log.write_all(&[0xAB; 20]).unwrap();
    drop(log);

    let db = Database::open(&path, &config()).unwrap();
    assert_eq!(std::fs::metadata(&log_path).unwrap().len(), valid_len);
    assert_eq!(read_committed(&db, uid), Some(b"before tear".to_vec()));
}

#[test]
fn test_corrupt_log_header_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Database::create(&path, &config()).unwrap().close().unwrap();

    let mut log = OpenOptions::new().write(true).open(file(&path, ".log")).unwrap();
    log.write_all(&[1, 2, 3, 4]).unwrap();
    drop(log);

    let err = Database::open(&path, &config()).err().unwrap();
    assert!(matches!(err, Error::BadLogFile { .. }));
    assert!(err.is_fatal());
}

#[test]
fn test_corrupt_ledger_is_fatal() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("db");
    Database::create(&path, &config()).unwrap().close().unwrap();

    let mut ledger = OpenOptions::new().append(true).open(file(&path, ".xid")).unwrap();
    ledger.write_all(&[0, 0]).unwrap();
    drop(ledger);

    let err = Database::open(&path, &config()).err().unwrap();
    assert!(matches!(err, Error::BadLedgerFile { .. }));
}

#[test]
fn test_memory_below_minimum() {
    let dir = tempdir().unwrap();
    let config = Config::new().memory(PAGE_SIZE as u64 * 4);

    let err = Database::create(dir.path().join("db"), &config).err().unwrap();
    assert!(matches!(err, Error::MemTooSmall { pages: 4, .. }));
}
