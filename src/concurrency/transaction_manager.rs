//! Transaction status ledger, `<path>.xid`.
//!
//! # File Layout
//! ```text
//! ┌─────────────────┬──────────┬──────────┬─────┐
//! │ xid counter (8) │ xid 1    │ xid 2    │ ... │
//! └─────────────────┴──────────┴──────────┴─────┘
//! ```
//! One status byte per xid, at `8 + (xid - 1)`. The counter is the last xid
//! handed out, so a healthy file is exactly `8 + counter` bytes long.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, info};

use crate::common::config::XID_SUFFIX;
use crate::common::fs::{create_file, open_file, with_suffix};
use crate::common::{Error, Result, Xid};

const HEADER_SIZE: u64 = 8;

const ACTIVE: u8 = 0;
const COMMITTED: u8 = 1;
const ABORTED: u8 = 2;

struct Ledger {
    file: File,
    counter: u64,
}

impl Ledger {
    fn position(xid: Xid) -> u64 {
        HEADER_SIZE + (xid.0 - 1)
    }

    fn write_status(&mut self, xid: Xid, status: u8) -> Result<()> {
        self.file.seek(SeekFrom::Start(Self::position(xid)))?;
        self.file.write_all(&[status])?;
        Ok(())
    }

    fn read_status(&mut self, xid: Xid) -> Result<Option<u8>> {
        if xid.is_super() || xid.0 > self.counter {
            return Ok(None);
        }
        let mut buf = [0u8; 1];
        self.file.seek(SeekFrom::Start(Self::position(xid)))?;
        self.file.read_exact(&mut buf)?;
        Ok(Some(buf[0]))
    }
}

/// Durable record of every transaction's outcome.
///
/// Status only moves forward: active to committed, or active to aborted.
/// The super transaction (xid 0) has no entry and reports `false` for
/// every status query.
pub struct TransactionManager {
    ledger: Mutex<Ledger>,
}

impl TransactionManager {
    /// Create an empty ledger.
    ///
    /// # Errors
    /// `Error::FileExists` if the ledger is already there.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = create_file(&with_suffix(path, XID_SUFFIX))?;
        file.write_all(&0u64.to_le_bytes())?;
        file.sync_all()?;

        Ok(Self {
            ledger: Mutex::new(Ledger { file, counter: 0 }),
        })
    }

    /// Open an existing ledger and validate its length.
    ///
    /// # Errors
    /// - `Error::FileNotExists` if the ledger is missing
    /// - `Error::BadLedgerFile` if the length disagrees with the counter
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = open_file(&with_suffix(path, XID_SUFFIX))?;

        let len = file.metadata()?.len();
        if len < HEADER_SIZE {
            return Err(Error::bad_ledger(format!("{} bytes, shorter than header", len)));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;
        let counter = u64::from_le_bytes(header);

        if HEADER_SIZE.checked_add(counter) != Some(len) {
            return Err(Error::bad_ledger(format!(
                "counter {} needs {} bytes, file has {}",
                counter,
                HEADER_SIZE.saturating_add(counter),
                len
            )));
        }

        info!(xid_counter = counter, "transaction ledger opened");
        Ok(Self {
            ledger: Mutex::new(Ledger { file, counter }),
        })
    }

    /// Start a transaction and return its xid.
    ///
    /// The new status byte and the bumped counter are synced before the
    /// xid is returned.
    pub fn begin(&self) -> Result<Xid> {
        let mut ledger = self.ledger.lock();
        let xid = Xid::new(ledger.counter + 1);

        ledger.write_status(xid, ACTIVE)?;
        ledger.file.seek(SeekFrom::Start(0))?;
        ledger.file.write_all(&xid.0.to_le_bytes())?;
        ledger.file.sync_all()?;

        ledger.counter = xid.0;
        debug!(%xid, "transaction started");
        Ok(xid)
    }

    pub fn commit(&self, xid: Xid) -> Result<()> {
        self.finish(xid, COMMITTED)
    }

    pub fn abort(&self, xid: Xid) -> Result<()> {
        self.finish(xid, ABORTED)
    }

    /// Move `xid` from active to `status`.
    ///
    /// # Errors
    /// - `Error::UnknownTransaction` for xid 0 or an xid never handed out
    /// - `Error::TransactionNotActive` if `xid` is already committed or aborted
    fn finish(&self, xid: Xid, status: u8) -> Result<()> {
        let mut ledger = self.ledger.lock();
        match ledger.read_status(xid)? {
            None => return Err(Error::UnknownTransaction(xid)),
            Some(ACTIVE) => {}
            Some(_) => return Err(Error::TransactionNotActive(xid)),
        }
        ledger.write_status(xid, status)?;
        ledger.file.sync_all()?;
        Ok(())
    }

    pub fn is_active(&self, xid: Xid) -> Result<bool> {
        self.has_status(xid, ACTIVE)
    }

    pub fn is_committed(&self, xid: Xid) -> Result<bool> {
        self.has_status(xid, COMMITTED)
    }

    pub fn is_aborted(&self, xid: Xid) -> Result<bool> {
        self.has_status(xid, ABORTED)
    }

    fn has_status(&self, xid: Xid, status: u8) -> Result<bool> {
        Ok(self.ledger.lock().read_status(xid)? == Some(status))
    }

    /// Last xid handed out.
    pub fn xid_counter(&self) -> u64 {
        self.ledger.lock().counter
    }

    /// Abort every transaction still marked active. Returns their xids.
    ///
    /// Only meaningful at startup, when no transaction can be running.
    pub fn abort_orphans(&self) -> Result<Vec<Xid>> {
        let mut ledger = self.ledger.lock();
        let mut orphans = Vec::new();

        for xid in (1..=ledger.counter).map(Xid::new) {
            if ledger.read_status(xid)? == Some(ACTIVE) {
                ledger.write_status(xid, ABORTED)?;
                orphans.push(xid);
            }
        }

        if !orphans.is_empty() {
            ledger.file.sync_all()?;
        }
        Ok(orphans)
    }

    pub fn close(&self) -> Result<()> {
        self.ledger.lock().file.sync_all()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs::OpenOptions;
    use std::sync::Arc;
    use std::thread;
    use tempfile::tempdir;

    fn statuses(tm: &TransactionManager, xid: Xid) -> (bool, bool, bool) {
        (
            tm.is_active(xid).unwrap(),
            tm.is_committed(xid).unwrap(),
            tm.is_aborted(xid).unwrap(),
        )
    }

    #[test]
    fn test_lifecycle() {
        let dir = tempdir().unwrap();
        let tm = TransactionManager::create(&dir.path().join("db")).unwrap();

        let t1 = tm.begin().unwrap();
        let t2 = tm.begin().unwrap();
        assert_eq!((t1, t2), (Xid::new(1), Xid::new(2)));
        assert_eq!(statuses(&tm, t1), (true, false, false));

        tm.commit(t1).unwrap();
        tm.abort(t2).unwrap();

        assert_eq!(statuses(&tm, t1), (false, true, false));
        assert_eq!(statuses(&tm, t2), (false, false, true));
    }

    #[test]
    fn test_super_xid_has_no_status() {
        let dir = tempdir().unwrap();
        let tm = TransactionManager::create(&dir.path().join("db")).unwrap();
        tm.begin().unwrap();

        assert_eq!(statuses(&tm, Xid::SUPER), (false, false, false));
        assert!(matches!(tm.commit(Xid::SUPER), Err(Error::UnknownTransaction(_))));
    }

    #[test]
    fn test_final_status_is_never_overwritten() {
        let dir = tempdir().unwrap();
        let tm = TransactionManager::create(&dir.path().join("db")).unwrap();
        let t1 = tm.begin().unwrap();
        let t2 = tm.begin().unwrap();

        tm.abort(t1).unwrap();
        assert!(matches!(tm.commit(t1), Err(Error::TransactionNotActive(x)) if x == t1));
        assert_eq!(statuses(&tm, t1), (false, false, true));

        tm.commit(t2).unwrap();
        assert!(matches!(tm.abort(t2), Err(Error::TransactionNotActive(_))));
        assert!(matches!(tm.commit(t2), Err(Error::TransactionNotActive(_))));
        assert_eq!(statuses(&tm, t2), (false, true, false));
    }

    #[test]
    fn test_unknown_xid() {
        let dir = tempdir().unwrap();
        let tm = TransactionManager::create(&dir.path().join("db")).unwrap();

        assert_eq!(statuses(&tm, Xid::new(5)), (false, false, false));
        assert!(tm.abort(Xid::new(5)).is_err());
    }

    #[test]
    fn test_reopen_keeps_statuses() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let tm = TransactionManager::create(&path).unwrap();
            let t1 = tm.begin().unwrap();
            tm.begin().unwrap();
            tm.commit(t1).unwrap();
        }

        let tm = TransactionManager::open(&path).unwrap();
        assert_eq!(tm.xid_counter(), 2);
        assert!(tm.is_committed(Xid::new(1)).unwrap());
        assert!(tm.is_active(Xid::new(2)).unwrap());
        assert_eq!(tm.begin().unwrap(), Xid::new(3));

        let len = std::fs::metadata(dir.path().join("db.xid")).unwrap().len();
        assert_eq!(len, 8 + 3);
    }

    #[test]
    fn test_bad_length_is_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("db");

        {
            let tm = TransactionManager::create(&path).unwrap();
            tm.begin().unwrap();
        }

        let mut file = OpenOptions::new()
            .append(true)
            .open(dir.path().join("db.xid"))
            .unwrap();
        file.write_all(&[0]).unwrap();
        drop(file);

        let err = TransactionManager::open(&path).err().unwrap();
        assert!(matches!(err, Error::BadLedgerFile { .. }));
        assert!(err.is_fatal());
    }

    #[test]
    fn test_abort_orphans() {
        let dir = tempdir().unwrap();
        let tm = TransactionManager::create(&dir.path().join("db")).unwrap();

        let t1 = tm.begin().unwrap();
        let t2 = tm.begin().unwrap();
        let t3 = tm.begin().unwrap();
        tm.commit(t2).unwrap();

        assert_eq!(tm.abort_orphans().unwrap(), vec![t1, t3]);
        assert!(tm.is_committed(t2).unwrap());
        assert!(tm.is_aborted(t3).unwrap());
        assert!(tm.abort_orphans().unwrap().is_empty());
    }

    #[test]
    fn test_concurrent_begin_unique() {
        let dir = tempdir().unwrap();
        let tm = Arc::new(TransactionManager::create(&dir.path().join("db")).unwrap());

        let handles: Vec<_> = (0..4)
            .map(|_| {
                let tm = Arc::clone(&tm);
                thread::spawn(move || (0..25).map(|_| tm.begin().unwrap()).collect::<Vec<_>>())
            })
            .collect();

        let mut xids: Vec<Xid> = handles.into_iter().flat_map(|h| h.join().unwrap()).collect();
        xids.sort();
        xids.dedup();
        assert_eq!(xids.len(), 100);
        assert_eq!(tm.xid_counter(), 100);
    }
}
