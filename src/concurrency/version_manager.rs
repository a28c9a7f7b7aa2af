//! Version manager - MVCC on top of the data manager.
//!
//! The [`VersionManager`] provides:
//! - `begin` / `commit` / `abort` of transactions at either isolation level
//! - `read` of the version visible to a transaction
//! - `insert` of new versions and `delete` by setting `xmax`
//! - Record locks for deleters, with deadlock detection

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tracing::debug;

use crate::cache::{CacheSource, CacheStats, ResourceCache};
use crate::common::{Error, Result, Uid, Xid};
use crate::concurrency::entry::wrap_entry_raw;
use crate::concurrency::visibility::{is_version_skip, is_visible};
use crate::concurrency::{AbortReason, Entry, IsolationLevel, LockTable, Transaction, TransactionManager};
use crate::storage::DataManager;

/// Loads entries through the data manager and releases their data item on
/// eviction.
struct EntrySource {
    dm: Arc<DataManager>,
}

impl CacheSource for EntrySource {
    type Item = Arc<Entry>;

    fn load(&self, key: u64) -> Result<Arc<Entry>> {
        let uid = Uid(key);
        Entry::load(&self.dm, uid)?
            .map(Arc::new)
            .ok_or(Error::NullEntry(uid))
    }

    fn evict(&self, _key: u64, entry: Arc<Entry>) -> Result<()> {
        self.dm.release(entry.item())
    }
}

type SharedTransaction = Arc<Mutex<Transaction>>;

/// Multi-version access to records.
///
/// # Thread Safety
/// - `active`: one `Mutex` over the map of running transactions; `begin`
///   holds it while it copies the active set into a new snapshot
/// - each transaction: its own `Mutex`, held only for visibility checks and
///   to record an abort
/// - `lock_table`: internal `Mutex`; a blocked `delete` waits on a signal
///   without holding any of the locks above
///
/// # Usage
/// ```ignore
/// let xid = vm.begin(IsolationLevel::RepeatableRead)?;
/// let uid = vm.insert(xid, b"row")?;
/// assert_eq!(vm.read(xid, uid)?, Some(b"row".to_vec()));
/// vm.commit(xid)?;
/// ```
pub struct VersionManager {
    tm: Arc<TransactionManager>,
    entries: ResourceCache<EntrySource>,
    active: Mutex<HashMap<Xid, SharedTransaction>>,
    lock_table: LockTable,
}

impl VersionManager {
    /// The super transaction is registered up front as an always-running
    /// read-committed transaction.
    pub fn new(tm: Arc<TransactionManager>, dm: Arc<DataManager>) -> Self {
        let mut active = HashMap::new();
        active.insert(
            Xid::SUPER,
            Arc::new(Mutex::new(Transaction::new(
                Xid::SUPER,
                IsolationLevel::ReadCommitted,
                [],
            ))),
        );

        Self {
            tm,
            entries: ResourceCache::new(EntrySource { dm }, 0),
            active: Mutex::new(active),
            lock_table: LockTable::new(),
        }
    }

    fn dm(&self) -> &DataManager {
        &self.entries.source().dm
    }

    /// The running transaction `xid`, failing with its sticky error if the
    /// engine already aborted it.
    fn transaction(&self, xid: Xid) -> Result<SharedTransaction> {
        let t = self
            .active
            .lock()
            .get(&xid)
            .cloned()
            .ok_or(Error::UnknownTransaction(xid))?;

        let err = t.lock().error();
        match err {
            Some(e) => Err(e),
            None => Ok(t),
        }
    }

    /// Start a transaction.
    pub fn begin(&self, level: IsolationLevel) -> Result<Xid> {
        let mut active = self.active.lock();
        let xid = self.tm.begin()?;
        let t = Transaction::new(xid, level, active.keys().copied());
        active.insert(xid, Arc::new(Mutex::new(t)));

        debug!(%xid, %level, "transaction registered");
        Ok(xid)
    }

    /// The data of `uid` as `xid` sees it, or `None` if that version is
    /// unknown, deleted or invisible.
    pub fn read(&self, xid: Xid, uid: Uid) -> Result<Option<Vec<u8>>> {
        let t = self.transaction(xid)?;

        let entry = match self.entries.get(uid.0) {
            Ok(entry) => entry,
            Err(Error::NullEntry(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        let result = is_visible(&self.tm, &t.lock(), &entry)
            .map(|visible| visible.then(|| entry.data()));
        self.entries.release(uid.0)?;
        result
    }

    /// Store `data` as a new version created by `xid`.
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        self.transaction(xid)?;
        self.dm().insert(xid, &wrap_entry_raw(xid, data))
    }

    /// Delete the version at `uid` on behalf of `xid`.
    ///
    /// Returns `false` if `xid` cannot see the version or already deleted
    /// it. Blocks while another transaction holds the record lock.
    ///
    /// # Errors
    /// - `Error::UnknownTransaction` for the super transaction, which may
    ///   not delete
    /// - `Error::Deadlock` if waiting for the lock would deadlock
    /// - `Error::ConcurrentUpdate` if a repeatable-read transaction would
    ///   delete over a version it cannot see
    /// - `Error::TransactionAborted` if `xid` was aborted while waiting
    ///
    /// The first two abort `xid`; later calls on it fail the same way.
    pub fn delete(&self, xid: Xid, uid: Uid) -> Result<bool> {
        if xid.is_super() {
            return Err(Error::UnknownTransaction(xid));
        }
        let t = self.transaction(xid)?;

        let entry = match self.entries.get(uid.0) {
            Ok(entry) => entry,
            Err(Error::NullEntry(_)) => return Ok(false),
            Err(e) => return Err(e),
        };

        let result = self.delete_entry(&t, xid, &entry);
        self.entries.release(uid.0)?;
        result
    }

    fn delete_entry(&self, t: &SharedTransaction, xid: Xid, entry: &Entry) -> Result<bool> {
        let uid = entry.uid();
        if !is_visible(&self.tm, &t.lock(), entry)? {
            return Ok(false);
        }

        match self.lock_table.add(xid, uid) {
            Ok(None) => {}
            Ok(Some(signal)) => {
                if !signal.wait() {
                    return Err(Error::TransactionAborted(xid));
                }
            }
            Err(Error::Deadlock { .. }) => {
                return Err(self.internal_abort(t, xid, AbortReason::Deadlock { uid }));
            }
            Err(e) => return Err(e),
        }

        if entry.xmax() == xid {
            return Ok(false);
        }

        if is_version_skip(&self.tm, &t.lock(), entry)? {
            return Err(self.internal_abort(t, xid, AbortReason::ConcurrentUpdate { uid }));
        }

        entry.set_xmax(xid)?;
        Ok(true)
    }

    /// Abort `xid` on the engine's initiative. The transaction stays
    /// registered so its later calls keep failing with `reason`.
    fn internal_abort(&self, t: &SharedTransaction, xid: Xid, reason: AbortReason) -> Error {
        {
            let mut t = t.lock();
            t.err = Some(reason);
            t.auto_aborted = true;
        }
        debug!(%xid, ?reason, "transaction aborted by engine");

        let aborted = self.tm.abort(xid);
        self.lock_table.remove(xid);
        match aborted {
            Ok(()) => reason.into_error(xid),
            Err(e) => e,
        }
    }

    /// Commit `xid` and release its record locks.
    ///
    /// # Errors
    /// The transaction's sticky error if the engine aborted it.
    pub fn commit(&self, xid: Xid) -> Result<()> {
        if xid.is_super() {
            return Err(Error::UnknownTransaction(xid));
        }
        self.transaction(xid)?;

        // Durable before leaving the active set: a snapshot taken in between
        // must still list xid. Waiters wake last so they see the commit.
        let committed = self.tm.commit(xid);
        self.active.lock().remove(&xid);
        self.lock_table.remove(xid);
        committed?;

        debug!(%xid, "transaction committed");
        Ok(())
    }

    /// Abort `xid` and release its record locks.
    ///
    /// Also used to retire a transaction the engine aborted already.
    pub fn abort(&self, xid: Xid) -> Result<()> {
        if xid.is_super() {
            return Err(Error::UnknownTransaction(xid));
        }
        let t = self
            .active
            .lock()
            .remove(&xid)
            .ok_or(Error::UnknownTransaction(xid))?;

        if t.lock().auto_aborted {
            return Ok(());
        }

        let aborted = self.tm.abort(xid);
        self.lock_table.remove(xid);
        aborted?;

        debug!(%xid, "transaction aborted");
        Ok(())
    }

    /// Number of running transactions, the super transaction included.
    pub fn active_count(&self) -> usize {
        self.active.lock().len()
    }

    /// Statistics of the entry cache.
    pub fn entry_stats(&self) -> &CacheStats {
        self.entries.stats()
    }

    /// Release every cached entry.
    pub fn close(&self) -> Result<()> {
        self.entries.close()
    }
}
