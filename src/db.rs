//! Database - the three managers wired together over one set of files.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use crate::common::config::Config;
use crate::common::{Result, Uid, Xid};
use crate::concurrency::{IsolationLevel, TransactionManager, VersionManager};
use crate::recovery::RecoveryReport;
use crate::storage::DataManager;

/// Size of the empty catalog root written at create time.
const BOOTSTRAP_LEN: usize = 8;

/// An open database: `<path>.xid`, `<path>.db` and `<path>.log`.
///
/// Dropping a `Database` without calling [`close`](Self::close) leaves the
/// files as a crash would; the next `open` runs recovery.
///
/// # Example
/// ```no_run
/// use txstore::{Config, Database};
///
/// let db = Database::create("/tmp/mydb", &Config::default())?;
/// let xid = db.begin()?;
/// let uid = db.insert(xid, b"hello")?;
/// db.commit(xid)?;
/// db.close()?;
/// # Ok::<(), txstore::Error>(())
/// ```
pub struct Database {
    path: PathBuf,
    config: Config,
    tm: Arc<TransactionManager>,
    dm: Arc<DataManager>,
    vm: VersionManager,
    bootstrap_uid: Uid,
}

impl Database {
    /// Create a new database and its empty catalog bootstrap record.
    ///
    /// # Errors
    /// `Error::FileExists` if any of the three files exists already.
    pub fn create(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let tm = Arc::new(TransactionManager::create(path)?);
        let dm = Arc::new(DataManager::create(path, config.memory)?);
        let vm = VersionManager::new(Arc::clone(&tm), Arc::clone(&dm));

        let bootstrap_uid = vm.insert(Xid::SUPER, &[0u8; BOOTSTRAP_LEN])?;
        dm.set_bootstrap_uid(bootstrap_uid)?;

        info!(path = %path.display(), %bootstrap_uid, "database created");
        Ok(Self {
            path: path.to_path_buf(),
            config: config.clone(),
            tm,
            dm,
            vm,
            bootstrap_uid,
        })
    }

    /// Open an existing database, recovering it if it was not closed.
    ///
    /// # Errors
    /// - `Error::FileNotExists` if any of the three files is missing
    /// - `Error::BadLedgerFile` / `Error::BadLogFile` if a file is corrupt
    pub fn open(path: impl AsRef<Path>, config: &Config) -> Result<Self> {
        let path = path.as_ref();
        let tm = Arc::new(TransactionManager::open(path)?);
        let dm = Arc::new(DataManager::open(path, config.memory, &tm)?);
        let bootstrap_uid = dm.bootstrap_uid();
        let vm = VersionManager::new(Arc::clone(&tm), Arc::clone(&dm));

        info!(path = %path.display(), %bootstrap_uid, "database opened");
        Ok(Self {
            path: path.to_path_buf(),
            config: config.clone(),
            tm,
            dm,
            vm,
            bootstrap_uid,
        })
    }

    /// Start a transaction at the configured default isolation level.
    pub fn begin(&self) -> Result<Xid> {
        self.vm.begin(self.config.default_isolation)
    }

    /// Start a transaction at `level`.
    pub fn begin_with(&self, level: IsolationLevel) -> Result<Xid> {
        self.vm.begin(level)
    }

    pub fn read(&self, xid: Xid, uid: Uid) -> Result<Option<Vec<u8>>> {
        self.vm.read(xid, uid)
    }

    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        self.vm.insert(xid, data)
    }

    pub fn delete(&self, xid: Xid, uid: Uid) -> Result<bool> {
        self.vm.delete(xid, uid)
    }

    pub fn commit(&self, xid: Xid) -> Result<()> {
        self.vm.commit(xid)
    }

    pub fn abort(&self, xid: Xid) -> Result<()> {
        self.vm.abort(xid)
    }

    /// Uid of the catalog root record.
    pub fn bootstrap_uid(&self) -> Uid {
        self.bootstrap_uid
    }

    /// What recovery did at open, if it ran.
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.dm.recovery_report()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn version_manager(&self) -> &VersionManager {
        &self.vm
    }

    pub fn data_manager(&self) -> &DataManager {
        &self.dm
    }

    pub fn transaction_manager(&self) -> &TransactionManager {
        &self.tm
    }

    /// Flush everything and mark the shutdown clean.
    pub fn close(self) -> Result<()> {
        self.vm.close()?;
        self.dm.close()?;
        self.tm.close()?;
        info!(path = %self.path.display(), "database closed");
        Ok(())
    }
}
