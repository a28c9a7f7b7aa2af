//! Error types for txstore.

use std::path::PathBuf;

use thiserror::Error;

use crate::common::{Uid, Xid};

/// Convenient Result type alias.
///
/// Instead of writing `Result<T, Error>` everywhere, we can write `Result<T>`.
pub type Result<T> = std::result::Result<T, Error>;

/// All possible errors in txstore.
///
/// The variants fall into four groups:
/// - **Fatal**: the ledger, log or page file cannot be trusted or reached
///   (`Io`, `FileExists`, `FileNotExists`, `BadLedgerFile`, `BadLogFile`,
///   `MemTooSmall`). See [`Error::is_fatal`].
/// - **Capacity/contention**: the caller may retry later (`CacheFull`,
///   `DatabaseBusy`, `DataTooLarge`).
/// - **Transactional**: the transaction was aborted and must be retried from
///   `begin` (`Deadlock`, `ConcurrentUpdate`). See [`Error::is_retryable`].
/// - **Internal signals** that upper layers translate into "not found"
///   (`NullEntry`).
#[derive(Debug, Error)]
pub enum Error {
    /// I/O error from ledger, page or log file operations.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A cache refused to load another resource.
    #[error("cache is full ({capacity} resources)")]
    CacheFull {
        /// Configured capacity of the cache.
        capacity: usize,
    },

    /// `create` found a file that should not exist yet.
    #[error("file already exists: {}", .0.display())]
    FileExists(PathBuf),

    /// `open` could not find a file it needs.
    #[error("file does not exist: {}", .0.display())]
    FileNotExists(PathBuf),

    /// The transaction ledger does not match its own header.
    #[error("bad transaction ledger: {reason}")]
    BadLedgerFile {
        /// What failed to validate.
        reason: String,
    },

    /// The write-ahead log failed verification.
    #[error("bad log file: {reason}")]
    BadLogFile {
        /// What failed to validate.
        reason: String,
    },

    /// A log payload could not be decoded as an insert or update record.
    #[error("corrupt log record: {reason}")]
    CorruptLogRecord {
        /// Why decoding failed.
        reason: String,
    },

    /// The configured page cache is smaller than the engine minimum.
    #[error("memory too small: {pages} pages, need at least {min_pages}")]
    MemTooSmall {
        /// Pages the configuration allows.
        pages: usize,
        /// Minimum number of pages.
        min_pages: usize,
    },

    /// A memory size string could not be parsed.
    #[error("invalid memory size: {0:?}")]
    InvalidMemory(String),

    /// A record does not fit into a single page.
    #[error("data too large: {size} bytes, max {max}")]
    DataTooLarge {
        /// Size of the wrapped record.
        size: usize,
        /// Largest record a page can hold.
        max: usize,
    },

    /// Page allocation ran out of attempts.
    #[error("database is busy")]
    DatabaseBusy,

    /// Granting a record lock would close a cycle in the wait-for graph.
    #[error("deadlock: transaction {xid} waiting on {uid}")]
    Deadlock {
        /// Transaction that was aborted.
        xid: Xid,
        /// Record it asked for.
        uid: Uid,
    },

    /// A repeatable-read transaction tried to modify a version it cannot see.
    #[error("concurrent update: transaction {xid} on {uid}")]
    ConcurrentUpdate {
        /// Transaction that was aborted.
        xid: Xid,
        /// Record it tried to modify.
        uid: Uid,
    },

    /// No live record exists at this uid.
    #[error("no entry at {0}")]
    NullEntry(Uid),

    /// Requested page does not exist in the page file.
    #[error("page {0} not found")]
    PageNotFound(u32),

    /// The transaction is not registered with the version manager.
    #[error("unknown transaction {0}")]
    UnknownTransaction(Xid),

    /// The ledger already holds a final status for this transaction.
    #[error("transaction {0} is not active")]
    TransactionNotActive(Xid),

    /// The transaction was aborted while it was waiting for a lock.
    #[error("transaction {0} was aborted")]
    TransactionAborted(Xid),

    /// `release` was called for a key that holds no reference.
    ///
    /// This indicates a bug - every release must match a get.
    #[error("resource {0} is not held")]
    ResourceNotHeld(u64),
}

impl Error {
    /// Whether the engine cannot safely continue after this error.
    pub fn is_fatal(&self) -> bool {
        matches!(
            self,
            Error::Io(_)
                | Error::FileExists(_)
                | Error::FileNotExists(_)
                | Error::BadLedgerFile { .. }
                | Error::BadLogFile { .. }
                | Error::MemTooSmall { .. }
        )
    }

    /// Whether the failed transaction can simply be retried from `begin`.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Deadlock { .. } | Error::ConcurrentUpdate { .. })
    }

    pub(crate) fn bad_ledger(reason: impl Into<String>) -> Self {
        Error::BadLedgerFile {
            reason: reason.into(),
        }
    }

    pub(crate) fn bad_log(reason: impl Into<String>) -> Self {
        Error::BadLogFile {
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt_record(reason: impl Into<String>) -> Self {
        Error::CorruptLogRecord {
            reason: reason.into(),
        }
    }
}
