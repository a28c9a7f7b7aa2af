//! Version-layer view of a running transaction.

use std::collections::HashSet;
use std::fmt;

use crate::common::{Error, Uid, Xid};

/// How much of other transactions' work a transaction sees.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(u8)]
pub enum IsolationLevel {
    /// Sees every version committed before each read.
    #[default]
    ReadCommitted = 0,
    /// Sees only versions committed before the transaction began.
    RepeatableRead = 1,
}

impl TryFrom<u8> for IsolationLevel {
    type Error = u8;

    fn try_from(value: u8) -> std::result::Result<Self, u8> {
        match value {
            0 => Ok(IsolationLevel::ReadCommitted),
            1 => Ok(IsolationLevel::RepeatableRead),
            other => Err(other),
        }
    }
}

impl fmt::Display for IsolationLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IsolationLevel::ReadCommitted => write!(f, "read committed"),
            IsolationLevel::RepeatableRead => write!(f, "repeatable read"),
        }
    }
}

/// Why a transaction was aborted by the engine.
///
/// Kept on the transaction so every later call on it fails the same way.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AbortReason {
    Deadlock { uid: Uid },
    ConcurrentUpdate { uid: Uid },
}

impl AbortReason {
    pub fn into_error(self, xid: Xid) -> Error {
        match self {
            AbortReason::Deadlock { uid } => Error::Deadlock { xid, uid },
            AbortReason::ConcurrentUpdate { uid } => Error::ConcurrentUpdate { xid, uid },
        }
    }
}

/// A transaction registered with the version manager.
#[derive(Debug, Clone)]
pub struct Transaction {
    pub xid: Xid,
    pub level: IsolationLevel,
    /// Xids active when this transaction began. Empty under read committed.
    snapshot: HashSet<Xid>,
    pub(crate) err: Option<AbortReason>,
    pub(crate) auto_aborted: bool,
}

impl Transaction {
    /// `active` is every xid running at begin time; it is only kept under
    /// repeatable read.
    pub fn new(xid: Xid, level: IsolationLevel, active: impl IntoIterator<Item = Xid>) -> Self {
        let snapshot = match level {
            IsolationLevel::ReadCommitted => HashSet::new(),
            IsolationLevel::RepeatableRead => active.into_iter().filter(|x| !x.is_super()).collect(),
        };

        Self {
            xid,
            level,
            snapshot,
            err: None,
            auto_aborted: false,
        }
    }

    /// Whether `xid` was running when this transaction began.
    pub fn is_in_snapshot(&self, xid: Xid) -> bool {
        self.snapshot.contains(&xid)
    }

    /// The error every further call on this transaction must return.
    pub fn error(&self) -> Option<Error> {
        self.err.map(|reason| reason.into_error(self.xid))
    }
}
