//! Transaction identifier type.

use std::fmt;

/// Identifies a transaction in the ledger.
///
/// Xids are handed out sequentially starting from 1. Xid 0 is the
/// "super transaction": it is never active, committed or aborted in the
/// ledger, and records it creates are visible to everyone.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
pub struct Xid(pub u64);

impl Xid {
    /// The super transaction used for internal, always-visible writes.
    pub const SUPER: Xid = Xid(0);

    /// Create a new Xid.
    #[inline]
    pub fn new(id: u64) -> Self {
        Xid(id)
    }

    /// Whether this is the super transaction.
    #[inline]
    pub fn is_super(&self) -> bool {
        *self == Self::SUPER
    }
}

impl fmt::Display for Xid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
