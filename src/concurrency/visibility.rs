//! Which versions a transaction may see.
//!
//! A version created by the super transaction counts as committed.

use crate::common::{Result, Xid};
use crate::concurrency::{Entry, IsolationLevel, Transaction, TransactionManager};

fn is_committed(tm: &TransactionManager, xid: Xid) -> Result<bool> {
    Ok(xid.is_super() || tm.is_committed(xid)?)
}

/// Whether deleting `entry` in `t` would skip over a version `t` cannot
/// see: the version was deleted by a committed transaction that began
/// after `t` or was running when `t` began.
///
/// Always `false` under read committed.
pub fn is_version_skip(tm: &TransactionManager, t: &Transaction, entry: &Entry) -> Result<bool> {
    if t.level == IsolationLevel::ReadCommitted {
        return Ok(false);
    }
    let xmax = entry.xmax();
    if xmax.is_super() {
        return Ok(false);
    }
    Ok(tm.is_committed(xmax)? && (xmax > t.xid || t.is_in_snapshot(xmax)))
}

/// Whether `entry` is visible to `t`.
pub fn is_visible(tm: &TransactionManager, t: &Transaction, entry: &Entry) -> Result<bool> {
    let xmin = entry.xmin();
    let xmax = entry.xmax();
    match t.level {
        IsolationLevel::ReadCommitted => read_committed(tm, t, xmin, xmax),
        IsolationLevel::RepeatableRead => repeatable_read(tm, t, xmin, xmax),
    }
}

fn read_committed(tm: &TransactionManager, t: &Transaction, xmin: Xid, xmax: Xid) -> Result<bool> {
    let not_deleted = xmax.is_super();
    if xmin == t.xid && not_deleted {
        return Ok(true);
    }

    if !is_committed(tm, xmin)? {
        return Ok(false);
    }
    if not_deleted {
        return Ok(true);
    }
    Ok(xmax != t.xid && !tm.is_committed(xmax)?)
}

fn repeatable_read(tm: &TransactionManager, t: &Transaction, xmin: Xid, xmax: Xid) -> Result<bool> {
    let not_deleted = xmax.is_super();
    if xmin == t.xid && not_deleted {
        return Ok(true);
    }

    let created_before =
        is_committed(tm, xmin)? && xmin < t.xid && !t.is_in_snapshot(xmin);
    if !created_before {
        return Ok(false);
    }
    if not_deleted {
        return Ok(true);
    }
    if xmax == t.xid {
        return Ok(false);
    }
    Ok(!tm.is_committed(xmax)? || xmax > t.xid || t.is_in_snapshot(xmax))
}
