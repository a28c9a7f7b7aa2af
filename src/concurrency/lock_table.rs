//! Record locks for writers, with deadlock detection.
//!
//! The wait-for graph is kept in [`LockGraph`], a plain data structure
//! with no threads or blocking in it. [`LockTable`] wraps it and parks
//! waiting transactions on a [`WaitSignal`].

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use parking_lot::{Condvar, Mutex};
use tracing::debug;

use crate::common::{Error, Result, Uid, Xid};

/// Result of asking for a lock.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LockOutcome {
    /// The caller holds the lock now.
    Granted,
    /// Another transaction holds it; the caller is queued.
    Wait,
}

/// What `remove` changed for other transactions.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct Released {
    /// Waiters that now hold the lock they were waiting for.
    pub granted: Vec<Xid>,
    /// Whether the removed transaction was itself waiting.
    pub was_waiting: bool,
}

/// Who holds and who waits for which record.
///
/// Edges point from a waiting transaction to the record it wants, and from
/// a record to the transaction holding it. A cycle through those edges is
/// a deadlock.
#[derive(Debug, Default)]
pub struct LockGraph {
    /// Records each transaction holds.
    held: HashMap<Xid, Vec<Uid>>,
    /// Holder of each locked record.
    holder: HashMap<Uid, Xid>,
    /// Transactions queued for each record, oldest first.
    waiters: HashMap<Uid, VecDeque<Xid>>,
    /// Record each blocked transaction is waiting for.
    waiting_on: HashMap<Xid, Uid>,
}

impl LockGraph {
    pub fn new() -> Self {
        Self::default()
    }

    /// Ask for the lock on `uid` for `xid`.
    ///
    /// # Errors
    /// `Error::Deadlock` if waiting would close a cycle. The graph is left
    /// as it was before the call.
    pub fn add(&mut self, xid: Xid, uid: Uid) -> Result<LockOutcome> {
        if self.held.get(&xid).is_some_and(|uids| uids.contains(&uid)) {
            return Ok(LockOutcome::Granted);
        }

        if !self.holder.contains_key(&uid) {
            self.grant(xid, uid);
            return Ok(LockOutcome::Granted);
        }

        self.waiting_on.insert(xid, uid);
        self.waiters.entry(uid).or_default().push_back(xid);

        if self.has_deadlock() {
            self.waiting_on.remove(&xid);
            self.remove_waiter(uid, xid);
            return Err(Error::Deadlock { xid, uid });
        }

        Ok(LockOutcome::Wait)
    }

    /// Drop every lock `xid` holds and hand each record to its first
    /// waiter. A pending wait of `xid` is withdrawn.
    pub fn remove(&mut self, xid: Xid) -> Released {
        let mut released = Released::default();

        if let Some(uid) = self.waiting_on.remove(&xid) {
            self.remove_waiter(uid, xid);
            released.was_waiting = true;
        }

        for uid in self.held.remove(&xid).unwrap_or_default() {
            self.holder.remove(&uid);
            if let Some(next) = self.pop_waiter(uid) {
                self.waiting_on.remove(&next);
                self.grant(next, uid);
                released.granted.push(next);
            }
        }

        released
    }

    /// Holder of `uid`, if locked.
    pub fn holder(&self, uid: Uid) -> Option<Xid> {
        self.holder.get(&uid).copied()
    }

    /// Record `xid` is blocked on, if any.
    pub fn waiting_on(&self, xid: Xid) -> Option<Uid> {
        self.waiting_on.get(&xid).copied()
    }

    fn grant(&mut self, xid: Xid, uid: Uid) {
        self.holder.insert(uid, xid);
        self.held.entry(xid).or_default().push(uid);
    }

    /// First queued transaction still waiting for `uid`.
    fn pop_waiter(&mut self, uid: Uid) -> Option<Xid> {
        let queue = self.waiters.get_mut(&uid)?;
        let mut next = None;
        while let Some(xid) = queue.pop_front() {
            if self.waiting_on.get(&xid) == Some(&uid) {
                next = Some(xid);
                break;
            }
        }
        if queue.is_empty() {
            self.waiters.remove(&uid);
        }
        next
    }

    fn remove_waiter(&mut self, uid: Uid, xid: Xid) {
        if let Some(queue) = self.waiters.get_mut(&uid) {
            queue.retain(|&x| x != xid);
            if queue.is_empty() {
                self.waiters.remove(&uid);
            }
        }
    }

    /// Depth-first search from every lock holder.
    ///
    /// Each root gets a fresh stamp. Meeting the current stamp again means
    /// a cycle; meeting an older stamp means that part of the graph was
    /// already cleared by an earlier root.
    fn has_deadlock(&self) -> bool {
        let mut stamps: HashMap<Xid, u32> = HashMap::new();
        let mut stamp = 1;

        for &xid in self.held.keys() {
            if stamps.get(&xid).is_some_and(|&s| s > 0) {
                continue;
            }
            stamp += 1;
            if self.dfs(xid, stamp, &mut stamps) {
                return true;
            }
        }
        false
    }

    fn dfs(&self, mut xid: Xid, stamp: u32, stamps: &mut HashMap<Xid, u32>) -> bool {
        // Each transaction waits on at most one record, so the walk is a path
        loop {
            match stamps.get(&xid) {
                Some(&s) if s == stamp => return true,
                Some(&s) if s < stamp => return false,
                _ => {}
            }
            stamps.insert(xid, stamp);

            let Some(uid) = self.waiting_on.get(&xid) else {
                return false;
            };
            let Some(&holder) = self.holder.get(uid) else {
                return false;
            };
            xid = holder;
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum SignalState {
    Pending,
    Granted,
    Cancelled,
}

/// One-shot wake-up for a transaction waiting on a lock.
pub struct WaitSignal {
    state: Mutex<SignalState>,
    condvar: Condvar,
}

impl WaitSignal {
    fn new() -> Self {
        Self {
            state: Mutex::new(SignalState::Pending),
            condvar: Condvar::new(),
        }
    }

    fn settle(&self, to: SignalState) {
        let mut state = self.state.lock();
        if *state == SignalState::Pending {
            *state = to;
            self.condvar.notify_all();
        }
    }

    /// Block until the lock is granted (`true`) or the wait is cancelled
    /// (`false`).
    pub fn wait(&self) -> bool {
        let mut state = self.state.lock();
        while *state == SignalState::Pending {
            self.condvar.wait(&mut state);
        }
        *state == SignalState::Granted
    }
}

impl std::fmt::Debug for WaitSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WaitSignal").finish()
    }
}

struct LockState {
    graph: LockGraph,
    signals: HashMap<Xid, Arc<WaitSignal>>,
}

/// Thread-safe lock table shared by every transaction.
pub struct LockTable {
    state: Mutex<LockState>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(LockState {
                graph: LockGraph::new(),
                signals: HashMap::new(),
            }),
        }
    }

    /// Ask for the lock on `uid`.
    ///
    /// Returns `None` if the lock is held now, or a signal to wait on.
    ///
    /// # Errors
    /// `Error::Deadlock` if waiting would deadlock.
    pub fn add(&self, xid: Xid, uid: Uid) -> Result<Option<Arc<WaitSignal>>> {
        let mut state = self.state.lock();
        match state.graph.add(xid, uid) {
            Ok(LockOutcome::Granted) => Ok(None),
            Ok(LockOutcome::Wait) => {
                debug!(%xid, %uid, "waiting for record lock");
                let signal = Arc::new(WaitSignal::new());
                state.signals.insert(xid, Arc::clone(&signal));
                Ok(Some(signal))
            }
            Err(e) => {
                debug!(%xid, %uid, "deadlock detected");
                Err(e)
            }
        }
    }

    /// Release every lock of `xid`, waking the transactions that get them.
    /// If `xid` was waiting itself, its wait is cancelled.
    pub fn remove(&self, xid: Xid) {
        let mut state = self.state.lock();
        let released = state.graph.remove(xid);

        for next in released.granted {
            if let Some(signal) = state.signals.remove(&next) {
                signal.settle(SignalState::Granted);
            }
        }
        if let Some(signal) = state.signals.remove(&xid) {
            signal.settle(SignalState::Cancelled);
        }
    }

    /// Holder of `uid`, if locked.
    pub fn holder(&self, uid: Uid) -> Option<Xid> {
        self.state.lock().graph.holder(uid)
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    fn x(n: u64) -> Xid {
        Xid::new(n)
    }

    fn u(n: u16) -> Uid {
        Uid::new(2, n)
    }

    #[test]
    fn test_grant_and_reentry() {
        let mut graph = LockGraph::new();
        assert_eq!(graph.add(x(1), u(1)).unwrap(), LockOutcome::Granted);
        assert_eq!(graph.add(x(1), u(1)).unwrap(), LockOutcome::Granted);
        assert_eq!(graph.holder(u(1)), Some(x(1)));
    }

    #[test]
    fn test_wait_then_handoff() {
        let mut graph = LockGraph::new();
        graph.add(x(1), u(1)).unwrap();

        assert_eq!(graph.add(x(2), u(1)).unwrap(), LockOutcome::Wait);
        assert_eq!(graph.waiting_on(x(2)), Some(u(1)));

        let released = graph.remove(x(1));
        assert_eq!(released.granted, vec![x(2)]);
        assert_eq!(graph.holder(u(1)), Some(x(2)));
        assert_eq!(graph.waiting_on(x(2)), None);

        // The new holder releases it again on its own remove
        graph.remove(x(2));
        assert_eq!(graph.holder(u(1)), None);
    }

    #[test]
    fn test_waiters_are_fifo() {
        let mut graph = LockGraph::new();
        graph.add(x(1), u(1)).unwrap();
        graph.add(x(2), u(1)).unwrap();
        graph.add(x(3), u(1)).unwrap();

        assert_eq!(graph.remove(x(1)).granted, vec![x(2)]);
        assert_eq!(graph.remove(x(2)).granted, vec![x(3)]);
    }

    #[test]
    fn test_withdrawn_waiter_is_skipped() {
        let mut graph = LockGraph::new();
        graph.add(x(1), u(1)).unwrap();
        graph.add(x(2), u(1)).unwrap();
        graph.add(x(3), u(1)).unwrap();

        let released = graph.remove(x(2));
        assert!(released.was_waiting);
        assert!(released.granted.is_empty());

        assert_eq!(graph.remove(x(1)).granted, vec![x(3)]);
    }

    #[test]
    fn test_two_way_deadlock() {
        let mut graph = LockGraph::new();
        graph.add(x(1), u(1)).unwrap();
        graph.add(x(2), u(2)).unwrap();

        assert_eq!(graph.add(x(1), u(2)).unwrap(), LockOutcome::Wait);
        let err = graph.add(x(2), u(1)).unwrap_err();
        assert!(matches!(err, Error::Deadlock { xid, uid } if xid == x(2) && uid == u(1)));

        // The rejected edge is gone; x2 still holds u2
        assert_eq!(graph.waiting_on(x(2)), None);
        assert_eq!(graph.remove(x(2)).granted, vec![x(1)]);
    }

    #[test]
    fn test_three_way_deadlock() {
        let mut graph = LockGraph::new();
        for i in 1..=3 {
            graph.add(x(i as u64), u(i)).unwrap();
        }
        graph.add(x(1), u(2)).unwrap();
        graph.add(x(2), u(3)).unwrap();

        assert!(graph.add(x(3), u(1)).is_err());
    }

    #[test]
    fn test_chain_is_not_deadlock() {
        let mut graph = LockGraph::new();
        graph.add(x(1), u(1)).unwrap();
        graph.add(x(2), u(2)).unwrap();
        graph.add(x(3), u(3)).unwrap();

        // 1 -> 2 -> 3, and 4 also waits on 3
        assert_eq!(graph.add(x(1), u(2)).unwrap(), LockOutcome::Wait);
        assert_eq!(graph.add(x(2), u(3)).unwrap(), LockOutcome::Wait);
        assert_eq!(graph.add(x(4), u(3)).unwrap(), LockOutcome::Wait);
    }

    #[test]
    fn test_table_wakes_waiter() {
        let table = Arc::new(LockTable::new());
        assert!(table.add(x(1), u(1)).unwrap().is_none());

        let signal = table.add(x(2), u(1)).unwrap().unwrap();
        let waiter = thread::spawn(move || signal.wait());

        thread::sleep(Duration::from_millis(20));
        table.remove(x(1));

        assert!(waiter.join().unwrap());
        assert_eq!(table.holder(u(1)), Some(x(2)));
    }

    #[test]
    fn test_table_cancels_waiter() {
        let table = LockTable::new();
        table.add(x(1), u(1)).unwrap();
        let signal = table.add(x(2), u(1)).unwrap().unwrap();

        table.remove(x(2));

        assert!(!signal.wait());
        assert_eq!(table.holder(u(1)), Some(x(1)));
    }
}
