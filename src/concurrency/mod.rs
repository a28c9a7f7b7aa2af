//! Transactions and multi-version concurrency control.
//!
//! This module contains:
//! - [`TransactionManager`] - Durable ledger of transaction outcomes
//! - [`Transaction`] / [`IsolationLevel`] - Per-transaction snapshot state
//! - [`Entry`] - A record version with its `xmin` / `xmax` markers
//! - [`visibility`] - Which versions a transaction may see
//! - [`LockTable`] - Writer locks with deadlock detection
//! - [`VersionManager`] - The MVCC entry point

mod entry;
mod lock_table;
mod transaction;
mod transaction_manager;
mod version_manager;
pub mod visibility;

pub use entry::Entry;
pub use lock_table::{LockGraph, LockOutcome, LockTable, Released, WaitSignal};
pub use transaction::{AbortReason, IsolationLevel, Transaction};
pub use transaction_manager::TransactionManager;
pub use version_manager::VersionManager;
