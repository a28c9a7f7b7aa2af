//! txstore - An embedded transactional storage engine.
//!
//! # Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────┐
//! │                            Database                             │
//! ├─────────────────────────────────────────────────────────────────┤
//! │  ┌─────────────────────────────────────────────────────────┐   │
//! │  │           Version Layer (concurrency/)                   │   │
//! │  │  VersionManager + Visibility + LockTable + Transaction   │   │
//! │  └─────────────────────────────────────────────────────────┘   │
//! │                 ↓                              ↓                │
//! │  ┌──────────────────────────────┐  ┌───────────────────────┐   │
//! │  │   Data Layer (storage/)      │  │ TransactionManager    │   │
//! │  │ DataManager + DataItem +     │  │   <path>.xid ledger   │   │
//! │  │ PageIndex                    │  └───────────────────────┘   │
//! │  └──────────────────────────────┘                              │
//! │                 ↓                              ↓                │
//! │  ┌──────────────────────────────┐  ┌───────────────────────┐   │
//! │  │ PageCache  <path>.db         │  │ Logger  <path>.log    │   │
//! │  │ (ResourceCache of pages)     │  │ (recovery/)           │   │
//! │  └──────────────────────────────┘  └───────────────────────┘   │
//! └─────────────────────────────────────────────────────────────────┘
//! ```
//!
//! Page cache, data item cache and entry cache are all instances of one
//! generic [`ResourceCache`].
//!
//! # Modules
//! - [`common`] - Shared primitives (PageId, Uid, Xid, Error, config)
//! - [`cache`] - The reference-counted resource cache
//! - [`storage`] - Pages, page cache, free-space index, data items
//! - [`recovery`] - Write-ahead logging and crash recovery
//! - [`concurrency`] - Transaction ledger and MVCC
//!
//! # Quick Start
//! ```no_run
//! use txstore::{Config, Database, IsolationLevel};
//!
//! let db = Database::create("my_database", &Config::default()).unwrap();
//!
//! let xid = db.begin_with(IsolationLevel::RepeatableRead).unwrap();
//! let uid = db.insert(xid, b"hello").unwrap();
//! assert_eq!(db.read(xid, uid).unwrap(), Some(b"hello".to_vec()));
//! db.commit(xid).unwrap();
//!
//! db.close().unwrap();
//! ```

pub mod cache;
pub mod common;
pub mod concurrency;
mod db;
pub mod recovery;
pub mod storage;

// Re-export commonly used items at crate root for convenience
pub use common::config::{Config, PAGE_SIZE};
pub use common::{Error, PageId, Result, Uid, Xid};

pub use cache::{CacheSource, CacheStats, ResourceCache, StatsSnapshot};
pub use concurrency::{IsolationLevel, TransactionManager, VersionManager};
pub use db::Database;
pub use recovery::{Logger, RecoveryReport};
pub use storage::page::Page;
pub use storage::{DataItem, DataManager, PageCache, PageIndex};
