//! Common types and utilities shared across txstore.
//!
//! This module contains fundamental primitives used throughout the codebase:
//! - Configuration constants and open options
//! - Error types
//! - File creation/open helpers
//! - Identifiers (PageId, Uid, Xid)

pub mod config;
pub mod error;
pub(crate) mod fs;
mod page_id;
mod uid;
mod xid;

pub use error::{Error, Result};
pub use page_id::PageId;
pub use uid::Uid;
pub use xid::Xid;
