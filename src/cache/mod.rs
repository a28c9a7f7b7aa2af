//! Reference-counted resource caching.
//!
//! One generic cache backs three layers:
//! - the page cache ([`PageCache`](crate::storage::PageCache))
//! - the data item cache ([`DataManager`](crate::storage::DataManager))
//! - the version entry cache ([`VersionManager`](crate::concurrency::VersionManager))
//!
//! # Components
//! - [`ResourceCache`] - The cache itself
//! - [`CacheSource`] - Loader/evictor pair each layer plugs in
//! - [`CacheStats`] - Performance statistics

mod resource_cache;
mod stats;

pub use resource_cache::{CacheSource, ResourceCache};
pub use stats::{CacheStats, StatsSnapshot};
