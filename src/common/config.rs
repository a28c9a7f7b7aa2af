//! Configuration constants and open-time options for txstore.

use crate::common::error::{Error, Result};
use crate::concurrency::IsolationLevel;

/// Size of a page in bytes (8KB).
///
/// # Memory Layout
/// Page numbers are 1-based `u32`s, so a page lives at file offset
/// `(pgno - 1) × PAGE_SIZE`. A record uid keeps the page number in its
/// high 32 bits and the in-page offset in the low bits.
pub const PAGE_SIZE: usize = 8192;

/// Smallest page cache the engine will run with, in pages.
pub const MIN_CACHE_PAGES: usize = 10;

/// Default page cache budget (64MB).
pub const DEFAULT_MEMORY: u64 = 64 << 20;

/// Suffix of the transaction ledger file.
pub const XID_SUFFIX: &str = ".xid";

/// Suffix of the page file.
pub const DB_SUFFIX: &str = ".db";

/// Suffix of the write-ahead log file.
pub const LOG_SUFFIX: &str = ".log";

const KB: u64 = 1 << 10;
const MB: u64 = 1 << 20;
const GB: u64 = 1 << 30;

/// Options used when creating or opening a database.
#[derive(Debug, Clone)]
pub struct Config {
    /// Bytes of memory given to the page cache.
    pub memory: u64,

    /// Isolation level used by [`Database::begin`](crate::Database::begin).
    pub default_isolation: IsolationLevel,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            memory: DEFAULT_MEMORY,
            default_isolation: IsolationLevel::ReadCommitted,
        }
    }
}

impl Config {
    /// Creates a configuration with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the page cache budget in bytes.
    #[must_use]
    pub const fn memory(mut self, bytes: u64) -> Self {
        self.memory = bytes;
        self
    }

    /// Sets the isolation level for transactions started without one.
    #[must_use]
    pub const fn default_isolation(mut self, level: IsolationLevel) -> Self {
        self.default_isolation = level;
        self
    }

    /// Number of pages the page cache may hold at once.
    pub fn cache_pages(&self) -> usize {
        (self.memory / PAGE_SIZE as u64) as usize
    }
}

/// Parse a memory size such as `"64MB"`, `"512KB"` or `"1GB"`.
///
/// # Errors
/// Returns `Error::InvalidMemory` if the unit is missing or unknown, or
/// the number does not parse.
pub fn parse_memory(text: &str) -> Result<u64> {
    let text = text.trim();
    if text.len() < 3 || !text.is_char_boundary(text.len() - 2) {
        return Err(Error::InvalidMemory(text.to_string()));
    }

    let (number, unit) = text.split_at(text.len() - 2);
    let number: u64 = number
        .trim()
        .parse()
        .map_err(|_| Error::InvalidMemory(text.to_string()))?;

    let scale = match unit.to_ascii_uppercase().as_str() {
        "KB" => KB,
        "MB" => MB,
        "GB" => GB,
        _ => return Err(Error::InvalidMemory(text.to_string())),
    };

    number
        .checked_mul(scale)
        .ok_or_else(|| Error::InvalidMemory(text.to_string()))
}
