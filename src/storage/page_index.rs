//! Free-space index over normal pages.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

/// Number of free-space intervals a page is bucketed into.
const INTERVALS: usize = 40;

/// Bytes covered by one bucket.
const THRESHOLD: usize = PAGE_SIZE / INTERVALS;

/// A page checked out of the index with the free space it had.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageInfo {
    pub page_id: PageId,
    pub free_space: usize,
}

/// Buckets pages by free space so an inserter can find a page with room
/// without touching disk.
///
/// Bucket `i` holds pages with `i * THRESHOLD <= free < (i + 1) * THRESHOLD`,
/// the last bucket holds everything above. `select` removes the page it
/// returns; the caller re-adds it with its new free space once done, so
/// two inserters never write to the same page through the index.
pub struct PageIndex {
    buckets: Mutex<Vec<VecDeque<PageInfo>>>,
}

impl PageIndex {
    pub fn new() -> Self {
        Self {
            buckets: Mutex::new((0..=INTERVALS).map(|_| VecDeque::new()).collect()),
        }
    }

    /// Register `page_id` as having `free_space` bytes available.
    pub fn add(&self, page_id: PageId, free_space: usize) {
        let bucket = (free_space / THRESHOLD).min(INTERVALS);
        self.buckets.lock()[bucket].push_back(PageInfo {
            page_id,
            free_space,
        });
    }

    /// Check out a page with at least `space` free bytes.
    ///
    /// Starts one bucket above the one `space` falls into, so every page in
    /// the first bucket scanned has room. The last bucket is open ended and
    /// its entries are checked individually.
    pub fn select(&self, space: usize) -> Option<PageInfo> {
        let mut start = space / THRESHOLD;
        if start < INTERVALS {
            start += 1;
        }

        let mut buckets = self.buckets.lock();
        for bucket in buckets.iter_mut().skip(start) {
            if let Some(pos) = bucket.iter().position(|info| info.free_space >= space) {
                return bucket.remove(pos);
            }
        }
        None
    }

    /// Number of pages currently in the index.
    pub fn len(&self) -> usize {
        self.buckets.lock().iter().map(VecDeque::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for PageIndex {
    fn default() -> Self {
        Self::new()
    }
}
