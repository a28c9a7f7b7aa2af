//! Page cache - reference-counted residency for pages of the page file.
//!
//! The [`PageCache`] provides:
//! - Page caching between disk and memory on top of [`ResourceCache`]
//! - Reference counting (`get_page` / `release`)
//! - Dirty page write-back when the last reference is released

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheSource, CacheStats, ResourceCache};
use crate::common::config::{DB_SUFFIX, MIN_CACHE_PAGES, PAGE_SIZE};
use crate::common::fs::with_suffix;
use crate::common::{Error, PageId, Result};
use crate::storage::page::Page;
use crate::storage::page_file::PageFile;

/// Loads pages from the page file and writes dirty ones back.
struct PageSource {
    file: PageFile,
}

impl CacheSource for PageSource {
    type Item = Arc<Page>;

    fn load(&self, key: u64) -> Result<Arc<Page>> {
        let page_id = PageId::new(key as u32);
        let data = self.file.read_page(page_id)?;
        Ok(Arc::new(Page::new(page_id, data)))
    }

    fn evict(&self, _key: u64, page: Arc<Page>) -> Result<()> {
        if page.is_dirty() {
            self.file.write_page(page.page_id(), &page.read())?;
            page.set_dirty(false);
        }
        Ok(())
    }
}

/// Caches pages of `<path>.db`.
///
/// # Architecture
/// ```text
/// ┌──────────────────────────────────────────────┐
/// │                  PageCache                   │
/// │  ┌────────────────────────────────────────┐  │
/// │  │ ResourceCache<PageSource>              │  │
/// │  │   pgno → Arc<Page>, refcount           │  │
/// │  └───────────────────┬────────────────────┘  │
/// │                      │ load / evict          │
/// │  ┌───────────────────▼────────────────────┐  │
/// │  │ PageFile  (Mutex<File>, page count)    │  │
/// │  └────────────────────────────────────────┘  │
/// └──────────────────────────────────────────────┘
/// ```
///
/// The capacity bounds how many pages are resident at once, not how large
/// the file may grow.
///
/// # Usage
/// ```ignore
/// let pc = PageCache::create(path, 64 << 20)?;
/// let pgno = pc.new_page(&init)?;
/// let page = pc.get_page(pgno)?;
/// page.write()[10] = 1;
/// page.set_dirty(true);
/// pc.release(&page)?;   // written back here
/// ```
pub struct PageCache {
    cache: ResourceCache<PageSource>,
}

impl PageCache {
    /// Create `<path>.db` with a cache budget of `memory` bytes.
    ///
    /// # Errors
    /// - `Error::MemTooSmall` if `memory` holds fewer than `MIN_CACHE_PAGES` pages
    /// - `Error::FileExists` if the page file already exists
    pub fn create(path: &Path, memory: u64) -> Result<Self> {
        let capacity = capacity_for(memory)?;
        let file = PageFile::create(&with_suffix(path, DB_SUFFIX))?;
        Ok(Self::with_file(file, capacity))
    }

    /// Open an existing `<path>.db`.
    ///
    /// # Errors
    /// - `Error::MemTooSmall` if `memory` holds fewer than `MIN_CACHE_PAGES` pages
    /// - `Error::FileNotExists` if the page file is missing
    pub fn open(path: &Path, memory: u64) -> Result<Self> {
        let capacity = capacity_for(memory)?;
        let file = PageFile::open(&with_suffix(path, DB_SUFFIX))?;
        info!(pages = file.page_count(), capacity, "page file opened");
        Ok(Self::with_file(file, capacity))
    }

    fn with_file(file: PageFile, capacity: usize) -> Self {
        Self {
            cache: ResourceCache::new(PageSource { file }, capacity),
        }
    }

    /// Allocate the next page and write `init` to it immediately.
    pub fn new_page(&self, init: &[u8]) -> Result<PageId> {
        let page_id = self.cache.source().file.append_page(init)?;
        debug!(%page_id, "page allocated");
        Ok(page_id)
    }

    /// Get a page, loading it from disk on a miss.
    ///
    /// Every `get_page` must be paired with a [`release`](Self::release).
    ///
    /// # Errors
    /// - `Error::PageNotFound` if the page is not in the file
    /// - `Error::CacheFull` if the cache is at capacity
    pub fn get_page(&self, page_id: PageId) -> Result<Arc<Page>> {
        self.cache.get(page_id.0 as u64)
    }

    /// Drop one reference to `page`; the last one writes it back if dirty.
    pub fn release(&self, page: &Page) -> Result<()> {
        self.cache.release(page.page_id().0 as u64)
    }

    /// Write `page` to disk whether or not it is dirty.
    pub fn flush_page(&self, page: &Page) -> Result<()> {
        let file = &self.cache.source().file;
        file.write_page(page.page_id(), &page.read())?;
        file.sync()?;
        page.set_dirty(false);
        Ok(())
    }

    /// Sync the page file.
    pub fn sync(&self) -> Result<()> {
        self.cache.source().file.sync()
    }

    /// Drop every page after `max_page` from the file.
    pub fn truncate(&self, max_page: u32) -> Result<()> {
        info!(max_page, "truncating page file");
        self.cache.source().file.truncate(max_page)
    }

    /// Number of pages in the file.
    pub fn page_count(&self) -> u32 {
        self.cache.source().file.page_count()
    }

    /// Number of resident pages.
    pub fn resident_pages(&self) -> usize {
        self.cache.len()
    }

    /// Maximum number of resident pages.
    pub fn capacity(&self) -> usize {
        self.cache.capacity()
    }

    /// Cache statistics.
    pub fn stats(&self) -> &CacheStats {
        self.cache.stats()
    }

    /// Write back every resident page and sync the file.
    pub fn close(&self) -> Result<()> {
        self.cache.close()?;
        self.cache.source().file.sync()
    }
}

fn capacity_for(memory: u64) -> Result<usize> {
    let pages = (memory / PAGE_SIZE as u64) as usize;
    if pages < MIN_CACHE_PAGES {
        return Err(Error::MemTooSmall {
            pages,
            min_pages: MIN_CACHE_PAGES,
        });
    }
    Ok(pages)
}

// ============================================================================
// TESTS
// ============================================================================
