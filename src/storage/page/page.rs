//! Page - the fundamental 8KB unit of storage.
//!
//! A [`Page`] is a resident copy of one page of the page file, shared by
//! every layer that touches it through `Arc<Page>` handed out by the
//! [`PageCache`](crate::storage::PageCache).

use std::sync::atomic::{AtomicBool, Ordering};

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use crate::common::config::PAGE_SIZE;
use crate::common::PageId;

/// A resident page.
///
/// # Memory Layout
/// - Size: 8192 bytes, heap-allocated once per residency
/// - Page number: fixed for the page's lifetime
/// - Dirty flag: in memory only, cleared when the cache writes the page back
///
/// # Thread Safety
/// The bytes sit behind a `RwLock`: record readers share it, and a writer
/// holds it only for the duration of a single byte copy. Record-level
/// exclusion is the job of [`DataItem`](crate::storage::DataItem).
///
/// # Example
/// ```
/// use txstore::{Page, PageId, PAGE_SIZE};
///
/// let page = Page::new(PageId::new(2), vec![0u8; PAGE_SIZE]);
/// page.write()[0] = 0xFF;
/// page.set_dirty(true);
/// assert_eq!(page.read()[0], 0xFF);
/// assert!(page.is_dirty());
/// ```
pub struct Page {
    page_id: PageId,
    data: RwLock<Box<[u8]>>,
    dirty: AtomicBool,
}

impl Page {
    /// Wrap `data` as the contents of page `page_id`.
    ///
    /// `data` is padded with zeros (or cut) to exactly `PAGE_SIZE` bytes.
    pub fn new(page_id: PageId, mut data: Vec<u8>) -> Self {
        data.resize(PAGE_SIZE, 0);
        Self {
            page_id,
            data: RwLock::new(data.into_boxed_slice()),
            dirty: AtomicBool::new(false),
        }
    }

    /// Page number of this page.
    #[inline]
    pub fn page_id(&self) -> PageId {
        self.page_id
    }

    /// Shared access to the page bytes.
    #[inline]
    pub fn read(&self) -> RwLockReadGuard<'_, Box<[u8]>> {
        self.data.read()
    }

    /// Exclusive access to the page bytes.
    ///
    /// Does not mark the page dirty; callers do that explicitly.
    #[inline]
    pub fn write(&self) -> RwLockWriteGuard<'_, Box<[u8]>> {
        self.data.write()
    }

    /// Copy of the page bytes.
    pub fn snapshot(&self) -> Vec<u8> {
        self.data.read().to_vec()
    }

    /// Whether the page differs from its on-disk copy.
    #[inline]
    pub fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    /// Set or clear the dirty flag.
    #[inline]
    pub fn set_dirty(&self, dirty: bool) {
        self.dirty.store(dirty, Ordering::Release);
    }
}

impl std::fmt::Debug for Page {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Page")
            .field("page_id", &self.page_id)
            .field("dirty", &self.is_dirty())
            .finish_non_exhaustive()
    }
}

// ============================================================================
// TESTS
// ============================================================================
