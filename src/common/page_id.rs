//! Page identifier type.

use std::fmt;

/// Identifies a page in the page file.
///
/// Page numbers are 1-based: page `n` lives at file offset
/// `(n - 1) × PAGE_SIZE`. Page 1 is the checkpoint page; records live on
/// pages 2 and up. `0` is never a real page and serves as the sentinel.
///
/// # Example
/// ```
/// use txstore::PageId;
///
/// let page_id = PageId::new(42);
/// assert!(page_id.is_valid());
/// assert_eq!(page_id.0, 42);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct PageId(pub u32);

impl PageId {
    /// Invalid/sentinel page ID.
    pub const INVALID: PageId = PageId(0);

    /// The checkpoint page.
    pub const CHECKPOINT: PageId = PageId(1);

    /// Create a new PageId.
    #[inline]
    pub fn new(id: u32) -> Self {
        PageId(id)
    }

    /// Check if this page ID is valid (not the sentinel value).
    #[inline]
    pub fn is_valid(&self) -> bool {
        *self != Self::INVALID
    }

    /// Byte offset of this page in the page file.
    #[inline]
    pub fn file_offset(&self, page_size: usize) -> u64 {
        (self.0 as u64).saturating_sub(1) * page_size as u64
    }
}

impl fmt::Display for PageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if *self == Self::INVALID {
            write!(f, "Page(INVALID)")
        } else {
            write!(f, "Page({})", self.0)
        }
    }
}
