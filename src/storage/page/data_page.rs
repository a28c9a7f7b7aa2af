//! Layout of normal (record-holding) pages.
//!
//! Every page except page 1 starts with a [`DataPageHeader`] holding the
//! free space offset (FSO). Records are packed one after another from the
//! end of the header up to the FSO:
//!
//! ```text
//! ┌─────────┬──────────┬──────────┬─────┬──────────────────────┐
//! │ FSO (2) │ record 0 │ record 1 │ ... │      free space      │
//! └─────────┴──────────┴──────────┴─────┴──────────────────────┘
//! 0         2                           FSO                 8192
//! ```

use crate::common::config::PAGE_SIZE;
use crate::common::{Error, Result};

use super::Page;

/// Most bytes a single record can occupy on a normal page.
pub const MAX_FREE_SPACE: usize = PAGE_SIZE - DataPageHeader::SIZE;

/// Metadata stored at the beginning of every normal page.
///
/// # Layout (2 bytes)
/// ```text
/// Offset  Size  Field
/// ------  ----  -----
/// 0       2     free_space_offset (little-endian)
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DataPageHeader {
    /// First unused byte of the page.
    pub free_space_offset: u16,
}

impl DataPageHeader {
    /// Size of the header in bytes.
    pub const SIZE: usize = 2;

    /// Offset of the FSO field within the header.
    pub const OFFSET_FSO: usize = 0;

    /// Header of an empty page.
    pub fn empty() -> Self {
        Self {
            free_space_offset: Self::SIZE as u16,
        }
    }

    /// Read a header from the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < DataPageHeader::SIZE`.
    pub fn from_bytes(data: &[u8]) -> Self {
        assert!(data.len() >= Self::SIZE, "buffer too small for DataPageHeader");

        let free_space_offset =
            u16::from_le_bytes([data[Self::OFFSET_FSO], data[Self::OFFSET_FSO + 1]]);

        Self { free_space_offset }
    }

    /// Write this header to the beginning of a byte slice.
    ///
    /// # Panics
    /// Panics if `data.len() < DataPageHeader::SIZE`.
    pub fn write_to(&self, data: &mut [u8]) {
        assert!(data.len() >= Self::SIZE, "buffer too small for DataPageHeader");

        data[Self::OFFSET_FSO..Self::OFFSET_FSO + 2]
            .copy_from_slice(&self.free_space_offset.to_le_bytes());
    }
}

/// Initial contents of a fresh normal page.
pub fn init_raw() -> Vec<u8> {
    let mut raw = vec![0u8; PAGE_SIZE];
    DataPageHeader::empty().write_to(&mut raw);
    raw
}

/// Current free space offset of `page`.
pub fn free_space_offset(page: &Page) -> u16 {
    DataPageHeader::from_bytes(&page.read()).free_space_offset
}

/// Bytes still available on `page`.
pub fn free_space(page: &Page) -> usize {
    PAGE_SIZE.saturating_sub(free_space_offset(page) as usize)
}

/// Append `raw` at the FSO and advance it. Returns the record offset.
///
/// The caller guarantees `raw` fits; the page index only hands out pages
/// with enough free space.
pub fn insert(page: &Page, raw: &[u8]) -> u16 {
    page.set_dirty(true);
    let mut data = page.write();

    let mut header = DataPageHeader::from_bytes(&data);
    let offset = header.free_space_offset;
    let start = offset as usize;
    data[start..start + raw.len()].copy_from_slice(raw);

    header.free_space_offset = offset + raw.len() as u16;
    header.write_to(&mut data);

    offset
}

/// Replay an insert: place `raw` at `offset` and move the FSO forward if
/// the record ends past it. The FSO never moves backwards, so replaying
/// the same insert twice leaves the page unchanged.
pub fn recover_insert(page: &Page, raw: &[u8], offset: u16) -> Result<()> {
    let end = checked_end(raw, offset)?;

    page.set_dirty(true);
    let mut data = page.write();
    data[offset as usize..end].copy_from_slice(raw);

    let mut header = DataPageHeader::from_bytes(&data);
    if (header.free_space_offset as usize) < end {
        header.free_space_offset = end as u16;
        header.write_to(&mut data);
    }

    Ok(())
}

/// Replay an update: overwrite the bytes at `offset`. The FSO is untouched.
pub fn recover_update(page: &Page, raw: &[u8], offset: u16) -> Result<()> {
    let end = checked_end(raw, offset)?;

    page.set_dirty(true);
    let mut data = page.write();
    data[offset as usize..end].copy_from_slice(raw);

    Ok(())
}

fn checked_end(raw: &[u8], offset: u16) -> Result<usize> {
    let end = offset as usize + raw.len();
    if (offset as usize) < DataPageHeader::SIZE || end > PAGE_SIZE {
        return Err(Error::corrupt_record(format!(
            "{} bytes at offset {} do not fit a page",
            raw.len(),
            offset
        )));
    }
    Ok(end)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::PageId;

    fn fresh_page() -> Page {
        Page::new(PageId::new(2), init_raw())
    }

    #[test]
    fn test_header_roundtrip() {
        let original = DataPageHeader {
            free_space_offset: 0x1234,
        };

        let mut buffer = [0u8; DataPageHeader::SIZE];
        original.write_to(&mut buffer);

        assert_eq!(buffer, [0x34, 0x12]);
        assert_eq!(DataPageHeader::from_bytes(&buffer), original);
    }

    #[test]
    fn test_fresh_page() {
        let page = fresh_page();
        assert_eq!(free_space_offset(&page), 2);
        assert_eq!(free_space(&page), MAX_FREE_SPACE);
        assert!(!page.is_dirty());
    }

    #[test]
    fn test_insert_packs_records() {
        let page = fresh_page();

        assert_eq!(insert(&page, b"hello"), 2);
        assert_eq!(insert(&page, b"world"), 7);

        assert!(page.is_dirty());
        assert_eq!(free_space_offset(&page), 12);
        assert_eq!(&page.read()[2..12], b"helloworld");
        assert_eq!(free_space(&page), PAGE_SIZE - 12);
    }

    #[test]
    fn test_recover_insert_only_advances() {
        let page = fresh_page();

        recover_insert(&page, b"abcd", 10).unwrap();
        assert_eq!(free_space_offset(&page), 14);

        // An earlier record must not pull the FSO back
        recover_insert(&page, b"xy", 2).unwrap();
        assert_eq!(free_space_offset(&page), 14);
        assert_eq!(&page.read()[2..4], b"xy");
    }

    #[test]
    fn test_recover_insert_is_idempotent() {
        let page = fresh_page();

        recover_insert(&page, b"record", 2).unwrap();
        let once = page.snapshot();
        recover_insert(&page, b"record", 2).unwrap();

        assert_eq!(page.snapshot(), once);
    }

    #[test]
    fn test_recover_update_keeps_fso() {
        let page = fresh_page();
        insert(&page, b"aaaa");

        recover_update(&page, b"bb", 3).unwrap();

        assert_eq!(&page.read()[2..6], b"abba");
        assert_eq!(free_space_offset(&page), 6);
    }

    #[test]
    fn test_recover_rejects_out_of_page_records() {
        let page = fresh_page();
        assert!(recover_update(&page, b"abc", (PAGE_SIZE - 1) as u16).is_err());
        assert!(recover_insert(&page, b"abc", 0).is_err());
    }
}
