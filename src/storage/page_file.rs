//! Page file - low-level file I/O for database pages.
//!
//! The [`PageFile`] handles all direct file operations on `<path>.db`:
//! - Reading and writing whole pages
//! - Appending freshly initialized pages
//! - Truncating pages left behind by a crash

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;
use std::sync::atomic::{AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::warn;

use crate::common::config::PAGE_SIZE;
use crate::common::fs::{create_file, open_file};
use crate::common::{Error, PageId, Result};

/// The page file.
///
/// # File Layout
/// Pages are laid out sequentially, numbered from 1:
/// ```text
/// ┌─────────┬─────────┬─────────┬─────────┐
/// │ Page 1  │ Page 2  │  ...    │ Page N  │
/// │ (8KB)   │ (8KB)   │         │ (8KB)   │
/// └─────────┴─────────┴─────────┴─────────┘
/// Offset:  0      8192     ...   (N-1)×8192
/// ```
///
/// # Thread Safety
/// The file handle sits behind a `Mutex` held for a whole seek+read or
/// seek+write. The page count is atomic so it can be read without the lock,
/// but it only changes while the lock is held.
///
/// # Durability
/// Appends and truncation are followed by `fsync()`. Write-backs are not;
/// the page cache calls [`sync`](Self::sync) on close.
pub(crate) struct PageFile {
    file: Mutex<File>,
    page_count: AtomicU32,
}

impl PageFile {
    /// Create an empty page file.
    ///
    /// # Errors
    /// `Error::FileExists` if the file is already there.
    pub fn create(path: &Path) -> Result<Self> {
        let file = create_file(path)?;
        Ok(Self {
            file: Mutex::new(file),
            page_count: AtomicU32::new(0),
        })
    }

    /// Open an existing page file. The page count is derived from its length;
    /// a partly written last page is not counted.
    ///
    /// # Errors
    /// `Error::FileNotExists` if the file is missing.
    pub fn open(path: &Path) -> Result<Self> {
        let file = open_file(path)?;
        let file_size = file.metadata()?.len();
        let page_count = (file_size / PAGE_SIZE as u64) as u32;
        let partial = file_size % PAGE_SIZE as u64;
        if partial != 0 {
            warn!(
                path = %path.display(),
                page_count,
                partial_bytes = partial,
                "ignoring partial trailing page"
            );
        }

        Ok(Self {
            file: Mutex::new(file),
            page_count: AtomicU32::new(page_count),
        })
    }

    /// Read a page from disk.
    ///
    /// # Errors
    /// `Error::PageNotFound` if `page_id` is 0 or past the end of the file.
    pub fn read_page(&self, page_id: PageId) -> Result<Vec<u8>> {
        let mut file = self.file.lock();
        if !self.contains(page_id) {
            return Err(Error::PageNotFound(page_id.0));
        }

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        let mut buf = vec![0u8; PAGE_SIZE];
        file.read_exact(&mut buf)?;

        Ok(buf)
    }

    /// Write a page back to disk.
    ///
    /// # Errors
    /// `Error::PageNotFound` if the page was never allocated.
    pub fn write_page(&self, page_id: PageId, data: &[u8]) -> Result<()> {
        let mut file = self.file.lock();
        if !self.contains(page_id) {
            return Err(Error::PageNotFound(page_id.0));
        }

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(&data[..PAGE_SIZE.min(data.len())])?;

        Ok(())
    }

    /// Append a page holding `init` (zero-padded) and return its number.
    ///
    /// The page reaches the disk before the number is handed out.
    pub fn append_page(&self, init: &[u8]) -> Result<PageId> {
        let mut file = self.file.lock();
        let page_id = PageId::new(self.page_count.load(Ordering::Acquire) + 1);

        let mut buf = vec![0u8; PAGE_SIZE];
        let len = init.len().min(PAGE_SIZE);
        buf[..len].copy_from_slice(&init[..len]);

        file.seek(SeekFrom::Start(page_id.file_offset(PAGE_SIZE)))?;
        file.write_all(&buf)?;
        file.sync_all()?;

        self.page_count.store(page_id.0, Ordering::Release);
        Ok(page_id)
    }

    /// Shrink the file to `max_page` pages.
    pub fn truncate(&self, max_page: u32) -> Result<()> {
        let file = self.file.lock();
        file.set_len(max_page as u64 * PAGE_SIZE as u64)?;
        file.sync_all()?;
        self.page_count.store(max_page, Ordering::Release);
        Ok(())
    }

    /// Flush file contents to disk.
    pub fn sync(&self) -> Result<()> {
        self.file.lock().sync_all()?;
        Ok(())
    }

    /// Number of pages in the file.
    #[inline]
    pub fn page_count(&self) -> u32 {
        self.page_count.load(Ordering::Acquire)
    }

    fn contains(&self, page_id: PageId) -> bool {
        page_id.is_valid() && page_id.0 <= self.page_count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn test_create_new_file() {
        let dir = tempdir().unwrap();
        let file = PageFile::create(&dir.path().join("test.db")).unwrap();
        assert_eq!(file.page_count(), 0);
    }

    #[test]
    fn test_open_ignores_partial_trailing_page() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        {
            let file = PageFile::create(&path).unwrap();
            file.append_page(&[7u8; 16]).unwrap();
        }
        let mut raw = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
        raw.write_all(&[0xEE; 100]).unwrap();
        drop(raw);

        let file = PageFile::open(&path).unwrap();
        assert_eq!(file.page_count(), 1);
        assert_eq!(file.read_page(PageId::new(1)).unwrap()[..16], [7u8; 16]);
        assert!(matches!(file.read_page(PageId::new(2)), Err(Error::PageNotFound(2))));

        // The next append overwrites the partial bytes
        assert_eq!(file.append_page(&[1]).unwrap(), PageId::new(2));
    }

    #[test]
    fn test_append_and_read_page() {
        let dir = tempdir().unwrap();
        let file = PageFile::create(&dir.path().join("test.db")).unwrap();

        let page_id = file.append_page(&[0xAB, 0xCD]).unwrap();
        assert_eq!(page_id, PageId::new(1));
        assert_eq!(file.page_count(), 1);

        let data = file.read_page(page_id).unwrap();
        assert_eq!(data.len(), PAGE_SIZE);
        assert_eq!(&data[..3], &[0xAB, 0xCD, 0]);
    }

    #[test]
    fn test_write_and_read_page() {
        let dir = tempdir().unwrap();
        let file = PageFile::create(&dir.path().join("test.db")).unwrap();
        file.append_page(&[]).unwrap();
        let page_id = file.append_page(&[]).unwrap();

        let mut data = vec![0u8; PAGE_SIZE];
        data[0] = 0xAB;
        data[PAGE_SIZE - 1] = 0xEF;
        file.write_page(page_id, &data).unwrap();

        assert_eq!(file.read_page(page_id).unwrap(), data);
        assert_eq!(file.read_page(PageId::new(1)).unwrap()[0], 0);
    }

    #[test]
    fn test_persistence() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");

        {
            let file = PageFile::create(&path).unwrap();
            file.append_page(&[0x42]).unwrap();
            file.append_page(&[0x43]).unwrap();
        }

        let file = PageFile::open(&path).unwrap();
        assert_eq!(file.page_count(), 2);
        assert_eq!(file.read_page(PageId::new(2)).unwrap()[0], 0x43);
    }

    #[test]
    fn test_read_invalid_page() {
        let dir = tempdir().unwrap();
        let file = PageFile::create(&dir.path().join("test.db")).unwrap();
        file.append_page(&[]).unwrap();

        assert!(matches!(file.read_page(PageId::INVALID), Err(Error::PageNotFound(0))));
        assert!(matches!(file.read_page(PageId::new(2)), Err(Error::PageNotFound(2))));
        assert!(file.write_page(PageId::new(2), &[0u8; PAGE_SIZE]).is_err());
    }

    #[test]
    fn test_truncate() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("test.db");
        let file = PageFile::create(&path).unwrap();
        for _ in 0..5 {
            file.append_page(&[]).unwrap();
        }

        file.truncate(2).unwrap();

        assert_eq!(file.page_count(), 2);
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 2 * PAGE_SIZE as u64);
        assert_eq!(file.append_page(&[]).unwrap(), PageId::new(3));
    }
}
