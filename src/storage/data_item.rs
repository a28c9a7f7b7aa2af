//! Records stored on normal pages.
//!
//! # Layout
//! ```text
//! ┌───────────┬──────────┬─────────────────┐
//! │ valid (1) │ size (2) │ payload (size)  │
//! └───────────┴──────────┴─────────────────┘
//! ```
//! `valid` is 0 for a live record and 1 for a tombstone. Space is never
//! reclaimed.

use std::fmt;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockWriteGuard};

use crate::common::{Result, Uid, Xid};
use crate::recovery::{update_payload, Logger};
use crate::storage::page::Page;

pub(crate) const OF_VALID: usize = 0;
pub(crate) const OF_SIZE: usize = 1;
pub(crate) const OF_DATA: usize = 3;

const VALID: u8 = 0;
const INVALID: u8 = 1;

/// Wrap `data` into a live record.
pub(crate) fn wrap_raw(data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(OF_DATA + data.len());
    raw.push(VALID);
    raw.extend_from_slice(&(data.len() as u16).to_le_bytes());
    raw.extend_from_slice(data);
    raw
}

/// Turn a record into a tombstone.
pub(crate) fn set_raw_invalid(raw: &mut [u8]) {
    raw[OF_VALID] = INVALID;
}

/// A record on a resident page.
///
/// The item keeps its page resident for as long as the item itself is
/// cached. Its bytes are read straight from the page under the item's
/// read lock. Changes go through [`before`](Self::before), which hands out a
/// [`DataItemWriter`] holding the write lock:
///
/// ```ignore
/// let mut writer = item.before();
/// writer.write_data(0, &xid.0.to_le_bytes());
/// writer.after(xid)?;          // update record logged, lock released
/// ```
///
/// Dropping a writer without calling `after` restores the pre-image.
pub struct DataItem {
    uid: Uid,
    page: Arc<Page>,
    /// Start of the record within the page.
    offset: usize,
    /// Length of the whole record, header included.
    len: usize,
    lock: RwLock<()>,
    logger: Arc<Logger>,
}

impl DataItem {
    pub(crate) fn new(uid: Uid, page: Arc<Page>, offset: usize, len: usize, logger: Arc<Logger>) -> Self {
        Self {
            uid,
            page,
            offset,
            len,
            lock: RwLock::new(()),
            logger,
        }
    }

    #[inline]
    pub fn uid(&self) -> Uid {
        self.uid
    }

    /// Page the record lives on.
    pub(crate) fn page(&self) -> &Arc<Page> {
        &self.page
    }

    /// Whether the record is live.
    pub fn is_valid(&self) -> bool {
        let _guard = self.lock.read();
        self.page.read()[self.offset + OF_VALID] == VALID
    }

    /// Payload length in bytes.
    pub fn data_len(&self) -> usize {
        self.len - OF_DATA
    }

    /// Run `f` over the payload under the read lock.
    pub fn read_with<R>(&self, f: impl FnOnce(&[u8]) -> R) -> R {
        let _guard = self.lock.read();
        let page = self.page.read();
        f(&page[self.offset + OF_DATA..self.offset + self.len])
    }

    /// Copy of the payload.
    pub fn data(&self) -> Vec<u8> {
        self.read_with(<[u8]>::to_vec)
    }

    /// Copy of the whole record, header included.
    pub fn raw(&self) -> Vec<u8> {
        let _guard = self.lock.read();
        self.raw_locked()
    }

    fn raw_locked(&self) -> Vec<u8> {
        self.page.read()[self.offset..self.offset + self.len].to_vec()
    }

    fn restore(&self, old_raw: &[u8]) {
        self.page.write()[self.offset..self.offset + self.len].copy_from_slice(old_raw);
    }

    /// Start a change: take the write lock, mark the page dirty and save
    /// the pre-image.
    pub fn before(&self) -> DataItemWriter<'_> {
        let guard = self.lock.write();
        self.page.set_dirty(true);
        let old_raw = self.raw_locked();

        DataItemWriter {
            item: self,
            _guard: guard,
            old_raw,
            finished: false,
        }
    }
}

impl fmt::Debug for DataItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataItem")
            .field("uid", &self.uid)
            .field("len", &self.len)
            .finish_non_exhaustive()
    }
}

/// An in-progress change to a [`DataItem`].
///
/// Readers of the item block until the writer is finished or dropped.
pub struct DataItemWriter<'a> {
    item: &'a DataItem,
    _guard: RwLockWriteGuard<'a, ()>,
    old_raw: Vec<u8>,
    finished: bool,
}

impl DataItemWriter<'_> {
    /// Copy of the current payload, including changes made so far.
    pub fn data(&self) -> Vec<u8> {
        let page = self.item.page.read();
        page[self.item.offset + OF_DATA..self.item.offset + self.item.len].to_vec()
    }

    /// Overwrite payload bytes starting at `at`.
    ///
    /// # Panics
    /// Panics if the bytes run past the end of the payload.
    pub fn write_data(&mut self, at: usize, bytes: &[u8]) {
        assert!(
            at + bytes.len() <= self.item.data_len(),
            "write past end of data item"
        );
        let start = self.item.offset + OF_DATA + at;
        self.item.page.write()[start..start + bytes.len()].copy_from_slice(bytes);
    }

    /// Mark the record as a tombstone.
    pub fn set_invalid(&mut self) {
        set_raw_invalid(&mut self.item.page.write()[self.item.offset..]);
    }

    /// Abandon the change and restore the pre-image.
    pub fn un_before(mut self) {
        self.item.restore(&self.old_raw);
        self.finished = true;
    }

    /// Finish the change: log pre- and post-image for `xid`, then release
    /// the write lock.
    ///
    /// If the log append fails the pre-image is restored and the error is
    /// returned.
    pub fn after(mut self, xid: Xid) -> Result<()> {
        let new_raw = self.item.raw_locked();
        let payload = update_payload(xid, self.item.uid, &self.old_raw, &new_raw);

        let result = self.item.logger.log(&payload);
        if result.is_err() {
            self.item.restore(&self.old_raw);
        }
        self.finished = true;
        result
    }
}

impl Drop for DataItemWriter<'_> {
    fn drop(&mut self) {
        if !self.finished {
            self.item.restore(&self.old_raw);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::common::config::PAGE_SIZE;
    use crate::common::PageId;
    use crate::recovery::LogRecord;
    use tempfile::{tempdir, TempDir};

    fn setup(payload: &[u8]) -> (TempDir, Arc<Logger>, DataItem) {
        let dir = tempdir().unwrap();
        let logger = Arc::new(Logger::create(&dir.path().join("db")).unwrap());

        let raw = wrap_raw(payload);
        let mut bytes = vec![0u8; PAGE_SIZE];
        bytes[10..10 + raw.len()].copy_from_slice(&raw);
        let page = Arc::new(Page::new(PageId::new(2), bytes));

        let item = DataItem::new(Uid::new(2, 10), page, 10, raw.len(), Arc::clone(&logger));
        (dir, logger, item)
    }

    #[test]
    fn test_wrap_raw() {
        assert_eq!(wrap_raw(b"ab"), vec![0, 2, 0, b'a', b'b']);

        let mut raw = wrap_raw(b"x");
        set_raw_invalid(&mut raw);
        assert_eq!(raw[OF_VALID], INVALID);
    }

    #[test]
    fn test_read_payload() {
        let (_dir, _logger, item) = setup(b"hello");

        assert!(item.is_valid());
        assert_eq!(item.data(), b"hello");
        assert_eq!(item.data_len(), 5);
        assert_eq!(item.read_with(|d| d[1]), b'e');
        assert_eq!(item.raw(), wrap_raw(b"hello"));
    }

    #[test]
    fn test_after_logs_both_images() {
        let (_dir, logger, item) = setup(b"hello");

        let mut writer = item.before();
        assert!(item.page().is_dirty());
        writer.write_data(0, b"J");
        assert_eq!(writer.data(), b"Jello");
        writer.after(Xid::new(4)).unwrap();

        assert_eq!(item.data(), b"Jello");

        logger.rewind();
        let record = LogRecord::decode(&logger.next().unwrap().unwrap()).unwrap();
        assert_eq!(
            record,
            LogRecord::Update {
                xid: Xid::new(4),
                uid: Uid::new(2, 10),
                old_raw: wrap_raw(b"hello"),
                new_raw: wrap_raw(b"Jello"),
            }
        );
    }

    #[test]
    fn test_un_before_restores() {
        let (_dir, logger, item) = setup(b"hello");

        let mut writer = item.before();
        writer.write_data(1, b"ipp");
        writer.un_before();

        assert_eq!(item.data(), b"hello");
        logger.rewind();
        assert_eq!(logger.next().unwrap(), None);
    }

    #[test]
    fn test_dropped_writer_restores() {
        let (_dir, _logger, item) = setup(b"hello");

        {
            let mut writer = item.before();
            writer.set_invalid();
        }

        assert!(item.is_valid());
    }

    #[test]
    #[should_panic(expected = "write past end")]
    fn test_write_past_end_panics() {
        let (_dir, _logger, item) = setup(b"abc");
        let mut writer = item.before();
        writer.write_data(2, b"xy");
    }
}
