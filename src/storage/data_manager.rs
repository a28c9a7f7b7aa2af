//! Data manager - record storage on top of the page cache and the log.
//!
//! The [`DataManager`] provides:
//! - `insert`: place a record on a page with room, logging it first
//! - `read`: a cached [`DataItem`] for a uid, or nothing for a tombstone
//! - Crash detection through the checkpoint page and replay of the log

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, info};

use crate::cache::{CacheSource, CacheStats, ResourceCache};
use crate::common::{Error, PageId, Result, Uid, Xid};
use crate::concurrency::TransactionManager;
use crate::recovery::{insert_payload, recover, Logger, RecoveryReport};
use crate::storage::data_item::{self, DataItem, OF_DATA, OF_SIZE};
use crate::storage::page::{checkpoint, data_page, DataPageHeader, Page, MAX_FREE_SPACE};
use crate::storage::{PageCache, PageIndex};

/// Times `insert` asks the page index for room before giving up.
const MAX_ALLOC_ATTEMPTS: usize = 5;

/// Loads data items from pages and releases their page on eviction.
struct ItemSource {
    pc: Arc<PageCache>,
    logger: Arc<Logger>,
}

impl ItemSource {
    /// Locate the record at `uid` on `page`, if one is there.
    fn locate(page: &Page, uid: Uid) -> Option<(usize, usize)> {
        let data = page.read();
        let fso = DataPageHeader::from_bytes(&data).free_space_offset as usize;

        let offset = uid.offset() as usize;
        if offset < DataPageHeader::SIZE || offset + OF_DATA > fso {
            return None;
        }

        let size = u16::from_le_bytes([data[offset + OF_SIZE], data[offset + OF_SIZE + 1]]) as usize;
        let len = OF_DATA + size;
        if offset + len > fso {
            return None;
        }
        Some((offset, len))
    }
}

impl CacheSource for ItemSource {
    type Item = Arc<DataItem>;

    fn load(&self, key: u64) -> Result<Arc<DataItem>> {
        let uid = Uid(key);
        if uid.page_id() <= PageId::CHECKPOINT {
            return Err(Error::NullEntry(uid));
        }

        let page = match self.pc.get_page(uid.page_id()) {
            Ok(page) => page,
            Err(Error::PageNotFound(_)) => return Err(Error::NullEntry(uid)),
            Err(e) => return Err(e),
        };

        match Self::locate(&page, uid) {
            Some((offset, len)) => Ok(Arc::new(DataItem::new(
                uid,
                page,
                offset,
                len,
                Arc::clone(&self.logger),
            ))),
            None => {
                self.pc.release(&page)?;
                Err(Error::NullEntry(uid))
            }
        }
    }

    fn evict(&self, _key: u64, item: Arc<DataItem>) -> Result<()> {
        self.pc.release(item.page())
    }
}

/// Record storage for one database.
///
/// # Files
/// - `<path>.db`: pages, through the [`PageCache`]
/// - `<path>.log`: the write-ahead log, through the [`Logger`]
///
/// # Thread Safety
/// All operations take `&self`. An inserter checks its page out of the
/// [`PageIndex`], so two inserts never target the same page at once.
/// Record-level exclusion lives in each [`DataItem`].
pub struct DataManager {
    items: ResourceCache<ItemSource>,
    page_index: PageIndex,
    /// The checkpoint page, held for the manager's lifetime.
    page_one: Arc<Page>,
    recovery: Option<RecoveryReport>,
}

impl DataManager {
    /// Create the page file and the log, with a fresh checkpoint page.
    pub fn create(path: &Path, memory: u64) -> Result<Self> {
        let pc = Arc::new(PageCache::create(path, memory)?);
        let logger = Arc::new(Logger::create(path)?);

        pc.new_page(&checkpoint::init_raw())?;
        let page_one = pc.get_page(PageId::CHECKPOINT)?;
        pc.flush_page(&page_one)?;

        info!(path = %path.display(), "data manager created");
        Ok(Self::assemble(pc, logger, page_one, None))
    }

    /// Open existing files, recovering first if the last shutdown was not
    /// clean.
    ///
    /// # Errors
    /// - `Error::BadLogFile` if the log fails verification
    /// - `Error::CorruptLogRecord` if recovery meets an undecodable record
    pub fn open(path: &Path, memory: u64, tm: &TransactionManager) -> Result<Self> {
        let pc = Arc::new(PageCache::open(path, memory)?);
        let logger = Arc::new(Logger::open(path)?);
        let page_one = pc.get_page(PageId::CHECKPOINT)?;

        let recovery = if checkpoint::check_stamp(&page_one) {
            None
        } else {
            Some(recover(tm, &logger, &pc)?)
        };

        let dm = Self::assemble(pc, logger, page_one, recovery);
        dm.fill_page_index()?;

        checkpoint::set_open_stamp(&dm.page_one);
        dm.pc().flush_page(&dm.page_one)?;

        info!(
            path = %path.display(),
            pages = dm.pc().page_count(),
            recovered = dm.recovery.is_some(),
            "data manager opened"
        );
        Ok(dm)
    }

    fn assemble(
        pc: Arc<PageCache>,
        logger: Arc<Logger>,
        page_one: Arc<Page>,
        recovery: Option<RecoveryReport>,
    ) -> Self {
        Self {
            items: ResourceCache::new(ItemSource { pc, logger }, 0),
            page_index: PageIndex::new(),
            page_one,
            recovery,
        }
    }

    fn pc(&self) -> &PageCache {
        &self.items.source().pc
    }

    fn logger(&self) -> &Logger {
        &self.items.source().logger
    }

    /// Register every data page with its current free space.
    fn fill_page_index(&self) -> Result<()> {
        let pc = self.pc();
        for pgno in 2..=pc.page_count() {
            let page = pc.get_page(PageId::new(pgno))?;
            self.page_index.add(page.page_id(), data_page::free_space(&page));
            pc.release(&page)?;
        }
        Ok(())
    }

    /// The live record at `uid`, or `None` if it is unknown or a tombstone.
    ///
    /// A returned item must be handed back with [`release`](Self::release).
    pub fn read(&self, uid: Uid) -> Result<Option<Arc<DataItem>>> {
        let item = match self.items.get(uid.0) {
            Ok(item) => item,
            Err(Error::NullEntry(_)) => return Ok(None),
            Err(e) => return Err(e),
        };

        if !item.is_valid() {
            self.release(&item)?;
            return Ok(None);
        }
        Ok(Some(item))
    }

    /// Drop one reference to a data item.
    pub fn release(&self, item: &DataItem) -> Result<()> {
        self.items.release(item.uid().0)
    }

    /// Store `data` as a new record written by `xid` and return its uid.
    ///
    /// # Errors
    /// - `Error::DataTooLarge` if the record cannot fit on one page
    /// - `Error::DatabaseBusy` if no page with room turned up
    pub fn insert(&self, xid: Xid, data: &[u8]) -> Result<Uid> {
        let raw = data_item::wrap_raw(data);
        if raw.len() > MAX_FREE_SPACE {
            return Err(Error::DataTooLarge {
                size: raw.len(),
                max: MAX_FREE_SPACE,
            });
        }

        let mut selected = None;
        for _ in 0..MAX_ALLOC_ATTEMPTS {
            if let Some(info) = self.page_index.select(raw.len()) {
                selected = Some(info);
                break;
            }
            let page_id = self.pc().new_page(&data_page::init_raw())?;
            self.page_index.add(page_id, MAX_FREE_SPACE);
        }
        let info = selected.ok_or(Error::DatabaseBusy)?;

        let page = match self.pc().get_page(info.page_id) {
            Ok(page) => page,
            Err(e) => {
                self.page_index.add(info.page_id, info.free_space);
                return Err(e);
            }
        };

        let offset = data_page::free_space_offset(&page);
        let logged = self
            .logger()
            .log(&insert_payload(xid, page.page_id(), offset, &raw));
        if logged.is_ok() {
            data_page::insert(&page, &raw);
        }

        self.page_index.add(page.page_id(), data_page::free_space(&page));
        self.pc().release(&page)?;
        logged?;

        let uid = Uid::new(page.page_id().0, offset);
        debug!(%xid, %uid, len = raw.len(), "record inserted");
        Ok(uid)
    }

    /// Uid of the catalog bootstrap record.
    pub fn bootstrap_uid(&self) -> Uid {
        checkpoint::bootstrap_uid(&self.page_one)
    }

    /// Record the uid of the catalog bootstrap record and flush page 1.
    pub fn set_bootstrap_uid(&self, uid: Uid) -> Result<()> {
        checkpoint::set_bootstrap_uid(&self.page_one, uid);
        self.pc().flush_page(&self.page_one)
    }

    /// What recovery did at open, if it ran.
    pub fn recovery_report(&self) -> Option<&RecoveryReport> {
        self.recovery.as_ref()
    }

    /// Number of pages in the page file.
    pub fn page_count(&self) -> u32 {
        self.pc().page_count()
    }

    /// Statistics of the data item cache.
    pub fn item_stats(&self) -> &CacheStats {
        self.items.stats()
    }

    /// Statistics of the page cache.
    pub fn page_stats(&self) -> &CacheStats {
        self.pc().stats()
    }

    /// Write everything back and mark the shutdown clean.
    pub fn close(&self) -> Result<()> {
        self.items.close()?;

        checkpoint::set_close_stamp(&self.page_one);
        self.pc().flush_page(&self.page_one)?;
        self.pc().release(&self.page_one)?;

        self.pc().close()?;
        self.logger().close()?;
        info!("data manager closed");
        Ok(())
    }
}
