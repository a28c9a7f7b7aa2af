//! Crash recovery.
//!
//! Runs at open time when the checkpoint page shows the last shutdown was
//! not clean. Every record in the log is redone in log order:
//!
//! 1. Scan the log for the highest page it references and truncate the
//!    page file there. Pages past it were allocated but never written to.
//! 2. Replay each insert with [`data_page::recover_insert`] and each update
//!    with [`data_page::recover_update`] using the post-image.
//! 3. Write back every touched page and sync the page file.
//! 4. Abort every transaction the ledger still lists as active.
//!
//! Records of aborted transactions are redone too. Their versions carry an
//! xmin or xmax that is not committed, so visibility already hides them.
//! Both replay operations are idempotent, so a crash during recovery is
//! handled by running it again.

use tracing::{info, warn};

use crate::common::{PageId, Result};
use crate::concurrency::TransactionManager;
use crate::recovery::{LogRecord, Logger};
use crate::storage::page::{data_page, Page};
use crate::storage::PageCache;

/// What a recovery pass did.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RecoveryReport {
    /// Insert records replayed.
    pub inserts: usize,
    /// Update records replayed.
    pub updates: usize,
    /// Page count the page file was truncated to.
    pub max_page: u32,
    /// Transactions found active and aborted.
    pub aborted: usize,
}

/// Replay the whole log onto the page file.
pub(crate) fn recover(tm: &TransactionManager, logger: &Logger, pc: &PageCache) -> Result<RecoveryReport> {
    warn!("unclean shutdown detected, recovering");

    let mut report = RecoveryReport {
        max_page: PageId::CHECKPOINT.0,
        ..Default::default()
    };

    logger.rewind();
    while let Some(data) = logger.next()? {
        let record = LogRecord::decode(&data)?;
        report.max_page = report.max_page.max(record.page_id().0);
    }
    pc.truncate(report.max_page)?;

    logger.rewind();
    while let Some(data) = logger.next()? {
        match LogRecord::decode(&data)? {
            LogRecord::Insert {
                page_id,
                offset,
                raw,
                ..
            } => {
                redo(pc, page_id, |page| data_page::recover_insert(page, &raw, offset))?;
                report.inserts += 1;
            }
            LogRecord::Update { uid, new_raw, .. } => {
                redo(pc, uid.page_id(), |page| {
                    data_page::recover_update(page, &new_raw, uid.offset())
                })?;
                report.updates += 1;
            }
        }
    }
    pc.sync()?;

    report.aborted = tm.abort_orphans()?.len();

    info!(
        inserts = report.inserts,
        updates = report.updates,
        max_page = report.max_page,
        aborted = report.aborted,
        "recovery finished"
    );
    Ok(report)
}

fn redo(
    pc: &PageCache,
    page_id: PageId,
    apply: impl FnOnce(&Page) -> Result<()>,
) -> Result<()> {
    let page = pc.get_page(page_id)?;
    let result = apply(&page);
    pc.release(&page)?;
    result
}
