//! Versioned records.
//!
//! An entry is the payload of a data item, prefixed with the xid that
//! created it and the xid that deleted it:
//!
//! ```text
//! ┌──────────┬──────────┬──────────────────┐
//! │ xmin (8) │ xmax (8) │ data             │
//! └──────────┴──────────┴──────────────────┘
//! ```
//! `xmax` is 0 while the version is not deleted.

use std::sync::Arc;

use crate::common::{Result, Uid, Xid};
use crate::storage::{DataItem, DataManager};

const OF_XMIN: usize = 0;
const OF_XMAX: usize = OF_XMIN + 8;
const OF_DATA: usize = OF_XMAX + 8;

/// Wrap `data` as a fresh version created by `xid`.
pub(crate) fn wrap_entry_raw(xid: Xid, data: &[u8]) -> Vec<u8> {
    let mut raw = Vec::with_capacity(OF_DATA + data.len());
    raw.extend_from_slice(&xid.0.to_le_bytes());
    raw.extend_from_slice(&0u64.to_le_bytes());
    raw.extend_from_slice(data);
    raw
}

fn read_xid(data: &[u8], at: usize) -> Xid {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    Xid(u64::from_le_bytes(buf))
}

/// One version of a record.
#[derive(Debug)]
pub struct Entry {
    item: Arc<DataItem>,
}

impl Entry {
    /// Load the entry at `uid`, or `None` if no live record is there.
    ///
    /// Records too short to hold the version header are not entries.
    pub fn load(dm: &DataManager, uid: Uid) -> Result<Option<Entry>> {
        match dm.read(uid)? {
            Some(item) if item.data_len() >= OF_DATA => Ok(Some(Entry { item })),
            Some(item) => {
                dm.release(&item)?;
                Ok(None)
            }
            None => Ok(None),
        }
    }

    pub fn uid(&self) -> Uid {
        self.item.uid()
    }

    pub(crate) fn item(&self) -> &DataItem {
        &self.item
    }

    /// Xid that created this version.
    pub fn xmin(&self) -> Xid {
        self.item.read_with(|d| read_xid(d, OF_XMIN))
    }

    /// Xid that deleted this version, or `Xid::SUPER` if none.
    pub fn xmax(&self) -> Xid {
        self.item.read_with(|d| read_xid(d, OF_XMAX))
    }

    /// Copy of the user data.
    pub fn data(&self) -> Vec<u8> {
        self.item.read_with(|d| d[OF_DATA..].to_vec())
    }

    /// Mark this version deleted by `xid`, logging the change.
    pub fn set_xmax(&self, xid: Xid) -> Result<()> {
        let mut writer = self.item.before();
        writer.write_data(OF_XMAX, &xid.0.to_le_bytes());
        writer.after(xid)
    }
}
