//! Payloads of write-ahead log records.
//!
//! ```text
//! Insert: [type=0:1][xid:8][pgno:4][offset:2][raw]
//! Update: [type=1:1][xid:8][uid:8][old raw][new raw]
//! ```
//!
//! `raw` is a whole data item (valid flag, size, payload). The two images of
//! an update always have the same length.

use crate::common::{Error, PageId, Result, Uid, Xid};

const TYPE_INSERT: u8 = 0;
const TYPE_UPDATE: u8 = 1;

const OFFSET_TYPE: usize = 0;
const OFFSET_XID: usize = OFFSET_TYPE + 1;

const INSERT_OFFSET_PGNO: usize = OFFSET_XID + 8;
const INSERT_OFFSET_OFFSET: usize = INSERT_OFFSET_PGNO + 4;
const INSERT_OFFSET_RAW: usize = INSERT_OFFSET_OFFSET + 2;

const UPDATE_OFFSET_UID: usize = OFFSET_XID + 8;
const UPDATE_OFFSET_RAW: usize = UPDATE_OFFSET_UID + 8;

/// A decoded log record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogRecord {
    /// `raw` was placed at `offset` on page `page_id`.
    Insert {
        xid: Xid,
        page_id: PageId,
        offset: u16,
        raw: Vec<u8>,
    },
    /// The item at `uid` changed from `old_raw` to `new_raw`.
    Update {
        xid: Xid,
        uid: Uid,
        old_raw: Vec<u8>,
        new_raw: Vec<u8>,
    },
}

impl LogRecord {
    /// Transaction that wrote the record.
    pub fn xid(&self) -> Xid {
        match self {
            LogRecord::Insert { xid, .. } | LogRecord::Update { xid, .. } => *xid,
        }
    }

    /// Page the record touches.
    pub fn page_id(&self) -> PageId {
        match self {
            LogRecord::Insert { page_id, .. } => *page_id,
            LogRecord::Update { uid, .. } => uid.page_id(),
        }
    }

    pub fn encode(&self) -> Vec<u8> {
        match self {
            LogRecord::Insert {
                xid,
                page_id,
                offset,
                raw,
            } => insert_payload(*xid, *page_id, *offset, raw),
            LogRecord::Update {
                xid,
                uid,
                old_raw,
                new_raw,
            } => update_payload(*xid, *uid, old_raw, new_raw),
        }
    }

    /// Decode a payload read back from the log.
    ///
    /// # Errors
    /// `Error::CorruptLogRecord` on an unknown type, a short payload or
    /// update images that cannot be split evenly.
    pub fn decode(data: &[u8]) -> Result<Self> {
        let kind = *data
            .get(OFFSET_TYPE)
            .ok_or_else(|| Error::corrupt_record("empty record"))?;

        match kind {
            TYPE_INSERT => {
                if data.len() < INSERT_OFFSET_RAW {
                    return Err(Error::corrupt_record(format!(
                        "insert record of {} bytes",
                        data.len()
                    )));
                }
                Ok(LogRecord::Insert {
                    xid: Xid(read_u64(data, OFFSET_XID)),
                    page_id: PageId(read_u32(data, INSERT_OFFSET_PGNO)),
                    offset: u16::from_le_bytes([
                        data[INSERT_OFFSET_OFFSET],
                        data[INSERT_OFFSET_OFFSET + 1],
                    ]),
                    raw: data[INSERT_OFFSET_RAW..].to_vec(),
                })
            }
            TYPE_UPDATE => {
                if data.len() < UPDATE_OFFSET_RAW || (data.len() - UPDATE_OFFSET_RAW) % 2 != 0 {
                    return Err(Error::corrupt_record(format!(
                        "update record of {} bytes",
                        data.len()
                    )));
                }
                let half = (data.len() - UPDATE_OFFSET_RAW) / 2;
                let images = &data[UPDATE_OFFSET_RAW..];
                Ok(LogRecord::Update {
                    xid: Xid(read_u64(data, OFFSET_XID)),
                    uid: Uid(read_u64(data, UPDATE_OFFSET_UID)),
                    old_raw: images[..half].to_vec(),
                    new_raw: images[half..].to_vec(),
                })
            }
            other => Err(Error::corrupt_record(format!("unknown record type {}", other))),
        }
    }
}

/// Encode an insert record without building a [`LogRecord`].
pub(crate) fn insert_payload(xid: Xid, page_id: PageId, offset: u16, raw: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(INSERT_OFFSET_RAW + raw.len());
    buf.push(TYPE_INSERT);
    buf.extend_from_slice(&xid.0.to_le_bytes());
    buf.extend_from_slice(&page_id.0.to_le_bytes());
    buf.extend_from_slice(&offset.to_le_bytes());
    buf.extend_from_slice(raw);
    buf
}

/// Encode an update record without building a [`LogRecord`].
pub(crate) fn update_payload(xid: Xid, uid: Uid, old_raw: &[u8], new_raw: &[u8]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(UPDATE_OFFSET_RAW + old_raw.len() + new_raw.len());
    buf.push(TYPE_UPDATE);
    buf.extend_from_slice(&xid.0.to_le_bytes());
    buf.extend_from_slice(&uid.0.to_le_bytes());
    buf.extend_from_slice(old_raw);
    buf.extend_from_slice(new_raw);
    buf
}

fn read_u64(data: &[u8], at: usize) -> u64 {
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[at..at + 8]);
    u64::from_le_bytes(buf)
}

fn read_u32(data: &[u8], at: usize) -> u32 {
    let mut buf = [0u8; 4];
    buf.copy_from_slice(&data[at..at + 4]);
    u32::from_le_bytes(buf)
}
