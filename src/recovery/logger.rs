//! Write-ahead log file.
//!
//! # File Layout
//! ```text
//! ┌──────────────┬──────────────────────────┬──────────────────────────┬─────┐
//! │ checksum (4) │ size (4) │ crc (4) │ data │ size (4) │ crc (4) │ data │ ... │
//! └──────────────┴──────────────────────────┴──────────────────────────┴─────┘
//! ```
//!
//! The header holds the running checksum of every record (size, per-record
//! checksum and data folded together). Each record carries its own checksum
//! over `data`. Integers are little-endian.

use std::fs::File;
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use parking_lot::Mutex;
use tracing::{debug, warn};

use crate::common::config::LOG_SUFFIX;
use crate::common::fs::{create_file, open_file, with_suffix};
use crate::common::{Error, Result};

/// Multiplier of the rolling checksum.
const SEED: u32 = 13331;

const HEADER_SIZE: u64 = 4;
const OFFSET_SIZE: usize = 0;
const OFFSET_CHECKSUM: usize = 4;
const OFFSET_DATA: usize = 8;

/// Fold `bytes` into `acc`.
pub(crate) fn checksum(acc: u32, bytes: &[u8]) -> u32 {
    bytes
        .iter()
        .fold(acc, |acc, &b| acc.wrapping_mul(SEED).wrapping_add(b as i8 as u32))
}

/// Wrap `data` as a full record: size, checksum, data.
fn wrap(data: &[u8]) -> Vec<u8> {
    let mut record = Vec::with_capacity(OFFSET_DATA + data.len());
    record.extend_from_slice(&(data.len() as u32).to_le_bytes());
    record.extend_from_slice(&checksum(0, data).to_le_bytes());
    record.extend_from_slice(data);
    record
}

struct LogState {
    file: File,
    /// Read cursor for `next`.
    position: u64,
    /// Length of the valid part of the file.
    file_size: u64,
    /// Aggregate checksum, mirrored in the header.
    checksum: u32,
}

impl LogState {
    /// Read the full record at the cursor and advance past it.
    ///
    /// Returns `None` at the end of the valid data: a short header, a size
    /// running past the file, or a checksum mismatch.
    fn next_record(&mut self) -> Result<Option<Vec<u8>>> {
        if self.position + OFFSET_DATA as u64 > self.file_size {
            return Ok(None);
        }

        let mut head = [0u8; OFFSET_DATA];
        self.file.seek(SeekFrom::Start(self.position))?;
        self.file.read_exact(&mut head)?;

        let size = u32::from_le_bytes([
            head[OFFSET_SIZE],
            head[OFFSET_SIZE + 1],
            head[OFFSET_SIZE + 2],
            head[OFFSET_SIZE + 3],
        ]) as u64;
        if self.position + OFFSET_DATA as u64 + size > self.file_size {
            return Ok(None);
        }

        let mut record = vec![0u8; OFFSET_DATA + size as usize];
        record[..OFFSET_DATA].copy_from_slice(&head);
        self.file.read_exact(&mut record[OFFSET_DATA..])?;

        let stored = u32::from_le_bytes([
            head[OFFSET_CHECKSUM],
            head[OFFSET_CHECKSUM + 1],
            head[OFFSET_CHECKSUM + 2],
            head[OFFSET_CHECKSUM + 3],
        ]);
        if checksum(0, &record[OFFSET_DATA..]) != stored {
            return Ok(None);
        }

        self.position += record.len() as u64;
        Ok(Some(record))
    }

    /// Verify the aggregate checksum and cut off a torn tail.
    fn check_and_remove_tail(&mut self) -> Result<()> {
        self.position = HEADER_SIZE;

        let mut acc = 0;
        let mut records = 0usize;
        while let Some(record) = self.next_record()? {
            acc = checksum(acc, &record);
            records += 1;
        }

        if acc != self.checksum {
            return Err(Error::bad_log(format!(
                "header checksum {:#010x} does not match records {:#010x}",
                self.checksum, acc
            )));
        }

        if self.position < self.file_size {
            warn!(
                valid_len = self.position,
                file_len = self.file_size,
                "truncating torn log tail"
            );
            self.file.set_len(self.position)?;
            self.file.sync_all()?;
            self.file_size = self.position;
        }

        debug!(records, "log verified");
        self.position = HEADER_SIZE;
        Ok(())
    }
}

/// The write-ahead log, `<path>.log`.
///
/// `log` appends at the end of the file; `rewind`/`next` walk the records
/// from the start. One mutex covers both, so a reader never sees a record
/// that is half written.
pub struct Logger {
    state: Mutex<LogState>,
}

impl Logger {
    /// Create an empty log.
    ///
    /// # Errors
    /// `Error::FileExists` if the log file is already there.
    pub fn create(path: &Path) -> Result<Self> {
        let mut file = create_file(&with_suffix(path, LOG_SUFFIX))?;
        file.write_all(&0u32.to_le_bytes())?;
        file.sync_all()?;

        Ok(Self {
            state: Mutex::new(LogState {
                file,
                position: HEADER_SIZE,
                file_size: HEADER_SIZE,
                checksum: 0,
            }),
        })
    }

    /// Open an existing log, verify it and truncate a torn tail.
    ///
    /// # Errors
    /// - `Error::FileNotExists` if the log file is missing
    /// - `Error::BadLogFile` if the file is shorter than its header or the
    ///   header checksum does not match the valid records
    pub fn open(path: &Path) -> Result<Self> {
        let mut file = open_file(&with_suffix(path, LOG_SUFFIX))?;

        let file_size = file.metadata()?.len();
        if file_size < HEADER_SIZE {
            return Err(Error::bad_log(format!("{} bytes, shorter than header", file_size)));
        }

        let mut header = [0u8; HEADER_SIZE as usize];
        file.seek(SeekFrom::Start(0))?;
        file.read_exact(&mut header)?;

        let mut state = LogState {
            file,
            position: HEADER_SIZE,
            file_size,
            checksum: u32::from_le_bytes(header),
        };
        state.check_and_remove_tail()?;

        Ok(Self {
            state: Mutex::new(state),
        })
    }

    /// Append `data` as one record and make it durable.
    ///
    /// The record is recoverable once this returns.
    pub fn log(&self, data: &[u8]) -> Result<()> {
        let record = wrap(data);
        let mut state = self.state.lock();

        let end = state.file_size;
        state.file.seek(SeekFrom::Start(end))?;
        state.file.write_all(&record)?;

        let acc = checksum(state.checksum, &record);
        state.file.seek(SeekFrom::Start(0))?;
        state.file.write_all(&acc.to_le_bytes())?;
        state.file.sync_all()?;

        state.checksum = acc;
        state.file_size = end + record.len() as u64;
        Ok(())
    }

    /// Move the read cursor back to the first record.
    pub fn rewind(&self) {
        self.state.lock().position = HEADER_SIZE;
    }

    /// Data of the next record, or `None` past the last one.
    pub fn next(&self) -> Result<Option<Vec<u8>>> {
        let mut state = self.state.lock();
        Ok(state
            .next_record()?
            .map(|mut record| record.split_off(OFFSET_DATA)))
    }

    /// Length of the log file in bytes.
    pub fn file_size(&self) -> u64 {
        self.state.lock().file_size
    }

    /// Flush the log file.
    pub fn close(&self) -> Result<()> {
        self.state.lock().file.sync_all()?;
        Ok(())
    }
}
