//! Write-ahead logging and crash recovery.
//!
//! This module contains:
//! - [`Logger`] - The checksummed append-only log file
//! - [`LogRecord`] - Insert and update record payloads
//! - `recover` - Redo of the log after an unclean shutdown

mod log_record;
mod logger;
mod recover;

pub(crate) use log_record::{insert_payload, update_payload};
pub use log_record::LogRecord;
pub use logger::Logger;
pub(crate) use recover::recover;
pub use recover::RecoveryReport;
