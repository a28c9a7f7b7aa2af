//! The checkpoint page (page 1).
//!
//! Page 1 never holds records. It carries:
//! - the uid of the catalog bootstrap record at offset 0
//! - validation bytes used to detect an unclean shutdown
//!
//! ```text
//! Offset  Size  Field
//! ------  ----  -----
//! 0       8     bootstrap uid (little-endian)
//! 100     8     open stamp: random bytes written on every open
//! 108     8     close stamp: copy of the open stamp written on clean close
//! ```
//!
//! When the two stamps differ at open time the previous process died
//! without closing, and the log has to be replayed.

use rand::RngCore;

use crate::common::config::PAGE_SIZE;
use crate::common::Uid;

use super::Page;

const OFFSET_BOOTSTRAP: usize = 0;
const OFFSET_STAMP: usize = 100;
const STAMP_LEN: usize = 8;

/// Initial contents of the checkpoint page: a fresh open stamp.
pub fn init_raw() -> Vec<u8> {
    let mut raw = vec![0u8; PAGE_SIZE];
    fill_open_stamp(&mut raw);
    raw
}

/// Write a fresh random open stamp.
pub fn set_open_stamp(page: &Page) {
    page.set_dirty(true);
    fill_open_stamp(&mut page.write());
}

/// Copy the open stamp into the close stamp, marking a clean shutdown.
pub fn set_close_stamp(page: &Page) {
    page.set_dirty(true);
    let mut data = page.write();
    data.copy_within(
        OFFSET_STAMP..OFFSET_STAMP + STAMP_LEN,
        OFFSET_STAMP + STAMP_LEN,
    );
}

/// Whether the last shutdown was clean.
pub fn check_stamp(page: &Page) -> bool {
    let data = page.read();
    data[OFFSET_STAMP..OFFSET_STAMP + STAMP_LEN]
        == data[OFFSET_STAMP + STAMP_LEN..OFFSET_STAMP + 2 * STAMP_LEN]
}

/// Uid of the catalog bootstrap record.
pub fn bootstrap_uid(page: &Page) -> Uid {
    let data = page.read();
    let mut buf = [0u8; 8];
    buf.copy_from_slice(&data[OFFSET_BOOTSTRAP..OFFSET_BOOTSTRAP + 8]);
    Uid(u64::from_le_bytes(buf))
}

/// Record the uid of the catalog bootstrap record.
pub fn set_bootstrap_uid(page: &Page, uid: Uid) {
    page.set_dirty(true);
    page.write()[OFFSET_BOOTSTRAP..OFFSET_BOOTSTRAP + 8].copy_from_slice(&uid.0.to_le_bytes());
}

fn fill_open_stamp(data: &mut [u8]) {
    rand::thread_rng().fill_bytes(&mut data[OFFSET_STAMP..OFFSET_STAMP + STAMP_LEN]);
}
