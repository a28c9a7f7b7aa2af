//! Record address type.

use std::fmt;

use super::PageId;

/// Address of a record: page number in the high 32 bits, in-page byte
/// offset in the low 16 bits.
///
/// This is the only handle passed between layers. The version layer, the
/// data layer and the WAL all speak in uids.
///
/// # Example
/// ```
/// use txstore::{PageId, Uid};
///
/// let uid = Uid::new(3, 130);
/// assert_eq!(uid.page_id(), PageId::new(3));
/// assert_eq!(uid.offset(), 130);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Uid(pub u64);

impl Uid {
    /// Pack a page number and offset.
    #[inline]
    pub fn new(pgno: u32, offset: u16) -> Self {
        Uid(((pgno as u64) << 32) | offset as u64)
    }

    /// Page the record lives on.
    #[inline]
    pub fn page_id(&self) -> PageId {
        PageId((self.0 >> 32) as u32)
    }

    /// Byte offset of the record within its page.
    #[inline]
    pub fn offset(&self) -> u16 {
        (self.0 & 0xFFFF) as u16
    }
}

impl fmt::Display for Uid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Uid({}:{})", self.page_id().0, self.offset())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn test_uid_layout() {
        let uid = Uid::new(2, 7);
        assert_eq!(uid.0, (2u64 << 32) | 7);
    }

    #[test]
    fn test_uid_display() {
        assert_eq!(format!("{}", Uid::new(5, 42)), "Uid(5:42)");
    }

    proptest! {
        #[test]
        fn test_uid_unpacks(pgno in any::<u32>(), offset in any::<u16>()) {
            let uid = Uid::new(pgno, offset);
            prop_assert_eq!(uid.page_id(), PageId::new(pgno));
            prop_assert_eq!(uid.offset(), offset);
        }
    }
}
