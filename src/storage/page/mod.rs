//! Page types and layout.
//!
//! This module contains:
//! - [`Page`] - A resident 8KB page shared through the page cache
//! - [`data_page`] - FSO header and record packing for normal pages
//! - [`checkpoint`] - Shutdown stamps and bootstrap pointer on page 1

pub mod checkpoint;
pub mod data_page;
#[allow(clippy::module_inception)]
mod page;

pub use data_page::{DataPageHeader, MAX_FREE_SPACE};
pub use page::Page;
