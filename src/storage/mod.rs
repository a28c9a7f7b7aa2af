//! Storage layer - pages, records and free space.
//!
//! This module handles persistent storage:
//! - [`page`] - Page types and layouts
//! - [`PageCache`] - Reference-counted page residency over the page file
//! - [`PageIndex`] - Free-space directory for inserts
//! - [`DataItem`] / [`DataManager`] - Records and the mutation protocol

mod data_item;
mod data_manager;
pub mod page;
mod page_cache;
mod page_file;
mod page_index;

pub use data_item::{DataItem, DataItemWriter};
pub use data_manager::DataManager;
pub use page_cache::PageCache;
pub use page_index::{PageIndex, PageInfo};
