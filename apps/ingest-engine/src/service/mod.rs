//! Read-side query services over the store.

mod data;

pub use data::{DataService, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
