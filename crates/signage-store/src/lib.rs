//! Content-addressed (kind, id) byte store (spec.md §4.4).
//!
//! Guarantees atomic publish, byte-range reads suitable for serving HTTP
//! 206 responses, and a listing API; eviction is driven entirely by
//! external callers through [`analyzer::StorageAnalyzer`].

pub mod analyzer;
pub mod entry;
pub mod error;
pub mod store;

pub use analyzer::{LruAnalyzer, StorageAnalyzer};
pub use entry::EntryMeta;
pub use error::{Result, StoreError};
pub use store::{Existence, FsStore, ListedEntry};
