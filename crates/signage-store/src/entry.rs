//! On-disk metadata sidecar for a content store entry.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Metadata persisted alongside an entry's bytes.
///
/// For a plain (non-progressive) entry, `chunk_size`/`total_chunks` are
/// `None` and `complete` flips to `true` the instant `put` renames the blob
/// into place. For a progressive entry, `complete` becomes `true` once
/// every index in `0..total_chunks` is present in `committed_chunks`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntryMeta {
    pub size: u64,
    pub content_type: String,
    pub mtime_unix: i64,
    pub chunk_size: Option<u64>,
    pub total_chunks: Option<u64>,
    #[serde(default)]
    pub committed_chunks: BTreeSet<u64>,
    pub complete: bool,
    /// CMS-declared MD5, when known, so a later manifest diff can redrive a
    /// download whose declared checksum changed without its size changing.
    #[serde(default)]
    pub md5: Option<String>,
}

impl EntryMeta {
    pub fn whole(size: u64, content_type: String, mtime_unix: i64, md5: Option<String>) -> Self {
        Self {
            size,
            content_type,
            mtime_unix,
            chunk_size: None,
            total_chunks: None,
            committed_chunks: BTreeSet::new(),
            complete: true,
            md5,
        }
    }

    pub fn progressive(
        size: u64,
        chunk_size: u64,
        content_type: String,
        mtime_unix: i64,
        md5: Option<String>,
    ) -> Self {
        let total_chunks = size.div_ceil(chunk_size).max(1);
        Self {
            size,
            content_type,
            mtime_unix,
            chunk_size: Some(chunk_size),
            total_chunks: Some(total_chunks),
            committed_chunks: BTreeSet::new(),
            complete: false,
            md5,
        }
    }

    pub fn is_progressive(&self) -> bool {
        self.chunk_size.is_some()
    }

    /// Byte range `[start, end]` (inclusive) covered by a chunk index.
    pub fn chunk_range(&self, index: u64) -> Option<(u64, u64)> {
        let chunk_size = self.chunk_size?;
        let start = index.checked_mul(chunk_size)?;
        if start >= self.size {
            return None;
        }
        let end = (start + chunk_size - 1).min(self.size - 1);
        Some((start, end))
    }

    /// Every chunk index whose range overlaps `[start, end]`.
    pub fn chunks_covering(&self, start: u64, end: u64) -> Vec<u64> {
        let Some(chunk_size) = self.chunk_size else {
            return Vec::new();
        };
        let first = start / chunk_size;
        let last = end / chunk_size;
        (first..=last).collect()
    }

    pub fn mark_committed(&mut self, index: u64) {
        self.committed_chunks.insert(index);
        if let Some(total) = self.total_chunks
            && self.committed_chunks.len() as u64 == total
        {
            self.complete = true;
        }
    }

    pub fn range_is_fully_committed(&self, start: u64, end: u64) -> bool {
        if !self.is_progressive() {
            return self.complete;
        }
        self.chunks_covering(start, end)
            .iter()
            .all(|idx| self.committed_chunks.contains(idx))
    }
}
