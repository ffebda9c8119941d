//! Download manager configuration (spec.md §3 "Chunk plan", §4.3).

use serde::{Deserialize, Serialize};
use signage_core::IntegrityPolicy;
use signage_transport::retry::RetryConfig;

const MIB: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DownloadConfig {
    /// Maximum concurrent file downloads (default 4).
    pub concurrency: usize,
    /// Files at or below this size use a single GET (default 100 MiB).
    pub chunk_threshold_bytes: u64,
    /// Fixed chunk size for files above the threshold (default 50 MiB).
    pub chunk_size_bytes: u64,
    /// Max parallel Range requests per large file (default 4).
    pub chunks_per_file: usize,
    /// Whether chunks publish to the store as they arrive.
    pub progressive: bool,
    pub integrity_policy: IntegrityPolicy,
    /// Backoff policy wrapping each HEAD/GET attempt (spec.md §4.1).
    pub retry: RetryConfig,
}

impl Default for DownloadConfig {
    fn default() -> Self {
        Self {
            concurrency: 4,
            chunk_threshold_bytes: 100 * MIB,
            chunk_size_bytes: 50 * MIB,
            chunks_per_file: 4,
            progressive: true,
            integrity_policy: IntegrityPolicy::Enforce,
            retry: RetryConfig::default(),
        }
    }
}
