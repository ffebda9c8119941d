//! Download manager: queues declared files, fetches them (optionally in
//! parallel Range chunks), verifies integrity, and publishes into a
//! content store (spec.md §4.3).

mod config;
mod error;
mod fetcher;
mod manager;
mod plan;
mod task;

pub use config::DownloadConfig;
pub use error::{DownloadError, Result};
pub use fetcher::{Fetcher, GetResponse, ReqwestFetcher, SizeProbe};
pub use manager::{DownloadManager, IntegrityWarning};
pub use plan::{compute_chunk_plan, ChunkRange};
pub use task::{DownloadTask, ProgressSnapshot, TaskState};
