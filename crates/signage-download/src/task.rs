//! A single download task (spec.md §3, "Download task").

use crate::error::DownloadError;
use crate::plan::{ChunkRange, compute_chunk_plan};
use signage_core::FileInfo;
use std::sync::atomic::{AtomicU64, AtomicU8, Ordering};
use std::sync::Arc;
use tokio::sync::watch;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskState {
    Pending,
    Running,
    Complete,
    Failed,
}

impl TaskState {
    fn from_u8(v: u8) -> Self {
        match v {
            0 => Self::Pending,
            1 => Self::Running,
            2 => Self::Complete,
            _ => Self::Failed,
        }
    }

    fn as_u8(self) -> u8 {
        match self {
            Self::Pending => 0,
            Self::Running => 1,
            Self::Complete => 2,
            Self::Failed => 3,
        }
    }
}

/// A snapshot of task progress for `getProgress` (spec.md §4.3).
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    pub url: String,
    pub downloaded: u64,
    pub total: Option<u64>,
    pub state: TaskState,
}

impl ProgressSnapshot {
    pub fn percent(&self) -> Option<f64> {
        self.total.map(|total| {
            if total == 0 {
                100.0
            } else {
                (self.downloaded as f64 / total as f64) * 100.0
            }
        })
    }
}

/// One unit of work: fetch a declared file and publish it to the store.
///
/// Invariant (spec.md §8): at most one running task exists per `(kind,
/// id)`; concurrent `enqueue` calls for the same key return this same
/// `Arc<DownloadTask>`, and all callers observe the same terminal
/// `outcome`.
#[derive(Debug)]
pub struct DownloadTask {
    pub file_info: FileInfo,
    pub chunk_plan: Vec<ChunkRange>,
    state: AtomicU8,
    bytes_downloaded: AtomicU64,
    total_size: AtomicU64,
    chunks_complete: AtomicU64,
    outcome_tx: watch::Sender<Option<Arc<Result<(), DownloadError>>>>,
}

impl DownloadTask {
    pub fn new(file_info: FileInfo, chunk_size: u64, chunk_threshold: u64) -> Self {
        let chunk_plan = if file_info.size > chunk_threshold {
            compute_chunk_plan(file_info.size, chunk_size)
        } else {
            Vec::new()
        };
        let (outcome_tx, _rx) = watch::channel(None);
        Self {
            total_size: AtomicU64::new(file_info.size),
            file_info,
            chunk_plan,
            state: AtomicU8::new(TaskState::Pending.as_u8()),
            bytes_downloaded: AtomicU64::new(0),
            chunks_complete: AtomicU64::new(0),
            outcome_tx,
        }
    }

    pub fn is_chunked(&self) -> bool {
        !self.chunk_plan.is_empty()
    }

    pub fn state(&self) -> TaskState {
        TaskState::from_u8(self.state.load(Ordering::Acquire))
    }

    pub fn set_state(&self, state: TaskState) {
        self.state.store(state.as_u8(), Ordering::Release);
    }

    /// Relaxed add to the running byte counter; `getProgress` may observe
    /// a stale value (spec.md §5).
    pub fn add_bytes(&self, n: u64) {
        self.bytes_downloaded.fetch_add(n, Ordering::Relaxed);
    }

    pub fn bytes_downloaded(&self) -> u64 {
        self.bytes_downloaded.load(Ordering::Relaxed)
    }

    pub fn set_total_size(&self, size: u64) {
        self.total_size.store(size, Ordering::Relaxed);
    }

    pub fn total_size(&self) -> u64 {
        self.total_size.load(Ordering::Relaxed)
    }

    pub fn inc_chunks_complete(&self) -> u64 {
        self.chunks_complete.fetch_add(1, Ordering::AcqRel) + 1
    }

    pub fn chunks_complete(&self) -> u64 {
        self.chunks_complete.load(Ordering::Relaxed)
    }

    pub fn progress(&self) -> ProgressSnapshot {
        ProgressSnapshot {
            url: self.file_info.download_url.clone(),
            downloaded: self.bytes_downloaded(),
            total: Some(self.total_size()),
            state: self.state(),
        }
    }

    /// Subscribes a waiter to this task's terminal outcome. Resolves once
    /// [`Self::complete`] or [`Self::fail`] is called.
    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Result<(), DownloadError>>>> {
        self.outcome_tx.subscribe()
    }

    pub async fn wait(&self) -> Result<(), DownloadError> {
        let mut rx = self.subscribe();
        loop {
            if let Some(outcome) = rx.borrow().as_ref() {
                return (**outcome).clone();
            }
            if rx.changed().await.is_err() {
                return Err(DownloadError::Cancelled);
            }
        }
    }

    pub fn complete(&self) {
        self.set_state(TaskState::Complete);
        let _ = self.outcome_tx.send(Some(Arc::new(Ok(()))));
    }

    pub fn fail(&self, err: DownloadError) {
        self.set_state(TaskState::Failed);
        let _ = self.outcome_tx.send(Some(Arc::new(Err(err))));
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use signage_core::ContentKey;

    fn info(size: u64) -> FileInfo {
        FileInfo {
            key: ContentKey::media(1),
            size,
            md5: None,
            content_type: "application/octet-stream".into(),
            download_url: "https://cdn.example/media/1".into(),
        }
    }

    #[test]
    fn small_file_has_no_chunk_plan() {
        let task = DownloadTask::new(info(10), 50, 100);
        assert!(!task.is_chunked());
    }

    #[test]
    fn large_file_gets_chunk_plan() {
        let task = DownloadTask::new(info(500), 50, 100);
        assert!(task.is_chunked());
        assert_eq!(task.chunk_plan.len(), 10);
    }

    #[tokio::test]
    async fn waiters_observe_success() {
        let task = Arc::new(DownloadTask::new(info(10), 50, 100));
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.wait().await })
        };
        task.complete();
        assert!(waiter.await.unwrap().is_ok());
    }

    #[tokio::test]
    async fn waiters_observe_failure() {
        let task = Arc::new(DownloadTask::new(info(10), 50, 100));
        let waiter = {
            let task = task.clone();
            tokio::spawn(async move { task.wait().await })
        };
        task.fail(DownloadError::HttpStatus(500));
        let result = waiter.await.unwrap();
        assert!(matches!(result, Err(DownloadError::HttpStatus(500))));
    }

    #[test]
    fn progress_percent_handles_zero_total() {
        let task = DownloadTask::new(info(0), 50, 100);
        let snap = task.progress();
        assert_eq!(snap.percent(), Some(100.0));
    }
}
