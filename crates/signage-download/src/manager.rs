//! Download manager (spec.md §4.3).
//!
//! A flat FIFO queue plus an active-task map, both guarded by a single
//! mutex so queue mutation stays confined to one critical section at a
//! time (spec.md §5: "confine the download manager's queue mutation... to
//! a single actor"). Per-file work — HEAD probe, single GET, or chunked
//! Range GETs — runs as a plain tokio task once a slot opens.

use crate::error::DownloadError;
use crate::fetcher::Fetcher;
use crate::task::{DownloadTask, ProgressSnapshot, TaskState};
use crate::DownloadConfig;
use signage_core::{ContentKey, FileInfo, IntegrityPolicy};
use signage_store::FsStore;
use signage_transport::retry::retry_async;
use std::collections::VecDeque;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

/// A recorded MD5 mismatch under [`IntegrityPolicy::WarnOnly`]
/// (spec.md §7, §8 scenario 6).
#[derive(Debug, Clone)]
pub struct IntegrityWarning {
    pub key: ContentKey,
    pub declared: String,
    pub actual: String,
}

struct QueueState {
    queue: VecDeque<ContentKey>,
    tasks: std::collections::HashMap<ContentKey, Arc<DownloadTask>>,
}

pub struct DownloadManager {
    fetcher: Arc<dyn Fetcher>,
    store: Arc<FsStore>,
    config: DownloadConfig,
    state: Mutex<QueueState>,
    active_count: AtomicUsize,
    warnings: Mutex<Vec<IntegrityWarning>>,
}

impl DownloadManager {
    pub fn new(fetcher: Arc<dyn Fetcher>, store: Arc<FsStore>, config: DownloadConfig) -> Arc<Self> {
        Arc::new(Self {
            fetcher,
            store,
            config,
            state: Mutex::new(QueueState {
                queue: VecDeque::new(),
                tasks: std::collections::HashMap::new(),
            }),
            active_count: AtomicUsize::new(0),
            warnings: Mutex::new(Vec::new()),
        })
    }

    /// `enqueue(fileInfo) -> task`. Idempotent for a given `(kind, id)`
    /// while a task is pending or running (spec.md §8, "Download
    /// idempotence").
    #[instrument(skip(self_arc, file_info), fields(key = %file_info.key))]
    pub async fn enqueue(self_arc: &Arc<Self>, file_info: FileInfo) -> Arc<DownloadTask> {
        let key = file_info.key;
        let mut state = self_arc.state.lock().await;
        if let Some(existing) = state.tasks.get(&key)
            && matches!(existing.state(), TaskState::Pending | TaskState::Running)
        {
            debug!(%key, "enqueue collapsed onto existing task");
            return existing.clone();
        }

        let task = Arc::new(DownloadTask::new(
            file_info,
            self_arc.config.chunk_size_bytes,
            self_arc.config.chunk_threshold_bytes,
        ));
        state.tasks.insert(key, task.clone());
        state.queue.push_back(key);
        drop(state);

        Self::process_queue(self_arc.clone());
        task
    }

    /// `prioritize(kind, id) -> bool`. Moves a queued task to the front;
    /// returns whether the task was found anywhere.
    pub async fn prioritize(&self, key: ContentKey) -> bool {
        let mut state = self.state.lock().await;
        if let Some(pos) = state.queue.iter().position(|k| *k == key) {
            if pos != 0 {
                let k = state.queue.remove(pos).expect("position just found");
                state.queue.push_front(k);
            }
            return true;
        }
        state.tasks.contains_key(&key)
    }

    pub async fn get_task(&self, key: ContentKey) -> Option<Arc<DownloadTask>> {
        self.state.lock().await.tasks.get(&key).cloned()
    }

    /// `getProgress()` — snapshot of active and pending tasks keyed by URL.
    pub async fn get_progress(&self) -> std::collections::HashMap<String, ProgressSnapshot> {
        let state = self.state.lock().await;
        state
            .tasks
            .values()
            .filter(|t| matches!(t.state(), TaskState::Pending | TaskState::Running))
            .map(|t| (t.file_info.download_url.clone(), t.progress()))
            .collect()
    }

    /// Drains recorded [`IntegrityWarning`]s, e.g. for inclusion in the
    /// next fault report.
    pub async fn drain_integrity_warnings(&self) -> Vec<IntegrityWarning> {
        std::mem::take(&mut *self.warnings.lock().await)
    }

    /// `clear()` — drops the queue and active references, failing every
    /// waiter with [`DownloadError::Cancelled`] (spec.md §4.3, §5).
    #[instrument(skip(self))]
    pub async fn clear(&self) {
        let mut state = self.state.lock().await;
        state.queue.clear();
        for task in state.tasks.values() {
            if matches!(task.state(), TaskState::Pending | TaskState::Running) {
                task.fail(DownloadError::Cancelled);
            }
        }
        state.tasks.clear();
        info!("download manager cleared");
    }

    /// Re-entrant, idempotent: promotes queued tasks to active until the
    /// concurrency budget or the queue is exhausted. Safe to call from
    /// multiple places at once (spec.md §4.3: "processQueue is safe to
    /// invoke concurrently; it is a no-op past the budget").
    fn process_queue(self_arc: Arc<Self>) {
        tokio::spawn(async move {
            loop {
                let next = {
                    let mut state = self_arc.state.lock().await;
                    if self_arc.active_count.load(Ordering::Acquire) >= self_arc.config.concurrency {
                        None
                    } else {
                        state.queue.pop_front().and_then(|key| state.tasks.get(&key).cloned())
                    }
                };
                let Some(task) = next else { break };
                self_arc.active_count.fetch_add(1, Ordering::AcqRel);
                let manager = self_arc.clone();
                tokio::spawn(async move {
                    manager.run_task(task).await;
                    manager.active_count.fetch_sub(1, Ordering::AcqRel);
                    Self::process_queue(manager.clone());
                });
            }
        });
    }

    #[instrument(skip(self, task), fields(key = %task.file_info.key))]
    async fn run_task(&self, task: Arc<DownloadTask>) {
        task.set_state(TaskState::Running);
        let result = if task.is_chunked() {
            self.run_chunked(&task).await
        } else {
            self.run_single(&task).await
        };
        match result {
            Ok(()) => task.complete(),
            Err(e) => {
                warn!(key = %task.file_info.key, error = %e, "download task failed");
                task.fail(e);
            }
        }
    }

    async fn run_single(&self, task: &DownloadTask) -> crate::error::Result<()> {
        let key = task.file_info.key;
        let url = task.file_info.download_url.clone();
        if let Ok(probe) = retry_async(&self.config.retry, "head", DownloadError::should_retry, || {
            self.fetcher.head(&url)
        })
        .await
            && let Some(size) = probe.size
        {
            task.set_total_size(size);
        }

        let url = task.file_info.download_url.clone();
        let response = retry_async(&self.config.retry, "get", DownloadError::should_retry, || {
            self.fetcher.get(&url, None)
        })
        .await?;
        task.add_bytes(response.body.len() as u64);

        let content_type = task.file_info.content_type.clone();
        match self
            .verify_and_decide(key, &response.body, task.file_info.md5.as_deref())
            .await?
        {
            Verified::Store => {
                self.store
                    .put(key, &response.body, &content_type, task.file_info.md5.as_deref())
                    .await?;
            }
            Verified::Reject => {
                return Err(self.integrity_error(task.file_info.md5.as_deref(), &response.body));
            }
        }
        Ok(())
    }

    async fn run_chunked(&self, task: &DownloadTask) -> crate::error::Result<()> {
        let key = task.file_info.key;
        let content_type = task.file_info.content_type.clone();

        if self.config.progressive {
            self.store
                .begin_progressive(
                    key,
                    task.file_info.size,
                    self.config.chunk_size_bytes,
                    &content_type,
                    task.file_info.md5.as_deref(),
                )
                .await?;
        }

        let next_index = Arc::new(std::sync::atomic::AtomicU64::new(0));
        let buffered: Arc<Mutex<std::collections::BTreeMap<u64, bytes::Bytes>>> =
            Arc::new(Mutex::new(std::collections::BTreeMap::new()));
        let total_chunks = task.chunk_plan.len() as u64;

        let workers = (0..self.config.chunks_per_file.min(task.chunk_plan.len().max(1))).map(|_| {
            let next_index = next_index.clone();
            let buffered = buffered.clone();
            let plan = task.chunk_plan.clone();
            let url = task.file_info.download_url.clone();
            let fetcher = self.fetcher.clone();
            let store = self.store.clone();
            let progressive = self.config.progressive;
            let retry_config = self.config.retry;
            async move {
                loop {
                    let idx = next_index.fetch_add(1, Ordering::AcqRel);
                    if idx >= total_chunks {
                        return Ok::<(), DownloadError>(());
                    }
                    let range = plan[idx as usize];
                    let response =
                        retry_async(&retry_config, "get_range", DownloadError::should_retry, || {
                            fetcher.get(&url, Some((range.start, range.end)))
                        })
                        .await?;
                    if !response.is_acceptable_range_response() {
                        return Err(DownloadError::HttpStatus(response.status));
                    }
                    if progressive {
                        store.put_chunk(key, range.index, &response.body).await?;
                    } else {
                        buffered.lock().await.insert(range.index, response.body.clone());
                    }
                    Ok(())
                }
            }
        });

        // Run the worker lanes concurrently; a failure in any lane fails
        // the whole task (spec.md §4.3, "Failure semantics").
        let results = futures::future::join_all(workers).await;
        let mut byte_total = 0u64;
        for result in &results {
            result.clone()?;
        }
        // Track bytes/ chunk counters after confirming no lane failed.
        if self.config.progressive {
            for range in &task.chunk_plan {
                byte_total += range.len();
            }
        } else {
            let map = buffered.lock().await;
            for bytes in map.values() {
                byte_total += bytes.len() as u64;
            }
        }
        task.add_bytes(byte_total);
        for _ in 0..total_chunks {
            task.inc_chunks_complete();
        }

        if self.config.progressive {
            match self
                .verify_progressive(key, task.file_info.md5.as_deref())
                .await?
            {
                Verified::Store => {}
                Verified::Reject => {
                    self.store.remove(key).await?;
                    return Err(self.integrity_error(task.file_info.md5.as_deref(), &[]));
                }
            }
        } else {
            let map = buffered.lock().await;
            let mut assembled = Vec::with_capacity(byte_total as usize);
            for bytes in map.values() {
                assembled.extend_from_slice(bytes);
            }
            match self
                .verify_and_decide(key, &assembled, task.file_info.md5.as_deref())
                .await?
            {
                Verified::Store => {
                    self.store
                        .put(key, &assembled, &content_type, task.file_info.md5.as_deref())
                        .await?;
                }
                Verified::Reject => {
                    return Err(self.integrity_error(task.file_info.md5.as_deref(), &assembled));
                }
            }
        }
        Ok(())
    }

    /// Checks a declared MD5 (when present) against assembled bytes,
    /// applying [`IntegrityPolicy`]. Returns whether the caller should
    /// store the bytes (always, unless `Enforce` + mismatch).
    async fn verify_and_decide(
        &self,
        key: ContentKey,
        bytes: &[u8],
        declared_md5: Option<&str>,
    ) -> crate::error::Result<Verified> {
        let Some(declared) = declared_md5 else {
            return Ok(Verified::Store);
        };
        let actual = hex::encode(md5::compute(bytes).0);
        if actual.eq_ignore_ascii_case(declared) {
            return Ok(Verified::Store);
        }
        self.handle_mismatch(key, declared, &actual).await
    }

    /// Verifies MD5 over a progressive entry by reading it back from the
    /// store, which assembles committed chunks in order (spec.md §4.3,
    /// step 6).
    async fn verify_progressive(
        &self,
        key: ContentKey,
        declared_md5: Option<&str>,
    ) -> crate::error::Result<Verified> {
        let Some(declared) = declared_md5 else {
            return Ok(Verified::Store);
        };
        let bytes = self.store.get(key).await?;
        let actual = hex::encode(md5::compute(&bytes).0);
        if actual.eq_ignore_ascii_case(declared) {
            return Ok(Verified::Store);
        }
        self.handle_mismatch(key, declared, &actual).await
    }

    async fn handle_mismatch(
        &self,
        key: ContentKey,
        declared: &str,
        actual: &str,
    ) -> crate::error::Result<Verified> {
        match self.config.integrity_policy {
            IntegrityPolicy::Enforce => Ok(Verified::Reject),
            IntegrityPolicy::WarnOnly => {
                warn!(%key, declared, actual, "MD5 mismatch, committing under warn-only policy");
                self.warnings.lock().await.push(IntegrityWarning {
                    key,
                    declared: declared.to_string(),
                    actual: actual.to_string(),
                });
                Ok(Verified::Store)
            }
        }
    }

    fn integrity_error(&self, declared: Option<&str>, actual_bytes: &[u8]) -> DownloadError {
        DownloadError::Integrity {
            declared: declared.unwrap_or_default().to_string(),
            actual: hex::encode(md5::compute(actual_bytes).0),
        }
    }
}

enum Verified {
    Store,
    Reject,
}
