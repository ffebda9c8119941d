//! Filesystem-backed content store (spec.md §4.4).
//!
//! Physical layout (implementation-defined per spec): a tree keyed by
//! `kind/shard/shard/id/`, containing either a single `blob` file (plain
//! entries) or a `chunks/<index>.chunk` directory (progressive entries),
//! plus a `meta.json` sidecar. Every write lands in a temp file beside its
//! destination and is made visible with a single `rename`, which is atomic
//! on the same filesystem — a reader never observes a partially-written
//! entry (spec.md §4.4 invariant, §8 "Store atomicity").

use crate::entry::EntryMeta;
use crate::error::{Result, StoreError};
use signage_core::ContentKey;
use std::path::{Path, PathBuf};
use tokio::fs;
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};
use tracing::{debug, instrument, warn};

/// `(exists, size)` — the result of [`Store::has`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Existence {
    pub exists: bool,
    pub size: Option<u64>,
    pub md5: Option<String>,
}

/// A listed entry: `(kind, id, size, mtime)`.
#[derive(Debug, Clone)]
pub struct ListedEntry {
    pub key: ContentKey,
    pub size: u64,
    pub mtime_unix: i64,
}

/// Content-addressed store: atomic put, byte-range reads, listing.
///
/// The store never evicts on its own (spec.md §3); external analyzers call
/// [`Store::remove`] when storage is pressured.
#[derive(Debug, Clone)]
pub struct FsStore {
    base_dir: PathBuf,
}

impl FsStore {
    pub async fn new(base_dir: impl Into<PathBuf>) -> Result<Self> {
        let base_dir = base_dir.into();
        fs::create_dir_all(&base_dir).await?;
        debug!(?base_dir, "opened content store");
        Ok(Self { base_dir })
    }

    fn entry_dir(&self, key: &ContentKey) -> PathBuf {
        self.base_dir.join(key.shard_path())
    }

    fn blob_path(&self, key: &ContentKey) -> PathBuf {
        self.entry_dir(key).join("blob")
    }

    fn meta_path(&self, key: &ContentKey) -> PathBuf {
        self.entry_dir(key).join("meta.json")
    }

    fn chunk_path(&self, key: &ContentKey, index: u64) -> PathBuf {
        self.entry_dir(key).join("chunks").join(format!("{index}.chunk"))
    }

    async fn read_meta(&self, key: &ContentKey) -> Result<Option<EntryMeta>> {
        let path = self.meta_path(key);
        match fs::read(&path).await {
            Ok(bytes) => {
                let meta: EntryMeta = serde_json::from_slice(&bytes)
                    .map_err(|e| StoreError::CorruptMetadata(e.to_string()))?;
                Ok(Some(meta))
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    async fn write_meta(&self, key: &ContentKey, meta: &EntryMeta) -> Result<()> {
        let bytes = serde_json::to_vec(meta)
            .map_err(|e| StoreError::CorruptMetadata(e.to_string()))?;
        atomic_write(&self.meta_path(key), &bytes).await
    }

    fn now_unix() -> i64 {
        chrono::Utc::now().timestamp()
    }

    /// `has(kind, id) -> {exists, size?}`
    #[instrument(skip(self))]
    pub async fn has(&self, key: ContentKey) -> Result<Existence> {
        match self.read_meta(&key).await? {
            Some(meta) if meta.complete => Ok(Existence {
                exists: true,
                size: Some(meta.size),
                md5: meta.md5,
            }),
            _ => Ok(Existence {
                exists: false,
                size: None,
                md5: None,
            }),
        }
    }

    /// `put(kind, id, bytes, content_type, md5?)` — atomic whole-blob
    /// publish. `md5` is the CMS-declared checksum (if any), persisted so a
    /// later manifest diff can detect a checksum change even when size is
    /// unchanged.
    #[instrument(skip(self, bytes))]
    pub async fn put(
        &self,
        key: ContentKey,
        bytes: &[u8],
        content_type: &str,
        md5: Option<&str>,
    ) -> Result<()> {
        let dir = self.entry_dir(&key);
        fs::create_dir_all(&dir).await?;
        atomic_write(&self.blob_path(&key), bytes).await?;
        let meta = EntryMeta::whole(
            bytes.len() as u64,
            content_type.to_string(),
            Self::now_unix(),
            md5.map(str::to_string),
        );
        self.write_meta(&key, &meta).await?;
        debug!(%key, size = bytes.len(), "published entry");
        Ok(())
    }

    /// Registers a progressive entry's chunk plan ahead of the first
    /// [`Self::put_chunk`] call, so range reads can validate chunk
    /// boundaries before every chunk has arrived. Grounded in the download
    /// manager's chunk plan (spec.md §3, "Chunk plan"), which is known
    /// before any chunk is dispatched.
    #[instrument(skip(self))]
    pub async fn begin_progressive(
        &self,
        key: ContentKey,
        total_size: u64,
        chunk_size: u64,
        content_type: &str,
        md5: Option<&str>,
    ) -> Result<()> {
        let dir = self.entry_dir(&key);
        fs::create_dir_all(dir.join("chunks")).await?;
        let meta = EntryMeta::progressive(
            total_size,
            chunk_size,
            content_type.to_string(),
            Self::now_unix(),
            md5.map(str::to_string),
        );
        self.write_meta(&key, &meta).await?;
        Ok(())
    }

    /// `put_chunk(kind, id, index, bytes, content_type)` — progressive
    /// write, visible atomically at chunk granularity.
    #[instrument(skip(self, bytes))]
    pub async fn put_chunk(&self, key: ContentKey, index: u64, bytes: &[u8]) -> Result<()> {
        let mut meta = self
            .read_meta(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !meta.is_progressive() {
            return Err(StoreError::CorruptMetadata(
                "put_chunk called on a non-progressive entry".into(),
            ));
        }
        atomic_write(&self.chunk_path(&key, index), bytes).await?;
        meta.mark_committed(index);
        self.write_meta(&key, &meta).await?;
        debug!(%key, index, complete = meta.complete, "committed chunk");
        Ok(())
    }

    /// `get(kind, id) -> bytes` (full). For a progressive entry this
    /// assembles chunks in index order; the store never persists a
    /// separate concatenated blob for those (spec.md §4.3, step 4).
    #[instrument(skip(self))]
    pub async fn get(&self, key: ContentKey) -> Result<Vec<u8>> {
        let meta = self
            .read_meta(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if !meta.complete {
            return Err(StoreError::NotFound(key.to_string()));
        }
        if meta.is_progressive() {
            self.get_range(key, 0, meta.size - 1).await
        } else {
            fs::read(self.blob_path(&key)).await.map_err(Into::into)
        }
    }

    /// `get_range(kind, id, start, end) -> bytes` (inclusive end).
    ///
    /// A range overlapping an uncommitted progressive chunk fails
    /// deterministically rather than returning zeros (spec.md §9, Open
    /// Question #3).
    #[instrument(skip(self))]
    pub async fn get_range(&self, key: ContentKey, start: u64, end: u64) -> Result<Vec<u8>> {
        let meta = self
            .read_meta(&key)
            .await?
            .ok_or_else(|| StoreError::NotFound(key.to_string()))?;
        if end >= meta.size || start > end {
            return Err(StoreError::RangeOutOfBounds {
                start,
                end,
                size: meta.size,
            });
        }
        if !meta.range_is_fully_committed(start, end) {
            return Err(StoreError::UncommittedRange);
        }

        if !meta.is_progressive() {
            return read_file_range(&self.blob_path(&key), start, end).await;
        }

        let mut out = Vec::with_capacity((end - start + 1) as usize);
        for index in meta.chunks_covering(start, end) {
            let Some((chunk_start, chunk_end)) = meta.chunk_range(index) else {
                continue;
            };
            let read_start = start.max(chunk_start);
            let read_end = end.min(chunk_end);
            let local_start = read_start - chunk_start;
            let local_end = read_end - chunk_start;
            let chunk_bytes =
                read_file_range(&self.chunk_path(&key, index), local_start, local_end).await?;
            out.extend_from_slice(&chunk_bytes);
        }
        Ok(out)
    }

    /// `remove(kind, id)`. Safe to call on a missing entry.
    #[instrument(skip(self))]
    pub async fn remove(&self, key: ContentKey) -> Result<()> {
        let dir = self.entry_dir(&key);
        match fs::remove_dir_all(&dir).await {
            Ok(()) => {
                debug!(%key, "removed entry");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// `list(kind?) -> [(kind, id, size, mtime)]`. `kind` filters by file
    /// kind when supplied; this walks the shard tree once per call, which
    /// is fine for the display-scale content sets this core targets.
    #[instrument(skip(self))]
    pub async fn list(&self, kind: Option<signage_core::FileKind>) -> Result<Vec<ListedEntry>> {
        let base_dir = self.base_dir.clone();
        let kind_prefix = kind.map(|k| k.to_string());
        tokio::task::spawn_blocking(move || list_blocking(&base_dir, kind_prefix.as_deref()))
            .await
            .map_err(|e| StoreError::Io(std::io::Error::other(e.to_string())))?
    }
}

fn list_blocking(base_dir: &Path, kind_prefix: Option<&str>) -> Result<Vec<ListedEntry>> {
    let mut out = Vec::new();
    let root = match kind_prefix {
        Some(k) => base_dir.join(k),
        None => base_dir.to_path_buf(),
    };
    if !root.exists() {
        return Ok(out);
    }
    for entry in walkdir::WalkDir::new(&root)
        .into_iter()
        .filter_map(std::result::Result::ok)
    {
        if entry.file_name() != "meta.json" {
            continue;
        }
        let bytes = std::fs::read(entry.path())?;
        let Ok(meta) = serde_json::from_slice::<EntryMeta>(&bytes) else {
            warn!(path = %entry.path().display(), "skipping corrupt metadata during list");
            continue;
        };
        if !meta.complete {
            continue;
        }
        let Some(entry_dir) = entry.path().parent() else {
            continue;
        };
        let Some(key) = decode_key_from_path(base_dir, entry_dir) else {
            continue;
        };
        out.push(ListedEntry {
            key,
            size: meta.size,
            mtime_unix: meta.mtime_unix,
        });
    }
    Ok(out)
}

/// Recovers a `ContentKey` from its shard directory path
/// (`kind/aa/bb/id`); the shard hash prefix is not otherwise recoverable,
/// so `list` trusts the trailing path component (the original id string)
/// and the leading path component (the kind).
fn decode_key_from_path(base_dir: &Path, entry_dir: &Path) -> Option<ContentKey> {
    use signage_core::{FileId, FileKind};

    let rel = entry_dir.strip_prefix(base_dir).ok()?;
    let mut components: Vec<&str> = rel.components().filter_map(|c| c.as_os_str().to_str()).collect();
    let id_str = components.pop()?;
    let _shard_b = components.pop()?;
    let _shard_a = components.pop()?;
    let kind_str = components.pop()?;

    let kind = match kind_str {
        "media" => FileKind::Media,
        "layout" => FileKind::Layout,
        "widget" => FileKind::Widget,
        "fontKit" => FileKind::FontKit,
        "bundle" => FileKind::Bundle,
        _ => return None,
    };

    let id = if kind == FileKind::Widget {
        let mut parts = id_str.split('/');
        let layout_id = parts.next()?.parse().ok()?;
        let region_id = parts.next()?.parse().ok()?;
        let media_id = parts.next()?.parse().ok()?;
        FileId::Widget {
            layout_id,
            region_id,
            media_id,
        }
    } else {
        FileId::Simple(id_str.parse().ok()?)
    };

    Some(ContentKey::new(kind, id))
}

async fn atomic_write(path: &Path, bytes: &[u8]) -> Result<()> {
    if let Some(dir) = path.parent() {
        fs::create_dir_all(dir).await?;
    }
    let tmp_path = path.with_extension(format!("tmp-{}", std::process::id()));
    {
        let mut file = fs::File::create(&tmp_path).await?;
        file.write_all(bytes).await?;
        file.sync_all().await?;
    }
    fs::rename(&tmp_path, path).await?;
    Ok(())
}

async fn read_file_range(path: &Path, start: u64, end: u64) -> Result<Vec<u8>> {
    let mut file = fs::File::open(path).await.map_err(|e| {
        if e.kind() == std::io::ErrorKind::NotFound {
            StoreError::NotFound(path.display().to_string())
        } else {
            StoreError::Io(e)
        }
    })?;
    file.seek(std::io::SeekFrom::Start(start)).await?;
    let len = (end - start + 1) as usize;
    let mut buf = vec![0u8; len];
    file.read_exact(&mut buf).await?;
    Ok(buf)
}
