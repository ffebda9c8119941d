//! Manifest diff: download plan + purge list (spec.md §4.2).

use crate::error::Result;
use signage_core::{ContentKey, FileInfo};
use signage_store::FsStore;
use signage_transport::RequiredFilesResponse;
use std::collections::{HashMap, HashSet};
use tracing::{debug, instrument};

/// The layout→media map (spec.md §4.2, "sole truth source"). Populated by
/// the caller as layout XLFs are parsed; keyed by layout id.
pub type LayoutMediaMap = HashMap<u64, Vec<ContentKey>>;

#[derive(Debug, Clone)]
pub struct ManifestDiff {
    /// Files to fetch, ordered: media/layouts the active schedule needs
    /// first, then everything else (spec.md §4.2, "Ordering policy").
    pub download_plan: Vec<FileInfo>,
    /// Keys to remove from the store: CMS-declared purges plus (optionally)
    /// store entries no longer referenced by any required file or the
    /// layout→media map.
    pub purge_list: Vec<ContentKey>,
}

#[derive(Debug, Default)]
pub struct ManifestResolver;

impl ManifestResolver {
    pub fn new() -> Self {
        Self
    }

    /// Diffs `required` against `store`, ordering the plan so that files
    /// reachable from `active_layout_ids` sort first. `layout_media_map`
    /// supplies the dependent-media ordering for those layouts; entries
    /// absent from it (not yet parsed) simply sort after layouts that are
    /// present.
    #[instrument(skip(self, required, store, layout_media_map))]
    pub async fn resolve(
        &self,
        required: &RequiredFilesResponse,
        store: &FsStore,
        active_layout_ids: &[u64],
        layout_media_map: &LayoutMediaMap,
    ) -> Result<ManifestDiff> {
        let mut needed = Vec::new();
        for entry in &required.files {
            let info = FileInfo {
                key: ContentKey::new(entry.kind, entry.id),
                size: entry.size,
                md5: entry.md5.clone(),
                content_type: entry.content_type.clone(),
                download_url: entry.download_url.clone(),
            };
            if Self::needs_fetch(store, &info).await? {
                needed.push(info);
            }
        }

        let rank = Self::build_rank(active_layout_ids, layout_media_map);
        needed.sort_by_key(|info| rank.get(&info.key).copied().unwrap_or(usize::MAX));

        let mut purge: Vec<ContentKey> = required.purge.clone();
        let stale = Self::stale_entries(required, layout_media_map, store).await?;
        for key in stale {
            if !purge.contains(&key) {
                purge.push(key);
            }
        }

        debug!(
            needed = needed.len(),
            purge = purge.len(),
            "manifest diff computed"
        );
        Ok(ManifestDiff {
            download_plan: needed,
            purge_list: purge,
        })
    }

    async fn needs_fetch(store: &FsStore, info: &FileInfo) -> Result<bool> {
        let existence = store.has(info.key).await?;
        let size_mismatch = !existence.exists || existence.size != Some(info.size);
        let md5_mismatch = match (&info.md5, &existence.md5) {
            (Some(declared), stored) => stored.as_deref() != Some(declared.as_str()),
            (None, _) => false,
        };
        Ok(size_mismatch || md5_mismatch)
    }

    /// Rank 0 = an active layout; rank 1 = media/widgets it references;
    /// rank `usize::MAX` (via the caller's default) = everything else.
    fn build_rank(active_layout_ids: &[u64], layout_media_map: &LayoutMediaMap) -> HashMap<ContentKey, usize> {
        let mut rank = HashMap::new();
        for &layout_id in active_layout_ids {
            rank.insert(ContentKey::layout(layout_id), 0);
            if let Some(media) = layout_media_map.get(&layout_id) {
                for key in media {
                    rank.entry(*key).or_insert(1);
                }
            }
        }
        rank
    }

    /// Stale-detection pass (spec.md §4.2: "optional but recommended"):
    /// store entries referenced by neither the current manifest nor the
    /// layout→media map.
    async fn stale_entries(
        required: &RequiredFilesResponse,
        layout_media_map: &LayoutMediaMap,
        store: &FsStore,
    ) -> Result<Vec<ContentKey>> {
        let mut referenced: HashSet<ContentKey> =
            required.files.iter().map(|f| ContentKey::new(f.kind, f.id)).collect();
        for media in layout_media_map.values() {
            referenced.extend(media.iter().copied());
        }
        for &layout_id in layout_media_map.keys() {
            referenced.insert(ContentKey::layout(layout_id));
        }

        let entries = store.list(None).await?;
        Ok(entries
            .into_iter()
            .filter(|e| !referenced.contains(&e.key))
            .map(|e| e.key)
            .collect())
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use signage_transport::RequiredFileEntry;

    async fn store() -> (FsStore, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        (FsStore::new(dir.path()).await.unwrap(), dir)
    }

    fn entry(kind: signage_core::FileKind, id: u64, size: u64) -> RequiredFileEntry {
        entry_with_md5(kind, id, size, None)
    }

    fn entry_with_md5(
        kind: signage_core::FileKind,
        id: u64,
        size: u64,
        md5: Option<&str>,
    ) -> RequiredFileEntry {
        RequiredFileEntry {
            kind,
            id: signage_core::FileId::Simple(id),
            size,
            md5: md5.map(str::to_string),
            content_type: "application/octet-stream".into(),
            download_url: format!("https://cdn/{kind}/{id}"),
        }
    }

    #[tokio::test]
    async fn missing_entries_are_planned_for_download() {
        let (store, _dir) = store().await;
        let required = RequiredFilesResponse {
            files: vec![entry(signage_core::FileKind::Media, 1, 10)],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert_eq!(diff.download_plan.len(), 1);
    }

    #[tokio::test]
    async fn present_entries_with_matching_size_are_skipped() {
        let (store, _dir) = store().await;
        let key = ContentKey::media(1);
        store.put(key, b"0123456789", "application/octet-stream", None).await.unwrap();
        let required = RequiredFilesResponse {
            files: vec![entry(signage_core::FileKind::Media, 1, 10)],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert!(diff.download_plan.is_empty());
    }

    #[tokio::test]
    async fn size_mismatch_redrives_download() {
        let (store, _dir) = store().await;
        let key = ContentKey::media(1);
        store.put(key, b"short", "application/octet-stream", None).await.unwrap();
        let required = RequiredFilesResponse {
            files: vec![entry(signage_core::FileKind::Media, 1, 999)],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert_eq!(diff.download_plan.len(), 1);
    }

    #[tokio::test]
    async fn present_entries_with_matching_md5_are_skipped() {
        let (store, _dir) = store().await;
        let key = ContentKey::media(1);
        store
            .put(key, b"0123456789", "application/octet-stream", Some("abc123"))
            .await
            .unwrap();
        let required = RequiredFilesResponse {
            files: vec![entry_with_md5(signage_core::FileKind::Media, 1, 10, Some("abc123"))],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert!(diff.download_plan.is_empty());
    }

    #[tokio::test]
    async fn md5_mismatch_redrives_download_despite_matching_size() {
        let (store, _dir) = store().await;
        let key = ContentKey::media(1);
        store
            .put(key, b"0123456789", "application/octet-stream", Some("old-md5"))
            .await
            .unwrap();
        let required = RequiredFilesResponse {
            files: vec![entry_with_md5(signage_core::FileKind::Media, 1, 10, Some("new-md5"))],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert_eq!(diff.download_plan.len(), 1);
    }

    #[tokio::test]
    async fn active_layout_media_sorts_before_unrelated_files() {
        let (store, _dir) = store().await;
        let required = RequiredFilesResponse {
            files: vec![
                entry(signage_core::FileKind::Media, 99, 1),
                entry(signage_core::FileKind::Layout, 7, 1),
                entry(signage_core::FileKind::Media, 42, 1),
            ],
            purge: Vec::new(),
        };
        let mut map = LayoutMediaMap::new();
        map.insert(7, vec![ContentKey::media(42)]);

        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[7], &map)
            .await
            .unwrap();
        let keys: Vec<_> = diff.download_plan.iter().map(|f| f.key).collect();
        assert_eq!(keys[0], ContentKey::layout(7));
        assert_eq!(keys[1], ContentKey::media(42));
        assert_eq!(keys[2], ContentKey::media(99));
    }

    #[tokio::test]
    async fn explicit_purge_list_is_carried_through() {
        let (store, _dir) = store().await;
        let required = RequiredFilesResponse {
            files: vec![],
            purge: vec![ContentKey::media(5)],
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert_eq!(diff.purge_list, vec![ContentKey::media(5)]);
    }

    #[tokio::test]
    async fn unreferenced_store_entry_is_marked_stale() {
        let (store, _dir) = store().await;
        store
            .put(ContentKey::media(123), b"old", "application/octet-stream", None)
            .await
            .unwrap();
        let required = RequiredFilesResponse {
            files: vec![],
            purge: Vec::new(),
        };
        let diff = ManifestResolver::new()
            .resolve(&required, &store, &[], &LayoutMediaMap::new())
            .await
            .unwrap();
        assert!(diff.purge_list.contains(&ContentKey::media(123)));
    }
}
