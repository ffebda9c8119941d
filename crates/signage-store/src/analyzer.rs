//! Eviction-hook trait invoked by external callers when storage is under
//! pressure (spec.md §3: "the store never evicts on its own").

use crate::store::{FsStore, ListedEntry};
use async_trait::async_trait;

/// An analyzer that decides which entries to remove when free space is
/// low. The store itself never calls this; `signage-player`'s collection
/// loop invokes it after a `Capacity` error (SPEC_FULL.md §4.4).
#[async_trait]
pub trait StorageAnalyzer: Send + Sync {
    /// Picks entries to evict, given the full listing and the number of
    /// bytes that must be freed.
    fn select_for_eviction(&self, entries: &[ListedEntry], bytes_needed: u64) -> Vec<ListedEntry>;
}

/// Evicts the least-recently-modified entries first until enough space is
/// freed, mirroring the simplest policy a digital-signage display needs:
/// the CMS will redrive anything it still wants on the next collection.
#[derive(Debug, Default, Clone, Copy)]
pub struct LruAnalyzer;

#[async_trait]
impl StorageAnalyzer for LruAnalyzer {
    fn select_for_eviction(&self, entries: &[ListedEntry], bytes_needed: u64) -> Vec<ListedEntry> {
        let mut sorted: Vec<ListedEntry> = entries.to_vec();
        sorted.sort_by_key(|e| e.mtime_unix);

        let mut freed = 0u64;
        let mut picked = Vec::new();
        for entry in sorted {
            if freed >= bytes_needed {
                break;
            }
            freed += entry.size;
            picked.push(entry);
        }
        picked
    }
}

/// Runs `analyzer` over `store`'s current listing and removes whatever it
/// selects, returning the total bytes freed.
pub async fn run_eviction(
    store: &FsStore,
    analyzer: &dyn StorageAnalyzer,
    bytes_needed: u64,
) -> crate::error::Result<u64> {
    let entries = store.list(None).await?;
    let victims = analyzer.select_for_eviction(&entries, bytes_needed);
    let mut freed = 0u64;
    for victim in victims {
        store.remove(victim.key).await?;
        freed += victim.size;
    }
    Ok(freed)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use signage_core::ContentKey;

    fn entry(id: u64, size: u64, mtime: i64) -> ListedEntry {
        ListedEntry {
            key: ContentKey::media(id),
            size,
            mtime_unix: mtime,
        }
    }

    #[test]
    fn lru_picks_oldest_first_until_enough_freed() {
        let entries = vec![entry(1, 100, 300), entry(2, 100, 100), entry(3, 100, 200)];
        let picked = LruAnalyzer.select_for_eviction(&entries, 150);
        assert_eq!(picked.len(), 2);
        assert_eq!(picked[0].key, ContentKey::media(2));
        assert_eq!(picked[1].key, ContentKey::media(3));
    }

    #[tokio::test]
    async fn run_eviction_removes_selected_entries() {
        let dir = tempfile::tempdir().unwrap();
        let store = crate::store::FsStore::new(dir.path()).await.unwrap();
        store.put(ContentKey::media(1), b"aaaa", "t", None).await.unwrap();
        store.put(ContentKey::media(2), b"b", "t", None).await.unwrap();

        let freed = run_eviction(&store, &LruAnalyzer, 100).await.unwrap();
        assert_eq!(freed, 5);
        assert!(!store.has(ContentKey::media(1)).await.unwrap().exists);
        assert!(!store.has(ContentKey::media(2)).await.unwrap().exists);
    }
}
