//! File identity shared by every component of the core.
//!
//! A file is identified by a `(kind, id)` pair (spec.md §3, "File
//! identity"). The pair is the key into the content store, the download
//! manager's task map, and the manifest resolver's diff — never the CMS
//! download URL, which may change across collection cycles.

use serde::{Deserialize, Serialize};
use std::fmt;

/// The five file kinds the CMS can declare.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum FileKind {
    Media,
    Layout,
    Widget,
    FontKit,
    Bundle,
}

impl fmt::Display for FileKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Media => "media",
            Self::Layout => "layout",
            Self::Widget => "widget",
            Self::FontKit => "fontKit",
            Self::Bundle => "bundle",
        };
        f.write_str(s)
    }
}

/// A file's id, either a stable integer or the composite key widgets use.
///
/// Widgets are addressed by `layoutId/regionId/mediaId` (spec.md §3); every
/// other kind uses a single integer id.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FileId {
    Simple(u64),
    Widget {
        layout_id: u64,
        region_id: u64,
        media_id: u64,
    },
}

impl fmt::Display for FileId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Simple(id) => write!(f, "{id}"),
            Self::Widget {
                layout_id,
                region_id,
                media_id,
            } => write!(f, "{layout_id}/{region_id}/{media_id}"),
        }
    }
}

/// The identity of a single file: `(kind, id)`.
///
/// This is the key used everywhere a component needs to address "this
/// specific declared file" — the content store, the download manager's
/// active-task set, and the manifest diff — deliberately never the CMS URL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ContentKey {
    pub kind: FileKind,
    pub id: FileId,
}

impl ContentKey {
    pub fn new(kind: FileKind, id: FileId) -> Self {
        Self { kind, id }
    }

    pub fn media(id: u64) -> Self {
        Self::new(FileKind::Media, FileId::Simple(id))
    }

    pub fn layout(id: u64) -> Self {
        Self::new(FileKind::Layout, FileId::Simple(id))
    }

    pub fn widget(layout_id: u64, region_id: u64, media_id: u64) -> Self {
        Self::new(
            FileKind::Widget,
            FileId::Widget {
                layout_id,
                region_id,
                media_id,
            },
        )
    }

    /// Relative path component under which this key's bytes are sharded on
    /// disk, e.g. `media/ab/cd/abcd1234...`. The shard prefix comes from the
    /// id's own display string, matching the teacher's two-level hash
    /// sharding (`Cache::cache_path_with_suffix`) but keyed on id rather
    /// than a content hash, since ids here are stable CMS identifiers.
    pub fn shard_path(&self) -> String {
        let id = self.id.to_string();
        let digest = format!("{:08x}", fnv1a(id.as_bytes()));
        format!("{}/{}/{}/{}", self.kind, &digest[0..2], &digest[2..4], id)
    }
}

impl fmt::Display for ContentKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.kind, self.id)
    }
}

/// Tiny non-cryptographic hash used only to pick a shard directory.
fn fnv1a(bytes: &[u8]) -> u32 {
    let mut hash: u32 = 0x811c_9dc5;
    for b in bytes {
        hash ^= u32::from(*b);
        hash = hash.wrapping_mul(0x0100_0193);
    }
    hash
}

/// Declared metadata for a file the CMS wants the display to hold.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FileInfo {
    pub key: ContentKey,
    pub size: u64,
    pub md5: Option<String>,
    pub content_type: String,
    pub download_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_roundtrip_simple() {
        let key = ContentKey::media(42);
        assert_eq!(key.to_string(), "media:42");
    }

    #[test]
    fn display_roundtrip_widget() {
        let key = ContentKey::widget(7, 2, 99);
        assert_eq!(key.to_string(), "widget:7/2/99");
    }

    #[test]
    fn shard_path_is_stable() {
        let key = ContentKey::media(42);
        let a = key.shard_path();
        let b = key.shard_path();
        assert_eq!(a, b);
        assert!(a.starts_with("media/"));
    }

    #[test]
    fn equal_keys_are_equal_and_hash_the_same() {
        use std::collections::HashSet;
        let a = ContentKey::media(1);
        let b = ContentKey::media(1);
        assert_eq!(a, b);
        let mut set = HashSet::new();
        set.insert(a);
        assert!(set.contains(&b));
    }
}
