//! Per-operation ETag cache (spec.md §4.1, "ETag cache").
//!
//! One slot per idempotent GET operation, last-writer-wins, matching the
//! "single-writer" resource note in spec.md §5.

use dashmap::DashMap;

#[derive(Debug, Clone)]
pub struct CachedResponse<T> {
    pub etag: String,
    pub body: T,
}

/// Keyed by operation name (`requiredFiles`, `schedule`, ...). Bodies are
/// type-erased into `serde_json::Value` by callers so one cache can serve
/// every cacheable operation without a generic per-operation instance.
#[derive(Debug, Default)]
pub struct EtagCache {
    slots: DashMap<&'static str, CachedResponse<serde_json::Value>>,
}

impl EtagCache {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn etag_for(&self, operation: &'static str) -> Option<String> {
        self.slots.get(operation).map(|entry| entry.etag.clone())
    }

    pub fn cached_body(&self, operation: &'static str) -> Option<serde_json::Value> {
        self.slots.get(operation).map(|entry| entry.body.clone())
    }

    pub fn store(&self, operation: &'static str, etag: String, body: serde_json::Value) {
        self.slots.insert(operation, CachedResponse { etag, body });
    }

    pub fn clear(&self) {
        self.slots.clear();
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn store_then_fetch_round_trips() {
        let cache = EtagCache::new();
        cache.store("schedule", "abc123".into(), json!({"ok": true}));
        assert_eq!(cache.etag_for("schedule"), Some("abc123".to_string()));
        assert_eq!(cache.cached_body("schedule"), Some(json!({"ok": true})));
    }

    #[test]
    fn last_writer_wins_per_operation() {
        let cache = EtagCache::new();
        cache.store("schedule", "first".into(), json!(1));
        cache.store("schedule", "second".into(), json!(2));
        assert_eq!(cache.etag_for("schedule"), Some("second".to_string()));
    }

    #[test]
    fn distinct_operations_do_not_collide() {
        let cache = EtagCache::new();
        cache.store("schedule", "a".into(), json!(1));
        cache.store("requiredFiles", "b".into(), json!(2));
        assert_eq!(cache.etag_for("schedule"), Some("a".to_string()));
        assert_eq!(cache.etag_for("requiredFiles"), Some("b".to_string()));
    }
}
