//! Per-adapter cache of content hashes.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

/// Path-keyed cache of the last known blob SHA of each file.
///
/// Owned by a single [`GitHubStorage`](crate::GitHubStorage) instance; two
/// adapters never share entries. Keys are content-root-relative paths.
#[derive(Debug, Default)]
pub(crate) struct HashCache {
    entries: Mutex<HashMap<String, String>>,
}

impl HashCache {
    pub(crate) fn get(&self, path: &str) -> Option<String> {
        self.lock().get(path).cloned()
    }

    pub(crate) fn insert(&self, path: &str, sha: &str) {
        self.lock().insert(path.to_owned(), sha.to_owned());
    }

    pub(crate) fn remove(&self, path: &str) {
        self.lock().remove(path);
    }

    /// Drop every entry below directory `dir`.
    pub(crate) fn remove_prefix(&self, dir: &str) {
        let prefix = format!("{dir}/");
        self.lock().retain(|path, _| !path.starts_with(&prefix));
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<String, String>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_insert_get_remove() {
        let cache = HashCache::default();
        cache.insert("a.md", "1");
        assert_eq!(cache.get("a.md").as_deref(), Some("1"));

        cache.insert("a.md", "2");
        assert_eq!(cache.get("a.md").as_deref(), Some("2"));

        cache.remove("a.md");
        assert!(cache.get("a.md").is_none());
    }

    #[test]
    fn test_remove_prefix_keeps_siblings() {
        let cache = HashCache::default();
        cache.insert("posts/a/index.md", "1");
        cache.insert("posts/a/images/x.png", "2");
        cache.insert("posts/ab/index.md", "3");

        cache.remove_prefix("posts/a");

        assert!(cache.get("posts/a/index.md").is_none());
        assert!(cache.get("posts/a/images/x.png").is_none());
        assert_eq!(cache.get("posts/ab/index.md").as_deref(), Some("3"));
    }
}
