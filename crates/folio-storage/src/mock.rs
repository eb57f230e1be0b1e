//! In-memory storage implementation for testing.
//!
//! Provides [`MemoryStorage`] for unit testing storage consumers without
//! filesystem or network access.

use std::collections::{BTreeMap, BTreeSet, HashSet};
use std::sync::RwLock;

use chrono::{DateTime, Utc};

use crate::path::{file_name, join_path, normalize_path, parent_path};
use crate::storage::{
    BatchOperation, DirectoryEntry, FileMetadata, Storage, StorageError, StorageErrorKind,
    WriteResult,
};

const BACKEND: &str = "Memory";

#[derive(Debug, Clone)]
struct MemoryFile {
    bytes: Vec<u8>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default)]
struct State {
    files: BTreeMap<String, MemoryFile>,
    dirs: BTreeSet<String>,
}

impl State {
    fn is_dir(&self, path: &str) -> bool {
        if path.is_empty() || self.dirs.contains(path) {
            return true;
        }
        let prefix = format!("{path}/");
        self.files.keys().any(|p| p.starts_with(&prefix))
            || self.dirs.iter().any(|d| d.starts_with(&prefix))
    }

    fn put(&mut self, path: String, bytes: Vec<u8>) {
        let now = Utc::now();
        let created_at = self.files.get(&path).map_or(now, |f| f.created_at);
        self.files.insert(
            path,
            MemoryFile {
                bytes,
                created_at,
                updated_at: now,
            },
        );
    }

    fn remove(&mut self, path: &str) -> Result<(), StorageError> {
        self.files
            .remove(path)
            .map(|_| ())
            .ok_or_else(|| StorageError::not_found(path).with_backend(BACKEND))
    }
}

/// In-memory storage for testing.
///
/// Directories exist when created explicitly or when a file lives below them.
/// Batches are applied to a copy of the state and swapped in, so
/// [`batch_write`](Storage::batch_write) is atomic.
///
/// # Example
///
/// ```ignore
/// use folio_storage::{MemoryStorage, Storage};
///
/// let storage = MemoryStorage::new().with_file("posts/a/index.md", "---\ntitle: A\n---\n");
/// let content = storage.read_file("posts/a/index.md")?;
/// ```
#[derive(Debug, Default)]
pub struct MemoryStorage {
    state: RwLock<State>,
    failing: RwLock<HashSet<String>>,
}

impl MemoryStorage {
    /// Create a new empty storage.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a text file.
    ///
    /// # Panics
    ///
    /// Panics if the path escapes the root or the internal lock is poisoned.
    #[must_use]
    pub fn with_file(self, path: &str, content: impl Into<String>) -> Self {
        let path = normalize_path(path).expect("invalid mock path");
        self.state
            .write()
            .unwrap()
            .put(path, content.into().into_bytes());
        self
    }

    /// Override the timestamps of an existing file.
    ///
    /// # Panics
    ///
    /// Panics if the file was not added before or the internal lock is poisoned.
    #[must_use]
    pub fn with_timestamps(
        self,
        path: &str,
        created_at: DateTime<Utc>,
        updated_at: DateTime<Utc>,
    ) -> Self {
        {
            let mut state = self.state.write().unwrap();
            let file = state.files.get_mut(path).expect("unknown mock file");
            file.created_at = created_at;
            file.updated_at = updated_at;
        }
        self
    }

    /// Make every read of `path` fail with [`StorageErrorKind::Other`].
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn with_failure(self, path: &str) -> Self {
        self.failing.write().unwrap().insert(path.to_owned());
        self
    }

    /// Paths of all stored files, sorted.
    ///
    /// # Panics
    ///
    /// Panics if the internal lock is poisoned.
    #[must_use]
    pub fn files(&self) -> Vec<String> {
        self.state.read().unwrap().files.keys().cloned().collect()
    }

    fn check_failure(&self, path: &str) -> Result<(), StorageError> {
        if self.failing.read().unwrap().contains(path) {
            return Err(StorageError::new(StorageErrorKind::Other)
                .with_path(path)
                .with_backend(BACKEND));
        }
        Ok(())
    }

    fn resolve(path: &str) -> Result<String, StorageError> {
        normalize_path(path).map_err(|e| e.with_backend(BACKEND))
    }
}

impl Storage for MemoryStorage {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = Self::resolve(path)?;
        let state = self.state.read().unwrap();
        Ok(state.files.contains_key(&path) || state.is_dir(&path))
    }

    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, StorageError> {
        let path = Self::resolve(path)?;
        self.check_failure(&path)?;
        let state = self.state.read().unwrap();
        if !state.is_dir(&path) {
            return Err(StorageError::not_found(path).with_backend(BACKEND));
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut children: BTreeMap<String, bool> = BTreeMap::new();
        let file_paths = state.files.keys().map(|p| (p, false));
        let dir_paths = state.dirs.iter().map(|p| (p, true));
        for (candidate, is_dir) in file_paths.chain(dir_paths) {
            let Some(rest) = candidate.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((name, _)) => {
                    children.insert(name.to_owned(), true);
                }
                None => {
                    let entry = children.entry(rest.to_owned()).or_insert(is_dir);
                    *entry |= is_dir;
                }
            }
        }

        Ok(children
            .into_iter()
            .map(|(name, is_directory)| DirectoryEntry {
                path: join_path(&path, &name),
                name,
                is_directory,
            })
            .collect())
    }

    fn read_file(&self, path: &str) -> Result<Option<String>, StorageError> {
        let Some(bytes) = self.read_binary_file(path)? else {
            return Ok(None);
        };
        String::from_utf8(bytes).map(Some).map_err(|e| {
            StorageError::new(StorageErrorKind::Other)
                .with_path(path)
                .with_backend(BACKEND)
                .with_source(e)
        })
    }

    fn read_binary_file(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = Self::resolve(path)?;
        self.check_failure(&path)?;
        Ok(self
            .state
            .read()
            .unwrap()
            .files
            .get(&path)
            .map(|f| f.bytes.clone()))
    }

    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let path = Self::resolve(path)?;
        self.check_failure(&path)?;
        Ok(self.state.read().unwrap().files.get(&path).map(|f| FileMetadata {
            path: path.clone(),
            size: Some(f.bytes.len() as u64),
            created_at: f.created_at,
            updated_at: f.updated_at,
            content_hash: None,
        }))
    }

    fn write_file(
        &self,
        path: &str,
        content: &str,
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        self.write_binary_file(path, content.as_bytes(), message)
    }

    fn write_binary_file(
        &self,
        path: &str,
        content: &[u8],
        _message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        let path = Self::resolve(path)?;
        self.state
            .write()
            .unwrap()
            .put(path.clone(), content.to_vec());
        Ok(WriteResult::new(path))
    }

    fn delete_file(&self, path: &str, _message: Option<&str>) -> Result<(), StorageError> {
        let path = Self::resolve(path)?;
        self.state.write().unwrap().remove(&path)
    }

    fn delete_directory(&self, path: &str, _message: Option<&str>) -> Result<(), StorageError> {
        let path = Self::resolve(path)?;
        if path.is_empty() {
            return Err(StorageError::new(StorageErrorKind::InvalidPath).with_backend(BACKEND));
        }
        let mut state = self.state.write().unwrap();
        if !state.is_dir(&path) {
            return Err(StorageError::not_found(path).with_backend(BACKEND));
        }
        let prefix = format!("{path}/");
        state.files.retain(|p, _| !p.starts_with(&prefix));
        state.dirs.retain(|d| d != &path && !d.starts_with(&prefix));
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        let path = Self::resolve(path)?;
        let mut state = self.state.write().unwrap();
        let mut current = path.as_str();
        while !current.is_empty() {
            state.dirs.insert(current.to_owned());
            current = parent_path(current);
        }
        Ok(())
    }

    fn batch_write(
        &self,
        operations: &[BatchOperation],
        _message: &str,
    ) -> Result<Vec<WriteResult>, StorageError> {
        let mut state = self.state.write().unwrap();
        let mut staged = state.clone();
        let mut results = Vec::with_capacity(operations.len());

        for op in operations {
            let path = Self::resolve(op.path())?;
            match op.content() {
                Some(content) => staged.put(path.clone(), content.as_bytes().to_vec()),
                None => staged.remove(&path)?,
            }
            results.push(WriteResult::new(path));
        }

        *state = staged;
        Ok(results)
    }
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use super::*;

    fn assert_send_sync<T: Send + Sync>() {}

    #[test]
    fn test_memory_storage_is_send_sync() {
        assert_send_sync::<MemoryStorage>();
    }

    #[test]
    fn test_round_trip() {
        let storage = MemoryStorage::new();
        storage.write_file("a/b.md", "hello", None).unwrap();

        assert_eq!(storage.read_file("a/b.md").unwrap().as_deref(), Some("hello"));
        assert!(storage.exists("a").unwrap());
    }

    #[test]
    fn test_read_missing_is_none() {
        let storage = MemoryStorage::new();
        assert!(storage.read_file("missing.md").unwrap().is_none());
    }

    #[test]
    fn test_read_directory_synthesizes_dirs() {
        let storage = MemoryStorage::new()
            .with_file("posts/b/index.md", "b")
            .with_file("posts/a/index.md", "a")
            .with_file("posts/readme.md", "r");

        let entries = storage.read_directory("posts").unwrap();
        let names: Vec<_> = entries
            .iter()
            .map(|e| (e.name.as_str(), e.is_directory))
            .collect();

        assert_eq!(names, vec![("a", true), ("b", true), ("readme.md", false)]);
        assert_eq!(entries[0].path, "posts/a");
    }

    #[test]
    fn test_explicit_empty_directory_is_listed() {
        let storage = MemoryStorage::new();
        storage.create_directory("posts/a/images").unwrap();

        let entries = storage.read_directory("posts/a").unwrap();
        assert_eq!(entries.len(), 1);
        assert!(entries[0].is_directory);
        assert_eq!(entries[0].name, "images");
    }

    #[test]
    fn test_delete_directory_recursive() {
        let storage = MemoryStorage::new()
            .with_file("posts/a/index.md", "a")
            .with_file("posts/a/images/x.png", "x")
            .with_file("posts/b/index.md", "b");

        storage.delete_directory("posts/a", None).unwrap();

        assert_eq!(storage.files(), vec!["posts/b/index.md".to_owned()]);
    }

    #[test]
    fn test_batch_is_atomic() {
        let storage = MemoryStorage::new().with_file("keep.md", "k");
        let ops = vec![
            BatchOperation::create("new.md", "n"),
            BatchOperation::delete("missing.md"),
        ];

        let err = storage.batch_write(&ops, "msg").unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert_eq!(storage.files(), vec!["keep.md".to_owned()]);
    }

    #[test]
    fn test_traversal_rejected() {
        let storage = MemoryStorage::new();
        let err = storage.read_file("../../secret").unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::PathTraversal);
        assert_eq!(err.backend, Some("Memory"));
    }

    #[test]
    fn test_failure_injection() {
        let storage = MemoryStorage::new()
            .with_file("a.md", "a")
            .with_failure("a.md");

        assert!(storage.read_file("a.md").is_err());
    }

    #[test]
    fn test_update_preserves_created_at() {
        let storage = MemoryStorage::new();
        storage.write_file("a.md", "1", None).unwrap();
        let first = storage.metadata("a.md").unwrap().unwrap();
        storage.write_file("a.md", "2", None).unwrap();
        let second = storage.metadata("a.md").unwrap().unwrap();

        assert_eq!(first.created_at, second.created_at);
        assert!(second.updated_at >= first.updated_at);
    }
}
