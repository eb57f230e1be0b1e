//! Filesystem storage implementation for the folio content store.
//!
//! This crate provides [`FsStorage`], a local-directory implementation of the
//! [`Storage`](folio_storage::Storage) trait. It handles:
//!
//! - Path resolution against a content root with traversal rejection
//! - Stat-derived metadata (birth time and modification time)
//! - Implicit creation of parent directories on write
//! - Sequential, **non-atomic** batch writes
//!
//! # Example
//!
//! ```ignore
//! use std::path::PathBuf;
//! use folio_storage::Storage;
//! use folio_storage_fs::FsStorage;
//!
//! let storage = FsStorage::new(PathBuf::from("content"));
//! storage.write_file("posts/hello/index.md", "---\ntitle: Hello\n---\n", None)?;
//! ```

use std::fs;
use std::io::ErrorKind;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use folio_storage::{
    BatchOperation, DirectoryEntry, FileContent, FileMetadata, Storage, StorageError,
    StorageErrorKind, WriteResult, join_path, normalize_path,
};

/// Backend identifier for error messages.
const BACKEND: &str = "Fs";

/// Filesystem storage implementation.
///
/// Every relative path is normalized and resolved below `content_root`; paths
/// that would escape it fail with [`StorageErrorKind::PathTraversal`] before any
/// filesystem call.
///
/// # Batch writes
///
/// The filesystem has no transactional primitive, so
/// [`batch_write`](Storage::batch_write) applies operations one by one in list
/// order. A failure partway through leaves the earlier operations on disk.
///
/// Commit messages are ignored; version history for this backend is handled
/// separately by `folio-vcs`.
#[derive(Debug, Clone)]
pub struct FsStorage {
    /// Root directory for content storage.
    content_root: PathBuf,
}

impl FsStorage {
    /// Create a filesystem storage rooted at `content_root`.
    ///
    /// The directory does not need to exist yet; it is created on first write.
    #[must_use]
    pub fn new(content_root: PathBuf) -> Self {
        Self { content_root }
    }

    /// Root directory of this storage.
    #[must_use]
    pub fn content_root(&self) -> &Path {
        &self.content_root
    }

    /// Normalize a relative path and resolve it below the content root.
    fn resolve(&self, path: &str) -> Result<(String, PathBuf), StorageError> {
        let relative = normalize_path(path).map_err(|e| e.with_backend(BACKEND))?;
        let mut full = self.content_root.clone();
        full.extend(relative.split('/').filter(|s| !s.is_empty()));
        Ok((relative, full))
    }

    fn write_bytes(&self, path: &str, content: &[u8]) -> Result<WriteResult, StorageError> {
        let (relative, full) = self.resolve(path)?;
        if relative.is_empty() {
            return Err(invalid_path(relative));
        }
        if let Some(parent) = full.parent() {
            fs::create_dir_all(parent).map_err(|e| io_error(e, &relative))?;
        }
        fs::write(&full, content).map_err(|e| io_error(e, &relative))?;
        debug!(path = %relative, bytes = content.len(), "Wrote file");
        Ok(WriteResult::new(relative))
    }
}

fn io_error(err: std::io::Error, path: &str) -> StorageError {
    StorageError::io(err, Some(path.to_owned())).with_backend(BACKEND)
}

fn invalid_path(path: String) -> StorageError {
    StorageError::new(StorageErrorKind::InvalidPath)
        .with_path(path)
        .with_backend(BACKEND)
}

impl Storage for FsStorage {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let (_, full) = self.resolve(path)?;
        Ok(full.exists())
    }

    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, StorageError> {
        let (relative, full) = self.resolve(path)?;
        let entries = fs::read_dir(&full).map_err(|e| io_error(e, &relative))?;

        let mut listing: Vec<DirectoryEntry> = entries
            .filter_map(Result::ok)
            .map(|entry| {
                let name = entry.file_name().to_string_lossy().into_owned();
                let is_directory = entry.file_type().is_ok_and(|t| t.is_dir());
                DirectoryEntry {
                    path: join_path(&relative, &name),
                    name,
                    is_directory,
                }
            })
            .collect();
        listing.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(listing)
    }

    fn read_file(&self, path: &str) -> Result<Option<String>, StorageError> {
        let (relative, full) = self.resolve(path)?;
        match fs::read_to_string(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e, &relative)),
        }
    }

    fn read_binary_file(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let (relative, full) = self.resolve(path)?;
        match fs::read(&full) {
            Ok(content) => Ok(Some(content)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(io_error(e, &relative)),
        }
    }

    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let (relative, full) = self.resolve(path)?;
        let meta = match fs::metadata(&full) {
            Ok(meta) => meta,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(io_error(e, &relative)),
        };

        let modified = meta.modified().map_err(|e| io_error(e, &relative))?;
        // Not every filesystem records birth time.
        let created = meta.created().unwrap_or(modified);

        Ok(Some(FileMetadata {
            size: meta.is_file().then_some(meta.len()),
            path: relative,
            created_at: DateTime::<Utc>::from(created),
            updated_at: DateTime::<Utc>::from(modified),
            content_hash: None,
        }))
    }

    fn write_file(
        &self,
        path: &str,
        content: &str,
        _message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        self.write_bytes(path, content.as_bytes())
    }

    fn write_binary_file(
        &self,
        path: &str,
        content: &[u8],
        _message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        self.write_bytes(path, content)
    }

    fn delete_file(&self, path: &str, _message: Option<&str>) -> Result<(), StorageError> {
        let (relative, full) = self.resolve(path)?;
        fs::remove_file(&full).map_err(|e| io_error(e, &relative))?;
        debug!(path = %relative, "Deleted file");
        Ok(())
    }

    fn delete_directory(&self, path: &str, _message: Option<&str>) -> Result<(), StorageError> {
        let (relative, full) = self.resolve(path)?;
        if relative.is_empty() {
            return Err(invalid_path(relative));
        }
        if !full.is_dir() {
            return Err(StorageError::not_found(relative).with_backend(BACKEND));
        }
        fs::remove_dir_all(&full).map_err(|e| io_error(e, &relative))?;
        info!(path = %relative, "Deleted directory");
        Ok(())
    }

    fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        let (relative, full) = self.resolve(path)?;
        fs::create_dir_all(&full).map_err(|e| io_error(e, &relative))
    }

    fn batch_write(
        &self,
        operations: &[BatchOperation],
        _message: &str,
    ) -> Result<Vec<WriteResult>, StorageError> {
        let mut results = Vec::with_capacity(operations.len());
        for op in operations {
            let result = match op {
                BatchOperation::Create { path, content } | BatchOperation::Update { path, content } => {
                    match content {
                        FileContent::Text(text) => self.write_bytes(path, text.as_bytes())?,
                        FileContent::Binary(bytes) => self.write_bytes(path, bytes)?,
                    }
                }
                BatchOperation::Delete { path } => {
                    self.delete_file(path, None)?;
                    WriteResult::new(normalize_path(path)?)
                }
            };
            results.push(result);
        }
        info!(operations = operations.len(), "Applied batch sequentially");
        Ok(results)
    }
}
