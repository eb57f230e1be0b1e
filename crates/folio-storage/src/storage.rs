//! Storage trait, contract types and error types.
//!
//! Provides the core [`Storage`] trait for abstracting file access over a content
//! root, along with [`StorageError`] for unified error handling across backends.
//!
//! # Path Convention
//!
//! All path parameters are **relative to the backend's content root** and use `/`
//! as separator:
//! - `""` - the content root itself
//! - `"posts"` - a collection directory
//! - `"posts/hello-world/index.md"` - an entry document
//!
//! Implementations normalize every path with [`normalize_path`](crate::normalize_path)
//! before any I/O, so a path escaping the root fails with
//! [`StorageErrorKind::PathTraversal`] and never reaches the store.

use chrono::{DateTime, Utc};
use serde::Serialize;

/// A single record returned by [`Storage::read_directory`].
///
/// Transient: only valid for the listing that produced it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DirectoryEntry {
    /// Entry name (last path segment).
    pub name: String,
    /// True for directories (real or synthesized by the backend).
    pub is_directory: bool,
    /// Content-root-relative path of the entry.
    pub path: String,
}

/// File metadata reported by a backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    /// Content-root-relative path.
    pub path: String,
    /// Size in bytes, when the backend reports it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub size: Option<u64>,
    /// Creation time.
    pub created_at: DateTime<Utc>,
    /// Last modification time.
    pub updated_at: DateTime<Utc>,
    /// Content hash (git blob SHA) on content-addressed backends.
    ///
    /// Used as an optimistic-concurrency precondition for updates and deletes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
}

/// Outcome of a single write.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WriteResult {
    /// Content-root-relative path that was written.
    pub path: String,
    /// New content hash, on content-addressed backends.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_hash: Option<String>,
    /// Commit created by the write, on backends that commit transactionally.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
}

impl WriteResult {
    /// Create a result for `path` with no hash or commit.
    #[must_use]
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            content_hash: None,
            commit_id: None,
        }
    }

    /// Attach the content hash.
    #[must_use]
    pub fn with_content_hash(mut self, hash: impl Into<String>) -> Self {
        self.content_hash = Some(hash.into());
        self
    }

    /// Attach the commit id.
    #[must_use]
    pub fn with_commit_id(mut self, commit_id: impl Into<String>) -> Self {
        self.commit_id = Some(commit_id.into());
        self
    }
}

/// File payload carried by a batch operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FileContent {
    /// UTF-8 text.
    Text(String),
    /// Raw bytes (images and other binary assets).
    Binary(Vec<u8>),
}

impl FileContent {
    /// Borrow the payload as bytes.
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        match self {
            Self::Text(text) => text.as_bytes(),
            Self::Binary(bytes) => bytes,
        }
    }

    /// True for [`FileContent::Binary`].
    #[must_use]
    pub fn is_binary(&self) -> bool {
        matches!(self, Self::Binary(_))
    }
}

/// Kind of a [`BatchOperation`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BatchKind {
    Create,
    Update,
    Delete,
}

/// One unit of a [`Storage::batch_write`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BatchOperation {
    /// Create a new file.
    Create { path: String, content: FileContent },
    /// Replace an existing file.
    Update { path: String, content: FileContent },
    /// Remove a file.
    Delete { path: String },
}

impl BatchOperation {
    /// Create a text file.
    #[must_use]
    pub fn create(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Create {
            path: path.into(),
            content: FileContent::Text(content.into()),
        }
    }

    /// Create a binary file.
    #[must_use]
    pub fn create_binary(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        Self::Create {
            path: path.into(),
            content: FileContent::Binary(content.into()),
        }
    }

    /// Replace a text file.
    #[must_use]
    pub fn update(path: impl Into<String>, content: impl Into<String>) -> Self {
        Self::Update {
            path: path.into(),
            content: FileContent::Text(content.into()),
        }
    }

    /// Remove a file.
    #[must_use]
    pub fn delete(path: impl Into<String>) -> Self {
        Self::Delete { path: path.into() }
    }

    /// Target path of the operation.
    #[must_use]
    pub fn path(&self) -> &str {
        match self {
            Self::Create { path, .. } | Self::Update { path, .. } | Self::Delete { path } => path,
        }
    }

    /// Operation kind.
    #[must_use]
    pub fn kind(&self) -> BatchKind {
        match self {
            Self::Create { .. } => BatchKind::Create,
            Self::Update { .. } => BatchKind::Update,
            Self::Delete { .. } => BatchKind::Delete,
        }
    }

    /// Payload for create/update operations.
    #[must_use]
    pub fn content(&self) -> Option<&FileContent> {
        match self {
            Self::Create { content, .. } | Self::Update { content, .. } => Some(content),
            Self::Delete { .. } => None,
        }
    }
}

/// Semantic error categories (inspired by Object Store + `OpenDAL`).
#[derive(Debug, PartialEq, Eq, Clone, Copy)]
#[non_exhaustive]
pub enum StorageErrorKind {
    /// Resource does not exist.
    NotFound,
    /// Permission denied.
    PermissionDenied,
    /// Resource already exists (for create operations).
    AlreadyExists,
    /// Invalid path or identifier.
    InvalidPath,
    /// Path resolves outside the content root. Never retried.
    PathTraversal,
    /// Optimistic-concurrency precondition failed (content hash or branch head moved).
    StaleWrite,
    /// Remote API answered with a non-success status.
    ///
    /// The source is a [`RemoteApiError`] carrying status and message.
    RemoteApi,
    /// Backend is temporarily unavailable.
    Unavailable,
    /// Too many requests.
    RateLimited,
    /// Operation timed out.
    Timeout,
    /// Other/unknown error category.
    Other,
}

/// Retry guidance (from `OpenDAL`).
#[derive(Debug, PartialEq, Eq, Default, Clone, Copy)]
pub enum ErrorStatus {
    /// Don't retry (config error, not found, invalid path).
    #[default]
    Permanent,
    /// Retry immediately (timeout, connection reset).
    Temporary,
    /// Retry with backoff (rate limited, service unavailable).
    Persistent,
}

/// Error payload reported by a remote API.
#[derive(Debug, thiserror::Error)]
#[error("HTTP {status}: {message}")]
pub struct RemoteApiError {
    /// HTTP status code.
    pub status: u16,
    /// Message extracted from the response body.
    pub message: String,
}

/// Storage error with semantic kind and backend-specific source.
#[derive(Debug)]
pub struct StorageError {
    /// Semantic error category.
    pub kind: StorageErrorKind,
    /// Retry guidance.
    pub status: ErrorStatus,
    /// Path context (if applicable).
    pub path: Option<String>,
    /// Backend identifier (e.g., "Fs", "GitHub").
    pub backend: Option<&'static str>,
    source: Option<Box<dyn std::error::Error + Send + Sync>>,
}

impl StorageError {
    /// Create a new storage error.
    #[must_use]
    pub fn new(kind: StorageErrorKind) -> Self {
        Self {
            kind,
            status: ErrorStatus::Permanent,
            path: None,
            backend: None,
            source: None,
        }
    }

    /// Attach path context.
    #[must_use]
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = Some(path.into());
        self
    }

    /// Attach backend identifier.
    #[must_use]
    pub fn with_backend(mut self, backend: &'static str) -> Self {
        self.backend = Some(backend);
        self
    }

    /// Set retry status.
    #[must_use]
    pub fn with_status(mut self, status: ErrorStatus) -> Self {
        self.status = status;
        self
    }

    /// Attach the underlying error source.
    #[must_use]
    pub fn with_source(mut self, source: impl std::error::Error + Send + Sync + 'static) -> Self {
        self.source = Some(Box::new(source));
        self
    }

    /// Downcast the source error to a concrete type.
    #[must_use]
    pub fn downcast_source<E: std::error::Error + 'static>(&self) -> Option<&E> {
        self.source.as_ref()?.downcast_ref()
    }

    /// Create a not found error with path.
    #[must_use]
    pub fn not_found(path: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::NotFound).with_path(path)
    }

    /// Create a path traversal error for the offending (un-normalized) path.
    #[must_use]
    pub fn path_traversal(path: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::PathTraversal).with_path(path)
    }

    /// Create a stale write error with path.
    #[must_use]
    pub fn stale_write(path: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::StaleWrite).with_path(path)
    }

    /// Create a remote API error from an HTTP status and message.
    #[must_use]
    pub fn remote_api(status: u16, message: impl Into<String>) -> Self {
        Self::new(StorageErrorKind::RemoteApi).with_source(RemoteApiError {
            status,
            message: message.into(),
        })
    }

    /// HTTP status of a [`StorageErrorKind::RemoteApi`] error.
    #[must_use]
    pub fn remote_status(&self) -> Option<u16> {
        self.downcast_source::<RemoteApiError>().map(|e| e.status)
    }

    /// Create a storage error from an I/O error.
    #[must_use]
    pub fn io(err: std::io::Error, path: Option<String>) -> Self {
        let kind = match err.kind() {
            std::io::ErrorKind::NotFound => StorageErrorKind::NotFound,
            std::io::ErrorKind::PermissionDenied => StorageErrorKind::PermissionDenied,
            std::io::ErrorKind::AlreadyExists => StorageErrorKind::AlreadyExists,
            std::io::ErrorKind::TimedOut => StorageErrorKind::Timeout,
            _ => StorageErrorKind::Other,
        };
        let status = match err.kind() {
            std::io::ErrorKind::TimedOut => ErrorStatus::Temporary,
            _ => ErrorStatus::Permanent,
        };
        let mut error = Self::new(kind).with_status(status).with_source(err);
        if let Some(p) = path {
            error = error.with_path(p);
        }
        error
    }
}

impl std::fmt::Display for StorageError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // Format: "[Backend] Kind: message (path: foo/bar)"
        if let Some(backend) = self.backend {
            write!(f, "[{backend}] ")?;
        }

        let kind_str = match self.kind {
            StorageErrorKind::NotFound => "Not found",
            StorageErrorKind::PermissionDenied => "Permission denied",
            StorageErrorKind::AlreadyExists => "Already exists",
            StorageErrorKind::InvalidPath => "Invalid path",
            StorageErrorKind::PathTraversal => "Path escapes content root",
            StorageErrorKind::StaleWrite => "Stale write",
            StorageErrorKind::RemoteApi => "Remote API error",
            StorageErrorKind::Unavailable => "Unavailable",
            StorageErrorKind::RateLimited => "Rate limited",
            StorageErrorKind::Timeout => "Timeout",
            StorageErrorKind::Other => "Error",
        };

        write!(f, "{kind_str}")?;

        if let Some(source) = &self.source {
            write!(f, ": {source}")?;
        }

        if let Some(path) = &self.path {
            write!(f, " (path: {path})")?;
        }

        Ok(())
    }
}

impl std::error::Error for StorageError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|s| s.as_ref() as &(dyn std::error::Error + 'static))
    }
}

/// Storage abstraction over a content root.
///
/// Both the local filesystem and the remote git-hosting backends implement this
/// trait, so the content layer never learns which one it talks to.
///
/// # Batch atomicity
///
/// [`batch_write`](Storage::batch_write) is atomic on backends with a
/// transactional primitive (the remote backend flips a branch ref once) and
/// sequential on backends without one (the local filesystem). Each
/// implementation documents which guarantee it gives.
///
/// # Commit messages
///
/// Mutating operations accept a message. Version-controlled backends use it
/// for the commit they create; other backends ignore it.
pub trait Storage: Send + Sync {
    /// Backend identifier used in logs and errors (e.g., "Fs", "GitHub").
    fn backend(&self) -> &'static str;

    /// Check whether a file or directory exists.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::PathTraversal`] for paths outside the root, or
    /// a backend error if the check itself fails.
    fn exists(&self, path: &str) -> Result<bool, StorageError>;

    /// List the direct children of a directory, sorted by name.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::NotFound`] if the directory does not exist.
    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, StorageError>;

    /// Read a UTF-8 file. Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read.
    fn read_file(&self, path: &str) -> Result<Option<String>, StorageError>;

    /// Read a file as bytes. Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the file exists but cannot be read.
    fn read_binary_file(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError>;

    /// Read file metadata. Returns `Ok(None)` when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if metadata cannot be retrieved.
    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError>;

    /// Write a UTF-8 file, creating intermediate directories.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::StaleWrite`] when a content-hash precondition
    /// fails, or another [`StorageError`] on backend failure.
    fn write_file(
        &self,
        path: &str,
        content: &str,
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError>;

    /// Write a binary file, creating intermediate directories.
    ///
    /// # Errors
    ///
    /// Same as [`write_file`](Storage::write_file).
    fn write_binary_file(
        &self,
        path: &str,
        content: &[u8],
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError>;

    /// Delete a single file.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::NotFound`] if the file does not exist.
    fn delete_file(&self, path: &str, message: Option<&str>) -> Result<(), StorageError>;

    /// Delete a directory and everything below it.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::NotFound`] if the directory does not exist
    /// (or, on backends without real directories, contains no files).
    fn delete_directory(&self, path: &str, message: Option<&str>) -> Result<(), StorageError>;

    /// Create a directory and its parents.
    ///
    /// Default implementation is a no-op for backends with no native directory
    /// concept; directories then appear once a file is written below them.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if the directory cannot be created.
    fn create_directory(&self, path: &str) -> Result<(), StorageError> {
        crate::normalize_path(path)?;
        Ok(())
    }

    /// Apply an ordered list of operations as one change set.
    ///
    /// Returns one [`WriteResult`] per operation, in input order. An empty list
    /// is a no-op.
    ///
    /// # Errors
    ///
    /// Returns [`StorageError`] if any operation fails. Whether earlier
    /// operations remain applied depends on the backend (see trait docs).
    fn batch_write(
        &self,
        operations: &[BatchOperation],
        message: &str,
    ) -> Result<Vec<WriteResult>, StorageError>;
}
