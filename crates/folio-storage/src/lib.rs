//! Storage abstraction for the folio content store.
//!
//! This crate provides the [`Storage`] trait that every backend implements, so the
//! content layer can read, write, list and batch-mutate files without knowing
//! whether it talks to a local directory or a remote git-hosting API. This enables:
//!
//! - **Backend flexibility** (local filesystem, GitHub-style REST API)
//! - **Unit testing** without touching the real filesystem or network
//! - **One traversal check** shared by all backends ([`normalize_path`])
//!
//! # Architecture
//!
//! The crate provides:
//! - [`Storage`] trait and its contract types ([`DirectoryEntry`], [`FileMetadata`],
//!   [`WriteResult`], [`BatchOperation`])
//! - [`StorageError`] with semantic [`StorageErrorKind`] and retry [`ErrorStatus`]
//! - [`Action`] and [`MessageTemplate`] for commit messages
//! - [`MemoryStorage`] for testing (behind `mock` feature flag)
//!
//! # Example
//!
//! ```ignore
//! use folio_storage::{BatchOperation, Storage};
//!
//! fn publish(storage: &dyn Storage) -> Result<(), folio_storage::StorageError> {
//!     let ops = vec![
//!         BatchOperation::create("posts/a/index.md", "---\ntitle: A\n---\n"),
//!         BatchOperation::delete("posts/old/index.md"),
//!     ];
//!     storage.batch_write(&ops, "publish posts")?;
//!     Ok(())
//! }
//! ```

mod message;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod path;
mod storage;

pub use message::{Action, DEFAULT_MESSAGE_TEMPLATE, MessageTemplate};
#[cfg(any(test, feature = "mock"))]
pub use mock::MemoryStorage;
pub use path::{file_name, join_path, normalize_path, parent_path};
pub use storage::{
    BatchKind, BatchOperation, DirectoryEntry, ErrorStatus, FileContent, FileMetadata,
    RemoteApiError, Storage, StorageError, StorageErrorKind, WriteResult,
};
