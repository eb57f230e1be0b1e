//! GitHub storage backend for the folio content store.
//!
//! Implements [`Storage`](folio_storage::Storage) over one branch of a GitHub
//! repository through the REST API. The contents endpoint covers single-file
//! reads and writes; multi-file batches are published as one commit built from
//! git blobs, trees and a fast-forward ref update, so readers never observe a
//! half-applied batch.
//!
//! # Example
//!
//! ```ignore
//! use folio_storage::Storage;
//! use folio_storage_github::{GitHubOptions, GitHubStorage};
//!
//! let options = GitHubOptions::new("acme", "site").with_content_path("content");
//! let storage = GitHubStorage::connect(options, "https://api.github.com", Some(token))?;
//! let text = storage.read_file("posts/hello-world/index.md")?;
//! ```

mod batch;
mod blob;
mod cache;
mod error;
#[cfg(any(test, feature = "mock"))]
mod mock;
mod storage;
mod transport;
mod types;

pub use blob::git_blob_sha;
#[cfg(any(test, feature = "mock"))]
pub use mock::{INLINE_LIMIT, MockGitHub};
pub use storage::{GitHubOptions, GitHubStorage};
pub use transport::{ApiRequest, ApiResponse, Method, Transport, UreqTransport};
