//! File-backed content store over local and remote git storage.
//!
//! This crate wires the folio crates together from a `folio.toml`:
//!
//! - [`folio_config`] loads and validates configuration
//! - [`folio_storage_fs`] or [`folio_storage_github`] provides the backend
//! - [`folio_content`] manages collections and entries on top of it
//! - [`folio_vcs`] commits local changes when auto-commit is enabled
//!
//! # Example
//!
//! ```ignore
//! use folio::{Folio, content::{EntryData, ListOptions}};
//!
//! let folio = Folio::open(None, None)?;
//! let created = folio.create_entry(
//!     "posts",
//!     EntryData::default().with_field("title", "Hello World"),
//!     None,
//! )?;
//! assert_eq!(created.value.slug, "hello-world");
//! let page = folio.list_entries("posts", &ListOptions::default())?;
//! ```

mod error;
mod store;

pub use error::FolioError;
pub use store::{Folio, Mutation};

pub use folio_config as config;
pub use folio_content as content;
pub use folio_storage as storage;
pub use folio_vcs as vcs;
