//! Content entry management for the folio content store.
//!
//! [`ContentManager`] layers entry semantics over any
//! [`Storage`](folio_storage::Storage) backend:
//!
//! - **Listing** with search, locale-aware sorting and pagination
//! - **Lifecycle** (create, update, delete) with slugs derived from a field
//! - **Assets** stored next to each entry under `images/`
//!
//! # Layout
//!
//! ```text
//! {collection}/{slug}/index.md      # YAML front-matter + markdown
//! {collection}/{slug}/images/*      # uploaded assets
//! ```
//!
//! `createdAt` and `updatedAt` live in the front-matter, so both backends
//! report the same lifecycle timestamps.

mod collection;
mod entry;
mod error;
pub mod front_matter;
mod manager;
mod slug;
mod sort;

pub use collection::{Collection, DEFAULT_SLUG_FIELD, IMAGES_DIR, INDEX_FILE};
pub use entry::{
    CREATED_AT, Entry, EntryData, EntryLoad, EntryPage, ListOptions, SortOrder, UPDATED_AT,
};
pub use error::ContentError;
pub use manager::ContentManager;
pub use slug::{sanitize_image_name, slugify};
