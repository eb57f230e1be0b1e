//! Collection registry entries.

use folio_storage::join_path;
use serde::Serialize;

/// Default front-matter field used to derive slugs.
pub const DEFAULT_SLUG_FIELD: &str = "title";

/// Entry document name inside a slug directory.
pub const INDEX_FILE: &str = "index.md";

/// Asset directory name inside a slug directory.
pub const IMAGES_DIR: &str = "images";

/// A named group of entries stored under one base path.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Collection {
    /// Registry name.
    pub name: String,
    /// Base path relative to the storage root.
    pub path: String,
    /// Front-matter field the slug is derived from.
    pub slug_field: String,
}

impl Collection {
    /// Create a collection with the default slug field.
    #[must_use]
    pub fn new(name: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            path: path.into(),
            slug_field: DEFAULT_SLUG_FIELD.to_owned(),
        }
    }

    /// Set the slug field.
    #[must_use]
    pub fn with_slug_field(mut self, field: impl Into<String>) -> Self {
        self.slug_field = field.into();
        self
    }

    /// Directory of the entry with this slug.
    #[must_use]
    pub fn entry_dir(&self, slug: &str) -> String {
        join_path(&self.path, slug)
    }

    /// Path of the entry document.
    #[must_use]
    pub fn document_path(&self, slug: &str) -> String {
        join_path(&self.entry_dir(slug), INDEX_FILE)
    }

    /// Path of the entry's asset directory.
    #[must_use]
    pub fn images_dir(&self, slug: &str) -> String {
        join_path(&self.entry_dir(slug), IMAGES_DIR)
    }
}
