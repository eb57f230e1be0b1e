//! Content layer errors.

use folio_storage::{StorageError, StorageErrorKind};

/// Error raised by [`ContentManager`](crate::ContentManager) operations.
#[derive(Debug, thiserror::Error)]
pub enum ContentError {
    /// No collection is registered under this name.
    #[error("Unknown collection: {0}")]
    CollectionNotFound(String),

    /// The entry does not exist.
    #[error("Entry not found: {collection}/{slug}")]
    EntryNotFound {
        /// Collection name.
        collection: String,
        /// Entry slug.
        slug: String,
    },

    /// The image does not exist.
    #[error("Image not found: {collection}/{slug}/images/{name}")]
    ImageNotFound {
        /// Collection name.
        collection: String,
        /// Entry slug.
        slug: String,
        /// Image file name.
        name: String,
    },

    /// An entry with this slug already exists.
    #[error("Entry already exists: {collection}/{slug}")]
    AlreadyExists {
        /// Collection name.
        collection: String,
        /// Entry slug.
        slug: String,
    },

    /// The slug field is missing or slugifies to an empty string.
    #[error("Field `{field}` does not produce a slug")]
    EmptySlug {
        /// Name of the slug field.
        field: String,
    },

    /// A slug that is not a single path segment.
    #[error("Invalid slug: {0}")]
    InvalidSlug(String),

    /// An image name that is not a plain file name.
    #[error("Invalid file name: {0}")]
    InvalidFileName(String),

    /// The document front-matter could not be parsed or written.
    #[error("Invalid front-matter in {path}: {message}")]
    FrontMatter {
        /// Document path.
        path: String,
        /// Parser message.
        message: String,
    },

    /// Storage backend error.
    #[error(transparent)]
    Storage(#[from] StorageError),
}

impl ContentError {
    /// True for errors meaning "does not exist", including storage `NotFound`.
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        match self {
            Self::CollectionNotFound(_) | Self::EntryNotFound { .. } | Self::ImageNotFound { .. } => {
                true
            }
            Self::Storage(e) => e.kind == StorageErrorKind::NotFound,
            _ => false,
        }
    }

    /// Storage error kind, if this error came from the backend.
    #[must_use]
    pub fn storage_kind(&self) -> Option<StorageErrorKind> {
        match self {
            Self::Storage(e) => Some(e.kind),
            _ => None,
        }
    }
}
