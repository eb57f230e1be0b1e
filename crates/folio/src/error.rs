//! Top-level error type.

use folio_config::ConfigError;
use folio_content::ContentError;
use folio_storage::StorageError;

/// Error raised while opening or using a [`Folio`](crate::Folio).
#[derive(Debug, thiserror::Error)]
pub enum FolioError {
    /// Configuration could not be loaded or is invalid.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// Content operation failed.
    #[error(transparent)]
    Content(#[from] ContentError),

    /// Storage backend could not be set up.
    #[error(transparent)]
    Storage(#[from] StorageError),
}
