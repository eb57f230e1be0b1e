//! Mapping of API responses to storage errors.

use folio_storage::{ErrorStatus, RemoteApiError, StorageError, StorageErrorKind};

use crate::transport::ApiResponse;
use crate::types::ErrorBody;

/// Backend identifier for error messages.
pub(crate) const BACKEND: &str = "GitHub";

/// A recursive tree listing the API cut short.
#[derive(Debug, thiserror::Error)]
#[error("recursive listing of tree {tree} was truncated")]
pub(crate) struct TruncatedTree {
    pub tree: String,
}

/// Extract the `message` field of an error body, falling back to the raw body.
pub(crate) fn error_message(response: &ApiResponse) -> String {
    serde_json::from_str::<ErrorBody>(&response.body)
        .map(|b| b.message)
        .unwrap_or_else(|_| response.body.trim().to_owned())
}

/// Convert a non-success response into a [`StorageError`].
///
/// - 403/429 with an exhausted quota → [`StorageErrorKind::RateLimited`]
/// - 5xx → [`StorageErrorKind::RemoteApi`], retry with backoff
/// - anything else → [`StorageErrorKind::RemoteApi`], permanent
pub(crate) fn response_error(response: &ApiResponse) -> StorageError {
    let source = RemoteApiError {
        status: response.status,
        message: error_message(response),
    };
    let exhausted =
        matches!(response.status, 403 | 429) && response.rate_limit_remaining == Some(0);

    let (kind, status) = if exhausted {
        (StorageErrorKind::RateLimited, ErrorStatus::Persistent)
    } else if response.status >= 500 {
        (StorageErrorKind::RemoteApi, ErrorStatus::Persistent)
    } else {
        (StorageErrorKind::RemoteApi, ErrorStatus::Permanent)
    };

    StorageError::new(kind)
        .with_status(status)
        .with_source(source)
        .with_backend(BACKEND)
}

/// True when the remote rejected a write because its hash precondition no
/// longer holds.
///
/// The contents endpoint answers 409 for a mismatched SHA and 422 when an
/// existing file is written without one; ref updates answer 422 when the
/// update is not a fast forward.
pub(crate) fn is_stale(response: &ApiResponse) -> bool {
    match response.status {
        409 => true,
        422 => {
            let message = error_message(response).to_lowercase();
            message.contains("sha") || message.contains("fast forward")
        }
        _ => false,
    }
}
