//! Versioning outcomes.

use std::path::PathBuf;

/// Why a version-control operation did not succeed.
#[derive(Debug, thiserror::Error)]
pub enum VersioningFailure {
    /// The configured directory is not a git working tree.
    #[error("not a git repository: {}", .0.display())]
    NotARepository(PathBuf),

    /// The repository has no working tree to stage from.
    #[error("bare repository has no working tree: {}", .0.display())]
    BareRepository(PathBuf),

    /// The configured remote does not exist.
    #[error("remote not found: {0}")]
    RemoteNotFound(String),

    /// The local branch has diverged from the remote one.
    #[error("{remote}/{branch} cannot be fast-forwarded")]
    NotFastForward {
        /// Remote name.
        remote: String,
        /// Branch name.
        branch: String,
    },

    /// The remote refused the pushed reference.
    #[error("push rejected: {0}")]
    PushRejected(String),

    /// A commit could not be read back.
    #[error("invalid commit {id}: {reason}")]
    InvalidCommit {
        /// Commit id.
        id: String,
        /// What was wrong with it.
        reason: String,
    },

    /// Any other libgit2 error.
    #[error("git: {0}")]
    Git(#[from] git2::Error),
}

/// Result of a version-control operation, returned as a value.
#[derive(Debug)]
#[must_use]
pub enum VcsOutcome<T> {
    /// The operation completed.
    Success(T),
    /// The operation failed; nothing was rolled back.
    Failure(VersioningFailure),
}

impl<T> VcsOutcome<T> {
    /// True for [`VcsOutcome::Success`].
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Success(_))
    }

    /// The success value, if any.
    pub fn success(self) -> Option<T> {
        match self {
            Self::Success(value) => Some(value),
            Self::Failure(_) => None,
        }
    }

    /// The failure, if any.
    pub fn failure(&self) -> Option<&VersioningFailure> {
        match self {
            Self::Success(_) => None,
            Self::Failure(failure) => Some(failure),
        }
    }

    /// Map the success value.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> VcsOutcome<U> {
        match self {
            Self::Success(value) => VcsOutcome::Success(f(value)),
            Self::Failure(failure) => VcsOutcome::Failure(failure),
        }
    }

    /// Convert into a `Result`.
    ///
    /// # Errors
    ///
    /// Returns the [`VersioningFailure`] of a failed outcome.
    pub fn into_result(self) -> Result<T, VersioningFailure> {
        match self {
            Self::Success(value) => Ok(value),
            Self::Failure(failure) => Err(failure),
        }
    }
}

impl<T> From<Result<T, VersioningFailure>> for VcsOutcome<T> {
    fn from(result: Result<T, VersioningFailure>) -> Self {
        match result {
            Ok(value) => Self::Success(value),
            Err(failure) => Self::Failure(failure),
        }
    }
}
