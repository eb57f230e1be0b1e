//! Git commit orchestration for the folio content store.
//!
//! When content lives in a local working tree, each mutation can be recorded
//! as a commit. [`GitRepository`] stages the paths a mutation touched and
//! commits them with a message rendered from
//! [`MessageTemplate`](folio_storage::MessageTemplate).
//!
//! Operations never return `Err`: they return a [`VcsOutcome`], so a failed
//! commit is reported to the caller without undoing the content write that
//! preceded it.
//!
//! Staging, commits, status, history and fast-forward sync go through
//! libgit2 via the `git2` crate, so no `git` executable is needed.

mod outcome;
mod repository;
mod status;

pub use outcome::{VcsOutcome, VersioningFailure};
pub use repository::{Author, GitRepository};
pub use status::{CommitInfo, RepoStatus, StatusEntry};
