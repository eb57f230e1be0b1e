//! Working tree status and commit history read through libgit2.

use chrono::{DateTime, Utc};
use git2::{Commit, Repository, Status, StatusEntry as GitStatusEntry, StatusOptions};
use serde::Serialize;

use crate::outcome::VersioningFailure;

/// One changed path in the working tree or index.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct StatusEntry {
    /// Two-letter porcelain code (index, worktree), e.g. `"M "` or `"??"`.
    pub code: String,
    /// Path relative to the repository root.
    pub path: String,
}

impl StatusEntry {
    fn from_git(entry: &GitStatusEntry<'_>) -> Self {
        Self {
            code: porcelain_code(entry.status()),
            path: String::from_utf8_lossy(entry.path_bytes()).into_owned(),
        }
    }
}

/// Working tree state.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize)]
pub struct RepoStatus {
    /// Current branch, if not detached.
    pub branch: Option<String>,
    /// Changed, staged and untracked paths.
    pub entries: Vec<StatusEntry>,
}

impl RepoStatus {
    /// True when nothing is modified, staged or untracked.
    #[must_use]
    pub fn is_clean(&self) -> bool {
        self.entries.is_empty()
    }

    pub(crate) fn read(repo: &Repository) -> Result<Self, VersioningFailure> {
        let mut options = StatusOptions::new();
        options
            .include_untracked(true)
            .recurse_untracked_dirs(true)
            .include_ignored(false);
        let statuses = repo.statuses(Some(&mut options))?;
        let entries = statuses
            .iter()
            .filter(|entry| !entry.status().is_ignored())
            .map(|entry| StatusEntry::from_git(&entry))
            .collect();

        Ok(Self {
            branch: current_branch(repo)?,
            entries,
        })
    }
}

/// Branch `HEAD` points at, including an unborn one.
fn current_branch(repo: &Repository) -> Result<Option<String>, VersioningFailure> {
    if repo.head_detached()? {
        return Ok(None);
    }
    let head = repo.find_reference("HEAD")?;
    Ok(head
        .symbolic_target()
        .and_then(|target| target.strip_prefix("refs/heads/"))
        .map(str::to_owned))
}

fn porcelain_code(status: Status) -> String {
    if status.is_conflicted() {
        return "UU".to_owned();
    }
    if status == Status::WT_NEW {
        return "??".to_owned();
    }

    let index = if status.is_index_new() {
        'A'
    } else if status.is_index_modified() {
        'M'
    } else if status.is_index_deleted() {
        'D'
    } else if status.is_index_renamed() {
        'R'
    } else if status.is_index_typechange() {
        'T'
    } else {
        ' '
    };
    let worktree = if status.is_wt_modified() {
        'M'
    } else if status.is_wt_deleted() {
        'D'
    } else if status.is_wt_renamed() {
        'R'
    } else if status.is_wt_typechange() {
        'T'
    } else {
        ' '
    };
    [index, worktree].iter().collect()
}

/// One commit of the branch history.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CommitInfo {
    /// Full commit SHA.
    pub id: String,
    /// Author name.
    pub author_name: String,
    /// Author email.
    pub author_email: String,
    /// Author date.
    pub date: DateTime<Utc>,
    /// First line of the message.
    pub summary: String,
}

impl CommitInfo {
    pub(crate) fn from_commit(commit: &Commit<'_>) -> Result<Self, VersioningFailure> {
        let id = commit.id().to_string();
        let author = commit.author();
        let seconds = author.when().seconds();
        let Some(date) = DateTime::from_timestamp(seconds, 0) else {
            return Err(VersioningFailure::InvalidCommit {
                id,
                reason: format!("author time {seconds} out of range"),
            });
        };

        Ok(Self {
            author_name: String::from_utf8_lossy(author.name_bytes()).into_owned(),
            author_email: String::from_utf8_lossy(author.email_bytes()).into_owned(),
            date,
            summary: commit
                .summary_bytes()
                .map(|s| String::from_utf8_lossy(s).into_owned())
                .unwrap_or_default(),
            id,
        })
    }
}
