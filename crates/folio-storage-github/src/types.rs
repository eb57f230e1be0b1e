//! GitHub API response types.
//!
//! Only includes fields that are actually used.
//! Serde ignores unknown fields from the API response.

use chrono::{DateTime, Utc};
use serde::Deserialize;

/// Response of the contents endpoint: a file object or a directory listing.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub(crate) enum ContentsResponse {
    Directory(Vec<ContentItem>),
    File(ContentItem),
}

/// Item kind reported by the contents endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub(crate) enum ContentKind {
    File,
    Dir,
    Symlink,
    Submodule,
}

/// File or directory entry from the contents endpoint.
#[derive(Debug, Deserialize)]
pub(crate) struct ContentItem {
    pub name: String,
    pub path: String,
    pub sha: String,
    #[serde(rename = "type")]
    pub kind: ContentKind,
    #[serde(default)]
    pub size: Option<u64>,
    /// Base64 payload; only present when fetching a single file.
    #[serde(default)]
    pub content: Option<String>,
    /// `"base64"`, or `"none"` for files too large to inline.
    #[serde(default)]
    pub encoding: Option<String>,
}

/// Reference to a git object.
#[derive(Debug, Deserialize)]
pub(crate) struct ObjectRef {
    pub sha: String,
}

/// Response of a contents PUT.
#[derive(Debug, Deserialize)]
pub(crate) struct PutContentsResponse {
    pub content: Option<ObjectRef>,
    pub commit: ObjectRef,
}

/// Response of a contents DELETE.
#[derive(Debug, Deserialize)]
pub(crate) struct DeleteContentsResponse {
    pub commit: ObjectRef,
}

/// Branch reference.
#[derive(Debug, Deserialize)]
pub(crate) struct GitRef {
    pub object: ObjectRef,
}

/// Commit object.
#[derive(Debug, Deserialize)]
pub(crate) struct GitCommit {
    pub sha: String,
    pub tree: ObjectRef,
}

/// Tree listing.
#[derive(Debug, Deserialize)]
pub(crate) struct GitTree {
    pub tree: Vec<GitTreeEntry>,
    #[serde(default)]
    pub truncated: bool,
}

/// Entry of a tree listing; `kind` is `"blob"`, `"tree"` or `"commit"`.
#[derive(Debug, Deserialize)]
pub(crate) struct GitTreeEntry {
    pub path: String,
    pub mode: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub sha: String,
}

/// Blob with base64 payload.
#[derive(Debug, Deserialize)]
pub(crate) struct GitBlob {
    pub content: String,
}

/// Item of the commits-by-path listing.
#[derive(Debug, Deserialize)]
pub(crate) struct CommitListItem {
    pub commit: CommitDetail,
}

#[derive(Debug, Deserialize)]
pub(crate) struct CommitDetail {
    pub committer: Option<Signature>,
    pub author: Option<Signature>,
}

impl CommitDetail {
    pub(crate) fn date(&self) -> Option<DateTime<Utc>> {
        self.committer
            .as_ref()
            .or(self.author.as_ref())
            .map(|s| s.date)
    }
}

#[derive(Debug, Deserialize)]
pub(crate) struct Signature {
    pub date: DateTime<Utc>,
}

/// Error payload.
#[derive(Debug, Deserialize)]
pub(crate) struct ErrorBody {
    pub message: String,
}
