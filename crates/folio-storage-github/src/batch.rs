//! Atomic multi-file commits.
//!
//! The contents endpoint creates one commit per file. To publish several
//! changes at once the adapter builds the commit itself:
//!
//! 1. read the branch ref, its commit and the recursive tree (the snapshot)
//! 2. create blobs for binary content
//! 3. create a tree on top of the snapshot tree
//! 4. create a commit whose parent is the snapshot head
//! 5. move the branch ref to it without force
//!
//! Only step 5 is visible to readers. If anything fails before it, the
//! objects created so far are unreachable and the branch is untouched.

use std::collections::{HashMap, HashSet};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::{Value, json};
use tracing::{info, warn};

use folio_storage::{
    BatchOperation, FileContent, RemoteApiError, StorageError, StorageErrorKind, WriteResult,
    normalize_path,
};

use crate::blob::git_blob_sha;
use crate::error::{BACKEND, TruncatedTree, error_message, is_stale};
use crate::storage::GitHubStorage;
use crate::transport::{ApiRequest, Method};
use crate::types::{GitCommit, GitRef, GitTree, ObjectRef};

/// Mode of a regular file.
const FILE_MODE: &str = "100644";

/// Branch state a batch is built on.
#[derive(Debug)]
pub(crate) struct Snapshot {
    /// Head commit SHA.
    pub head: String,
    /// Root tree SHA of the head commit.
    pub tree: String,
    /// Files of the tree by repository path: `(mode, blob sha)`.
    pub files: HashMap<String, (String, String)>,
}

/// A batch operation resolved against the snapshot.
struct Resolved<'a> {
    local: String,
    remote: String,
    op: &'a BatchOperation,
}

impl GitHubStorage {
    /// Apply `operations` as a single commit on the configured branch.
    ///
    /// Either every operation becomes visible with one ref update or none
    /// does. Returns one [`WriteResult`] per operation, in input order, all
    /// carrying the new commit id.
    ///
    /// # Errors
    ///
    /// - [`StorageErrorKind::InvalidPath`] if a path appears twice
    /// - [`StorageErrorKind::NotFound`] if a delete targets a missing file
    /// - [`StorageErrorKind::StaleWrite`] if the branch moved while the batch
    ///   was being built
    /// - [`StorageErrorKind::Other`] if the API truncated the tree listing
    /// - any other [`StorageError`] from the API
    pub fn commit_batch(
        &self,
        operations: &[BatchOperation],
        message: &str,
    ) -> Result<Vec<WriteResult>, StorageError> {
        if operations.is_empty() {
            return Ok(Vec::new());
        }
        let snapshot = self.snapshot()?;
        self.commit_on(&snapshot, operations, message)
    }

    /// Delete every file below `dir` in one commit.
    ///
    /// Files are enumerated from the same snapshot the commit is built on, so
    /// a concurrent push between listing and commit fails with
    /// [`StorageErrorKind::StaleWrite`] instead of leaving new files behind.
    pub(crate) fn delete_tree(&self, dir: &str, message: &str) -> Result<(), StorageError> {
        let snapshot = self.snapshot()?;
        let prefix = format!("{}/", self.remote_path(dir));

        let mut paths: Vec<String> = snapshot
            .files
            .keys()
            .filter(|path| path.starts_with(&prefix))
            .map(|path| self.local_path(path))
            .collect();
        if paths.is_empty() {
            return Err(StorageError::not_found(dir).with_backend(BACKEND));
        }
        paths.sort();

        let operations: Vec<BatchOperation> =
            paths.into_iter().map(BatchOperation::delete).collect();
        self.commit_on(&snapshot, &operations, message)?;
        self.cache.remove_prefix(dir);
        info!(path = dir, files = operations.len(), "Deleted directory");
        Ok(())
    }

    /// Read the branch head, its commit and its recursive tree.
    ///
    /// Fails when the API reports the listing as truncated, since every
    /// caller needs the complete file set.
    pub(crate) fn snapshot(&self) -> Result<Snapshot, StorageError> {
        let branch = &self.options.branch;

        let request = ApiRequest::get(self.repo_path(&format!("/git/ref/heads/{branch}")));
        let head = self.send_ok(&request, "")?.json::<GitRef>()?.object.sha;

        let request = ApiRequest::get(self.repo_path(&format!("/git/commits/{head}")));
        let commit: GitCommit = self.send_ok(&request, "")?.json()?;

        let request = ApiRequest::get(self.repo_path(&format!("/git/trees/{}", commit.tree.sha)))
            .with_query("recursive", "1");
        let tree: GitTree = self.send_ok(&request, "")?.json()?;
        if tree.truncated {
            warn!(tree = %commit.tree.sha, "Recursive tree listing truncated");
            return Err(StorageError::new(StorageErrorKind::Other)
                .with_source(TruncatedTree {
                    tree: commit.tree.sha,
                })
                .with_backend(BACKEND));
        }

        let files = tree
            .tree
            .into_iter()
            .filter(|entry| entry.kind == "blob")
            .map(|entry| (entry.path, (entry.mode, entry.sha)))
            .collect();

        Ok(Snapshot {
            head: commit.sha,
            tree: commit.tree.sha,
            files,
        })
    }

    /// Build and publish a commit applying `operations` on top of `snapshot`.
    pub(crate) fn commit_on(
        &self,
        snapshot: &Snapshot,
        operations: &[BatchOperation],
        message: &str,
    ) -> Result<Vec<WriteResult>, StorageError> {
        let resolved = self.resolve(snapshot, operations)?;

        let mut entries = Vec::with_capacity(resolved.len());
        for item in &resolved {
            entries.push(self.tree_entry(snapshot, item)?);
        }

        let request = ApiRequest::new(Method::Post, self.repo_path("/git/trees"))
            .with_body(json!({ "base_tree": snapshot.tree, "tree": entries }));
        let tree: ObjectRef = self.send_ok(&request, "")?.json()?;

        let request = ApiRequest::new(Method::Post, self.repo_path("/git/commits")).with_body(
            json!({ "message": message, "tree": tree.sha, "parents": [snapshot.head] }),
        );
        let commit: ObjectRef = self.send_ok(&request, "")?.json()?;

        self.update_ref(&commit.sha)?;

        let results = resolved
            .iter()
            .map(|item| match item.op.content() {
                Some(content) => {
                    let sha = git_blob_sha(content.as_bytes());
                    self.cache.insert(&item.local, &sha);
                    WriteResult::new(&item.local)
                        .with_content_hash(sha)
                        .with_commit_id(&commit.sha)
                }
                None => {
                    self.cache.remove(&item.local);
                    WriteResult::new(&item.local).with_commit_id(&commit.sha)
                }
            })
            .collect();

        info!(
            commit = %commit.sha,
            operations = resolved.len(),
            "Committed batch"
        );
        Ok(results)
    }

    /// Normalize paths and check preconditions before any object is created.
    fn resolve<'a>(
        &self,
        snapshot: &Snapshot,
        operations: &'a [BatchOperation],
    ) -> Result<Vec<Resolved<'a>>, StorageError> {
        let mut seen = HashSet::with_capacity(operations.len());
        let mut resolved = Vec::with_capacity(operations.len());

        for op in operations {
            let local = normalize_path(op.path())?;
            if local.is_empty() {
                return Err(invalid_path(op.path()));
            }
            if !seen.insert(local.clone()) {
                return Err(invalid_path(&local));
            }
            let remote = self.remote_path(&local);
            if op.content().is_none() && !snapshot.files.contains_key(&remote) {
                return Err(StorageError::not_found(local).with_backend(BACKEND));
            }
            resolved.push(Resolved { local, remote, op });
        }
        Ok(resolved)
    }

    fn tree_entry(&self, snapshot: &Snapshot, item: &Resolved<'_>) -> Result<Value, StorageError> {
        let mode = snapshot
            .files
            .get(&item.remote)
            .map_or(FILE_MODE, |(mode, _)| mode.as_str());

        let entry = match item.op.content() {
            None => json!({ "path": item.remote, "mode": mode, "type": "blob", "sha": null }),
            Some(FileContent::Text(text)) => {
                json!({ "path": item.remote, "mode": mode, "type": "blob", "content": text })
            }
            Some(FileContent::Binary(bytes)) => {
                let sha = self.create_blob(bytes, &item.local)?;
                json!({ "path": item.remote, "mode": mode, "type": "blob", "sha": sha })
            }
        };
        Ok(entry)
    }

    fn create_blob(&self, bytes: &[u8], path: &str) -> Result<String, StorageError> {
        let request = ApiRequest::new(Method::Post, self.repo_path("/git/blobs"))
            .with_body(json!({ "content": BASE64.encode(bytes), "encoding": "base64" }));
        let blob: ObjectRef = self.send_ok(&request, path)?.json()?;
        Ok(blob.sha)
    }

    fn update_ref(&self, commit: &str) -> Result<(), StorageError> {
        let branch = &self.options.branch;
        let request = ApiRequest::new(
            Method::Patch,
            self.repo_path(&format!("/git/refs/heads/{branch}")),
        )
        .with_body(json!({ "sha": commit, "force": false }));

        let response = self.send(&request)?;
        if is_stale(&response) {
            warn!(branch = %branch, "Branch moved while building batch");
            return Err(StorageError::new(StorageErrorKind::StaleWrite)
                .with_backend(BACKEND)
                .with_source(RemoteApiError {
                    status: response.status,
                    message: error_message(&response),
                }));
        }
        if !response.is_success() {
            return Err(crate::error::response_error(&response));
        }
        Ok(())
    }
}

fn invalid_path(path: &str) -> StorageError {
    StorageError::new(StorageErrorKind::InvalidPath)
        .with_path(path)
        .with_backend(BACKEND)
}

#[cfg(test)]
mod tests {
    use pretty_assertions::assert_eq;

    use folio_storage::Storage;

    use super::*;
    use crate::mock::MockGitHub;
    use crate::storage::GitHubOptions;
    use crate::transport::{ApiResponse, Transport};

    fn storage(mock: &MockGitHub) -> GitHubStorage {
        GitHubStorage::new(
            GitHubOptions::new("acme", "site").with_content_path("content"),
            mock.clone(),
        )
        .unwrap()
    }

    /// Reports every recursive tree listing as truncated, leaving out `hidden`.
    struct TruncatingTransport {
        inner: MockGitHub,
        hidden: String,
    }

    impl Transport for TruncatingTransport {
        fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StorageError> {
            let mut response = self.inner.send(request)?;
            if request.method == Method::Get && request.query_param("recursive").is_some() {
                let mut body: Value = serde_json::from_str(&response.body).unwrap();
                body["truncated"] = json!(true);
                if let Some(entries) = body["tree"].as_array_mut() {
                    entries.retain(|entry| entry["path"] != self.hidden.as_str());
                }
                response.body = body.to_string();
            }
            Ok(response)
        }
    }

    fn truncating_storage(mock: &MockGitHub, hidden: &str) -> GitHubStorage {
        GitHubStorage::new(
            GitHubOptions::new("acme", "site").with_content_path("content"),
            TruncatingTransport {
                inner: mock.clone(),
                hidden: hidden.to_owned(),
            },
        )
        .unwrap()
    }

    fn slug_with_images() -> MockGitHub {
        MockGitHub::new("acme", "site", "main")
            .with_file("content/posts/a/index.md", "a")
            .with_file("content/posts/a/images/1.png", "1")
            .with_file("content/posts/a/images/2.png", "2")
    }

    #[test]
    fn test_batch_is_one_commit() {
        let mock = MockGitHub::new("acme", "site", "main").with_file("content/old.md", "old");
        let storage = storage(&mock);
        let commits = mock.commit_count();

        let results = storage
            .batch_write(
                &[
                    BatchOperation::create("posts/a/index.md", "a"),
                    BatchOperation::create_binary("posts/a/images/x.png", vec![1_u8, 2, 3]),
                    BatchOperation::delete("old.md"),
                ],
                "publish",
            )
            .unwrap();

        assert_eq!(mock.commit_count(), commits + 1);
        assert_eq!(mock.last_commit_message(), "publish");
        assert_eq!(mock.file("content/posts/a/index.md").as_deref(), Some(b"a".as_slice()));
        assert_eq!(
            mock.file("content/posts/a/images/x.png"),
            Some(vec![1_u8, 2, 3])
        );
        assert!(mock.file("content/old.md").is_none());

        let paths: Vec<&str> = results.iter().map(|r| r.path.as_str()).collect();
        assert_eq!(paths, vec!["posts/a/index.md", "posts/a/images/x.png", "old.md"]);
        let head = mock.head();
        assert!(results.iter().all(|r| r.commit_id.as_deref() == Some(head.as_str())));
    }

    #[test]
    fn test_batch_hashes_match_remote_blobs() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);

        let results = storage
            .batch_write(
                &[
                    BatchOperation::create("a.md", "alpha"),
                    BatchOperation::create_binary("b.bin", vec![0_u8, 255]),
                ],
                "two",
            )
            .unwrap();

        assert_eq!(results[0].content_hash, mock.file_sha("content/a.md"));
        assert_eq!(results[1].content_hash, mock.file_sha("content/b.bin"));
    }

    #[test]
    fn test_batch_refreshes_cache() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);
        storage
            .batch_write(
                &[
                    BatchOperation::create("a.md", "1"),
                    BatchOperation::create("b.md", "1"),
                ],
                "two",
            )
            .unwrap();

        mock.clear_requests();
        storage.write_file("a.md", "2", None).unwrap();

        assert_eq!(mock.requests(), vec!["PUT /repos/acme/site/contents/content/a.md"]);
    }

    #[test]
    fn test_failing_delete_leaves_branch_unchanged() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);
        let head = mock.head();

        let err = storage
            .batch_write(
                &[
                    BatchOperation::create("posts/a/index.md", "a"),
                    BatchOperation::delete("posts/missing.md"),
                ],
                "publish",
            )
            .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::NotFound);
        assert_eq!(mock.head(), head);
        assert!(mock.file("content/posts/a/index.md").is_none());
        assert!(
            mock.requests()
                .iter()
                .all(|r| !r.starts_with("POST"))
        );
    }

    #[test]
    fn test_remote_failure_mid_batch_leaves_branch_unchanged() {
        let mock = MockGitHub::new("acme", "site", "main");
        mock.fail_on(Method::Post, "/git/commits", 500, "Server Error");
        let storage = storage(&mock);
        let head = mock.head();

        let err = storage
            .batch_write(
                &[
                    BatchOperation::create("a.md", "a"),
                    BatchOperation::create("b.md", "b"),
                ],
                "publish",
            )
            .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::RemoteApi);
        assert_eq!(mock.head(), head);
        assert!(mock.file("content/a.md").is_none());
        assert!(mock.file("content/b.md").is_none());
    }

    #[test]
    fn test_duplicate_paths_rejected() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);

        let err = storage
            .batch_write(
                &[
                    BatchOperation::create("a.md", "1"),
                    BatchOperation::update("./a.md", "2"),
                ],
                "dup",
            )
            .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
    }

    #[test]
    fn test_concurrent_push_is_stale() {
        let mock = MockGitHub::new("acme", "site", "main");
        mock.simulate_concurrent_push("content/other.md", "theirs");
        let storage = storage(&mock);

        let err = storage
            .batch_write(
                &[
                    BatchOperation::create("a.md", "a"),
                    BatchOperation::create("b.md", "b"),
                ],
                "publish",
            )
            .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::StaleWrite);
        assert!(mock.file("content/a.md").is_none());
        assert_eq!(mock.file("content/other.md").as_deref(), Some(b"theirs".as_slice()));
    }

    #[test]
    fn test_delete_directory_removes_all_descendants() {
        let mock = MockGitHub::new("acme", "site", "main")
            .with_file("content/posts/a/index.md", "a")
            .with_file("content/posts/a/images/1.png", "1")
            .with_file("content/posts/a/images/2.png", "2")
            .with_file("content/posts/ab/index.md", "ab");
        let storage = storage(&mock);
        let commits = mock.commit_count();

        storage.delete_directory("posts/a", None).unwrap();

        assert_eq!(mock.commit_count(), commits + 1);
        assert_eq!(mock.last_commit_message(), "Delete posts/a");
        assert!(mock.file("content/posts/a/index.md").is_none());
        assert!(mock.file("content/posts/a/images/1.png").is_none());
        assert!(mock.file("content/posts/a/images/2.png").is_none());
        assert!(mock.file("content/posts/ab/index.md").is_some());
        assert!(!storage.exists("posts/a").unwrap());
    }

    #[test]
    fn test_delete_directory_missing_is_not_found() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);

        let err = storage.delete_directory("posts/nope", None).unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::NotFound);
    }

    #[test]
    fn test_delete_directory_root_rejected() {
        let mock = MockGitHub::new("acme", "site", "main").with_file("content/a.md", "a");
        let storage = storage(&mock);

        let err = storage.delete_directory("", None).unwrap_err();
        assert_eq!(err.kind, StorageErrorKind::InvalidPath);
    }

    #[test]
    fn test_delete_directory_with_concurrent_push_is_stale() {
        let mock = MockGitHub::new("acme", "site", "main")
            .with_file("content/posts/a/index.md", "a");
        mock.simulate_concurrent_push("content/posts/a/images/new.png", "late");
        let storage = storage(&mock);

        let err = storage.delete_directory("posts/a", None).unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::StaleWrite);
        assert!(mock.file("content/posts/a/index.md").is_some());
        assert!(mock.file("content/posts/a/images/new.png").is_some());
    }

    #[test]
    fn test_commit_batch_single_operation_is_atomic_commit() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = storage(&mock);

        let results = storage
            .commit_batch(&[BatchOperation::create("a.md", "a")], "one")
            .unwrap();

        assert_eq!(results.len(), 1);
        assert!(
            mock.requests()
                .iter()
                .any(|r| r == "PATCH /repos/acme/site/git/refs/heads/main")
        );
    }

    #[test]
    fn test_delete_directory_on_truncated_tree_changes_nothing() {
        let mock = slug_with_images();
        let storage = truncating_storage(&mock, "content/posts/a/images/2.png");
        let head = mock.head();

        let err = storage.delete_directory("posts/a", None).unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::Other);
        assert!(err.downcast_source::<TruncatedTree>().is_some());
        assert_eq!(mock.head(), head);
        assert!(mock.file("content/posts/a/index.md").is_some());
        assert!(mock.file("content/posts/a/images/1.png").is_some());
        assert!(mock.file("content/posts/a/images/2.png").is_some());
    }

    #[test]
    fn test_batch_on_truncated_tree_is_not_reported_missing() {
        let mock = slug_with_images();
        let storage = truncating_storage(&mock, "content/posts/a/images/2.png");
        let head = mock.head();

        let err = storage
            .batch_write(
                &[
                    BatchOperation::update("posts/a/index.md", "new"),
                    BatchOperation::delete("posts/a/images/2.png"),
                ],
                "publish",
            )
            .unwrap_err();

        assert_eq!(err.kind, StorageErrorKind::Other);
        assert!(err.downcast_source::<TruncatedTree>().is_some());
        assert_eq!(mock.head(), head);
        assert_eq!(mock.file("content/posts/a/index.md").as_deref(), Some(b"a".as_slice()));
        assert!(mock.file("content/posts/a/images/2.png").is_some());
    }
}
