//! GitHub storage adapter.
//!
//! Single-file operations go through the contents endpoint with the previous
//! blob SHA as precondition. Multi-file batches are assembled from git objects
//! and published with one ref update (see `batch.rs`).

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::Utc;
use serde_json::json;
use tracing::{debug, info, warn};

use folio_storage::{
    BatchOperation, DirectoryEntry, FileContent, FileMetadata, Storage, StorageError,
    StorageErrorKind, WriteResult, join_path, normalize_path,
};

use crate::cache::HashCache;
use crate::error::{BACKEND, is_stale, response_error};
use crate::transport::{ApiRequest, ApiResponse, Method, Transport, UreqTransport};
use crate::types::{
    CommitListItem, ContentItem, ContentKind, ContentsResponse, DeleteContentsResponse, GitBlob,
    PutContentsResponse,
};

/// Default branch.
const DEFAULT_BRANCH: &str = "main";

/// Default remaining-quota level at which a warning is logged.
const DEFAULT_RATE_LIMIT_WARN_THRESHOLD: u64 = 10;

/// Page size of the commit history lookup used for metadata.
const HISTORY_PAGE_SIZE: u32 = 100;

/// Repository coordinates and adapter tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GitHubOptions {
    /// Repository owner (user or organization).
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Branch all reads and writes target.
    pub branch: String,
    /// Subpath of the repository that acts as content root (`""` for the
    /// repository root).
    pub content_path: String,
    /// Log a warning when `x-ratelimit-remaining` drops to this value.
    pub rate_limit_warn_threshold: u64,
}

impl GitHubOptions {
    /// Options for `owner/repo` on the default branch, rooted at the repository root.
    #[must_use]
    pub fn new(owner: impl Into<String>, repo: impl Into<String>) -> Self {
        Self {
            owner: owner.into(),
            repo: repo.into(),
            branch: DEFAULT_BRANCH.to_owned(),
            content_path: String::new(),
            rate_limit_warn_threshold: DEFAULT_RATE_LIMIT_WARN_THRESHOLD,
        }
    }

    /// Set the target branch.
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Set the content subpath.
    #[must_use]
    pub fn with_content_path(mut self, content_path: impl Into<String>) -> Self {
        self.content_path = content_path.into();
        self
    }

    /// Set the rate-limit warning threshold.
    #[must_use]
    pub fn with_rate_limit_warn_threshold(mut self, threshold: u64) -> Self {
        self.rate_limit_warn_threshold = threshold;
        self
    }
}

/// Storage backed by a branch of a GitHub repository.
///
/// Every mutation is a commit on the configured branch. Single-file writes
/// and deletes send the last known blob SHA as precondition, so a file changed
/// by someone else fails with [`StorageErrorKind::StaleWrite`] instead of
/// being overwritten. Known SHAs are kept in a cache owned by this instance.
///
/// [`batch_write`](Storage::batch_write) with two or more operations is atomic:
/// the branch ref moves once, or not at all.
pub struct GitHubStorage {
    pub(crate) transport: Box<dyn Transport>,
    pub(crate) options: GitHubOptions,
    pub(crate) cache: HashCache,
}

impl GitHubStorage {
    /// Create an adapter that talks through `transport`.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidPath`] if the content path is invalid.
    pub fn new(
        options: GitHubOptions,
        transport: impl Transport + 'static,
    ) -> Result<Self, StorageError> {
        let mut options = options;
        options.content_path = normalize_path(&options.content_path)?;
        Ok(Self {
            transport: Box::new(transport),
            options,
            cache: HashCache::default(),
        })
    }

    /// Create an adapter for the API at `api_url` using the `ureq` transport.
    ///
    /// # Errors
    ///
    /// Returns [`StorageErrorKind::InvalidPath`] if the content path is invalid.
    pub fn connect(
        options: GitHubOptions,
        api_url: &str,
        token: Option<String>,
    ) -> Result<Self, StorageError> {
        Self::new(options, UreqTransport::new(api_url, token))
    }

    /// Adapter options.
    #[must_use]
    pub fn options(&self) -> &GitHubOptions {
        &self.options
    }

    /// API path below the repository (`suffix` starts with `/`).
    pub(crate) fn repo_path(&self, suffix: &str) -> String {
        format!("/repos/{}/{}{}", self.options.owner, self.options.repo, suffix)
    }

    /// Repository path of a content-root-relative path.
    pub(crate) fn remote_path(&self, path: &str) -> String {
        join_path(&self.options.content_path, path)
    }

    /// Content-root-relative path of a repository path.
    pub(crate) fn local_path(&self, remote: &str) -> String {
        let prefix = &self.options.content_path;
        if prefix.is_empty() {
            return remote.to_owned();
        }
        remote
            .strip_prefix(prefix.as_str())
            .and_then(|rest| rest.strip_prefix('/'))
            .unwrap_or(remote)
            .to_owned()
    }

    fn contents_path(&self, path: &str) -> String {
        let remote = self.remote_path(path);
        if remote.is_empty() {
            self.repo_path("/contents")
        } else {
            self.repo_path(&format!("/contents/{remote}"))
        }
    }

    /// Send a request, logging when the remaining quota runs low.
    pub(crate) fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StorageError> {
        debug!(method = request.method.as_str(), path = %request.path, "GitHub request");
        let response = self
            .transport
            .send(request)
            .map_err(|e| e.with_backend(BACKEND))?;

        if let Some(remaining) = response.rate_limit_remaining
            && remaining <= self.options.rate_limit_warn_threshold
        {
            warn!(remaining, "GitHub API rate limit nearly exhausted");
        }
        Ok(response)
    }

    /// Send a request and fail on any non-success status.
    pub(crate) fn send_ok(
        &self,
        request: &ApiRequest,
        path: &str,
    ) -> Result<ApiResponse, StorageError> {
        let response = self.send(request)?;
        if response.is_success() {
            Ok(response)
        } else {
            Err(response_error(&response).with_path(path))
        }
    }

    fn get_contents(&self, path: &str) -> Result<Option<ContentsResponse>, StorageError> {
        let request =
            ApiRequest::get(self.contents_path(path)).with_query("ref", &self.options.branch);
        let response = self.send(&request)?;
        if response.status == 404 {
            return Ok(None);
        }
        if !response.is_success() {
            return Err(response_error(&response).with_path(path));
        }
        response.json().map(Some).map_err(|e| e.with_path(path))
    }

    /// Fetch the file item at `path`, caching its SHA.
    fn get_file_item(&self, path: &str) -> Result<Option<ContentItem>, StorageError> {
        match self.get_contents(path)? {
            Some(ContentsResponse::File(item)) if item.kind == ContentKind::File => {
                self.cache.insert(path, &item.sha);
                Ok(Some(item))
            }
            _ => Ok(None),
        }
    }

    fn decode_item(&self, item: &ContentItem, path: &str) -> Result<Vec<u8>, StorageError> {
        match (item.encoding.as_deref(), item.content.as_deref()) {
            (Some("base64"), Some(content)) => decode_base64(content, path),
            // Files above the inline limit come back with encoding "none".
            _ => self.read_blob(&item.sha, path),
        }
    }

    fn read_blob(&self, sha: &str, path: &str) -> Result<Vec<u8>, StorageError> {
        let request = ApiRequest::get(self.repo_path(&format!("/git/blobs/{sha}")));
        let blob: GitBlob = self.send_ok(&request, path)?.json()?;
        decode_base64(&blob.content, path)
    }

    /// Known SHA of `path`: from the cache, else one lookup.
    fn current_sha(&self, path: &str) -> Result<Option<String>, StorageError> {
        if let Some(sha) = self.cache.get(path) {
            return Ok(Some(sha));
        }
        Ok(self.get_file_item(path)?.map(|item| item.sha))
    }

    fn stale(&self, response: &ApiResponse, path: &str) -> StorageError {
        self.cache.remove(path);
        warn!(path, status = response.status, "Stale content hash");
        StorageError::stale_write(path)
            .with_backend(BACKEND)
            .with_source(folio_storage::RemoteApiError {
                status: response.status,
                message: crate::error::error_message(response),
            })
    }

    fn put_file(
        &self,
        path: &str,
        content: &[u8],
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        let path = normalize_path(path)?;
        let sha = self.current_sha(&path)?;
        let message = message.map_or_else(
            || {
                let verb = if sha.is_some() { "Update" } else { "Create" };
                format!("{verb} {path}")
            },
            str::to_owned,
        );

        let mut body = json!({
            "message": message,
            "content": BASE64.encode(content),
            "branch": self.options.branch,
        });
        if let Some(sha) = &sha {
            body["sha"] = json!(sha);
        }

        let request = ApiRequest::new(Method::Put, self.contents_path(&path)).with_body(body);
        let response = self.send(&request)?;
        if is_stale(&response) {
            return Err(self.stale(&response, &path));
        }
        if !response.is_success() {
            return Err(response_error(&response).with_path(path));
        }

        let put: PutContentsResponse = response.json()?;
        let mut result = WriteResult::new(&path).with_commit_id(&put.commit.sha);
        match put.content {
            Some(content) => {
                self.cache.insert(&path, &content.sha);
                result = result.with_content_hash(content.sha);
            }
            None => self.cache.remove(&path),
        }
        info!(path = %path, commit = %put.commit.sha, "Wrote file");
        Ok(result)
    }

    fn remove_file(&self, path: &str, message: Option<&str>) -> Result<String, StorageError> {
        let path = normalize_path(path)?;
        let Some(sha) = self.current_sha(&path)? else {
            return Err(StorageError::not_found(path).with_backend(BACKEND));
        };
        let message = message.map_or_else(|| format!("Delete {path}"), str::to_owned);

        let body = json!({
            "message": message,
            "sha": sha,
            "branch": self.options.branch,
        });
        let request = ApiRequest::new(Method::Delete, self.contents_path(&path)).with_body(body);
        let response = self.send(&request)?;
        if response.status == 404 {
            self.cache.remove(&path);
            return Err(StorageError::not_found(path).with_backend(BACKEND));
        }
        if is_stale(&response) {
            return Err(self.stale(&response, &path));
        }
        if !response.is_success() {
            return Err(response_error(&response).with_path(path));
        }

        let deleted: DeleteContentsResponse = response.json()?;
        self.cache.remove(&path);
        info!(path = %path, commit = %deleted.commit.sha, "Deleted file");
        Ok(deleted.commit.sha)
    }

    /// First and last commit dates touching `path`, newest first.
    fn history_dates(
        &self,
        path: &str,
    ) -> Result<Option<(chrono::DateTime<Utc>, chrono::DateTime<Utc>)>, StorageError> {
        let request = ApiRequest::get(self.repo_path("/commits"))
            .with_query("path", self.remote_path(path))
            .with_query("sha", &self.options.branch)
            .with_query("per_page", HISTORY_PAGE_SIZE.to_string());
        let commits: Vec<CommitListItem> = self.send_ok(&request, path)?.json()?;

        let updated = commits.first().and_then(|c| c.commit.date());
        let created = commits.last().and_then(|c| c.commit.date());
        Ok(updated.zip(created))
    }
}

fn decode_base64(content: &str, path: &str) -> Result<Vec<u8>, StorageError> {
    let compact: String = content.chars().filter(|c| !c.is_ascii_whitespace()).collect();
    BASE64.decode(compact).map_err(|e| {
        StorageError::new(StorageErrorKind::Other)
            .with_path(path)
            .with_backend(BACKEND)
            .with_source(e)
    })
}

impl Storage for GitHubStorage {
    fn backend(&self) -> &'static str {
        BACKEND
    }

    fn exists(&self, path: &str) -> Result<bool, StorageError> {
        let path = normalize_path(path)?;
        Ok(self.get_contents(&path)?.is_some())
    }

    fn read_directory(&self, path: &str) -> Result<Vec<DirectoryEntry>, StorageError> {
        let path = normalize_path(path)?;
        let Some(ContentsResponse::Directory(items)) = self.get_contents(&path)? else {
            return Err(StorageError::not_found(path).with_backend(BACKEND));
        };

        let mut entries: Vec<DirectoryEntry> = items
            .into_iter()
            .map(|item| {
                let local = self.local_path(&item.path);
                if item.kind == ContentKind::File {
                    self.cache.insert(&local, &item.sha);
                }
                DirectoryEntry {
                    name: item.name,
                    is_directory: item.kind == ContentKind::Dir,
                    path: local,
                }
            })
            .collect();
        entries.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(entries)
    }

    fn read_file(&self, path: &str) -> Result<Option<String>, StorageError> {
        let path = normalize_path(path)?;
        let Some(bytes) = self.read_binary_file(&path)? else {
            return Ok(None);
        };
        String::from_utf8(bytes).map(Some).map_err(|e| {
            StorageError::new(StorageErrorKind::Other)
                .with_path(path)
                .with_backend(BACKEND)
                .with_source(e)
        })
    }

    fn read_binary_file(&self, path: &str) -> Result<Option<Vec<u8>>, StorageError> {
        let path = normalize_path(path)?;
        match self.get_file_item(&path)? {
            Some(item) => self.decode_item(&item, &path).map(Some),
            None => Ok(None),
        }
    }

    /// Timestamps come from the branch history of the file: `updated_at` is the
    /// newest commit touching it, `created_at` the oldest within the first page
    /// of history.
    fn metadata(&self, path: &str) -> Result<Option<FileMetadata>, StorageError> {
        let path = normalize_path(path)?;
        let Some(item) = self.get_file_item(&path)? else {
            return Ok(None);
        };

        let (updated_at, created_at) = match self.history_dates(&path)? {
            Some(dates) => dates,
            None => {
                let now = Utc::now();
                (now, now)
            }
        };

        Ok(Some(FileMetadata {
            path,
            size: item.size,
            created_at,
            updated_at,
            content_hash: Some(item.sha),
        }))
    }

    fn write_file(
        &self,
        path: &str,
        content: &str,
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        self.put_file(path, content.as_bytes(), message)
    }

    fn write_binary_file(
        &self,
        path: &str,
        content: &[u8],
        message: Option<&str>,
    ) -> Result<WriteResult, StorageError> {
        self.put_file(path, content, message)
    }

    fn delete_file(&self, path: &str, message: Option<&str>) -> Result<(), StorageError> {
        self.remove_file(path, message).map(|_| ())
    }

    /// Deletes every file below `path` in a single commit.
    fn delete_directory(&self, path: &str, message: Option<&str>) -> Result<(), StorageError> {
        let path = normalize_path(path)?;
        if path.is_empty() {
            return Err(StorageError::new(StorageErrorKind::InvalidPath)
                .with_path(path)
                .with_backend(BACKEND));
        }
        let message = message.map_or_else(|| format!("Delete {path}"), str::to_owned);
        self.delete_tree(&path, &message)
    }

    /// Two or more operations are committed atomically; a single operation
    /// uses the contents endpoint.
    fn batch_write(
        &self,
        operations: &[BatchOperation],
        message: &str,
    ) -> Result<Vec<WriteResult>, StorageError> {
        match operations {
            [] => Ok(Vec::new()),
            [single] => {
                let result = match single {
                    BatchOperation::Create { path, content }
                    | BatchOperation::Update { path, content } => match content {
                        FileContent::Text(text) => self.put_file(path, text.as_bytes(), Some(message))?,
                        FileContent::Binary(bytes) => self.put_file(path, bytes, Some(message))?,
                    },
                    BatchOperation::Delete { path } => {
                        let commit = self.remove_file(path, Some(message))?;
                        WriteResult::new(normalize_path(path)?).with_commit_id(commit)
                    }
                };
                Ok(vec![result])
            }
            _ => self.commit_batch(operations, message),
        }
    }
}
