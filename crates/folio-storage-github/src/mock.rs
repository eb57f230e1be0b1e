//! In-memory GitHub repository for testing.
//!
//! [`MockGitHub`] implements [`Transport`] by serving the subset of the REST
//! API the adapter uses (contents, refs, commits, trees, blobs, commit
//! history) from a single-branch repository held in memory. It enforces the
//! same preconditions as the real API: blob SHAs on contents writes and
//! fast-forward-only ref updates.

use std::collections::{BTreeMap, HashMap};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use base64::Engine;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Duration, SecondsFormat, TimeZone, Utc};
use serde_json::{Value, json};
use sha1::{Digest, Sha1};

use folio_storage::{StorageError, file_name};

use crate::blob::git_blob_sha;
use crate::transport::{ApiRequest, ApiResponse, Method, Transport};

/// Files larger than this are served with encoding `"none"` by the contents
/// endpoint and must be fetched as blobs.
pub const INLINE_LIMIT: usize = 1024 * 1024;

const FILE_MODE: &str = "100644";

/// Flat tree: repository path → (mode, blob sha).
type Tree = BTreeMap<String, (String, String)>;

struct Commit {
    tree: String,
    parents: Vec<String>,
    message: String,
    date: DateTime<Utc>,
}

struct Failure {
    method: Method,
    fragment: String,
    status: u16,
    message: String,
}

struct State {
    owner: String,
    repo: String,
    branch: String,
    blobs: HashMap<String, Vec<u8>>,
    trees: HashMap<String, Tree>,
    commits: HashMap<String, Commit>,
    head: String,
    clock: DateTime<Utc>,
    requests: Vec<String>,
    rate_limit_remaining: Option<u64>,
    pending_push: Option<(String, Vec<u8>)>,
    failures: Vec<Failure>,
}

/// In-memory single-branch GitHub repository.
///
/// Clones share the same repository, so a test can hand one clone to
/// [`GitHubStorage`](crate::GitHubStorage) and inspect the other.
///
/// # Example
///
/// ```ignore
/// let mock = MockGitHub::new("acme", "site", "main").with_file("content/a.md", "hello");
/// let storage = GitHubStorage::new(
///     GitHubOptions::new("acme", "site").with_content_path("content"),
///     mock.clone(),
/// )?;
/// assert_eq!(storage.read_file("a.md")?.as_deref(), Some("hello"));
/// ```
#[derive(Clone)]
pub struct MockGitHub {
    state: Arc<Mutex<State>>,
}

impl MockGitHub {
    /// Create a repository with one empty commit on `branch`.
    #[must_use]
    pub fn new(owner: &str, repo: &str, branch: &str) -> Self {
        let mut state = State {
            owner: owner.to_owned(),
            repo: repo.to_owned(),
            branch: branch.to_owned(),
            blobs: HashMap::new(),
            trees: HashMap::new(),
            commits: HashMap::new(),
            head: String::new(),
            clock: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).single().unwrap_or_default(),
            requests: Vec::new(),
            rate_limit_remaining: None,
            pending_push: None,
            failures: Vec::new(),
        };
        let tree = state.store_tree(Tree::new());
        state.head = state.store_commit(&tree, Vec::new(), "Initial commit");

        Self {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// Add a file in its own commit.
    #[must_use]
    pub fn with_file(self, path: &str, content: impl AsRef<[u8]>) -> Self {
        self.lock()
            .commit_change(path, Some(content.as_ref()), &format!("Add {path}"));
        self
    }

    /// Commit a change as another client would, bypassing the adapter.
    pub fn push_external_commit(&self, path: &str, content: impl AsRef<[u8]>) {
        self.lock()
            .commit_change(path, Some(content.as_ref()), &format!("External {path}"));
    }

    /// Push an external commit right before the next ref update is applied.
    pub fn simulate_concurrent_push(&self, path: &str, content: impl AsRef<[u8]>) {
        self.lock().pending_push = Some((path.to_owned(), content.as_ref().to_vec()));
    }

    /// Serve `x-ratelimit-remaining` with this value; `Some(0)` rejects all
    /// requests with 403.
    pub fn set_rate_limit_remaining(&self, remaining: Option<u64>) {
        self.lock().rate_limit_remaining = remaining;
    }

    /// Answer every `method` request whose path contains `fragment` with
    /// `status` and `message`.
    pub fn fail_on(&self, method: Method, fragment: &str, status: u16, message: &str) {
        self.lock().failures.push(Failure {
            method,
            fragment: fragment.to_owned(),
            status,
            message: message.to_owned(),
        });
    }

    /// Current head commit SHA.
    #[must_use]
    pub fn head(&self) -> String {
        self.lock().head.clone()
    }

    /// Content of a file at head, by repository path.
    #[must_use]
    pub fn file(&self, path: &str) -> Option<Vec<u8>> {
        let state = self.lock();
        let (_, sha) = state.head_tree().get(path)?;
        state.blobs.get(sha).cloned()
    }

    /// Blob SHA of a file at head, by repository path.
    #[must_use]
    pub fn file_sha(&self, path: &str) -> Option<String> {
        self.lock().head_tree().get(path).map(|(_, sha)| sha.clone())
    }

    /// Number of commits reachable from head along first parents.
    #[must_use]
    pub fn commit_count(&self) -> usize {
        self.lock().history().len()
    }

    /// Message of the head commit.
    #[must_use]
    pub fn last_commit_message(&self) -> String {
        let state = self.lock();
        state
            .commits
            .get(&state.head)
            .map(|c| c.message.clone())
            .unwrap_or_default()
    }

    /// Requests received so far, as `"METHOD /path"` without query.
    #[must_use]
    pub fn requests(&self) -> Vec<String> {
        self.lock().requests.clone()
    }

    /// Forget recorded requests.
    pub fn clear_requests(&self) {
        self.lock().requests.clear();
    }

    fn lock(&self) -> MutexGuard<'_, State> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Transport for MockGitHub {
    fn send(&self, request: &ApiRequest) -> Result<ApiResponse, StorageError> {
        Ok(self.lock().handle(request))
    }
}

fn reply(status: u16, body: &Value) -> ApiResponse {
    ApiResponse {
        status,
        rate_limit_remaining: None,
        body: body.to_string(),
    }
}

fn error(status: u16, message: &str) -> ApiResponse {
    reply(status, &json!({ "message": message }))
}

fn not_found() -> ApiResponse {
    error(404, "Not Found")
}

fn hash(parts: &[&str]) -> String {
    let mut hasher = Sha1::new();
    for part in parts {
        hasher.update(part.as_bytes());
        hasher.update(b"\n");
    }
    hex::encode(hasher.finalize())
}

fn wrapped_base64(bytes: &[u8]) -> String {
    let encoded = BASE64.encode(bytes);
    let mut out = String::with_capacity(encoded.len() + encoded.len() / 60 + 1);
    for chunk in encoded.as_bytes().chunks(60) {
        out.push_str(&String::from_utf8_lossy(chunk));
        out.push('\n');
    }
    out
}

fn timestamp(date: DateTime<Utc>) -> String {
    date.to_rfc3339_opts(SecondsFormat::Secs, true)
}

impl State {
    fn head_tree(&self) -> &Tree {
        static EMPTY: Tree = Tree::new();
        self.commits
            .get(&self.head)
            .and_then(|c| self.trees.get(&c.tree))
            .unwrap_or(&EMPTY)
    }

    /// Commits from head along first parents, newest first.
    fn history(&self) -> Vec<&str> {
        let mut out = Vec::new();
        let mut cursor = Some(self.head.as_str());
        while let Some(sha) = cursor {
            let Some(commit) = self.commits.get(sha) else {
                break;
            };
            out.push(sha);
            cursor = commit.parents.first().map(String::as_str);
        }
        out
    }

    fn is_ancestor(&self, ancestor: &str, of: &str) -> bool {
        let mut stack = vec![of.to_owned()];
        while let Some(sha) = stack.pop() {
            if sha == ancestor {
                return true;
            }
            if let Some(commit) = self.commits.get(&sha) {
                stack.extend(commit.parents.iter().cloned());
            }
        }
        false
    }

    fn store_blob(&mut self, bytes: &[u8]) -> String {
        let sha = git_blob_sha(bytes);
        self.blobs.insert(sha.clone(), bytes.to_vec());
        sha
    }

    fn store_tree(&mut self, tree: Tree) -> String {
        let listing: Vec<String> = tree
            .iter()
            .map(|(path, (mode, sha))| format!("{mode} {path} {sha}"))
            .collect();
        let mut parts = vec!["tree"];
        parts.extend(listing.iter().map(String::as_str));
        let sha = hash(&parts);
        self.trees.insert(sha.clone(), tree);
        sha
    }

    fn store_commit(&mut self, tree: &str, parents: Vec<String>, message: &str) -> String {
        let date = self.clock;
        self.clock += Duration::minutes(1);
        let parent_list = parents.join(" ");
        let date_text = timestamp(date);
        let sha = hash(&["commit", tree, parent_list.as_str(), message, date_text.as_str()]);
        self.commits.insert(
            sha.clone(),
            Commit {
                tree: tree.to_owned(),
                parents,
                message: message.to_owned(),
                date,
            },
        );
        sha
    }

    /// Write or delete one file on top of head and move head.
    fn commit_change(&mut self, path: &str, content: Option<&[u8]>, message: &str) -> String {
        let mut tree = self.head_tree().clone();
        match content {
            Some(bytes) => {
                let sha = self.store_blob(bytes);
                let mode = tree
                    .get(path)
                    .map_or_else(|| FILE_MODE.to_owned(), |(mode, _)| mode.clone());
                tree.insert(path.to_owned(), (mode, sha));
            }
            None => {
                tree.remove(path);
            }
        }
        let tree = self.store_tree(tree);
        let parent = self.head.clone();
        self.head = self.store_commit(&tree, vec![parent], message);
        self.head.clone()
    }

    fn handle(&mut self, request: &ApiRequest) -> ApiResponse {
        self.requests
            .push(format!("{} {}", request.method.as_str(), request.path));

        let mut response = self.route(request);
        response.rate_limit_remaining = self.rate_limit_remaining;
        response
    }

    fn route(&mut self, request: &ApiRequest) -> ApiResponse {
        if self.rate_limit_remaining == Some(0) {
            return error(403, "API rate limit exceeded");
        }
        if let Some(failure) = self
            .failures
            .iter()
            .find(|f| f.method == request.method && request.path.contains(&f.fragment))
        {
            return error(failure.status, &failure.message);
        }

        let prefix = format!("/repos/{}/{}", self.owner, self.repo);
        let Some(rest) = request.path.strip_prefix(&prefix) else {
            return not_found();
        };
        let rest = rest.to_owned();
        let body = request.body.clone().unwrap_or(Value::Null);

        if rest == "/contents" || rest.starts_with("/contents/") {
            let path = rest.trim_start_matches("/contents").trim_start_matches('/');
            return match request.method {
                Method::Get => self.get_contents(path),
                Method::Put => self.put_contents(path, &body),
                Method::Delete => self.delete_contents(path, &body),
                _ => error(405, "Method Not Allowed"),
            };
        }

        let segments: Vec<&str> = rest.trim_start_matches('/').splitn(4, '/').collect();
        match (request.method, segments.as_slice()) {
            (Method::Get, ["git", "ref", "heads", branch]) => self.get_ref(branch),
            (Method::Patch, ["git", "refs", "heads", branch]) => self.update_ref(branch, &body),
            (Method::Get, ["git", "commits", sha]) => self.get_commit(sha),
            (Method::Post, ["git", "commits"]) => self.create_commit(&body),
            (Method::Get, ["git", "trees", sha]) => self.get_tree(sha),
            (Method::Post, ["git", "trees"]) => self.create_tree(&body),
            (Method::Get, ["git", "blobs", sha]) => self.get_blob(sha),
            (Method::Post, ["git", "blobs"]) => self.create_blob(&body),
            (Method::Get, ["commits"]) => self.list_commits(request),
            _ => not_found(),
        }
    }

    fn get_contents(&self, path: &str) -> ApiResponse {
        let tree = self.head_tree();

        if let Some((_, sha)) = tree.get(path) {
            let bytes = self.blobs.get(sha).map_or(&[][..], Vec::as_slice);
            let (content, encoding) = if bytes.len() > INLINE_LIMIT {
                (String::new(), "none")
            } else {
                (wrapped_base64(bytes), "base64")
            };
            return reply(
                200,
                &json!({
                    "type": "file",
                    "name": file_name(path),
                    "path": path,
                    "sha": sha,
                    "size": bytes.len(),
                    "content": content,
                    "encoding": encoding,
                }),
            );
        }

        let prefix = if path.is_empty() {
            String::new()
        } else {
            format!("{path}/")
        };
        let mut children: BTreeMap<String, Value> = BTreeMap::new();
        for (file, (_, sha)) in tree.range(prefix.clone()..) {
            let Some(rest) = file.strip_prefix(&prefix) else {
                break;
            };
            match rest.split_once('/') {
                Some((dir, _)) => {
                    let dir_path = format!("{prefix}{dir}");
                    children.entry(dir.to_owned()).or_insert_with(|| {
                        json!({
                            "type": "dir",
                            "name": dir,
                            "path": dir_path,
                            "sha": hash(&["dir", dir_path.as_str()]),
                            "size": 0,
                        })
                    });
                }
                None => {
                    let size = self.blobs.get(sha).map_or(0, Vec::len);
                    children.insert(
                        rest.to_owned(),
                        json!({
                            "type": "file",
                            "name": rest,
                            "path": file,
                            "sha": sha,
                            "size": size,
                        }),
                    );
                }
            }
        }

        if children.is_empty() && !path.is_empty() {
            return not_found();
        }
        reply(200, &Value::Array(children.into_values().collect()))
    }

    fn put_contents(&mut self, path: &str, body: &Value) -> ApiResponse {
        let Some(bytes) = body["content"]
            .as_str()
            .and_then(|c| BASE64.decode(c).ok())
        else {
            return error(400, "content is not valid Base64");
        };
        let message = body["message"].as_str().unwrap_or_default().to_owned();
        let current = self.head_tree().get(path).map(|(_, sha)| sha.clone());

        match (&current, body["sha"].as_str()) {
            (Some(_), None) => {
                return error(422, "Invalid request.\n\n\"sha\" wasn't supplied.");
            }
            (Some(current), Some(given)) if current != given => {
                return error(409, &format!("{path} does not match {given}"));
            }
            (None, Some(given)) => {
                return error(409, &format!("{path} does not match {given}"));
            }
            _ => {}
        }

        let commit = self.commit_change(path, Some(&bytes), &message);
        let sha = git_blob_sha(&bytes);
        let status = if current.is_some() { 200 } else { 201 };
        reply(
            status,
            &json!({
                "content": { "name": file_name(path), "path": path, "sha": sha },
                "commit": { "sha": commit, "message": message },
            }),
        )
    }

    fn delete_contents(&mut self, path: &str, body: &Value) -> ApiResponse {
        let Some(given) = body["sha"].as_str() else {
            return error(422, "Invalid request.\n\n\"sha\" wasn't supplied.");
        };
        let Some((_, current)) = self.head_tree().get(path) else {
            return not_found();
        };
        if current != given {
            return error(409, &format!("{path} does not match {given}"));
        }

        let message = body["message"].as_str().unwrap_or_default().to_owned();
        let commit = self.commit_change(path, None, &message);
        reply(200, &json!({ "content": null, "commit": { "sha": commit } }))
    }

    fn get_ref(&self, branch: &str) -> ApiResponse {
        if branch != self.branch {
            return not_found();
        }
        reply(
            200,
            &json!({
                "ref": format!("refs/heads/{branch}"),
                "object": { "sha": self.head, "type": "commit" },
            }),
        )
    }

    fn update_ref(&mut self, branch: &str, body: &Value) -> ApiResponse {
        if branch != self.branch {
            return not_found();
        }
        if let Some((path, content)) = self.pending_push.take() {
            self.commit_change(&path, Some(&content), &format!("External {path}"));
        }

        let Some(sha) = body["sha"].as_str() else {
            return error(422, "Invalid request.");
        };
        if !self.commits.contains_key(sha) {
            return error(422, "Object does not exist");
        }
        let force = body["force"].as_bool().unwrap_or(false);
        if !force && !self.is_ancestor(&self.head, sha) {
            return error(422, "Update is not a fast forward");
        }

        self.head = sha.to_owned();
        reply(
            200,
            &json!({
                "ref": format!("refs/heads/{branch}"),
                "object": { "sha": sha, "type": "commit" },
            }),
        )
    }

    fn get_commit(&self, sha: &str) -> ApiResponse {
        let Some(commit) = self.commits.get(sha) else {
            return not_found();
        };
        let parents: Vec<Value> = commit.parents.iter().map(|p| json!({ "sha": p })).collect();
        reply(
            200,
            &json!({
                "sha": sha,
                "tree": { "sha": commit.tree },
                "parents": parents,
                "message": commit.message,
            }),
        )
    }

    fn create_commit(&mut self, body: &Value) -> ApiResponse {
        let Some(tree) = body["tree"].as_str() else {
            return error(422, "Invalid request.");
        };
        if !self.trees.contains_key(tree) {
            return error(422, "Tree SHA does not exist");
        }
        let parents: Vec<String> = body["parents"]
            .as_array()
            .map(|list| {
                list.iter()
                    .filter_map(Value::as_str)
                    .map(str::to_owned)
                    .collect()
            })
            .unwrap_or_default();
        if parents.iter().any(|p| !self.commits.contains_key(p)) {
            return error(422, "Parent SHA does not exist or is not a commit object");
        }

        let message = body["message"].as_str().unwrap_or_default();
        let tree = tree.to_owned();
        let sha = self.store_commit(&tree, parents, message);
        reply(201, &json!({ "sha": sha, "tree": { "sha": tree } }))
    }

    fn get_tree(&self, sha: &str) -> ApiResponse {
        let Some(tree) = self.trees.get(sha) else {
            return not_found();
        };

        let mut entries: BTreeMap<String, Value> = BTreeMap::new();
        for (path, (mode, blob)) in tree {
            let mut dir = path.as_str();
            while let Some((parent, _)) = dir.rsplit_once('/') {
                entries.entry(parent.to_owned()).or_insert_with(|| {
                    json!({
                        "path": parent,
                        "mode": "040000",
                        "type": "tree",
                        "sha": hash(&["dir", parent]),
                    })
                });
                dir = parent;
            }
            entries.insert(
                path.clone(),
                json!({ "path": path, "mode": mode, "type": "blob", "sha": blob }),
            );
        }

        reply(
            200,
            &json!({
                "sha": sha,
                "tree": entries.into_values().collect::<Vec<_>>(),
                "truncated": false,
            }),
        )
    }

    fn create_tree(&mut self, body: &Value) -> ApiResponse {
        let mut tree = match body["base_tree"].as_str() {
            Some(base) => match self.trees.get(base) {
                Some(tree) => tree.clone(),
                None => return error(422, "base_tree is not a valid tree oid"),
            },
            None => Tree::new(),
        };

        let Some(entries) = body["tree"].as_array() else {
            return error(422, "Invalid tree info");
        };
        for entry in entries {
            let Some(path) = entry["path"].as_str() else {
                return error(422, "Invalid tree info");
            };
            let mode = entry["mode"].as_str().unwrap_or(FILE_MODE).to_owned();

            if let Some(content) = entry["content"].as_str() {
                let sha = self.store_blob(content.as_bytes());
                tree.insert(path.to_owned(), (mode, sha));
            } else if let Some(sha) = entry["sha"].as_str() {
                if !self.blobs.contains_key(sha) {
                    return error(422, "Invalid tree info");
                }
                tree.insert(path.to_owned(), (mode, sha.to_owned()));
            } else if tree.remove(path).is_none() {
                return error(422, "GitRPC::BadObjectState");
            }
        }

        let sha = self.store_tree(tree);
        reply(201, &json!({ "sha": sha }))
    }

    fn get_blob(&self, sha: &str) -> ApiResponse {
        let Some(bytes) = self.blobs.get(sha) else {
            return not_found();
        };
        reply(
            200,
            &json!({
                "sha": sha,
                "size": bytes.len(),
                "content": wrapped_base64(bytes),
                "encoding": "base64",
            }),
        )
    }

    fn create_blob(&mut self, body: &Value) -> ApiResponse {
        let Some(content) = body["content"].as_str() else {
            return error(422, "Invalid request.");
        };
        let bytes = match body["encoding"].as_str() {
            Some("base64") => match BASE64.decode(content) {
                Ok(bytes) => bytes,
                Err(_) => return error(422, "content is not valid Base64"),
            },
            _ => content.as_bytes().to_vec(),
        };
        let sha = self.store_blob(&bytes);
        reply(201, &json!({ "sha": sha }))
    }

    fn list_commits(&self, request: &ApiRequest) -> ApiResponse {
        let Some(path) = request.query_param("path") else {
            return error(422, "path is required");
        };
        let limit = request
            .query_param("per_page")
            .and_then(|n| n.parse().ok())
            .unwrap_or(30_usize);

        let blob_at = |sha: &str| -> Option<String> {
            let commit = self.commits.get(sha)?;
            self.trees.get(&commit.tree)?.get(path).map(|(_, b)| b.clone())
        };

        let mut items = Vec::new();
        for sha in self.history() {
            let Some(commit) = self.commits.get(sha) else {
                continue;
            };
            let before = commit.parents.first().and_then(|p| blob_at(p.as_str()));
            if blob_at(sha) != before {
                let date = timestamp(commit.date);
                items.push(json!({
                    "sha": sha,
                    "commit": {
                        "message": commit.message,
                        "author": { "date": date },
                        "committer": { "date": date },
                    },
                }));
            }
            if items.len() == limit {
                break;
            }
        }
        reply(200, &Value::Array(items))
    }
}
