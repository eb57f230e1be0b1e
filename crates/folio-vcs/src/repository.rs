//! Git working tree driven through libgit2.

use std::path::{Path, PathBuf};

use git2::build::CheckoutBuilder;
use git2::{
    Commit, ErrorCode, IndexAddOption, PushOptions, RemoteCallbacks, Repository, Signature, Sort,
};
use tracing::{debug, info, warn};

use folio_storage::{Action, MessageTemplate};

use crate::outcome::{VcsOutcome, VersioningFailure};
use crate::status::{CommitInfo, RepoStatus};

/// Default remote name.
const DEFAULT_REMOTE: &str = "origin";

/// Default branch name.
const DEFAULT_BRANCH: &str = "main";

/// Identity recorded as author and committer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
    /// Display name.
    pub name: String,
    /// Email address.
    pub email: String,
}

impl Author {
    /// Create an author identity.
    #[must_use]
    pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            email: email.into(),
        }
    }
}

/// A git working tree that content mutations are committed to.
///
/// Without an explicit [`Author`], the `user.name` and `user.email` git
/// configuration decides the identity. The repository is opened afresh for
/// every operation.
#[derive(Debug, Clone)]
pub struct GitRepository {
    repo_dir: PathBuf,
    remote: String,
    branch: String,
    author: Option<Author>,
    message_template: MessageTemplate,
}

impl GitRepository {
    /// Use the working tree at `repo_dir`.
    #[must_use]
    pub fn new(repo_dir: impl Into<PathBuf>) -> Self {
        Self {
            repo_dir: repo_dir.into(),
            remote: DEFAULT_REMOTE.to_owned(),
            branch: DEFAULT_BRANCH.to_owned(),
            author: None,
            message_template: MessageTemplate::default(),
        }
    }

    /// Set the remote used by [`pull`](Self::pull) and [`push`](Self::push).
    #[must_use]
    pub fn with_remote(mut self, remote: impl Into<String>) -> Self {
        self.remote = remote.into();
        self
    }

    /// Set the branch used by [`pull`](Self::pull) and [`push`](Self::push).
    #[must_use]
    pub fn with_branch(mut self, branch: impl Into<String>) -> Self {
        self.branch = branch.into();
        self
    }

    /// Set the commit identity.
    #[must_use]
    pub fn with_author(mut self, author: Author) -> Self {
        self.author = Some(author);
        self
    }

    /// Set the commit message template.
    #[must_use]
    pub fn with_message_template(mut self, template: MessageTemplate) -> Self {
        self.message_template = template;
        self
    }

    /// Working tree root.
    #[must_use]
    pub fn repo_dir(&self) -> &Path {
        &self.repo_dir
    }

    /// Stage `paths` (additions, modifications and deletions) and commit them.
    ///
    /// `paths` are absolute or relative to the working tree root. The message
    /// is `message` when given, otherwise the template rendered for
    /// `(action, collection, slug)`. Returns `Success(None)` when the staged
    /// tree equals the `HEAD` tree, and `Success(Some(id))` with the new
    /// commit id otherwise.
    pub fn commit(
        &self,
        paths: &[PathBuf],
        action: Action,
        collection: &str,
        slug: &str,
        message: Option<&str>,
    ) -> VcsOutcome<Option<String>> {
        let message = message.map_or_else(
            || self.message_template.render(action, collection, slug),
            str::to_owned,
        );
        let outcome: VcsOutcome<_> = self.try_commit(paths, &message).into();
        if let VcsOutcome::Failure(failure) = &outcome {
            warn!(error = %failure, "Commit failed");
        }
        outcome
    }

    fn try_commit(
        &self,
        paths: &[PathBuf],
        message: &str,
    ) -> Result<Option<String>, VersioningFailure> {
        let pathspecs: Vec<String> = paths.iter().map(|p| self.pathspec(p)).collect();
        if pathspecs.is_empty() {
            return Ok(None);
        }

        let repo = self.open()?;
        let mut index = repo.index()?;
        for (path, spec) in paths.iter().zip(&pathspecs) {
            if self.absolute(path).exists() {
                index.add_all([spec.as_str()], IndexAddOption::DEFAULT, None)?;
                index.update_all([spec.as_str()], None)?;
            } else {
                index.remove_all([spec.as_str()], None)?;
            }
        }
        index.write()?;

        let tree = repo.find_tree(index.write_tree()?)?;
        let parent = head_commit(&repo)?;
        let unchanged = match &parent {
            Some(parent) => parent.tree_id() == tree.id(),
            None => tree.is_empty(),
        };
        if unchanged {
            debug!("Nothing staged, skipping commit");
            return Ok(None);
        }

        let signature = self.signature(&repo)?;
        let parents: Vec<&Commit<'_>> = parent.iter().collect();
        let id = repo.commit(
            Some("HEAD"),
            &signature,
            &signature,
            message,
            &tree,
            &parents,
        )?;
        info!(commit = %id, summary = message, "Committed");
        Ok(Some(id.to_string()))
    }

    /// Working tree status.
    pub fn status(&self) -> VcsOutcome<RepoStatus> {
        self.open()
            .and_then(|repo| RepoStatus::read(&repo))
            .into()
    }

    /// The most recent `limit` commits on the current branch, newest first.
    ///
    /// An empty repository yields an empty list.
    pub fn log(&self, limit: usize) -> VcsOutcome<Vec<CommitInfo>> {
        self.try_log(limit).into()
    }

    fn try_log(&self, limit: usize) -> Result<Vec<CommitInfo>, VersioningFailure> {
        let repo = self.open()?;
        if head_commit(&repo)?.is_none() {
            return Ok(Vec::new());
        }
        let mut walk = repo.revwalk()?;
        walk.set_sorting(Sort::TOPOLOGICAL)?;
        walk.push_head()?;
        walk.take(limit)
            .map(|oid| -> Result<CommitInfo, VersioningFailure> {
                let commit = repo.find_commit(oid?)?;
                CommitInfo::from_commit(&commit)
            })
            .collect()
    }

    /// Fast-forward the configured branch from the configured remote.
    ///
    /// Local changes that the incoming commits would overwrite make the
    /// checkout fail; a diverged branch is reported as
    /// [`VersioningFailure::NotFastForward`].
    pub fn pull(&self) -> VcsOutcome<()> {
        let outcome: VcsOutcome<()> = self.try_pull().into();
        match &outcome {
            VcsOutcome::Success(()) => {
                info!(remote = %self.remote, branch = %self.branch, "Pulled");
            }
            VcsOutcome::Failure(failure) => warn!(error = %failure, "Pull failed"),
        }
        outcome
    }

    fn try_pull(&self) -> Result<(), VersioningFailure> {
        let repo = self.open()?;
        let mut remote = self.find_remote(&repo)?;
        remote.fetch(&[self.branch.as_str()], None, None)?;

        let fetch_head = repo.find_reference("FETCH_HEAD")?;
        let incoming = repo.reference_to_annotated_commit(&fetch_head)?;
        let (analysis, _) = repo.merge_analysis(&[&incoming])?;
        if analysis.is_up_to_date() {
            debug!("Already up to date");
            return Ok(());
        }
        if !analysis.is_fast_forward() && !analysis.is_unborn() {
            return Err(VersioningFailure::NotFastForward {
                remote: self.remote.clone(),
                branch: self.branch.clone(),
            });
        }

        let target = repo.find_object(incoming.id(), None)?;
        repo.checkout_tree(&target, Some(CheckoutBuilder::new().safe()))?;
        let refname = format!("refs/heads/{}", self.branch);
        repo.reference(&refname, incoming.id(), true, "pull: fast-forward")?;
        repo.set_head(&refname)?;
        Ok(())
    }

    /// Push the configured branch to the configured remote.
    pub fn push(&self) -> VcsOutcome<()> {
        let outcome: VcsOutcome<()> = self.try_push().into();
        match &outcome {
            VcsOutcome::Success(()) => {
                info!(remote = %self.remote, branch = %self.branch, "Pushed");
            }
            VcsOutcome::Failure(failure) => warn!(error = %failure, "Push failed"),
        }
        outcome
    }

    fn try_push(&self) -> Result<(), VersioningFailure> {
        let repo = self.open()?;
        let mut remote = self.find_remote(&repo)?;
        let refspec = format!("refs/heads/{0}:refs/heads/{0}", self.branch);

        let mut rejected = None;
        {
            let mut callbacks = RemoteCallbacks::new();
            callbacks.push_update_reference(|name, status| {
                if let Some(status) = status {
                    rejected = Some(format!("{name}: {status}"));
                }
                Ok(())
            });
            let mut options = PushOptions::new();
            options.remote_callbacks(callbacks);
            remote.push(&[refspec.as_str()], Some(&mut options))?;
        }

        match rejected {
            Some(reason) => Err(VersioningFailure::PushRejected(reason)),
            None => Ok(()),
        }
    }

    fn open(&self) -> Result<Repository, VersioningFailure> {
        let repo = Repository::open(&self.repo_dir).map_err(|e| match e.code() {
            ErrorCode::NotFound => VersioningFailure::NotARepository(self.repo_dir.clone()),
            _ => e.into(),
        })?;
        if repo.is_bare() {
            return Err(VersioningFailure::BareRepository(self.repo_dir.clone()));
        }
        Ok(repo)
    }

    fn find_remote<'r>(
        &self,
        repo: &'r Repository,
    ) -> Result<git2::Remote<'r>, VersioningFailure> {
        repo.find_remote(&self.remote).map_err(|e| match e.code() {
            ErrorCode::NotFound => VersioningFailure::RemoteNotFound(self.remote.clone()),
            _ => e.into(),
        })
    }

    fn signature(&self, repo: &Repository) -> Result<Signature<'static>, VersioningFailure> {
        let signature = match &self.author {
            Some(author) => Signature::now(&author.name, &author.email)?,
            None => repo.signature()?,
        };
        Ok(signature)
    }

    fn absolute(&self, path: &Path) -> PathBuf {
        if path.is_absolute() {
            path.to_owned()
        } else {
            self.repo_dir.join(path)
        }
    }

    /// Path relative to the working tree root, with `/` separators.
    fn pathspec(&self, path: &Path) -> String {
        let relative = path.strip_prefix(&self.repo_dir).unwrap_or(path);
        relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/")
    }
}

/// The commit `HEAD` resolves to, or `None` on an unborn branch.
fn head_commit(repo: &Repository) -> Result<Option<Commit<'_>>, VersioningFailure> {
    match repo.head() {
        Ok(head) => Ok(Some(head.peel_to_commit()?)),
        Err(e) if matches!(e.code(), ErrorCode::UnbornBranch | ErrorCode::NotFound) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use git2::RepositoryInitOptions;
    use pretty_assertions::assert_eq;
    use tempfile::TempDir;

    use super::*;
    use crate::StatusEntry;

    fn init_at(path: &Path) -> Repository {
        let mut options = RepositoryInitOptions::new();
        options.initial_head("main");
        Repository::init_opts(path, &options).unwrap()
    }

    fn init_repo() -> (TempDir, GitRepository) {
        let dir = TempDir::new().unwrap();
        init_at(dir.path());
        let repo = GitRepository::new(dir.path())
            .with_author(Author::new("Folio Test", "folio@example.com"));
        (dir, repo)
    }

    fn add_remote(dir: &Path, url: &Path) {
        let repo = Repository::open(dir).unwrap();
        repo.remote("origin", url.to_str().unwrap()).unwrap();
    }

    fn write(dir: &Path, path: &str, content: &str) {
        let full = dir.join(path);
        fs::create_dir_all(full.parent().unwrap()).unwrap();
        fs::write(full, content).unwrap();
    }

    fn commit_slug(repo: &GitRepository, slug: &str) -> String {
        repo.commit(
            &[PathBuf::from(format!("posts/{slug}"))],
            Action::Create,
            "posts",
            slug,
            None,
        )
        .success()
        .unwrap()
        .unwrap()
    }

    #[test]
    fn test_commit_with_default_message() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/hello-world/index.md", "hello");

        let id = repo
            .commit(
                &[dir.path().join("posts/hello-world")],
                Action::Create,
                "posts",
                "hello-world",
                None,
            )
            .success()
            .unwrap();

        let log = repo.log(10).success().unwrap();
        assert_eq!(log.len(), 1);
        assert_eq!(Some(log[0].id.clone()), id);
        assert_eq!(log[0].summary, "create: posts/hello-world");
        assert_eq!(log[0].author_name, "Folio Test");
        assert_eq!(log[0].author_email, "folio@example.com");
    }

    #[test]
    fn test_commit_message_override() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/a/index.md", "a");

        repo.commit(
            &[PathBuf::from("posts/a")],
            Action::Create,
            "posts",
            "a",
            Some("custom message"),
        )
        .success()
        .unwrap();

        assert_eq!(repo.log(1).success().unwrap()[0].summary, "custom message");
    }

    #[test]
    fn test_custom_template() {
        let (dir, repo) = init_repo();
        let repo = repo.with_message_template(MessageTemplate::from_pattern(
            "cms: {action} {collection}/{slug}",
        ));
        write(dir.path(), "pages/about/index.md", "about");

        repo.commit(
            &[PathBuf::from("pages/about")],
            Action::Update,
            "pages",
            "about",
            None,
        )
        .success()
        .unwrap();

        assert_eq!(
            repo.log(1).success().unwrap()[0].summary,
            "cms: update pages/about"
        );
    }

    #[test]
    fn test_commit_only_stages_given_paths() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/a/index.md", "a");
        write(dir.path(), "notes.txt", "scratch");

        commit_slug(&repo, "a");

        let status = repo.status().success().unwrap();
        assert_eq!(
            status.entries,
            vec![StatusEntry {
                code: "??".to_owned(),
                path: "notes.txt".to_owned(),
            }]
        );
    }

    #[test]
    fn test_unchanged_paths_commit_nothing() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/a/index.md", "a");
        let paths = [PathBuf::from("posts/a")];
        repo.commit(&paths, Action::Create, "posts", "a", None)
            .success()
            .unwrap();

        let second = repo.commit(&paths, Action::Update, "posts", "a", None);

        assert_eq!(second.success().unwrap(), None);
        assert_eq!(repo.log(10).success().unwrap().len(), 1);
    }

    #[test]
    fn test_deleted_directory_is_committed() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/a/index.md", "a");
        write(dir.path(), "posts/a/images/x.png", "x");
        let paths = [PathBuf::from("posts/a")];
        repo.commit(&paths, Action::Create, "posts", "a", None)
            .success()
            .unwrap();

        fs::remove_dir_all(dir.path().join("posts/a")).unwrap();
        let id = repo
            .commit(&paths, Action::Delete, "posts", "a", None)
            .success()
            .unwrap();

        assert!(id.is_some());
        assert!(repo.status().success().unwrap().is_clean());
        assert_eq!(repo.log(1).success().unwrap()[0].summary, "delete: posts/a");
    }

    #[test]
    fn test_removed_file_inside_kept_directory_is_committed() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/a/index.md", "a");
        write(dir.path(), "posts/a/images/x.png", "x");
        commit_slug(&repo, "a");

        fs::remove_file(dir.path().join("posts/a/images/x.png")).unwrap();
        let id = repo
            .commit(
                &[PathBuf::from("posts/a")],
                Action::Update,
                "posts",
                "a",
                None,
            )
            .success()
            .unwrap();

        assert!(id.is_some());
        assert!(repo.status().success().unwrap().is_clean());
    }

    #[test]
    fn test_never_tracked_missing_path_is_noop() {
        let (_dir, repo) = init_repo();

        let outcome = repo.commit(
            &[PathBuf::from("posts/ghost")],
            Action::Delete,
            "posts",
            "ghost",
            None,
        );

        assert_eq!(outcome.success().unwrap(), None);
    }

    #[test]
    fn test_status_reports_untracked() {
        let (dir, repo) = init_repo();
        write(dir.path(), "draft.md", "d");

        let status = repo.status().success().unwrap();

        assert!(!status.is_clean());
        assert_eq!(status.branch.as_deref(), Some("main"));
        assert_eq!(status.entries[0].code, "??");
        assert_eq!(status.entries[0].path, "draft.md");
    }

    #[test]
    fn test_status_keeps_non_ascii_paths() {
        let (dir, repo) = init_repo();
        write(dir.path(), "posts/café/index.md", "c");
        commit_slug(&repo, "café");
        write(dir.path(), "posts/café/index.md", "changed");

        let status = repo.status().success().unwrap();

        assert_eq!(
            status.entries,
            vec![StatusEntry {
                code: " M".to_owned(),
                path: "posts/café/index.md".to_owned(),
            }]
        );
    }

    #[test]
    fn test_log_of_empty_repository() {
        let (_dir, repo) = init_repo();

        assert!(repo.log(5).success().unwrap().is_empty());
    }

    #[test]
    fn test_log_limit() {
        let (dir, repo) = init_repo();
        for slug in ["a", "b", "c"] {
            write(dir.path(), &format!("posts/{slug}/index.md"), slug);
            commit_slug(&repo, slug);
        }

        let log = repo.log(2).success().unwrap();

        assert_eq!(log.len(), 2);
        assert_eq!(log[0].summary, "create: posts/c");
        assert_eq!(log[1].summary, "create: posts/b");
    }

    #[test]
    fn test_push_then_pull_fast_forwards() {
        let remote = TempDir::new().unwrap();
        Repository::init_bare(remote.path()).unwrap();
        let (writer_dir, writer) = init_repo();
        let (reader_dir, reader) = init_repo();
        add_remote(writer_dir.path(), remote.path());
        add_remote(reader_dir.path(), remote.path());

        write(writer_dir.path(), "posts/a/index.md", "a");
        let id = commit_slug(&writer, "a");
        assert!(writer.push().is_success());

        let bare = Repository::open_bare(remote.path()).unwrap();
        assert_eq!(bare.refname_to_id("refs/heads/main").unwrap().to_string(), id);

        assert!(reader.pull().is_success());
        assert_eq!(
            fs::read_to_string(reader_dir.path().join("posts/a/index.md")).unwrap(),
            "a"
        );
        assert_eq!(reader.log(1).success().unwrap()[0].id, id);
        assert!(reader.status().success().unwrap().is_clean());

        assert!(reader.pull().is_success());
    }

    #[test]
    fn test_pull_of_diverged_branch_is_failure() {
        let remote = TempDir::new().unwrap();
        Repository::init_bare(remote.path()).unwrap();
        let (writer_dir, writer) = init_repo();
        let (reader_dir, reader) = init_repo();
        add_remote(writer_dir.path(), remote.path());
        add_remote(reader_dir.path(), remote.path());

        write(writer_dir.path(), "posts/a/index.md", "a");
        commit_slug(&writer, "a");
        assert!(writer.push().is_success());
        assert!(reader.pull().is_success());

        write(writer_dir.path(), "posts/b/index.md", "b");
        commit_slug(&writer, "b");
        assert!(writer.push().is_success());
        write(reader_dir.path(), "posts/c/index.md", "c");
        commit_slug(&reader, "c");

        let outcome = reader.pull();

        assert!(matches!(
            outcome.failure(),
            Some(VersioningFailure::NotFastForward { .. })
        ));
        assert!(!reader_dir.path().join("posts/b").exists());
    }

    #[test]
    fn test_push_without_remote_is_failure() {
        let (_dir, repo) = init_repo();

        let outcome = repo.push();

        assert!(matches!(
            outcome.failure(),
            Some(VersioningFailure::RemoteNotFound(name)) if name == "origin"
        ));
    }

    #[test]
    fn test_outside_repository_is_failure() {
        let dir = TempDir::new().unwrap();
        let repo = GitRepository::new(dir.path());

        let outcome = repo.status();

        assert!(matches!(
            outcome.failure(),
            Some(VersioningFailure::NotARepository(_))
        ));
    }

    #[test]
    fn test_pathspec_relative_to_repo() {
        let repo = GitRepository::new("/srv/site");

        assert_eq!(repo.pathspec(Path::new("/srv/site/content/posts/a")), "content/posts/a");
        assert_eq!(repo.pathspec(Path::new("content/posts/a")), "content/posts/a");
    }
}
