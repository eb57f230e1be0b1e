//! Configured content store: backend, manager and optional auto-commit.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::info;

use folio_config::{Backend, Config, Overrides};
use folio_content::{Collection, ContentManager, Entry, EntryData, EntryPage, ListOptions};
use folio_storage::{Action, MessageTemplate, Storage};
use folio_storage_fs::FsStorage;
use folio_storage_github::{GitHubOptions, GitHubStorage};
use folio_vcs::{Author, GitRepository, VcsOutcome};

use crate::error::FolioError;

/// Result of a mutating operation.
///
/// `commit` is `None` when auto-commit is off or the backend commits by
/// itself. A failed commit does not undo the write.
#[derive(Debug)]
pub struct Mutation<T> {
    /// Operation result.
    pub value: T,
    /// Outcome of the auto-commit, if one was attempted.
    pub commit: Option<VcsOutcome<Option<String>>>,
}

impl<T> Mutation<T> {
    /// Id of the commit created by auto-commit, if any.
    #[must_use]
    pub fn commit_id(&self) -> Option<&str> {
        match &self.commit {
            Some(VcsOutcome::Success(Some(id))) => Some(id),
            _ => None,
        }
    }
}

#[derive(Debug)]
struct AutoCommit {
    repository: GitRepository,
    content_root: PathBuf,
}

/// Content store assembled from configuration.
///
/// Reads go straight to the [`ContentManager`]. Mutations on the local backend
/// are followed by a git commit of the touched entry directory when
/// auto-commit is enabled.
#[derive(Debug)]
pub struct Folio {
    manager: ContentManager,
    auto_commit: Option<AutoCommit>,
}

impl Folio {
    /// Wrap a manager without auto-commit.
    #[must_use]
    pub fn new(manager: ContentManager) -> Self {
        Self {
            manager,
            auto_commit: None,
        }
    }

    /// Commit every mutation below `content_root` to `repository`.
    #[must_use]
    pub fn with_auto_commit(
        mut self,
        repository: GitRepository,
        content_root: impl Into<PathBuf>,
    ) -> Self {
        self.auto_commit = Some(AutoCommit {
            repository,
            content_root: content_root.into(),
        });
        self
    }

    /// Load configuration and open the store it describes.
    pub fn open(
        config_path: Option<&Path>,
        overrides: Option<&Overrides>,
    ) -> Result<Self, FolioError> {
        let config = Config::load(config_path, overrides)?;
        Self::from_config(&config)
    }

    /// Open the store described by `config`.
    pub fn from_config(config: &Config) -> Result<Self, FolioError> {
        let messages = MessageTemplate::from_pattern(config.git_resolved.message_template.clone());

        let storage: Arc<dyn Storage> = match config.content_resolved.backend {
            Backend::Local => Arc::new(FsStorage::new(config.content_resolved.root.clone())),
            Backend::GitHub => {
                let github = config.require_github()?;
                let options = GitHubOptions::new(&github.owner, &github.repo)
                    .with_branch(&github.branch)
                    .with_content_path(&github.content_path)
                    .with_rate_limit_warn_threshold(github.rate_limit_warn_threshold);
                Arc::new(GitHubStorage::connect(
                    options,
                    &github.api_url,
                    github.token.clone(),
                )?)
            }
        };

        let manager = config.collections.iter().fold(
            ContentManager::new(storage).with_message_template(messages.clone()),
            |manager, (name, collection)| {
                manager.with_collection(
                    Collection::new(name, &collection.path)
                        .with_slug_field(&collection.slug_field),
                )
            },
        );
        let mut folio = Self::new(manager);

        let git = &config.git_resolved;
        if git.auto_commit && config.content_resolved.backend == Backend::Local {
            let mut repository = GitRepository::new(&git.repo_dir)
                .with_remote(&git.remote)
                .with_branch(&git.branch)
                .with_message_template(messages);
            if let (Some(name), Some(email)) = (&git.author_name, &git.author_email) {
                repository = repository.with_author(Author::new(name, email));
            }
            folio = folio.with_auto_commit(repository, config.content_resolved.root.clone());
        }

        info!(
            backend = folio.manager.storage().backend(),
            collections = config.collections.len(),
            auto_commit = folio.auto_commit.is_some(),
            "Opened content store"
        );
        Ok(folio)
    }

    /// Content manager.
    #[must_use]
    pub fn manager(&self) -> &ContentManager {
        &self.manager
    }

    /// Repository used for auto-commit, if enabled.
    #[must_use]
    pub fn repository(&self) -> Option<&GitRepository> {
        self.auto_commit.as_ref().map(|auto| &auto.repository)
    }

    /// List entries of a collection.
    pub fn list_entries(
        &self,
        collection: &str,
        options: &ListOptions,
    ) -> Result<EntryPage, FolioError> {
        Ok(self.manager.list_entries(collection, options)?)
    }

    /// Read one entry.
    pub fn get_entry(&self, collection: &str, slug: &str) -> Result<Option<Entry>, FolioError> {
        Ok(self.manager.get_entry(collection, slug)?)
    }

    /// Create an entry and commit it.
    pub fn create_entry(
        &self,
        collection: &str,
        data: EntryData,
        message: Option<&str>,
    ) -> Result<Mutation<Entry>, FolioError> {
        let entry = self.manager.create_entry(collection, data, message)?;
        let commit = self.commit(Action::Create, collection, &entry.slug, message)?;
        Ok(Mutation {
            value: entry,
            commit,
        })
    }

    /// Update an entry and commit it.
    pub fn update_entry(
        &self,
        collection: &str,
        slug: &str,
        data: EntryData,
        message: Option<&str>,
    ) -> Result<Mutation<Entry>, FolioError> {
        let entry = self.manager.update_entry(collection, slug, data, message)?;
        let commit = self.commit(Action::Update, collection, slug, message)?;
        Ok(Mutation {
            value: entry,
            commit,
        })
    }

    /// Delete an entry and commit the removal.
    pub fn delete_entry(
        &self,
        collection: &str,
        slug: &str,
        message: Option<&str>,
    ) -> Result<Mutation<()>, FolioError> {
        self.manager.delete_entry(collection, slug, message)?;
        let commit = self.commit(Action::Delete, collection, slug, message)?;
        Ok(Mutation { value: (), commit })
    }

    /// Store an image below an entry and commit it.
    pub fn save_image(
        &self,
        collection: &str,
        slug: &str,
        filename: &str,
        content: &[u8],
        message: Option<&str>,
    ) -> Result<Mutation<String>, FolioError> {
        let path = self
            .manager
            .save_image(collection, slug, filename, content, message)?;
        let commit = self.commit(Action::Update, collection, slug, message)?;
        Ok(Mutation {
            value: path,
            commit,
        })
    }

    /// Delete an image and commit the removal.
    pub fn delete_image(
        &self,
        collection: &str,
        slug: &str,
        filename: &str,
        message: Option<&str>,
    ) -> Result<Mutation<()>, FolioError> {
        self.manager
            .delete_image(collection, slug, filename, message)?;
        let commit = self.commit(Action::Update, collection, slug, message)?;
        Ok(Mutation { value: (), commit })
    }

    fn commit(
        &self,
        action: Action,
        collection: &str,
        slug: &str,
        message: Option<&str>,
    ) -> Result<Option<VcsOutcome<Option<String>>>, FolioError> {
        let Some(auto) = &self.auto_commit else {
            return Ok(None);
        };
        let dir = self.manager.entry_dir(collection, slug)?;
        let path = auto.content_root.join(dir);
        Ok(Some(auto.repository.commit(
            &[path],
            action,
            collection,
            slug,
            message,
        )))
    }
}

#[cfg(test)]
mod tests {
    use std::fs;

    use folio_storage_github::MockGitHub;
    use folio_vcs::VersioningFailure;
    use pretty_assertions::assert_eq;
    use serde_json::json;
    use tempfile::TempDir;

    use super::*;

    fn git_init(dir: &Path) {
        git2::Repository::init(dir).unwrap();
    }

    fn local_config(dir: &Path, auto_commit: bool) -> Config {
        let toml = format!(
            r#"
[content]
root = "content"

[git]
auto_commit = {auto_commit}
author_name = "Folio Test"
author_email = "folio@example.com"

[collections.posts]
path = "posts"
"#
        );
        Config::from_toml(&toml, dir).unwrap()
    }

    fn post(title: &str, draft: bool) -> EntryData {
        EntryData::default()
            .with_field("title", title)
            .with_field("draft", draft)
    }

    #[test]
    fn test_local_store_without_auto_commit() {
        let temp = TempDir::new().unwrap();
        let folio = Folio::from_config(&local_config(temp.path(), false)).unwrap();

        let created = folio
            .create_entry("posts", post("Hello World", true), None)
            .unwrap();

        assert!(created.commit.is_none());
        assert!(folio.repository().is_none());
        assert!(
            temp.path()
                .join("content/posts/hello-world/index.md")
                .exists()
        );
    }

    #[test]
    fn test_local_auto_commit() {
        let temp = TempDir::new().unwrap();
        git_init(temp.path());
        let folio = Folio::from_config(&local_config(temp.path(), true)).unwrap();

        let created = folio
            .create_entry("posts", post("Hello World", true), None)
            .unwrap();
        let updated = folio
            .update_entry("posts", "hello-world", post("Hello World", false), Some("Unpublish"))
            .unwrap();
        let deleted = folio.delete_entry("posts", "hello-world", None).unwrap();

        assert!(created.commit_id().is_some());
        assert!(updated.commit_id().is_some());
        assert!(deleted.commit_id().is_some());
        let log = folio.repository().unwrap().log(10).success().unwrap();
        let summaries: Vec<_> = log.iter().map(|c| c.summary.as_str()).collect();
        assert_eq!(
            summaries,
            vec![
                "delete: posts/hello-world",
                "Unpublish",
                "create: posts/hello-world",
            ]
        );
        assert_eq!(log[0].author_name, "Folio Test");
    }

    #[test]
    fn test_commit_failure_keeps_write() {
        let temp = TempDir::new().unwrap();
        let content_root = temp.path().join("content");
        let manager = ContentManager::new(Arc::new(FsStorage::new(content_root.clone())))
            .with_collection(Collection::new("posts", "posts"));
        let missing_repo = temp.path().join("not-a-repo");
        fs::create_dir_all(&missing_repo).unwrap();
        let folio = Folio::new(manager).with_auto_commit(GitRepository::new(&missing_repo), &content_root);

        let created = folio
            .create_entry("posts", post("Hello World", true), None)
            .unwrap();

        let failure = created.commit.as_ref().and_then(VcsOutcome::failure);
        assert!(failure.is_some());
        assert!(created.commit_id().is_none());
        assert!(content_root.join("posts/hello-world/index.md").exists());
        assert!(matches!(failure, Some(VersioningFailure::NotARepository(_))));
    }

    #[test]
    fn test_from_config_github_backend() {
        let temp = TempDir::new().unwrap();
        let toml = r#"
[content]
backend = "github"

[git]
auto_commit = true

[github]
owner = "acme"
repo = "site"
token = "${FOLIO_TEST_UNSET_TOKEN:-anonymous}"
content_path = "content"

[collections.posts]
path = "posts"
"#;
        let config = Config::from_toml(toml, temp.path()).unwrap();

        let folio = Folio::from_config(&config).unwrap();

        assert_eq!(folio.manager().storage().backend(), "GitHub");
        assert!(folio.repository().is_none());
    }

    #[test]
    fn test_scenario_on_github() {
        let mock = MockGitHub::new("acme", "site", "main");
        let storage = GitHubStorage::new(
            GitHubOptions::new("acme", "site").with_content_path("content"),
            mock.clone(),
        )
        .unwrap();
        let manager = ContentManager::new(Arc::new(storage))
            .with_collection(Collection::new("posts", "posts"))
            .with_message_template(MessageTemplate::from_pattern("cms: {action} {slug}"));
        let folio = Folio::new(manager);

        let created = folio
            .create_entry("posts", post("Hello World", true), None)
            .unwrap();
        assert!(created.commit.is_none());
        assert!(mock.file("content/posts/hello-world/index.md").is_some());
        assert_eq!(mock.last_commit_message(), "cms: create hello-world");

        let loaded = folio.get_entry("posts", "hello-world").unwrap().unwrap();
        assert_eq!(loaded.fields["draft"], json!(true));

        let updated = folio
            .update_entry("posts", "hello-world", post("Hello World", false), None)
            .unwrap()
            .value;
        assert_eq!(updated.created_at, loaded.created_at);
        assert!(updated.updated_at > loaded.updated_at);
        assert_eq!(
            folio.get_entry("posts", "hello-world").unwrap().unwrap().fields["draft"],
            json!(false)
        );

        let image = folio
            .save_image("posts", "hello-world", "cover.png", &[0x89, 0x50, 0x4e, 0x47], None)
            .unwrap()
            .value;
        assert_eq!(
            mock.file(&format!("content/posts/hello-world/{image}")),
            Some(vec![0x89, 0x50, 0x4e, 0x47])
        );

        let before = mock.commit_count();
        folio.delete_entry("posts", "hello-world", None).unwrap();

        assert_eq!(mock.commit_count(), before + 1);
        assert_eq!(mock.last_commit_message(), "cms: delete hello-world");
        assert!(mock.file("content/posts/hello-world/index.md").is_none());
        assert!(mock.file(&format!("content/posts/hello-world/{image}")).is_none());
        assert!(folio.get_entry("posts", "hello-world").unwrap().is_none());
    }

    #[test]
    fn test_pagination_on_github() {
        let mut mock = MockGitHub::new("acme", "site", "main");
        for i in 0..5 {
            mock = mock.with_file(
                &format!("posts/p{i}/index.md"),
                format!("---\ntitle: Post {i}\n---\n\nBody"),
            );
        }
        let storage = GitHubStorage::new(GitHubOptions::new("acme", "site"), mock).unwrap();
        let folio = Folio::new(
            ContentManager::new(Arc::new(storage))
                .with_collection(Collection::new("posts", "posts")),
        );

        let mut slugs = Vec::new();
        for page in 1..=3 {
            let options = ListOptions::default().with_page(page).with_limit(2);
            let result = folio.list_entries("posts", &options).unwrap();
            assert_eq!(result.total, 5);
            slugs.extend(result.entries.into_iter().map(|e| e.slug));
        }
        slugs.sort();

        assert_eq!(slugs, vec!["p0", "p1", "p2", "p3", "p4"]);
    }
}
