//! Configuration management for folio.
//!
//! Parses `folio.toml` configuration files with serde and provides
//! auto-discovery of config files in parent directories.
//!
//! Embedding applications can override file values via [`Overrides`].
//!
//! ## Environment Variable Expansion
//!
//! String configuration values support environment variable expansion:
//!
//! - `${VAR}` - expands to the value of VAR, errors if unset
//! - `${VAR:-default}` - expands to VAR if set, otherwise uses default
//!
//! Expanded fields:
//! - `github.owner`
//! - `github.repo`
//! - `github.token`
//! - `github.api_url`

mod expand;

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::Deserialize;

/// Configuration filename to search for.
const CONFIG_FILENAME: &str = "folio.toml";

/// Default commit message pattern.
const DEFAULT_MESSAGE_TEMPLATE: &str = "{action}: {collection}/{slug}";

/// Settings that override configuration file values.
///
/// All fields are optional. Only non-None values override the loaded config.
#[derive(Debug, Default)]
pub struct Overrides {
    /// Override the local content root.
    pub content_root: Option<PathBuf>,
    /// Override the storage backend.
    pub backend: Option<Backend>,
    /// Override the auto-commit flag.
    pub auto_commit: Option<bool>,
}

/// Storage backend selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Local filesystem below `content.root`.
    #[default]
    Local,
    /// GitHub repository described by the `[github]` section.
    #[serde(rename = "github")]
    GitHub,
}

/// Application configuration.
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Content configuration (paths are relative strings from TOML).
    content: ContentConfigRaw,
    /// Git configuration (paths are relative strings from TOML).
    git: GitConfigRaw,
    /// GitHub configuration (required when `content.backend = "github"`).
    pub github: Option<GitHubConfig>,
    /// Collection registry by name.
    pub collections: BTreeMap<String, CollectionConfig>,

    /// Resolved content configuration (set after loading).
    #[serde(skip)]
    pub content_resolved: ContentConfig,
    /// Resolved git configuration (set after loading).
    #[serde(skip)]
    pub git_resolved: GitConfig,
    /// Path to the config file (set after loading).
    #[serde(skip)]
    pub config_path: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self::default_with_base(Path::new("."))
    }
}

/// Raw content configuration as parsed from TOML.
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
struct ContentConfigRaw {
    root: Option<String>,
    backend: Backend,
}

/// Resolved content configuration with absolute paths.
#[derive(Debug, Default)]
pub struct ContentConfig {
    /// Local content root.
    pub root: PathBuf,
    /// Selected storage backend.
    pub backend: Backend,
}

/// Raw git configuration as parsed from TOML.
#[derive(Debug, Deserialize)]
#[serde(default)]
struct GitConfigRaw {
    auto_commit: bool,
    repo_dir: Option<String>,
    remote: String,
    branch: String,
    message_template: String,
    author_name: Option<String>,
    author_email: Option<String>,
}

impl Default for GitConfigRaw {
    fn default() -> Self {
        Self {
            auto_commit: false,
            repo_dir: None,
            remote: "origin".to_owned(),
            branch: default_branch(),
            message_template: DEFAULT_MESSAGE_TEMPLATE.to_owned(),
            author_name: None,
            author_email: None,
        }
    }
}

/// Resolved git configuration for the local backend.
#[derive(Debug)]
pub struct GitConfig {
    /// Commit after every content mutation.
    pub auto_commit: bool,
    /// Working tree root.
    pub repo_dir: PathBuf,
    /// Remote for pull and push.
    pub remote: String,
    /// Branch for pull and push.
    pub branch: String,
    /// Commit message pattern with `{action}`, `{collection}` and `{slug}`.
    pub message_template: String,
    /// Commit author name.
    pub author_name: Option<String>,
    /// Commit author email.
    pub author_email: Option<String>,
}

impl Default for GitConfig {
    fn default() -> Self {
        let raw = GitConfigRaw::default();
        Self {
            auto_commit: raw.auto_commit,
            repo_dir: PathBuf::from("."),
            remote: raw.remote,
            branch: raw.branch,
            message_template: raw.message_template,
            author_name: None,
            author_email: None,
        }
    }
}

/// GitHub configuration.
#[derive(Debug, Deserialize)]
pub struct GitHubConfig {
    /// Repository owner.
    pub owner: String,
    /// Repository name.
    pub repo: String,
    /// Target branch.
    #[serde(default = "default_branch")]
    pub branch: String,
    /// API token.
    #[serde(default)]
    pub token: Option<String>,
    /// Repository subpath acting as content root.
    #[serde(default)]
    pub content_path: String,
    /// API base URL.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    /// Remaining-quota level at which a warning is logged.
    #[serde(default = "default_rate_limit_warn_threshold")]
    pub rate_limit_warn_threshold: u64,
}

impl GitHubConfig {
    /// Validate that all required fields are properly set.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any field is empty or has invalid format.
    pub fn validate(&self) -> Result<(), ConfigError> {
        require_non_empty(&self.owner, "github.owner")?;
        require_non_empty(&self.repo, "github.repo")?;
        require_non_empty(&self.branch, "github.branch")?;
        require_non_empty(&self.api_url, "github.api_url")?;
        require_http_url(&self.api_url, "github.api_url")?;
        Ok(())
    }
}

/// Collection registry entry.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct CollectionConfig {
    /// Directory below the content root.
    pub path: String,
    /// Field whose value is slugified into the entry slug.
    #[serde(default = "default_slug_field")]
    pub slug_field: String,
}

fn default_branch() -> String {
    "main".to_owned()
}

fn default_api_url() -> String {
    "https://api.github.com".to_owned()
}

fn default_rate_limit_warn_threshold() -> u64 {
    10
}

fn default_slug_field() -> String {
    "title".to_owned()
}

/// Configuration error.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File not found.
    #[error("Configuration file not found: {}", .0.display())]
    NotFound(PathBuf),
    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    /// TOML parsing error.
    #[error("TOML parse error: {0}")]
    Parse(#[from] toml::de::Error),
    /// Validation error.
    #[error("Configuration error: {0}")]
    Validation(String),
    /// Environment variable error during expansion.
    #[error("Environment variable error in {field}: {message}")]
    EnvVar {
        /// Config field path (e.g., "`github.token`").
        field: String,
        /// Error message (e.g., "${`GITHUB_TOKEN`} not set").
        message: String,
    },
}

/// Require a string field to be non-empty.
fn require_non_empty(value: &str, field: &str) -> Result<(), ConfigError> {
    if value.is_empty() {
        return Err(ConfigError::Validation(format!("{field} cannot be empty")));
    }
    Ok(())
}

/// Require a URL field to use http:// or https:// scheme.
fn require_http_url(url: &str, field: &str) -> Result<(), ConfigError> {
    if !url.starts_with("http://") && !url.starts_with("https://") {
        return Err(ConfigError::Validation(format!(
            "{field} must start with http:// or https://"
        )));
    }
    Ok(())
}

impl Config {
    /// Load configuration from file with optional overrides.
    ///
    /// If `config_path` is provided, loads from that file.
    /// Otherwise, searches for `folio.toml` in current directory and parents.
    ///
    /// Overrides are applied after loading and path resolution.
    ///
    /// # Errors
    ///
    /// Returns error if explicit `config_path` doesn't exist or parsing fails.
    pub fn load(
        config_path: Option<&Path>,
        overrides: Option<&Overrides>,
    ) -> Result<Self, ConfigError> {
        let mut config = if let Some(path) = config_path {
            if !path.exists() {
                return Err(ConfigError::NotFound(path.to_path_buf()));
            }
            Self::load_from_file(path)?
        } else if let Some(discovered) = Self::discover_config() {
            Self::load_from_file(&discovered)?
        } else {
            Self::default_with_cwd()
        };

        if let Some(overrides) = overrides {
            config.apply_overrides(overrides);
        }

        Ok(config)
    }

    /// Parse configuration from a TOML string, resolving paths against `base`.
    ///
    /// # Errors
    ///
    /// Returns error if parsing, expansion or validation fails.
    pub fn from_toml(content: &str, base: &Path) -> Result<Self, ConfigError> {
        let mut config: Self = toml::from_str(content)?;
        config.expand_env_vars()?;
        config.resolve_paths(base);
        config.validate()?;
        Ok(config)
    }

    fn apply_overrides(&mut self, overrides: &Overrides) {
        if let Some(root) = &overrides.content_root {
            self.content_resolved.root.clone_from(root);
        }
        if let Some(backend) = overrides.backend {
            self.content_resolved.backend = backend;
        }
        if let Some(auto_commit) = overrides.auto_commit {
            self.git_resolved.auto_commit = auto_commit;
        }
    }

    /// Get validated GitHub configuration.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if the section is missing or invalid.
    pub fn require_github(&self) -> Result<&GitHubConfig, ConfigError> {
        let github = self.github.as_ref().ok_or_else(|| {
            ConfigError::Validation("[github] section required in config".into())
        })?;
        github.validate()?;
        Ok(github)
    }

    /// Search for config file in current directory and parents.
    fn discover_config() -> Option<PathBuf> {
        let mut current = std::env::current_dir().ok()?;
        loop {
            let candidate = current.join(CONFIG_FILENAME);
            if candidate.exists() {
                return Some(candidate);
            }
            if !current.pop() {
                return None;
            }
        }
    }

    /// Create default config with paths relative to current working directory.
    fn default_with_cwd() -> Self {
        let cwd = std::env::current_dir().unwrap_or_default();
        Self::default_with_base(&cwd)
    }

    /// Create default config with paths relative to given base directory.
    fn default_with_base(base: &Path) -> Self {
        Self {
            content: ContentConfigRaw::default(),
            git: GitConfigRaw::default(),
            github: None,
            collections: BTreeMap::new(),
            content_resolved: ContentConfig {
                root: base.join("content"),
                backend: Backend::Local,
            },
            git_resolved: GitConfig {
                repo_dir: base.to_path_buf(),
                ..GitConfig::default()
            },
            config_path: None,
        }
    }

    /// Load configuration from a specific file.
    fn load_from_file(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config_dir = path.parent().unwrap_or(Path::new("."));
        let mut config = Self::from_toml(&content, config_dir)?;
        config.config_path = Some(path.to_path_buf());
        Ok(config)
    }

    /// Validate configuration values.
    ///
    /// Called automatically after loading from file.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::Validation` if any validation fails.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.validate_git()?;
        self.validate_collections()?;
        if self.content_resolved.backend == Backend::GitHub {
            self.require_github()?;
        }
        Ok(())
    }

    fn validate_git(&self) -> Result<(), ConfigError> {
        let git = &self.git_resolved;
        require_non_empty(&git.message_template, "git.message_template")?;
        require_non_empty(&git.remote, "git.remote")?;
        require_non_empty(&git.branch, "git.branch")?;

        if git.author_name.is_some() != git.author_email.is_some() {
            return Err(ConfigError::Validation(
                "git.author_name and git.author_email must be set together".to_owned(),
            ));
        }
        Ok(())
    }

    fn validate_collections(&self) -> Result<(), ConfigError> {
        for (name, collection) in &self.collections {
            require_non_empty(&collection.path, &format!("collections.{name}.path"))?;
            require_non_empty(
                &collection.slug_field,
                &format!("collections.{name}.slug_field"),
            )?;
            if collection.path.split(['/', '\\']).any(|s| s == "..") {
                return Err(ConfigError::Validation(format!(
                    "collections.{name}.path must stay inside the content root"
                )));
            }
        }
        Ok(())
    }

    /// Expand environment variable references in configuration strings.
    fn expand_env_vars(&mut self) -> Result<(), ConfigError> {
        if let Some(ref mut github) = self.github {
            github.owner = expand::expand_env(&github.owner, "github.owner")?;
            github.repo = expand::expand_env(&github.repo, "github.repo")?;
            github.api_url = expand::expand_env(&github.api_url, "github.api_url")?;
            github.token = expand::expand_env_opt(github.token.as_deref(), "github.token")?;
        }
        Ok(())
    }

    /// Resolve relative paths to absolute paths based on config directory.
    fn resolve_paths(&mut self, config_dir: &Path) {
        self.content_resolved = ContentConfig {
            root: config_dir.join(self.content.root.as_deref().unwrap_or("content")),
            backend: self.content.backend,
        };

        let git = &self.git;
        self.git_resolved = GitConfig {
            auto_commit: git.auto_commit,
            repo_dir: git
                .repo_dir
                .as_deref()
                .map_or_else(|| config_dir.to_path_buf(), |d| config_dir.join(d)),
            remote: git.remote.clone(),
            branch: git.branch.clone(),
            message_template: git.message_template.clone(),
            author_name: git.author_name.clone(),
            author_email: git.author_email.clone(),
        };
    }
}
