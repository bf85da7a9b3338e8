//! Configuration loading and management.

use crate::branch::default_completed_statuses;
use crate::commits::DEFAULT_COMMIT_LOG;
use crate::error::{Result, VersioningError};
use crate::merge::{DEFAULT_RECENCY_FIELD, MergeStrategy};
use crate::store::DEFAULT_TASK_STORE;
use crate::types::DEFAULT_AUTHOR;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::debug;

/// Project-level config file, relative to the project root.
pub const PROJECT_CONFIG: &str = ".todo2/versioning.yaml";

/// User-level config directory under the home directory.
pub const USER_CONFIG_DIR: &str = ".task-versioning";

/// Versioning configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub paths: PathsConfig,

    #[serde(default)]
    pub history: HistoryConfig,

    #[serde(default)]
    pub merge: MergeConfig,

    #[serde(default)]
    pub branches: BranchesConfig,
}

/// File locations. Relative paths are resolved against the project root.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PathsConfig {
    /// Task store document.
    #[serde(default = "default_task_store")]
    pub task_store: PathBuf,

    /// Commit log.
    #[serde(default = "default_commit_log")]
    pub commit_log: PathBuf,
}

impl Default for PathsConfig {
    fn default() -> Self {
        Self {
            task_store: default_task_store(),
            commit_log: default_commit_log(),
        }
    }
}

fn default_task_store() -> PathBuf {
    PathBuf::from(DEFAULT_TASK_STORE)
}

fn default_commit_log() -> PathBuf {
    PathBuf::from(DEFAULT_COMMIT_LOG)
}

/// Commit recording and history display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HistoryConfig {
    /// Author recorded when none is given.
    #[serde(default = "default_author")]
    pub default_author: String,

    /// Commits shown by listings and graphs unless overridden.
    #[serde(default = "default_max_commits")]
    pub max_commits: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            default_author: default_author(),
            max_commits: default_max_commits(),
        }
    }
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

fn default_max_commits() -> usize {
    50
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MergeConfig {
    #[serde(default)]
    pub default_strategy: MergeStrategy,

    /// Field compared by the `newer` strategy.
    #[serde(default = "default_recency_field")]
    pub recency_field: String,
}

impl Default for MergeConfig {
    fn default() -> Self {
        Self {
            default_strategy: MergeStrategy::default(),
            recency_field: default_recency_field(),
        }
    }
}

fn default_recency_field() -> String {
    DEFAULT_RECENCY_FIELD.to_string()
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchesConfig {
    /// Statuses counted as completed in branch statistics (case-insensitive).
    #[serde(default = "default_completed_statuses")]
    pub completed_statuses: Vec<String>,
}

impl Default for BranchesConfig {
    fn default() -> Self {
        Self {
            completed_statuses: default_completed_statuses(),
        }
    }
}

/// Where the effective configuration came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConfigSource {
    Explicit(PathBuf),
    Project(PathBuf),
    User(PathBuf),
    Defaults,
}

impl fmt::Display for ConfigSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConfigSource::Explicit(p) => write!(f, "explicit ({})", p.display()),
            ConfigSource::Project(p) => write!(f, "project ({})", p.display()),
            ConfigSource::User(p) => write!(f, "user ({})", p.display()),
            ConfigSource::Defaults => write!(f, "defaults"),
        }
    }
}

impl Config {
    /// Load configuration from file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| VersioningError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&content).map_err(|e| VersioningError::Config {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Resolve the effective configuration for a project.
    ///
    /// An explicit path must exist. Otherwise the project file is tried, then
    /// the user file, then defaults. Environment overrides apply last.
    pub fn resolve(root: &Path, explicit: Option<&Path>) -> Result<(Self, ConfigSource)> {
        let user_config = dirs::home_dir().map(|h| h.join(USER_CONFIG_DIR).join("config.yaml"));
        Self::resolve_from(root, explicit, user_config.as_deref(), |key| {
            std::env::var(key).ok()
        })
    }

    fn resolve_from(
        root: &Path,
        explicit: Option<&Path>,
        user_config: Option<&Path>,
        env: impl Fn(&str) -> Option<String>,
    ) -> Result<(Self, ConfigSource)> {
        let (mut config, source) = if let Some(path) = explicit {
            (Self::load(path)?, ConfigSource::Explicit(path.to_path_buf()))
        } else {
            let project = root.join(PROJECT_CONFIG);
            if project.is_file() {
                (Self::load(&project)?, ConfigSource::Project(project))
            } else if let Some(user) = user_config.filter(|p| p.is_file()) {
                (Self::load(user)?, ConfigSource::User(user.to_path_buf()))
            } else {
                (Self::default(), ConfigSource::Defaults)
            }
        };

        if let Some(task_store) = env("TASK_VERSIONING_TASK_STORE") {
            config.paths.task_store = PathBuf::from(task_store);
        }
        if let Some(commit_log) = env("TASK_VERSIONING_COMMIT_LOG") {
            config.paths.commit_log = PathBuf::from(commit_log);
        }
        if let Some(author) = env("TASK_VERSIONING_AUTHOR").filter(|a| !a.trim().is_empty()) {
            config.history.default_author = author;
        }

        debug!(source = %source, "Resolved configuration");
        Ok((config, source))
    }

    pub fn task_store_path(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.task_store)
    }

    pub fn commit_log_path(&self, root: &Path) -> PathBuf {
        root.join(&self.paths.commit_log)
    }
}
