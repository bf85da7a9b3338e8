//! Core types for task versioning: branches, task records and commits.

use crate::error::{Result, VersioningError};
use chrono::{DateTime, NaiveDate, NaiveDateTime, SecondsFormat, SubsecRound, Utc};
use regex_lite::Regex;
use serde::{Deserialize, Deserializer, Serialize, Serializer};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;
use std::sync::LazyLock;
use uuid::Uuid;

/// Name of the distinguished main branch.
pub const MAIN_BRANCH: &str = "main";

/// Tag prefix marking a task's branch membership in the task store.
pub const BRANCH_TAG_PREFIX: &str = "branch:";

/// Author recorded when the caller does not name one.
pub const DEFAULT_AUTHOR: &str = "system";

static BRANCH_NAME_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9][A-Za-z0-9._/-]*$").expect("branch name pattern is valid")
});

/// Field-name to value mapping describing a task at one point in time.
pub type TaskState = BTreeMap<String, Value>;

/// Branch a task belongs to.
///
/// `Main` sorts before every named branch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Branch {
    #[default]
    Main,
    Named(String),
}

impl Branch {
    /// Parse a user-supplied branch name, rejecting malformed names.
    pub fn parse(name: &str) -> Result<Self> {
        let name = name.trim();
        if name.is_empty() {
            return Err(VersioningError::invalid_branch(
                name,
                "branch name cannot be empty",
            ));
        }
        if name == MAIN_BRANCH {
            return Ok(Branch::Main);
        }
        if name.contains("..") || name.ends_with('/') || !BRANCH_NAME_RE.is_match(name) {
            return Err(VersioningError::invalid_branch(
                name,
                "use letters, digits, '.', '_', '-' or '/', starting with a letter or digit",
            ));
        }
        Ok(Branch::Named(name.to_string()))
    }

    /// Interpret the text after a `branch:` tag prefix.
    ///
    /// Stored data is never rejected: an empty value or `main` means main.
    pub fn from_tag_value(value: &str) -> Self {
        let value = value.trim();
        if value.is_empty() || value == MAIN_BRANCH {
            Branch::Main
        } else {
            Branch::Named(value.to_string())
        }
    }

    pub fn as_str(&self) -> &str {
        match self {
            Branch::Main => MAIN_BRANCH,
            Branch::Named(name) => name,
        }
    }

    pub fn is_main(&self) -> bool {
        matches!(self, Branch::Main)
    }

    /// The tag encoding this branch, or `None` for main.
    pub fn to_tag(&self) -> Option<String> {
        match self {
            Branch::Main => None,
            Branch::Named(name) => Some(format!("{}{}", BRANCH_TAG_PREFIX, name)),
        }
    }
}

impl fmt::Display for Branch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Branch {
    type Err = VersioningError;

    fn from_str(s: &str) -> Result<Self> {
        Branch::parse(s)
    }
}

impl Serialize for Branch {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}

impl<'de> Deserialize<'de> for Branch {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let value = Option::<String>::deserialize(deserializer)?;
        Ok(value
            .as_deref()
            .map(Branch::from_tag_value)
            .unwrap_or_default())
    }
}

/// Parse a timestamp as written by this crate or by older tooling.
///
/// Accepts RFC 3339, naive ISO-8601 date-times (taken as UTC) and bare dates.
pub fn parse_timestamp(s: &str) -> Option<DateTime<Utc>> {
    let s = s.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(s) {
        return Some(dt.with_timezone(&Utc));
    }
    for fmt in [
        "%Y-%m-%dT%H:%M:%S%.f",
        "%Y-%m-%dT%H:%M:%S",
        "%Y-%m-%d %H:%M:%S%.f",
        "%Y-%m-%d %H:%M:%S",
        "%Y-%m-%dT%H:%M",
    ] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(s, fmt) {
            return Some(naive.and_utc());
        }
    }
    NaiveDate::parse_from_str(s, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|naive| naive.and_utc())
}

/// Render a timestamp the way the commit log stores it.
pub fn format_timestamp(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

mod iso_timestamp {
    use super::{format_timestamp, parse_timestamp};
    use chrono::{DateTime, Utc};
    use serde::{Deserialize, Deserializer, Serializer, de::Error};

    pub fn serialize<S: Serializer>(ts: &DateTime<Utc>, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&format_timestamp(ts))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<DateTime<Utc>, D::Error> {
        let raw = String::deserialize(deserializer)?;
        parse_timestamp(&raw).ok_or_else(|| D::Error::custom(format!("invalid timestamp: {}", raw)))
    }
}

fn default_author() -> String {
    DEFAULT_AUTHOR.to_string()
}

/// An immutable record of one task state transition.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Commit {
    pub id: String,
    pub task_id: String,
    pub message: String,
    #[serde(default)]
    pub old_state: TaskState,
    #[serde(default)]
    pub new_state: TaskState,
    #[serde(with = "iso_timestamp")]
    pub timestamp: DateTime<Utc>,
    #[serde(default = "default_author")]
    pub author: String,
    #[serde(default)]
    pub branch: Branch,
}

impl Commit {
    /// Build a commit stamped with a fresh id and the current time.
    pub fn new(
        task_id: &str,
        message: impl Into<String>,
        old_state: TaskState,
        new_state: TaskState,
        author: Option<&str>,
        branch: Branch,
    ) -> Result<Self> {
        validate_task_id(task_id)?;
        let commit = Self {
            id: Uuid::new_v4().to_string(),
            task_id: task_id.to_string(),
            message: message.into(),
            old_state,
            new_state,
            timestamp: Utc::now().trunc_subsecs(6),
            author: author
                .filter(|a| !a.trim().is_empty())
                .map(str::to_string)
                .unwrap_or_else(default_author),
            branch,
        };
        commit.validate()?;
        Ok(commit)
    }

    /// Replace the recorded time, e.g. when importing historical transitions.
    /// Precision beyond microseconds is dropped, matching the stored form.
    pub fn with_timestamp(mut self, timestamp: DateTime<Utc>) -> Self {
        self.timestamp = timestamp.trunc_subsecs(6);
        self
    }

    /// Check the invariants every stored commit must satisfy.
    pub fn validate(&self) -> Result<()> {
        if self.id.trim().is_empty() {
            return Err(VersioningError::InvalidCommit("commit id is empty".to_string()));
        }
        validate_task_id(&self.task_id)?;
        if self.old_state.is_empty() && self.new_state.is_empty() {
            return Err(VersioningError::InvalidCommit(format!(
                "commit for task {} has neither an old nor a new state",
                self.task_id
            )));
        }
        Ok(())
    }

    /// Abbreviated id for display.
    pub fn short_id(&self) -> &str {
        let end = self
            .id
            .char_indices()
            .nth(8)
            .map(|(i, _)| i)
            .unwrap_or(self.id.len());
        &self.id[..end]
    }
}

/// Reject empty task ids and ids containing whitespace.
pub fn validate_task_id(task_id: &str) -> Result<()> {
    if task_id.trim().is_empty() {
        return Err(VersioningError::invalid_task_id(task_id, "task id cannot be empty"));
    }
    if task_id.chars().any(char::is_whitespace) {
        return Err(VersioningError::invalid_task_id(
            task_id,
            "task id cannot contain whitespace",
        ));
    }
    Ok(())
}

/// A task record as held by the task store.
///
/// Branch membership is a typed field; the `branch:<name>` tag exists only in
/// the serialized form. Fields this crate does not interpret are kept in
/// `extra` and written back untouched.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "StoredTask", into = "StoredTask")]
pub struct Task {
    pub id: String,
    pub name: Option<String>,
    pub status: Option<String>,
    /// Tags other than the branch tag. `None` when the record has no tag list.
    pub tags: Option<Vec<String>>,
    pub branch: Branch,
    pub last_modified: Option<String>,
    pub dependencies: Option<Vec<String>>,
    pub extra: Map<String, Value>,
}

impl Task {
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            name: None,
            status: None,
            tags: None,
            branch: Branch::Main,
            last_modified: None,
            dependencies: None,
            extra: Map::new(),
        }
    }

    /// Display name, falling back to the id.
    pub fn display_name(&self) -> &str {
        self.name.as_deref().unwrap_or(&self.id)
    }

    /// Tags as stored, including the branch tag when on a named branch.
    pub fn stored_tags(&self) -> Option<Vec<String>> {
        match (self.branch.to_tag(), &self.tags) {
            (None, tags) => tags.clone(),
            (Some(tag), None) => Some(vec![tag]),
            (Some(tag), Some(tags)) => {
                let mut all = tags.clone();
                all.push(tag);
                Some(all)
            }
        }
    }

    /// Full snapshot of the record as it appears in the task store.
    pub fn to_state(&self) -> TaskState {
        self.state_with_tags(self.stored_tags())
    }

    /// Snapshot without branch membership, used to compare copies of a task
    /// living on different branches.
    pub fn content_state(&self) -> TaskState {
        self.state_with_tags(self.tags.clone())
    }

    fn state_with_tags(&self, tags: Option<Vec<String>>) -> TaskState {
        let mut state: TaskState = self
            .extra
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        state.insert("id".to_string(), Value::String(self.id.clone()));
        if let Some(ref name) = self.name {
            state.insert("name".to_string(), Value::String(name.clone()));
        }
        if let Some(ref status) = self.status {
            state.insert("status".to_string(), Value::String(status.clone()));
        }
        if let Some(tags) = tags {
            state.insert(
                "tags".to_string(),
                Value::Array(tags.into_iter().map(Value::String).collect()),
            );
        }
        if let Some(ref modified) = self.last_modified {
            state.insert("lastModified".to_string(), Value::String(modified.clone()));
        }
        if let Some(ref deps) = self.dependencies {
            state.insert(
                "dependencies".to_string(),
                Value::Array(deps.iter().cloned().map(Value::String).collect()),
            );
        }
        state
    }

    /// Rebuild a task from a snapshot, placing it on `branch` regardless of
    /// any branch tag inside the snapshot.
    pub fn from_state(state: &TaskState, branch: Branch) -> Result<Self> {
        let object: Map<String, Value> = state
            .iter()
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        let mut task: Task = serde_json::from_value(Value::Object(object))?;
        task.branch = branch;
        Ok(task)
    }
}

/// Serialized shape of a task record.
#[derive(Serialize, Deserialize)]
struct StoredTask {
    id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    status: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tags: Option<Vec<String>>,
    #[serde(
        rename = "lastModified",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    last_modified: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    dependencies: Option<Vec<String>>,
    #[serde(flatten)]
    extra: Map<String, Value>,
}

impl From<StoredTask> for Task {
    fn from(raw: StoredTask) -> Self {
        let branch = raw
            .tags
            .as_deref()
            .map(crate::branch::branch_of)
            .unwrap_or_default();
        let tags = raw.tags.map(|tags| {
            tags.into_iter()
                .filter(|t| !t.starts_with(BRANCH_TAG_PREFIX))
                .collect()
        });
        Self {
            id: raw.id,
            name: raw.name,
            status: raw.status,
            tags,
            branch,
            last_modified: raw.last_modified,
            dependencies: raw.dependencies,
            extra: raw.extra,
        }
    }
}

impl From<Task> for StoredTask {
    fn from(task: Task) -> Self {
        let tags = task.stored_tags();
        Self {
            id: task.id,
            name: task.name,
            status: task.status,
            tags,
            last_modified: task.last_modified,
            dependencies: task.dependencies,
            extra: task.extra,
        }
    }
}
