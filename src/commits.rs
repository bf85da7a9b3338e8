//! Append-only commit log for task state transitions.
//!
//! The log is a single JSON file. Every append performs a full
//! read-modify-write cycle while holding a process-wide mutex for the log path
//! and an exclusive advisory lock on a sidecar `.lock` file. The new log
//! replaces the old one atomically.

use crate::error::{Result, VersioningError};
use crate::persist::{read_optional, write_json_atomic};
use crate::types::{Branch, Commit, TaskState};
use chrono::{DateTime, Utc};
use file_guard::Lock;
use serde::Serialize;
use serde_json::Value;
use std::collections::HashMap;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::{Arc, LazyLock, Mutex};
use tracing::{debug, warn};

/// Commit log location relative to the project root.
pub const DEFAULT_COMMIT_LOG: &str = ".todo2/commits.json";

/// One mutex per log path. Advisory file locks are owned by the process, so
/// threads must be serialized before taking the file lock.
static LOG_LOCKS: LazyLock<Mutex<HashMap<PathBuf, Arc<Mutex<()>>>>> =
    LazyLock::new(Default::default);

fn process_lock(path: &Path) -> Arc<Mutex<()>> {
    let key = std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf());
    let mut locks = LOG_LOCKS.lock().unwrap_or_else(|e| e.into_inner());
    Arc::clone(locks.entry(key).or_default())
}

#[derive(Serialize)]
struct LogFile<'a> {
    commits: &'a [Commit],
}

/// Owner of the commit log file.
pub struct CommitTracker {
    path: PathBuf,
    write_lock: Arc<Mutex<()>>,
}

impl CommitTracker {
    /// Create a tracker for the log at `path`. The file is created on first write.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        let path = path.into();
        Self {
            write_lock: process_lock(&path),
            path,
        }
    }

    /// Tracker for the default log location under `root`.
    pub fn for_project(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_COMMIT_LOG))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn lock_path(&self) -> PathBuf {
        let mut name = self
            .path
            .file_name()
            .map(|n| n.to_os_string())
            .unwrap_or_default();
        name.push(".lock");
        self.path.with_file_name(name)
    }

    /// Load the whole log. A missing file is an empty log.
    ///
    /// Anything other than `{"commits": [...]}` or a bare array is corrupted,
    /// including a well-formed object without a `commits` list.
    fn load(&self) -> Result<Vec<Commit>> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(Vec::new());
        };

        let parsed = serde_json::from_str::<Value>(&content)
            .and_then(|value| match value {
                Value::Object(mut obj) => match obj.remove("commits") {
                    Some(list @ Value::Array(_)) => Ok(list),
                    Some(_) => Err(shape_error("\"commits\" is not a list")),
                    None => Err(shape_error("missing \"commits\" list")),
                },
                list @ Value::Array(_) => Ok(list),
                _ => Err(shape_error("expected an object with a \"commits\" list")),
            })
            .and_then(serde_json::from_value::<Vec<Commit>>);

        parsed.map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Commit log is corrupted");
            VersioningError::corrupted(&self.path, e)
        })
    }

    /// Run `f` against the in-memory log under both locks, then write it back.
    fn modify<T>(&self, f: impl FnOnce(&mut Vec<Commit>) -> Result<T>) -> Result<T> {
        let _guard = self.write_lock.lock().unwrap_or_else(|e| e.into_inner());

        let lock_path = self.lock_path();
        if let Some(parent) = lock_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent).map_err(|e| VersioningError::io(parent, e))?;
        }
        let mut lock_file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&lock_path)
            .map_err(|e| VersioningError::io(&lock_path, e))?;
        let _file_lock = file_guard::lock(&mut lock_file, Lock::Exclusive, 0, 1)
            .map_err(|e| VersioningError::io(&lock_path, e))?;
        debug!(path = %lock_path.display(), "Acquired commit log lock");

        let mut commits = self.load()?;
        let result = f(&mut commits)?;
        write_json_atomic(&self.path, &LogFile { commits: &commits })?;
        Ok(result)
    }

    /// Record a new commit and return it.
    pub fn create_commit(
        &self,
        task_id: &str,
        message: &str,
        old_state: TaskState,
        new_state: TaskState,
        author: Option<&str>,
        branch: &Branch,
    ) -> Result<Commit> {
        let commit = Commit::new(task_id, message, old_state, new_state, author, branch.clone())?;
        self.append(commit)
    }

    /// Append a pre-built commit, e.g. one carrying a historical timestamp.
    pub fn append(&self, commit: Commit) -> Result<Commit> {
        commit.validate()?;
        self.modify(|commits| {
            commits.push(commit.clone());
            Ok(())
        })?;
        debug!(
            commit_id = %commit.id,
            task_id = %commit.task_id,
            branch = %commit.branch,
            "Recorded commit"
        );
        Ok(commit)
    }

    /// Append several commits in one locked cycle so they land contiguously.
    pub fn append_batch(&self, batch: Vec<Commit>) -> Result<Vec<Commit>> {
        if batch.is_empty() {
            return Ok(batch);
        }
        self.append_batch_with(batch, || Ok(()))
    }

    /// Append `batch` together with a change to some other store.
    ///
    /// `apply` runs under the log lock, after the log has loaded cleanly and
    /// before the new log is written. If the log is unreadable `apply` never
    /// runs. If `apply` fails nothing is appended.
    pub fn append_batch_with(
        &self,
        batch: Vec<Commit>,
        apply: impl FnOnce() -> Result<()>,
    ) -> Result<Vec<Commit>> {
        for commit in &batch {
            commit.validate()?;
        }
        self.modify(|commits| {
            apply()?;
            commits.extend(batch.iter().cloned());
            Ok(())
        })?;
        debug!(count = batch.len(), "Recorded commit batch");
        Ok(batch)
    }

    /// Every commit in append order.
    pub fn all_commits(&self) -> Result<Vec<Commit>> {
        self.load()
    }

    /// Commits for one task in append order.
    pub fn commits_for_task(&self, task_id: &str) -> Result<Vec<Commit>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|c| c.task_id == task_id)
            .collect())
    }

    /// Commits recorded while their task was on `branch`.
    pub fn commits_for_branch(&self, branch: &Branch) -> Result<Vec<Commit>> {
        Ok(self
            .load()?
            .into_iter()
            .filter(|c| &c.branch == branch)
            .collect())
    }

    pub fn latest_commit_for_task(&self, task_id: &str) -> Result<Option<Commit>> {
        Ok(self.commits_for_task(task_id)?.pop())
    }

    /// State of a task as of `at`, or `None` if it had no commit by then.
    pub fn state_at_time(&self, task_id: &str, at: DateTime<Utc>) -> Result<Option<TaskState>> {
        Ok(self
            .commits_for_task(task_id)?
            .into_iter()
            .filter(|c| c.timestamp <= at)
            .max_by_key(|c| c.timestamp)
            .map(|c| c.new_state))
    }

    /// Find a commit of `task_id` by full id or unique prefix.
    pub fn find_commit(&self, task_id: &str, commit_id: &str) -> Result<Option<Commit>> {
        let commits = self.commits_for_task(task_id)?;
        if let Some(exact) = commits.iter().find(|c| c.id == commit_id) {
            return Ok(Some(exact.clone()));
        }
        let mut matches = commits.into_iter().filter(|c| c.id.starts_with(commit_id));
        match (matches.next(), matches.next()) {
            (Some(only), None) if !commit_id.is_empty() => Ok(Some(only)),
            _ => Ok(None),
        }
    }

    pub fn track_create(
        &self,
        task_id: &str,
        state: TaskState,
        author: Option<&str>,
        branch: &Branch,
    ) -> Result<Commit> {
        let message = format!("Create task: {}", state_name(&state, task_id));
        self.create_commit(task_id, &message, TaskState::new(), state, author, branch)
    }

    pub fn track_update(
        &self,
        task_id: &str,
        old_state: TaskState,
        new_state: TaskState,
        author: Option<&str>,
        branch: &Branch,
    ) -> Result<Commit> {
        let message = format!("Update task: {}", state_name(&new_state, task_id));
        self.create_commit(task_id, &message, old_state, new_state, author, branch)
    }

    pub fn track_delete(
        &self,
        task_id: &str,
        old_state: TaskState,
        author: Option<&str>,
        branch: &Branch,
    ) -> Result<Commit> {
        let message = format!("Delete task: {}", state_name(&old_state, task_id));
        self.create_commit(task_id, &message, old_state, TaskState::new(), author, branch)
    }

    /// Record a status transition. `task_state` supplies the other fields.
    pub fn track_status_change(
        &self,
        task_id: &str,
        old_status: &str,
        new_status: &str,
        task_state: &TaskState,
        author: Option<&str>,
        branch: &Branch,
    ) -> Result<Commit> {
        let mut old_state = task_state.clone();
        old_state.insert("status".to_string(), Value::String(old_status.to_string()));
        let mut new_state = task_state.clone();
        new_state.insert("status".to_string(), Value::String(new_status.to_string()));

        let message = format!("Change status: {} → {}", old_status, new_status);
        self.create_commit(task_id, &message, old_state, new_state, author, branch)
    }
}

fn shape_error(msg: &str) -> serde_json::Error {
    <serde_json::Error as serde::de::Error>::custom(msg)
}

fn state_name<'a>(state: &'a TaskState, task_id: &'a str) -> &'a str {
    state
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or(task_id)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;
    use serde_json::json;
    use tempfile::TempDir;

    fn setup() -> (TempDir, CommitTracker) {
        let dir = TempDir::new().expect("Failed to create temp directory");
        let tracker = CommitTracker::for_project(dir.path());
        (dir, tracker)
    }

    fn state(value: Value) -> TaskState {
        serde_json::from_value(value).unwrap()
    }

    fn at(hour: u32, minute: u32) -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2025, 1, 26, hour, minute, 0).unwrap()
    }

    #[test]
    fn test_missing_log_is_empty() {
        let (_dir, tracker) = setup();
        assert!(tracker.all_commits().unwrap().is_empty());
        assert!(tracker.latest_commit_for_task("task-1").unwrap().is_none());
    }

    #[test]
    fn test_create_commit_persists() {
        let (_dir, tracker) = setup();

        let commit = tracker
            .create_commit(
                "task-123",
                "Create task: Test",
                TaskState::new(),
                state(json!({"id": "task-123", "name": "Test"})),
                Some("user"),
                &Branch::Main,
            )
            .unwrap();

        assert!(tracker.path().exists());
        let commits = tracker.commits_for_task("task-123").unwrap();
        assert_eq!(commits, vec![commit]);
    }

    #[test]
    fn test_commits_for_branch_uses_recorded_branch() {
        let (_dir, tracker) = setup();
        let feature = Branch::Named("feature-auth".to_string());
        let s = state(json!({"id": "x"}));

        tracker.track_create("task-1", s.clone(), None, &feature).unwrap();
        tracker.track_create("task-2", s.clone(), None, &feature).unwrap();
        tracker.track_create("task-3", s, None, &Branch::Main).unwrap();

        let commits = tracker.commits_for_branch(&feature).unwrap();
        assert_eq!(commits.len(), 2);
        assert!(commits.iter().all(|c| c.branch == feature));
    }

    #[test]
    fn test_latest_commit() {
        let (_dir, tracker) = setup();
        tracker
            .track_create("task-123", state(json!({"status": "todo"})), None, &Branch::Main)
            .unwrap();
        let second = tracker
            .track_update(
                "task-123",
                state(json!({"status": "todo"})),
                state(json!({"status": "done"})),
                None,
                &Branch::Main,
            )
            .unwrap();

        let latest = tracker.latest_commit_for_task("task-123").unwrap().unwrap();
        assert_eq!(latest.id, second.id);
    }

    #[test]
    fn test_state_at_time() {
        let (_dir, tracker) = setup();
        let first = Commit::new(
            "task-123",
            "Create",
            TaskState::new(),
            state(json!({"status": "todo"})),
            None,
            Branch::Main,
        )
        .unwrap()
        .with_timestamp(at(10, 0));
        let second = Commit::new(
            "task-123",
            "Update",
            state(json!({"status": "todo"})),
            state(json!({"status": "done"})),
            None,
            Branch::Main,
        )
        .unwrap()
        .with_timestamp(at(11, 0));
        tracker.append_batch(vec![first, second]).unwrap();

        assert_eq!(tracker.state_at_time("task-123", at(9, 59)).unwrap(), None);
        assert_eq!(
            tracker.state_at_time("task-123", at(10, 0)).unwrap(),
            Some(state(json!({"status": "todo"})))
        );
        assert_eq!(
            tracker.state_at_time("task-123", at(10, 30)).unwrap(),
            Some(state(json!({"status": "todo"})))
        );
        assert_eq!(
            tracker.state_at_time("task-123", at(11, 30)).unwrap(),
            Some(state(json!({"status": "done"})))
        );
    }

    #[test]
    fn test_corrupted_log_is_an_error_and_is_not_overwritten() {
        let (_dir, tracker) = setup();
        std::fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        std::fs::write(tracker.path(), "{ this is not json").unwrap();

        let err = tracker.all_commits().unwrap_err();
        assert!(matches!(err, VersioningError::Corrupted { .. }));

        let append =
            tracker.track_create("task-1", state(json!({"id": "task-1"})), None, &Branch::Main);
        assert!(matches!(append, Err(VersioningError::Corrupted { .. })));
        assert_eq!(
            std::fs::read_to_string(tracker.path()).unwrap(),
            "{ this is not json"
        );
    }

    #[test]
    fn test_log_without_commits_list_is_corrupted() {
        let (_dir, tracker) = setup();
        std::fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        let foreign = r#"{"history":[{"id":"c1"}],"version":3}"#;

        for content in [foreign, r#"{"commits": {"id": "c1"}}"#, "42"] {
            std::fs::write(tracker.path(), content).unwrap();
            assert!(matches!(
                tracker.all_commits(),
                Err(VersioningError::Corrupted { .. })
            ));
        }

        std::fs::write(tracker.path(), foreign).unwrap();
        let append =
            tracker.track_create("task-1", state(json!({"id": "task-1"})), None, &Branch::Main);
        assert!(matches!(append, Err(VersioningError::Corrupted { .. })));
        assert_eq!(std::fs::read_to_string(tracker.path()).unwrap(), foreign);
    }

    #[test]
    fn test_fresh_commits_match_reloaded_log() {
        let (dir, tracker) = setup();
        let created: Vec<Commit> = (0..20)
            .map(|i| {
                let id = format!("task-{}", i);
                tracker
                    .track_create(&id, state(json!({"id": id})), None, &Branch::Main)
                    .unwrap()
            })
            .collect();

        let reopened = CommitTracker::for_project(dir.path());
        for commit in &created {
            let reloaded = reopened.latest_commit_for_task(&commit.task_id).unwrap();
            assert_eq!(reloaded.as_ref(), Some(commit));
        }
    }

    #[test]
    fn test_append_batch_with_skips_apply_on_corrupted_log() {
        let (_dir, tracker) = setup();
        std::fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        std::fs::write(tracker.path(), "{ broken").unwrap();

        let mut applied = false;
        let result = tracker.append_batch_with(Vec::new(), || {
            applied = true;
            Ok(())
        });

        assert!(matches!(result, Err(VersioningError::Corrupted { .. })));
        assert!(!applied);
    }

    #[test]
    fn test_append_batch_with_failed_apply_appends_nothing() {
        let (_dir, tracker) = setup();
        let commit = Commit::new(
            "task-1",
            "Create task: A",
            TaskState::new(),
            state(json!({"id": "task-1"})),
            None,
            Branch::Main,
        )
        .unwrap();

        let result = tracker.append_batch_with(vec![commit], || {
            Err(VersioningError::InvalidCommit("store rejected".to_string()))
        });

        assert!(result.is_err());
        assert!(tracker.all_commits().unwrap().is_empty());
    }

    #[test]
    fn test_reads_bare_array_log() {
        let (_dir, tracker) = setup();
        std::fs::create_dir_all(tracker.path().parent().unwrap()).unwrap();
        std::fs::write(
            tracker.path(),
            json!([{
                "id": "c1",
                "task_id": "task-1",
                "message": "Create task: A",
                "old_state": {},
                "new_state": {"id": "task-1"},
                "timestamp": "2025-01-26T10:00:00",
                "author": "system",
                "branch": "main"
            }])
            .to_string(),
        )
        .unwrap();

        let commits = tracker.all_commits().unwrap();
        assert_eq!(commits.len(), 1);
        assert_eq!(commits[0].id, "c1");
    }

    #[test]
    fn test_find_commit_by_prefix() {
        let (_dir, tracker) = setup();
        let commit = tracker
            .track_create("task-1", state(json!({"id": "task-1"})), None, &Branch::Main)
            .unwrap();

        let found = tracker.find_commit("task-1", commit.short_id()).unwrap();
        assert_eq!(found.map(|c| c.id), Some(commit.id.clone()));
        assert!(tracker.find_commit("task-2", &commit.id).unwrap().is_none());
        assert!(tracker.find_commit("task-1", "").unwrap().is_none());
    }

    #[test]
    fn test_track_helpers() {
        let (_dir, tracker) = setup();
        let data = state(json!({"id": "task-123", "name": "Test Task", "status": "done"}));

        let create = tracker
            .track_create("task-123", data.clone(), Some("user"), &Branch::Main)
            .unwrap();
        assert_eq!(create.message, "Create task: Test Task");
        assert!(create.old_state.is_empty());

        let delete = tracker
            .track_delete("task-123", data.clone(), Some("user"), &Branch::Main)
            .unwrap();
        assert_eq!(delete.message, "Delete task: Test Task");
        assert!(delete.new_state.is_empty());

        let status = tracker
            .track_status_change("task-123", "todo", "done", &data, Some("user"), &Branch::Main)
            .unwrap();
        assert!(status.message.starts_with("Change status"));
        assert_eq!(status.old_state["status"], json!("todo"));
        assert_eq!(status.new_state["status"], json!("done"));
        assert_eq!(status.new_state["name"], json!("Test Task"));
    }

    #[test]
    fn test_lock_file_is_sidecar() {
        let (_dir, tracker) = setup();
        assert!(tracker.lock_path().ends_with("commits.json.lock"));
    }
}
