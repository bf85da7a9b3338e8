//! Task store adapter.
//!
//! The task list itself belongs to an external tool. This module only needs to
//! load its records, hand them to the versioning operations, and write them
//! back without disturbing anything it does not understand.

use crate::commits::CommitTracker;
use crate::error::{Result, VersioningError};
use crate::persist::{read_optional, write_json_atomic};
use crate::types::{Branch, Commit, Task, validate_task_id};
use serde_json::{Map, Value};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::{info, warn};

/// Task store location relative to the project root.
pub const DEFAULT_TASK_STORE: &str = ".todo2/state.todo2.json";

/// Key holding the task list inside the store document.
const TODOS_KEY: &str = "todos";

/// Read/write access to the persisted task list.
pub trait TaskStore {
    fn load_tasks(&self) -> Result<Vec<Task>>;
    fn save_tasks(&self, tasks: &[Task]) -> Result<()>;
}

/// JSON document store of the form `{"todos": [...], ...}`.
#[derive(Debug, Clone)]
pub struct JsonTaskStore {
    path: PathBuf,
}

impl JsonTaskStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn for_project(root: &Path) -> Self {
        Self::new(root.join(DEFAULT_TASK_STORE))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the raw document. `None` when the file does not exist.
    fn read_document(&self) -> Result<Option<Map<String, Value>>> {
        let Some(content) = read_optional(&self.path)? else {
            return Ok(None);
        };
        let value: Value = serde_json::from_str(&content).map_err(|e| {
            warn!(path = %self.path.display(), error = %e, "Task store is corrupted");
            VersioningError::corrupted(&self.path, e)
        })?;
        match value {
            Value::Object(obj) => Ok(Some(obj)),
            Value::Array(todos) => {
                let mut obj = Map::new();
                obj.insert(TODOS_KEY.to_string(), Value::Array(todos));
                Ok(Some(obj))
            }
            _ => Err(VersioningError::corrupted(
                &self.path,
                <serde_json::Error as serde::de::Error>::custom(
                    "expected an object with a \"todos\" list",
                ),
            )),
        }
    }
}

impl TaskStore for JsonTaskStore {
    fn load_tasks(&self) -> Result<Vec<Task>> {
        let Some(mut doc) = self.read_document()? else {
            return Ok(Vec::new());
        };
        match doc.remove(TODOS_KEY) {
            Some(todos) => serde_json::from_value(todos)
                .map_err(|e| VersioningError::corrupted(&self.path, e)),
            None => Ok(Vec::new()),
        }
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        let mut doc = self.read_document()?.unwrap_or_default();
        doc.insert(TODOS_KEY.to_string(), serde_json::to_value(tasks)?);

        write_json_atomic(&self.path, &Value::Object(doc))
    }
}

/// In-memory store for embedding and tests.
#[derive(Debug, Default)]
pub struct MemoryTaskStore {
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskStore {
    pub fn new(tasks: Vec<Task>) -> Self {
        Self {
            tasks: Mutex::new(tasks),
        }
    }
}

impl TaskStore for MemoryTaskStore {
    fn load_tasks(&self) -> Result<Vec<Task>> {
        Ok(self.tasks.lock().unwrap_or_else(|e| e.into_inner()).clone())
    }

    fn save_tasks(&self, tasks: &[Task]) -> Result<()> {
        *self.tasks.lock().unwrap_or_else(|e| e.into_inner()) = tasks.to_vec();
        Ok(())
    }
}

/// Tasks currently on `branch`.
pub fn branch_tasks(store: &dyn TaskStore, branch: &Branch) -> Result<Vec<Task>> {
    Ok(store
        .load_tasks()?
        .into_iter()
        .filter(|t| &t.branch == branch)
        .collect())
}

/// Outcome of moving one task to another branch.
#[derive(Debug, Clone)]
pub struct BranchChange {
    pub task: Task,
    pub previous: Branch,
    /// `None` when the task was already on the requested branch.
    pub commit: Option<Commit>,
}

/// Move a task to `branch` in the store and record the change.
///
/// The store is only written once the commit log has loaded cleanly.
///
/// Returns `None` if no task has `task_id`.
pub fn set_task_branch(
    store: &dyn TaskStore,
    tracker: &CommitTracker,
    task_id: &str,
    branch: &Branch,
    author: Option<&str>,
) -> Result<Option<BranchChange>> {
    validate_task_id(task_id)?;
    let mut tasks = store.load_tasks()?;
    let Some(task) = tasks.iter_mut().find(|t| t.id == task_id) else {
        return Ok(None);
    };

    let previous = task.branch.clone();
    if &previous == branch {
        return Ok(Some(BranchChange {
            task: task.clone(),
            previous,
            commit: None,
        }));
    }

    let old_state = task.to_state();
    *task = crate::branch::assign_branch(task, branch);
    let updated = task.clone();

    let commit = Commit::new(
        task_id,
        format!("Set branch: {} → {}", previous, branch),
        old_state,
        updated.to_state(),
        author,
        branch.clone(),
    )?;
    let commit = tracker
        .append_batch_with(vec![commit], || store.save_tasks(&tasks))?
        .pop();
    info!(task_id = %task_id, from = %previous, to = %branch, "Task moved to branch");

    Ok(Some(BranchChange {
        task: updated,
        previous,
        commit,
    }))
}
