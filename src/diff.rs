//! Field-level comparison of task states.
//!
//! This module provides:
//! - A pure diff between two task snapshots
//! - Per-commit history and comparison of two recorded versions
//! - Human-readable rendering of a diff

use crate::commits::CommitTracker;
use crate::error::Result;
use crate::types::{Commit, TaskState, format_timestamp};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

/// Old and new value of a field present on both sides.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct FieldChange {
    pub old: Value,
    pub new: Value,
}

/// Difference between two task states, bucketed by field.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct TaskDiff {
    /// Fields present on both sides with different values
    pub changed: BTreeMap<String, FieldChange>,
    /// Fields present only in the new state
    pub added: BTreeMap<String, Value>,
    /// Fields present only in the old state
    pub removed: BTreeMap<String, Value>,
    /// Fields present on both sides with equal values
    pub unchanged: BTreeMap<String, Value>,
}

impl TaskDiff {
    /// Check if anything changed.
    pub fn is_empty(&self) -> bool {
        self.changed.is_empty() && self.added.is_empty() && self.removed.is_empty()
    }

    /// Number of changed, added and removed fields.
    pub fn change_count(&self) -> usize {
        self.changed.len() + self.added.len() + self.removed.len()
    }
}

/// Compare two values, ignoring floating point precision issues.
pub(crate) fn values_equal(a: &Value, b: &Value) -> bool {
    match (a, b) {
        (Value::Number(na), Value::Number(nb)) => {
            if let (Some(fa), Some(fb)) = (na.as_f64(), nb.as_f64()) {
                (fa - fb).abs() < 1e-10
            } else {
                na == nb
            }
        }
        _ => a == b,
    }
}

/// Compute the field-level difference from `old` to `new`.
pub fn diff_states(old: &TaskState, new: &TaskState) -> TaskDiff {
    let mut diff = TaskDiff::default();

    let fields: BTreeSet<&String> = old.keys().chain(new.keys()).collect();
    for field in fields {
        match (old.get(field), new.get(field)) {
            (Some(o), Some(n)) if values_equal(o, n) => {
                diff.unchanged.insert(field.clone(), n.clone());
            }
            (Some(o), Some(n)) => {
                diff.changed.insert(
                    field.clone(),
                    FieldChange {
                        old: o.clone(),
                        new: n.clone(),
                    },
                );
            }
            (None, Some(n)) => {
                diff.added.insert(field.clone(), n.clone());
            }
            (Some(o), None) => {
                diff.removed.insert(field.clone(), o.clone());
            }
            (None, None) => {}
        }
    }

    diff
}

impl fmt::Display for TaskDiff {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.is_empty() {
            writeln!(f, "No changes.")?;
            return Ok(());
        }

        if !self.changed.is_empty() {
            writeln!(f, "Changed Fields ({}):", self.changed.len())?;
            for (field, change) in &self.changed {
                writeln!(f, "  ~ {}: {} -> {}", field, change.old, change.new)?;
            }
        }

        if !self.added.is_empty() {
            writeln!(f, "Added Fields ({}):", self.added.len())?;
            for (field, value) in &self.added {
                writeln!(f, "  + {}: {}", field, value)?;
            }
        }

        if !self.removed.is_empty() {
            writeln!(f, "Removed Fields ({}):", self.removed.len())?;
            for (field, value) in &self.removed {
                writeln!(f, "  - {}: {}", field, value)?;
            }
        }

        writeln!(
            f,
            "Summary: {} changed, {} added, {} removed, {} unchanged",
            self.changed.len(),
            self.added.len(),
            self.removed.len(),
            self.unchanged.len()
        )
    }
}

/// Render a diff as a titled report.
pub fn format_diff(diff: &TaskDiff, label: &str) -> String {
    format!("Task Diff: {}\n{}\n{}", label, "=".repeat(60), diff)
}

/// One commit of a task together with what it changed.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryEntry {
    pub commit: Commit,
    pub diff: TaskDiff,
}

/// Every commit of a task in order, each diffed against its own old state.
pub fn history(tracker: &CommitTracker, task_id: &str) -> Result<Vec<HistoryEntry>> {
    Ok(tracker
        .commits_for_task(task_id)?
        .into_iter()
        .map(|commit| {
            let diff = diff_states(&commit.old_state, &commit.new_state);
            HistoryEntry { commit, diff }
        })
        .collect())
}

/// A point in a task's history.
#[derive(Debug, Clone, PartialEq)]
pub enum VersionPoint {
    /// Full commit id or unique prefix
    Commit(String),
    /// The task as it stood at this time
    Time(DateTime<Utc>),
}

/// A version point resolved to a concrete state.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedVersion {
    pub label: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_id: Option<String>,
    pub state: TaskState,
}

impl ResolvedVersion {
    fn from_commit(commit: &Commit) -> Self {
        Self {
            label: format!(
                "commit {} ({})",
                commit.short_id(),
                format_timestamp(&commit.timestamp)
            ),
            commit_id: Some(commit.id.clone()),
            state: commit.new_state.clone(),
        }
    }
}

/// Result of comparing two versions of one task.
#[derive(Debug, Clone, Serialize)]
pub struct VersionComparison {
    pub task_id: String,
    pub from: ResolvedVersion,
    pub to: ResolvedVersion,
    pub diff: TaskDiff,
}

impl VersionComparison {
    pub fn label(&self) -> String {
        format!("{} [{} -> {}]", self.task_id, self.from.label, self.to.label)
    }
}

fn resolve_point(
    tracker: &CommitTracker,
    task_id: &str,
    point: &VersionPoint,
) -> Result<Option<ResolvedVersion>> {
    match point {
        VersionPoint::Commit(id) => Ok(tracker
            .find_commit(task_id, id)?
            .map(|c| ResolvedVersion::from_commit(&c))),
        VersionPoint::Time(at) => {
            let state = tracker.state_at_time(task_id, *at)?;
            Ok(Some(ResolvedVersion {
                label: format_timestamp(at),
                commit_id: None,
                // A time before the first commit resolves to "did not exist yet".
                state: state.unwrap_or_default(),
            }))
        }
    }
}

/// Compare two recorded versions of a task.
///
/// A missing `from` defaults to the first recorded version and a missing `to`
/// to the latest. Returns `None` when the task has no history or a commit id
/// does not resolve.
pub fn compare_versions(
    tracker: &CommitTracker,
    task_id: &str,
    from: Option<&VersionPoint>,
    to: Option<&VersionPoint>,
) -> Result<Option<VersionComparison>> {
    let commits = tracker.commits_for_task(task_id)?;
    let (Some(first), Some(last)) = (commits.first(), commits.last()) else {
        return Ok(None);
    };

    let from = match from {
        Some(point) => resolve_point(tracker, task_id, point)?,
        None => Some(ResolvedVersion::from_commit(first)),
    };
    let to = match to {
        Some(point) => resolve_point(tracker, task_id, point)?,
        None => Some(ResolvedVersion::from_commit(last)),
    };
    let (Some(from), Some(to)) = (from, to) else {
        return Ok(None);
    };

    let diff = diff_states(&from.state, &to.state);
    Ok(Some(VersionComparison {
        task_id: task_id.to_string(),
        from,
        to,
        diff,
    }))
}
