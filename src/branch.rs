//! Branch membership: derivation, reassignment, filtering and statistics.

use crate::types::{BRANCH_TAG_PREFIX, Branch, Task};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

/// Statuses counted as completed when no configuration says otherwise.
pub const DEFAULT_COMPLETED_STATUSES: &[&str] = &["done", "completed"];

/// Derive a branch from a tag list.
///
/// The first `branch:<name>` tag wins; no such tag means main.
pub fn branch_of<S: AsRef<str>>(tags: &[S]) -> Branch {
    tags.iter()
        .find_map(|tag| tag.as_ref().strip_prefix(BRANCH_TAG_PREFIX))
        .map(Branch::from_tag_value)
        .unwrap_or_default()
}

/// Return `task` placed on `branch`.
///
/// Reassigning the branch a task already has yields an identical task.
pub fn assign_branch(task: &Task, branch: &Branch) -> Task {
    let mut updated = task.clone();
    updated.branch = branch.clone();
    updated
}

/// Tasks whose branch equals `branch`, in input order.
pub fn filter_by_branch<'a>(tasks: &'a [Task], branch: &Branch) -> Vec<&'a Task> {
    tasks.iter().filter(|t| &t.branch == branch).collect()
}

/// Distinct branches present in `tasks`.
pub fn all_branches(tasks: &[Task]) -> BTreeSet<Branch> {
    tasks.iter().map(|t| t.branch.clone()).collect()
}

/// Per-branch task counts and completion rate.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BranchStats {
    pub branch: Branch,
    pub task_count: usize,
    pub completed_count: usize,
    pub by_status: BTreeMap<String, usize>,
    /// Percentage of completed tasks, 0 when the branch is empty.
    pub completion_rate: f64,
}

impl BranchStats {
    fn empty(branch: Branch) -> Self {
        Self {
            branch,
            task_count: 0,
            completed_count: 0,
            by_status: BTreeMap::new(),
            completion_rate: 0.0,
        }
    }

    fn add(&mut self, task: &Task, completed_statuses: &[String]) {
        let status = task.status.as_deref().unwrap_or("unknown");
        self.task_count += 1;
        *self.by_status.entry(status.to_string()).or_insert(0) += 1;
        if completed_statuses
            .iter()
            .any(|s| s.eq_ignore_ascii_case(status))
        {
            self.completed_count += 1;
        }
    }

    fn finish(mut self) -> Self {
        self.completion_rate = if self.task_count == 0 {
            0.0
        } else {
            self.completed_count as f64 / self.task_count as f64 * 100.0
        };
        self
    }
}

/// Compute statistics for one branch.
pub fn branch_statistics(
    tasks: &[Task],
    branch: &Branch,
    completed_statuses: &[String],
) -> BranchStats {
    filter_by_branch(tasks, branch)
        .into_iter()
        .fold(BranchStats::empty(branch.clone()), |mut stats, task| {
            stats.add(task, completed_statuses);
            stats
        })
        .finish()
}

/// Compute statistics for every branch in a single pass.
pub fn all_branch_statistics(
    tasks: &[Task],
    completed_statuses: &[String],
) -> BTreeMap<Branch, BranchStats> {
    let mut stats: BTreeMap<Branch, BranchStats> = BTreeMap::new();
    for task in tasks {
        stats
            .entry(task.branch.clone())
            .or_insert_with(|| BranchStats::empty(task.branch.clone()))
            .add(task, completed_statuses);
    }
    stats
        .into_iter()
        .map(|(branch, s)| (branch, s.finish()))
        .collect()
}

/// Owned copy of [`DEFAULT_COMPLETED_STATUSES`].
pub fn default_completed_statuses() -> Vec<String> {
    DEFAULT_COMPLETED_STATUSES
        .iter()
        .map(|s| s.to_string())
        .collect()
}
