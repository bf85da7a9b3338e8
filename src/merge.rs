//! Branch merge: conflict detection, resolution strategies and apply.
//!
//! A merge is planned from the current task store, then optionally applied.
//! Planning never writes. Applying rewrites the task store and records one
//! commit per modified task in a single batch.

use crate::commits::CommitTracker;
use crate::diff::values_equal;
use crate::error::{Result, VersioningError};
use crate::store::TaskStore;
use crate::types::{Branch, Commit, Task, TaskState, parse_timestamp};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::cmp::Ordering;
use std::collections::{HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use tracing::{debug, info};

/// Field consulted by the `newer` strategy unless configured otherwise.
pub const DEFAULT_RECENCY_FIELD: &str = "lastModified";

/// How conflicting field values are resolved.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MergeStrategy {
    /// Take the source branch's values
    Source,
    /// Keep the target branch's values
    Target,
    /// Take the values of whichever side has the greater recency field
    #[default]
    Newer,
}

impl MergeStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            MergeStrategy::Source => "source",
            MergeStrategy::Target => "target",
            MergeStrategy::Newer => "newer",
        }
    }
}

impl FromStr for MergeStrategy {
    type Err = VersioningError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "source" => Ok(MergeStrategy::Source),
            "target" => Ok(MergeStrategy::Target),
            "newer" => Ok(MergeStrategy::Newer),
            _ => Err(VersioningError::InvalidStrategy(s.to_string())),
        }
    }
}

impl fmt::Display for MergeStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Disagreement between the two copies of one task.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeConflict {
    pub task_id: String,
    pub source_state: TaskState,
    pub target_state: TaskState,
    /// Shared fields whose values differ, in field-name order
    pub conflict_fields: Vec<String>,
}

/// Find tasks present on both sides whose shared fields disagree.
///
/// Branch membership is not compared. Conflicts come out in source order.
pub fn detect_conflicts(source_tasks: &[Task], target_tasks: &[Task]) -> Vec<MergeConflict> {
    let targets: HashMap<&str, &Task> = target_tasks
        .iter()
        .rev()
        .map(|t| (t.id.as_str(), t))
        .collect();

    let mut seen = HashSet::new();
    let mut conflicts = Vec::new();
    for source in source_tasks {
        if !seen.insert(source.id.as_str()) {
            continue;
        }
        let Some(target) = targets.get(source.id.as_str()) else {
            continue;
        };
        if let Some(conflict) = compare_copies(source, target) {
            conflicts.push(conflict);
        }
    }
    conflicts
}

fn compare_copies(source: &Task, target: &Task) -> Option<MergeConflict> {
    let source_state = source.content_state();
    let target_state = target.content_state();

    let conflict_fields: Vec<String> = source_state
        .iter()
        .filter(|(field, _)| field.as_str() != "id")
        .filter_map(|(field, value)| match target_state.get(field) {
            Some(other) if !values_equal(value, other) => Some(field.clone()),
            _ => None,
        })
        .collect();

    if conflict_fields.is_empty() {
        return None;
    }
    Some(MergeConflict {
        task_id: source.id.clone(),
        source_state,
        target_state,
        conflict_fields,
    })
}

/// Order two recency values. Timestamps compare chronologically, numbers
/// numerically, anything else by its JSON text.
fn compare_recency(a: &Value, b: &Value) -> Ordering {
    if let (Some(sa), Some(sb)) = (a.as_str(), b.as_str())
        && let (Some(ta), Some(tb)) = (parse_timestamp(sa), parse_timestamp(sb))
    {
        return ta.cmp(&tb);
    }
    if let (Some(na), Some(nb)) = (a.as_f64(), b.as_f64()) {
        return na.partial_cmp(&nb).unwrap_or(Ordering::Equal);
    }
    match (a.as_str(), b.as_str()) {
        (Some(sa), Some(sb)) => sa.cmp(sb),
        _ => a.to_string().cmp(&b.to_string()),
    }
}

/// Whether the source copy wins under the `newer` strategy.
///
/// A side carrying the recency field beats one that lacks it. Ties and a
/// field missing on both sides keep the target.
fn source_is_newer(conflict: &MergeConflict, recency_field: &str) -> bool {
    match (
        conflict.source_state.get(recency_field),
        conflict.target_state.get(recency_field),
    ) {
        (Some(source), Some(target)) => compare_recency(source, target) == Ordering::Greater,
        (Some(_), None) => true,
        _ => false,
    }
}

/// Resolve a conflict using the default recency field.
pub fn resolve_conflict(conflict: &MergeConflict, strategy: MergeStrategy) -> TaskState {
    resolve_conflict_by(conflict, strategy, DEFAULT_RECENCY_FIELD)
}

/// Resolve a conflict, returning the target state with every conflicting
/// field taken from the winning side.
pub fn resolve_conflict_by(
    conflict: &MergeConflict,
    strategy: MergeStrategy,
    recency_field: &str,
) -> TaskState {
    let take_source = match strategy {
        MergeStrategy::Source => true,
        MergeStrategy::Target => false,
        MergeStrategy::Newer => source_is_newer(conflict, recency_field),
    };

    let mut resolved = conflict.target_state.clone();
    if take_source {
        for field in &conflict.conflict_fields {
            if let Some(value) = conflict.source_state.get(field) {
                resolved.insert(field.clone(), value.clone());
            }
        }
    }
    resolved
}

/// A source task that would move to the target branch.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MergeItem {
    pub task_id: String,
    pub name: String,
}

impl MergeItem {
    fn from_task(task: &Task) -> Self {
        Self {
            task_id: task.id.clone(),
            name: task.display_name().to_string(),
        }
    }
}

/// What a merge would do, computed without writing anything.
#[derive(Debug, Clone, Serialize)]
pub struct MergePlan {
    pub source_branch: Branch,
    pub target_branch: Branch,
    /// Source-only tasks that move to the target branch
    pub would_merge: Vec<MergeItem>,
    pub conflicts: Vec<MergeConflict>,
    /// Tasks identical on both sides; the source copy is dropped
    pub unchanged: Vec<String>,
}

impl MergePlan {
    fn build(tasks: &[Task], source: &Branch, target: &Branch) -> Self {
        let on = |branch: &Branch| -> Vec<Task> {
            tasks.iter().filter(|t| &t.branch == branch).cloned().collect()
        };
        let source_tasks = on(source);
        let target_tasks = on(target);
        let target_ids: HashSet<&str> = target_tasks.iter().map(|t| t.id.as_str()).collect();

        let conflicts = detect_conflicts(&source_tasks, &target_tasks);
        let conflicted: HashSet<&str> = conflicts.iter().map(|c| c.task_id.as_str()).collect();

        let mut seen = HashSet::new();
        let mut would_merge = Vec::new();
        let mut unchanged = Vec::new();
        for task in &source_tasks {
            if !seen.insert(task.id.as_str()) {
                continue;
            }
            if !target_ids.contains(task.id.as_str()) {
                would_merge.push(MergeItem::from_task(task));
            } else if !conflicted.contains(task.id.as_str()) {
                unchanged.push(task.id.clone());
            }
        }

        Self {
            source_branch: source.clone(),
            target_branch: target.clone(),
            would_merge,
            conflicts,
            unchanged,
        }
    }

    pub fn has_conflicts(&self) -> bool {
        !self.conflicts.is_empty()
    }
}

/// Parameters of an apply-mode or dry-run merge.
#[derive(Debug, Clone)]
pub struct MergeOptions {
    pub strategy: MergeStrategy,
    pub recency_field: String,
    pub author: Option<String>,
    pub dry_run: bool,
}

impl Default for MergeOptions {
    fn default() -> Self {
        Self {
            strategy: MergeStrategy::default(),
            recency_field: DEFAULT_RECENCY_FIELD.to_string(),
            author: None,
            dry_run: false,
        }
    }
}

/// A conflict together with the state it resolved to.
#[derive(Debug, Clone, Serialize)]
pub struct ResolvedConflict {
    pub task_id: String,
    pub conflict_fields: Vec<String>,
    pub resolved_state: TaskState,
}

/// Result of [`merge_branches`].
#[derive(Debug, Clone, Serialize)]
pub struct MergeOutcome {
    #[serde(flatten)]
    pub plan: MergePlan,
    pub strategy: MergeStrategy,
    pub dry_run: bool,
    /// Number of tasks moved to the target branch
    pub merged: usize,
    pub resolved: Vec<ResolvedConflict>,
    /// Commits recorded by the merge, empty for a dry run
    pub commits: Vec<Commit>,
}

fn check_branches(source: &Branch, target: &Branch) -> Result<()> {
    if source == target {
        return Err(VersioningError::SameBranch(source.to_string()));
    }
    Ok(())
}

/// Plan a merge of `source` into `target` without writing anything.
pub fn preview_merge(store: &dyn TaskStore, source: &Branch, target: &Branch) -> Result<MergePlan> {
    check_branches(source, target)?;
    let tasks = store.load_tasks()?;
    let plan = MergePlan::build(&tasks, source, target);
    debug!(
        source = %source,
        target = %target,
        would_merge = plan.would_merge.len(),
        conflicts = plan.conflicts.len(),
        "Planned merge"
    );
    Ok(plan)
}

/// Merge `source` into `target`.
///
/// Source-only tasks move to the target branch. Conflicting tasks have their
/// resolved values written into the target copy and the source copy removed.
/// Identical copies are collapsed silently. With `dry_run` nothing is written.
/// The store is saved inside the commit log's locked cycle, so an unreadable
/// log leaves the store untouched.
pub fn merge_branches(
    store: &dyn TaskStore,
    tracker: &CommitTracker,
    source: &Branch,
    target: &Branch,
    options: &MergeOptions,
) -> Result<MergeOutcome> {
    check_branches(source, target)?;
    let mut tasks = store.load_tasks()?;
    let plan = MergePlan::build(&tasks, source, target);

    let resolved: Vec<ResolvedConflict> = plan
        .conflicts
        .iter()
        .map(|conflict| {
            let mut state = resolve_conflict_by(conflict, options.strategy, &options.recency_field);
            for (field, value) in &conflict.source_state {
                state.entry(field.clone()).or_insert_with(|| value.clone());
            }
            ResolvedConflict {
                task_id: conflict.task_id.clone(),
                conflict_fields: conflict.conflict_fields.clone(),
                resolved_state: state,
            }
        })
        .collect();

    if options.dry_run {
        return Ok(MergeOutcome {
            merged: plan.would_merge.len(),
            plan,
            strategy: options.strategy,
            dry_run: true,
            resolved,
            commits: Vec::new(),
        });
    }

    let author = options.author.as_deref();
    let moving: HashSet<&str> = plan.would_merge.iter().map(|m| m.task_id.as_str()).collect();
    let collapsing: HashSet<&str> = plan
        .unchanged
        .iter()
        .map(String::as_str)
        .chain(resolved.iter().map(|r| r.task_id.as_str()))
        .collect();
    let resolutions: HashMap<&str, &ResolvedConflict> =
        resolved.iter().map(|r| (r.task_id.as_str(), r)).collect();

    let mut batch = Vec::new();
    let mut moved = HashSet::new();
    let mut rewritten = HashSet::new();
    let mut kept = Vec::with_capacity(tasks.len());

    for mut task in tasks.drain(..) {
        if &task.branch == source {
            if moving.contains(task.id.as_str()) && moved.insert(task.id.clone()) {
                let old_state = task.to_state();
                task.branch = target.clone();
                batch.push(Commit::new(
                    &task.id,
                    format!("Merge task: {} ({} → {})", task.display_name(), source, target),
                    old_state,
                    task.to_state(),
                    author,
                    target.clone(),
                )?);
                kept.push(task);
            } else if !collapsing.contains(task.id.as_str()) {
                kept.push(task);
            }
            continue;
        }

        if &task.branch == target
            && let Some(resolution) = resolutions.get(task.id.as_str())
            && rewritten.insert(task.id.clone())
        {
            let old_state = task.to_state();
            let updated = Task::from_state(&resolution.resolved_state, target.clone())?;
            if updated.to_state() == old_state {
                kept.push(task);
                continue;
            }
            batch.push(Commit::new(
                &task.id,
                format!(
                    "Merge task: {} ({} → {}, {})",
                    updated.display_name(),
                    source,
                    target,
                    options.strategy
                ),
                old_state,
                updated.to_state(),
                author,
                target.clone(),
            )?);
            kept.push(updated);
            continue;
        }

        kept.push(task);
    }

    let commits = tracker.append_batch_with(batch, || store.save_tasks(&kept))?;

    info!(
        source = %source,
        target = %target,
        strategy = %options.strategy,
        merged = moved.len(),
        resolved = resolved.len(),
        commits = commits.len(),
        "Merged branch"
    );

    Ok(MergeOutcome {
        merged: moved.len(),
        plan,
        strategy: options.strategy,
        dry_run: false,
        resolved,
        commits,
    })
}
