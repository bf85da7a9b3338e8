//! Text formatting of command results.

use crate::branch::BranchStats;
use crate::diff::HistoryEntry;
use crate::merge::{MergeOutcome, MergePlan};
use crate::types::{Branch, Commit, Task, TaskState, format_timestamp};
use std::collections::BTreeMap;

/// Output format for command results.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Text,
}

impl OutputFormat {
    pub fn from_json_flag(json: bool) -> Self {
        if json {
            OutputFormat::Json
        } else {
            OutputFormat::Text
        }
    }
}

/// One line per commit: short id, time, branch, author and message.
pub fn format_commit_line(commit: &Commit) -> String {
    format!(
        "{}  {}  [{}]  {}: {}",
        commit.short_id(),
        format_timestamp(&commit.timestamp),
        commit.branch,
        commit.author,
        commit.message
    )
}

pub fn format_commits(commits: &[Commit]) -> String {
    if commits.is_empty() {
        return "No commits found.\n".to_string();
    }
    let mut out = format!("Commits ({})\n", commits.len());
    for commit in commits {
        out.push_str(&format_commit_line(commit));
        out.push('\n');
    }
    out
}

/// Branch table with per-status counts.
pub fn format_branch_stats(stats: &BTreeMap<Branch, BranchStats>) -> String {
    if stats.is_empty() {
        return "No tasks found.\n".to_string();
    }
    let mut out = format!("Branches ({})\n", stats.len());
    for s in stats.values() {
        out.push_str(&format!(
            "  {}: {} tasks, {} completed ({:.1}%)\n",
            s.branch, s.task_count, s.completed_count, s.completion_rate
        ));
        let statuses: Vec<String> = s
            .by_status
            .iter()
            .map(|(status, count)| format!("{}={}", status, count))
            .collect();
        if !statuses.is_empty() {
            out.push_str(&format!("      {}\n", statuses.join(", ")));
        }
    }
    out
}

pub fn format_tasks(branch: &Branch, tasks: &[&Task]) -> String {
    let mut out = format!("Tasks on {} ({})\n", branch, tasks.len());
    for task in tasks {
        out.push_str(&format!(
            "  {}  [{}]  {}\n",
            task.id,
            task.status.as_deref().unwrap_or("unknown"),
            task.display_name()
        ));
    }
    out
}

pub fn format_history(task_id: &str, entries: &[HistoryEntry]) -> String {
    if entries.is_empty() {
        return format!("No history found for task {}.\n", task_id);
    }
    let mut out = format!("History of {} ({} commits)\n", task_id, entries.len());
    for entry in entries {
        out.push('\n');
        out.push_str(&format_commit_line(&entry.commit));
        out.push('\n');
        for line in entry.diff.to_string().lines() {
            out.push_str("    ");
            out.push_str(line);
            out.push('\n');
        }
    }
    out
}

/// Pretty-printed state, or a note that the task did not exist yet.
pub fn format_state(task_id: &str, at: &str, state: Option<&TaskState>) -> String {
    match state {
        Some(state) if state.is_empty() => format!("Task {} was deleted as of {}.\n", task_id, at),
        Some(state) => {
            let body =
                serde_json::to_string_pretty(state).unwrap_or_else(|_| format!("{:?}", state));
            format!("Task {} as of {}\n{}\n", task_id, at, body)
        }
        None => format!("Task {} did not exist at {}.\n", task_id, at),
    }
}

pub fn format_plan(plan: &MergePlan) -> String {
    let mut out = format!(
        "Merge preview: {} → {}\n",
        plan.source_branch, plan.target_branch
    );

    out.push_str(&format!("\nWould merge ({}):\n", plan.would_merge.len()));
    for item in &plan.would_merge {
        out.push_str(&format!("  + {}  {}\n", item.task_id, item.name));
    }

    if plan.has_conflicts() {
        out.push_str(&format!("\nConflicts ({}):\n", plan.conflicts.len()));
        for conflict in &plan.conflicts {
            out.push_str(&format!(
                "  ! {}  fields: {}\n",
                conflict.task_id,
                conflict.conflict_fields.join(", ")
            ));
        }
    } else {
        out.push_str("\nNo conflicts.\n");
    }

    if !plan.unchanged.is_empty() {
        out.push_str(&format!("\nIdentical on both branches ({}):\n", plan.unchanged.len()));
        for id in &plan.unchanged {
            out.push_str(&format!("  = {}\n", id));
        }
    }
    out
}

pub fn format_outcome(outcome: &MergeOutcome) -> String {
    let mut out = format_plan(&outcome.plan);
    out.push('\n');
    if outcome.dry_run {
        out.push_str(&format!(
            "Dry run: {} tasks would merge, {} conflicts would resolve using '{}'.\n",
            outcome.merged,
            outcome.resolved.len(),
            outcome.strategy
        ));
    } else {
        out.push_str(&format!(
            "Merged {} tasks, resolved {} conflicts using '{}', recorded {} commits.\n",
            outcome.merged,
            outcome.resolved.len(),
            outcome.strategy,
            outcome.commits.len()
        ));
    }
    out
}
