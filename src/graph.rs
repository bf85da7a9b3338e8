//! Commit graph rendering as ASCII text or Graphviz DOT.

use crate::commits::CommitTracker;
use crate::error::Result;
use crate::persist::write_text_atomic;
use crate::types::{Branch, Commit, format_timestamp};
use serde::Serialize;
use std::collections::HashMap;
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use tracing::info;

/// Output format for commit graphs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum GraphFormat {
    #[default]
    Text,
    Dot,
}

impl FromStr for GraphFormat {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" | "ascii" => Ok(GraphFormat::Text),
            "dot" | "graphviz" => Ok(GraphFormat::Dot),
            _ => Err(format!(
                "Invalid format '{}'. Valid options: text, dot",
                s
            )),
        }
    }
}

impl fmt::Display for GraphFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GraphFormat::Text => write!(f, "text"),
            GraphFormat::Dot => write!(f, "dot"),
        }
    }
}

/// Render commits as a top-to-bottom list in the order given.
pub fn text_graph(commits: &[Commit]) -> String {
    let mut out = String::new();
    out.push_str("Commit History Graph\n");
    out.push_str(&"=".repeat(60));
    out.push('\n');

    if commits.is_empty() {
        out.push_str("(no commits)\n");
        return out;
    }

    for (i, commit) in commits.iter().enumerate() {
        out.push_str(&format!("* {} {}\n", commit.short_id(), commit.message));
        out.push_str(&format!(
            "|   task: {}  branch: {}  author: {}\n",
            commit.task_id, commit.branch, commit.author
        ));
        out.push_str(&format!("|   {}\n", format_timestamp(&commit.timestamp)));
        if i + 1 < commits.len() {
            out.push_str("|\n");
        }
    }
    out
}

fn escape_dot(s: &str) -> String {
    s.replace('\\', "\\\\")
        .replace('"', "\\\"")
        .replace('\n', "\\n")
}

/// Render commits as a Graphviz digraph. Each task's commits are chained in
/// timestamp order.
pub fn graphviz_dot(commits: &[Commit]) -> String {
    let mut out = String::new();
    out.push_str("digraph commit_history {\n");
    out.push_str("  rankdir=TB;\n");
    out.push_str("  node [shape=box, style=rounded, fontname=\"monospace\"];\n");

    for commit in commits {
        let label = format!(
            "{}\\n{}\\n{} @ {}",
            commit.short_id(),
            escape_dot(&commit.message),
            escape_dot(&commit.task_id),
            escape_dot(commit.branch.as_str())
        );
        let style = if commit.branch.is_main() {
            ""
        } else {
            ", color=\"blue\""
        };
        out.push_str(&format!(
            "  \"{}\" [label=\"{}\"{}];\n",
            escape_dot(&commit.id),
            label,
            style
        ));
    }

    let mut by_task: Vec<(&str, Vec<&Commit>)> = Vec::new();
    let mut index: HashMap<&str, usize> = HashMap::new();
    for commit in commits {
        let slot = *index.entry(commit.task_id.as_str()).or_insert_with(|| {
            by_task.push((commit.task_id.as_str(), Vec::new()));
            by_task.len() - 1
        });
        by_task[slot].1.push(commit);
    }

    for (_, mut chain) in by_task {
        chain.sort_by_key(|c| c.timestamp);
        for pair in chain.windows(2) {
            out.push_str(&format!(
                "  \"{}\" -> \"{}\";\n",
                escape_dot(&pair[0].id),
                escape_dot(&pair[1].id)
            ));
        }
    }

    out.push_str("}\n");
    out
}

/// Which commits to include in a graph.
#[derive(Debug, Clone, Default)]
pub struct GraphFilter {
    pub branch: Option<Branch>,
    pub task_id: Option<String>,
    /// Keep only the most recent N commits
    pub max_commits: Option<usize>,
}

impl GraphFilter {
    fn select(&self, commits: Vec<Commit>) -> Vec<Commit> {
        let mut selected: Vec<Commit> = commits
            .into_iter()
            .filter(|c| self.branch.as_ref().is_none_or(|b| &c.branch == b))
            .filter(|c| self.task_id.as_deref().is_none_or(|t| c.task_id == t))
            .collect();
        selected.sort_by_key(|c| c.timestamp);
        if let Some(max) = self.max_commits
            && selected.len() > max
        {
            selected.drain(..selected.len() - max);
        }
        selected
    }
}

/// A rendered graph.
#[derive(Debug, Clone, Serialize)]
pub struct GraphOutput {
    pub format: GraphFormat,
    pub commit_count: usize,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output_path: Option<PathBuf>,
}

/// Select commits, render them, and optionally write the result to a file.
pub fn commit_graph(
    tracker: &CommitTracker,
    filter: &GraphFilter,
    format: GraphFormat,
    output_path: Option<&Path>,
) -> Result<GraphOutput> {
    let commits = filter.select(tracker.all_commits()?);
    let content = match format {
        GraphFormat::Text => text_graph(&commits),
        GraphFormat::Dot => graphviz_dot(&commits),
    };

    if let Some(path) = output_path {
        write_text_atomic(path, &content)?;
        info!(path = %path.display(), commits = commits.len(), %format, "Wrote commit graph");
    }

    Ok(GraphOutput {
        format,
        commit_count: commits.len(),
        content,
        output_path: output_path.map(Path::to_path_buf),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::TaskState;
    use chrono::{TimeZone, Utc};
    use serde_json::json;
    use tempfile::TempDir;

    fn commit(task_id: &str, message: &str, hour: u32, branch: Branch) -> Commit {
        let state: TaskState = serde_json::from_value(json!({"id": task_id})).unwrap();
        Commit::new(task_id, message, TaskState::new(), state, None, branch)
            .unwrap()
            .with_timestamp(Utc.with_ymd_and_hms(2025, 1, 26, hour, 0, 0).unwrap())
    }

    #[test]
    fn test_text_graph() {
        let commits = vec![
            commit("task-1", "Create task: Test", 10, Branch::Main),
            commit("task-1", "Update task: Test", 11, Branch::Main),
        ];

        let graph = text_graph(&commits);

        assert!(graph.contains("Commit History Graph"));
        assert!(graph.contains("Create task: Test"));
        assert!(graph.contains("Update task: Test"));
        assert!(graph.find("Create task").unwrap() < graph.find("Update task").unwrap());
    }

    #[test]
    fn test_text_graph_empty() {
        assert!(text_graph(&[]).contains("(no commits)"));
    }

    #[test]
    fn test_graphviz_dot_chains_each_task() {
        let feature = Branch::Named("feature-x".to_string());
        let a1 = commit("task-1", "Create task: A", 10, Branch::Main);
        let b1 = commit("task-2", "Create task: \"B\"", 11, feature);
        let a2 = commit("task-1", "Update task: A", 12, Branch::Main);

        let dot = graphviz_dot(&[a2.clone(), a1.clone(), b1.clone()]);

        assert!(dot.starts_with("digraph commit_history {"));
        assert!(dot.contains(&format!("\"{}\" -> \"{}\";", a1.id, a2.id)));
        assert!(!dot.contains(&format!("\"{}\" ->", b1.id)));
        assert!(dot.contains("Create task: \\\"B\\\""));
        assert!(dot.trim_end().ends_with('}'));
    }

    #[test]
    fn test_format_from_str() {
        assert_eq!("dot".parse::<GraphFormat>().unwrap(), GraphFormat::Dot);
        assert_eq!("GRAPHVIZ".parse::<GraphFormat>().unwrap(), GraphFormat::Dot);
        assert_eq!("text".parse::<GraphFormat>().unwrap(), GraphFormat::Text);
        assert!("svg".parse::<GraphFormat>().is_err());
    }

    #[test]
    fn test_commit_graph_filters_and_writes() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::for_project(dir.path());
        let feature = Branch::Named("feature-x".to_string());
        tracker
            .append_batch(vec![
                commit("task-1", "one", 10, Branch::Main),
                commit("task-2", "two", 11, feature.clone()),
                commit("task-2", "three", 12, feature.clone()),
                commit("task-2", "four", 13, feature.clone()),
            ])
            .unwrap();

        let filter = GraphFilter {
            branch: Some(feature),
            max_commits: Some(2),
            ..GraphFilter::default()
        };
        let out_path = dir.path().join("out/graph.dot");
        let output = commit_graph(&tracker, &filter, GraphFormat::Dot, Some(&out_path)).unwrap();

        assert_eq!(output.commit_count, 2);
        assert!(!output.content.contains("two"));
        assert!(output.content.contains("three"));
        assert!(output.content.contains("four"));
        assert_eq!(std::fs::read_to_string(&out_path).unwrap(), output.content);
    }

    #[test]
    fn test_commit_graph_task_filter() {
        let dir = TempDir::new().unwrap();
        let tracker = CommitTracker::for_project(dir.path());
        tracker
            .append_batch(vec![
                commit("task-1", "one", 10, Branch::Main),
                commit("task-2", "two", 11, Branch::Main),
            ])
            .unwrap();

        let filter = GraphFilter {
            task_id: Some("task-2".to_string()),
            ..GraphFilter::default()
        };
        let output = commit_graph(&tracker, &filter, GraphFormat::Text, None).unwrap();

        assert_eq!(output.commit_count, 1);
        assert!(output.content.contains("two"));
        assert!(output.output_path.is_none());
    }
}
