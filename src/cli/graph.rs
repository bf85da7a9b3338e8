//! Graph subcommand for task-versioning CLI

use crate::graph::{GraphFilter, GraphFormat};
use crate::types::Branch;
use clap::Args;
use std::path::PathBuf;

/// Arguments for the graph subcommand
#[derive(Args, Debug)]
pub struct GraphArgs {
    /// Only commits recorded on this branch
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<Branch>,

    /// Only commits of this task
    #[arg(short, long, value_name = "ID")]
    pub task: Option<String>,

    /// Output format: text (default) or dot
    #[arg(short, long, default_value = "text", value_name = "FORMAT")]
    pub format: GraphFormat,

    /// Write the graph to this file instead of printing it
    #[arg(short, long, value_name = "FILE")]
    pub output: Option<PathBuf>,

    /// Keep only the most recent N commits (default from config)
    #[arg(short, long, value_name = "N")]
    pub max_commits: Option<usize>,
}

impl GraphArgs {
    /// Build the commit selection, falling back to `default_max` commits.
    pub fn filter(&self, default_max: usize) -> GraphFilter {
        GraphFilter {
            branch: self.branch.clone(),
            task_id: self.task.clone(),
            max_commits: Some(self.max_commits.unwrap_or(default_max)),
        }
    }
}
