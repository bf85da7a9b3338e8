//! CLI command definitions for task-versioning
//!
//! This module defines the CLI structure using clap's derive macros.
//! The main entry point is the `Cli` struct which contains subcommands.

pub mod diff;
pub mod graph;
pub mod merge;

use crate::logging::LogTarget;
use crate::types::Branch;
use clap::{Args, Parser, Subcommand};
use diff::{DiffArgs, HistoryArgs, StateAtArgs};
use graph::GraphArgs;
use merge::{MergeArgs, PreviewMergeArgs};
use std::path::PathBuf;

/// Task history, branching and merging for a Todo2 task list
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Project root holding the task store and commit log
    #[arg(short, long, default_value = ".", global = true, value_name = "DIR")]
    pub root: PathBuf,

    /// Path to configuration file
    #[arg(short, long, global = true, value_name = "FILE")]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Logging output: 0/off, 1/stdout, 2/stderr (default), or filename
    #[arg(short, long, default_value = "2", global = true)]
    pub log: LogTarget,

    /// Print results as JSON
    #[arg(long, global = true)]
    pub json: bool,

    #[command(subcommand)]
    pub command: Command,
}

/// Available subcommands
#[derive(Subcommand, Debug)]
pub enum Command {
    /// List commits for a task, a branch, or the whole log
    Commits(CommitsArgs),

    /// List branches with task statistics
    Branches,

    /// List tasks on a branch
    Tasks(TasksArgs),

    /// Move a task to another branch
    SetBranch(SetBranchArgs),

    /// Compare two versions of a task
    Diff(DiffArgs),

    /// Show every commit of a task with its changes
    History(HistoryArgs),

    /// Show a task as it was at a point in time
    StateAt(StateAtArgs),

    /// Render the commit graph as text or Graphviz DOT
    Graph(GraphArgs),

    /// Merge one branch into another
    Merge(MergeArgs),

    /// Show what a merge would do without changing anything
    PreviewMerge(PreviewMergeArgs),
}

/// Arguments for the commits subcommand
#[derive(Args, Debug)]
pub struct CommitsArgs {
    /// Only commits of this task
    #[arg(short, long, value_name = "ID")]
    pub task: Option<String>,

    /// Only commits recorded on this branch
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Option<Branch>,

    /// Show at most this many of the newest commits (default from config)
    #[arg(short = 'n', long, value_name = "N")]
    pub limit: Option<usize>,
}

/// Arguments for the tasks subcommand
#[derive(Args, Debug)]
pub struct TasksArgs {
    /// Branch to list
    #[arg(short, long, default_value = "main", value_name = "BRANCH")]
    pub branch: Branch,
}

/// Arguments for the set-branch subcommand
#[derive(Args, Debug)]
pub struct SetBranchArgs {
    /// Task to move
    #[arg(short, long, value_name = "ID")]
    pub task: String,

    /// Destination branch
    #[arg(short, long, value_name = "BRANCH")]
    pub branch: Branch,

    /// Commit author (default from config)
    #[arg(short, long)]
    pub author: Option<String>,
}

/// Parse a user-supplied point in time.
pub(crate) fn parse_time(s: &str) -> Result<chrono::DateTime<chrono::Utc>, String> {
    crate::types::parse_timestamp(s).ok_or_else(|| {
        format!(
            "Invalid time '{}'. Use an ISO-8601 date or date-time, e.g. 2025-01-26T10:00:00Z",
            s
        )
    })
}
