//! Task Versioning CLI
//!
//! Records task mutations as commits, groups tasks into branches, and diffs,
//! graphs and merges them from the command line.

use anyhow::Result;
use clap::Parser;
use serde::Serialize;
use serde_json::{Map, Value, json};
use task_versioning::branch::{all_branch_statistics, all_branches, filter_by_branch};
use task_versioning::cli::{Cli, Command, CommitsArgs, SetBranchArgs};
use task_versioning::commits::CommitTracker;
use task_versioning::config::Config;
use task_versioning::diff::{compare_versions, format_diff, history};
use task_versioning::error::{ErrorResponse, VersioningError};
use task_versioning::format::{
    OutputFormat, format_branch_stats, format_commits, format_history, format_outcome,
    format_plan, format_state, format_tasks,
};
use task_versioning::graph::commit_graph;
use task_versioning::logging::init_logging;
use task_versioning::merge::{merge_branches, preview_merge};
use task_versioning::store::{JsonTaskStore, TaskStore, set_task_branch};
use task_versioning::types::{Commit, format_timestamp};
use tracing::debug;

type CommandResult<T> = task_versioning::error::Result<T>;

/// Everything a command needs, resolved once from flags and config.
struct Context {
    config: Config,
    tracker: CommitTracker,
    store: JsonTaskStore,
}

impl Context {
    fn open(cli: &Cli) -> CommandResult<Self> {
        let (config, source) = Config::resolve(&cli.root, cli.config.as_deref())?;
        let tracker = CommitTracker::new(config.commit_log_path(&cli.root));
        let store = JsonTaskStore::new(config.task_store_path(&cli.root));
        debug!(
            config = %source,
            commit_log = %tracker.path().display(),
            task_store = %store.path().display(),
            "Opened project"
        );
        Ok(Self {
            config,
            tracker,
            store,
        })
    }

    fn author(&self, explicit: Option<&str>) -> String {
        explicit
            .map(str::to_string)
            .unwrap_or_else(|| self.config.history.default_author.clone())
    }
}

/// Result of one command in both renderings.
struct Report {
    data: Value,
    text: String,
}

impl Report {
    fn new(data: impl Serialize, text: String) -> CommandResult<Self> {
        Ok(Self {
            data: serde_json::to_value(data)?,
            text,
        })
    }
}

fn newest(mut commits: Vec<Commit>, limit: usize) -> Vec<Commit> {
    if commits.len() > limit {
        commits.drain(..commits.len() - limit);
    }
    commits
}

fn run_commits(ctx: &Context, args: &CommitsArgs) -> CommandResult<Report> {
    let commits = match (&args.task, &args.branch) {
        (Some(task), branch) => ctx
            .tracker
            .commits_for_task(task)?
            .into_iter()
            .filter(|c| branch.as_ref().is_none_or(|b| &c.branch == b))
            .collect(),
        (None, Some(branch)) => ctx.tracker.commits_for_branch(branch)?,
        (None, None) => ctx.tracker.all_commits()?,
    };
    let commits = newest(commits, args.limit.unwrap_or(ctx.config.history.max_commits));
    let text = format_commits(&commits);
    Report::new(json!({ "count": commits.len(), "commits": commits }), text)
}

fn run_set_branch(ctx: &Context, args: &SetBranchArgs) -> CommandResult<Report> {
    let author = ctx.author(args.author.as_deref());
    match set_task_branch(&ctx.store, &ctx.tracker, &args.task, &args.branch, Some(&author))? {
        Some(change) => {
            let text = match change.commit {
                Some(ref commit) => format!(
                    "Moved {} from {} to {} ({}).\n",
                    args.task,
                    change.previous,
                    args.branch,
                    commit.short_id()
                ),
                None => format!("Task {} is already on {}.\n", args.task, args.branch),
            };
            Report::new(
                json!({
                    "task_id": args.task,
                    "previous_branch": change.previous,
                    "branch": args.branch,
                    "changed": change.commit.is_some(),
                    "commit": change.commit,
                }),
                text,
            )
        }
        None => Report::new(
            json!({ "task_id": args.task, "found": false, "changed": false }),
            format!("Task {} not found.\n", args.task),
        ),
    }
}

fn run(ctx: &Context, command: &Command) -> CommandResult<Report> {
    match command {
        Command::Commits(args) => run_commits(ctx, args),

        Command::Branches => {
            let tasks = ctx.store.load_tasks()?;
            let stats = all_branch_statistics(&tasks, &ctx.config.branches.completed_statuses);
            let text = format_branch_stats(&stats);
            Report::new(
                json!({
                    "branches": all_branches(&tasks),
                    "statistics": stats.values().collect::<Vec<_>>(),
                }),
                text,
            )
        }

        Command::Tasks(args) => {
            let tasks = ctx.store.load_tasks()?;
            let on_branch = filter_by_branch(&tasks, &args.branch);
            let text = format_tasks(&args.branch, &on_branch);
            Report::new(
                json!({ "branch": args.branch, "count": on_branch.len(), "tasks": on_branch }),
                text,
            )
        }

        Command::SetBranch(args) => run_set_branch(ctx, args),

        Command::Diff(args) => {
            let from = args.from_point();
            let to = args.to_point();
            match compare_versions(&ctx.tracker, &args.task, from.as_ref(), to.as_ref())? {
                Some(comparison) => {
                    let text = format_diff(&comparison.diff, &comparison.label());
                    Report::new(&comparison, text)
                }
                None => Report::new(
                    json!({ "task_id": args.task, "found": false }),
                    format!("No matching history found for task {}.\n", args.task),
                ),
            }
        }

        Command::History(args) => {
            let entries = history(&ctx.tracker, &args.task)?;
            let text = format_history(&args.task, &entries);
            Report::new(json!({ "task_id": args.task, "history": entries }), text)
        }

        Command::StateAt(args) => {
            let state = ctx.tracker.state_at_time(&args.task, args.time)?;
            let at = format_timestamp(&args.time);
            let text = format_state(&args.task, &at, state.as_ref());
            Report::new(
                json!({
                    "task_id": args.task,
                    "time": at,
                    "exists": state.is_some(),
                    "state": state,
                }),
                text,
            )
        }

        Command::Graph(args) => {
            let filter = args.filter(ctx.config.history.max_commits);
            let output = commit_graph(&ctx.tracker, &filter, args.format, args.output.as_deref())?;
            let text = match output.output_path {
                Some(ref path) => format!(
                    "Wrote {} commits as {} to {}.\n",
                    output.commit_count,
                    output.format,
                    path.display()
                ),
                None => output.content.clone(),
            };
            Report::new(&output, text)
        }

        Command::Merge(args) => {
            let options = args.options(&ctx.config);
            let outcome = merge_branches(
                &ctx.store,
                &ctx.tracker,
                &args.source,
                &args.target,
                &options,
            )?;
            let text = format_outcome(&outcome);
            Report::new(&outcome, text)
        }

        Command::PreviewMerge(args) => {
            let plan = preview_merge(&ctx.store, &args.source, &args.target)?;
            let text = format_plan(&plan);
            Report::new(&plan, text)
        }
    }
}

fn success_envelope(data: Value) -> Value {
    let mut envelope = Map::new();
    envelope.insert("success".to_string(), Value::Bool(true));
    match data {
        Value::Object(fields) => envelope.extend(fields),
        other => {
            envelope.insert("result".to_string(), other);
        }
    }
    Value::Object(envelope)
}

fn failure_envelope(err: &VersioningError) -> Value {
    json!({ "success": false, "error": ErrorResponse::from(err) })
}

fn main() -> Result<()> {
    let cli = Cli::parse();

    init_logging(&cli.log, cli.verbose)?;

    let format = OutputFormat::from_json_flag(cli.json);
    let result = Context::open(&cli).and_then(|ctx| run(&ctx, &cli.command));

    match (result, format) {
        (Ok(report), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&success_envelope(report.data))?);
        }
        (Ok(report), OutputFormat::Text) => {
            print!("{}", report.text);
        }
        (Err(e), OutputFormat::Json) => {
            println!("{}", serde_json::to_string_pretty(&failure_envelope(&e))?);
            std::process::exit(1);
        }
        (Err(e), OutputFormat::Text) => {
            eprintln!("Error: {}", e);
            if let Some(details) = ErrorResponse::from(&e).details {
                eprintln!("  caused by: {}", details);
            }
            std::process::exit(1);
        }
    }

    Ok(())
}
