//! Merge and preview-merge subcommands.

use crate::config::Config;
use crate::merge::{MergeOptions, MergeStrategy};
use crate::types::Branch;
use clap::Args;

/// Arguments for the merge subcommand
#[derive(Args, Debug)]
pub struct MergeArgs {
    /// Branch whose tasks are merged in
    #[arg(short, long, value_name = "BRANCH")]
    pub source: Branch,

    /// Branch receiving the tasks
    #[arg(short, long, default_value = "main", value_name = "BRANCH")]
    pub target: Branch,

    /// Conflict strategy: source, target or newer (default from config)
    #[arg(long, value_name = "STRATEGY")]
    pub strategy: Option<MergeStrategy>,

    /// Commit author (default from config)
    #[arg(short, long)]
    pub author: Option<String>,

    /// Compute the merge without writing anything
    #[arg(long)]
    pub dry_run: bool,
}

impl MergeArgs {
    pub fn options(&self, config: &Config) -> MergeOptions {
        MergeOptions {
            strategy: self.strategy.unwrap_or(config.merge.default_strategy),
            recency_field: config.merge.recency_field.clone(),
            author: Some(
                self.author
                    .clone()
                    .unwrap_or_else(|| config.history.default_author.clone()),
            ),
            dry_run: self.dry_run,
        }
    }
}

/// Arguments for the preview-merge subcommand
#[derive(Args, Debug)]
pub struct PreviewMergeArgs {
    /// Branch whose tasks would be merged in
    #[arg(short, long, value_name = "BRANCH")]
    pub source: Branch,

    /// Branch that would receive the tasks
    #[arg(short, long, default_value = "main", value_name = "BRANCH")]
    pub target: Branch,
}
