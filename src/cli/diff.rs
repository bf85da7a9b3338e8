//! Diff, history and state-at subcommands.
//!
//! Version points are given either as commit ids (full or prefix) or as
//! timestamps; the two forms are mutually exclusive per side.

use super::parse_time;
use crate::diff::VersionPoint;
use chrono::{DateTime, Utc};
use clap::Args;

/// Arguments for the diff subcommand
#[derive(Args, Debug)]
pub struct DiffArgs {
    /// Task to compare
    #[arg(short, long, value_name = "ID")]
    pub task: String,

    /// Older version as a commit id (default: first recorded version)
    #[arg(long, value_name = "COMMIT", conflicts_with = "time1")]
    pub commit1: Option<String>,

    /// Newer version as a commit id (default: latest version)
    #[arg(long, value_name = "COMMIT", conflicts_with = "time2")]
    pub commit2: Option<String>,

    /// Older version as a point in time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub time1: Option<DateTime<Utc>>,

    /// Newer version as a point in time
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub time2: Option<DateTime<Utc>>,
}

impl DiffArgs {
    fn point(commit: &Option<String>, time: &Option<DateTime<Utc>>) -> Option<VersionPoint> {
        match (commit, time) {
            (Some(id), _) => Some(VersionPoint::Commit(id.clone())),
            (None, Some(at)) => Some(VersionPoint::Time(*at)),
            (None, None) => None,
        }
    }

    /// The requested older version, if any.
    pub fn from_point(&self) -> Option<VersionPoint> {
        Self::point(&self.commit1, &self.time1)
    }

    /// The requested newer version, if any.
    pub fn to_point(&self) -> Option<VersionPoint> {
        Self::point(&self.commit2, &self.time2)
    }
}

/// Arguments for the history subcommand
#[derive(Args, Debug)]
pub struct HistoryArgs {
    /// Task whose history to show
    #[arg(short, long, value_name = "ID")]
    pub task: String,
}

/// Arguments for the state-at subcommand
#[derive(Args, Debug)]
pub struct StateAtArgs {
    /// Task to look up
    #[arg(short, long, value_name = "ID")]
    pub task: String,

    /// Point in time (ISO-8601)
    #[arg(long, value_name = "TIME", value_parser = parse_time)]
    pub time: DateTime<Utc>,
}
