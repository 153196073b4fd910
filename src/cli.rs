// src/cli.rs

//! CLI argument parsing using `clap`.

use std::path::PathBuf;

use clap::{Args, Parser, Subcommand, ValueEnum};

use crate::config::DEFAULT_WORKFLOW_FILE;
use crate::scheduler::TargetStatus;

/// Command-line arguments for `clusterflow`.
#[derive(Debug, Clone, Parser)]
#[command(
    name = "clusterflow",
    version,
    about = "Run file-driven workflows on compute clusters.",
    long_about = None
)]
pub struct CliArgs {
    /// Path to the workflow file (TOML).
    #[arg(long, short = 'f', value_name = "PATH", default_value = DEFAULT_WORKFLOW_FILE, global = true)]
    pub workflow: PathBuf,

    /// Logging level (error, warn, info, debug, trace).
    ///
    /// If omitted, `CLUSTERFLOW_LOG` or a default level will be used.
    #[arg(long, value_enum, value_name = "LEVEL", global = true)]
    pub log_level: Option<LogLevel>,

    /// Backend to submit with; overrides `[config].backend`.
    #[arg(long, short = 'b', value_name = "NAME", global = true)]
    pub backend: Option<String>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Clone, Subcommand)]
pub enum Command {
    /// Submit targets that should run, with their stale dependencies.
    Run(Selection),

    /// Show the status of targets.
    ///
    /// One line per target, in creation order: name, status, duration and
    /// the percentage of the target and its dependencies that are completed.
    Status(StatusArgs),

    /// Run one target's command body. Invoked by submitted jobs.
    Exec {
        /// Name of the target to execute.
        target: String,
    },

    /// Re-arm targets in an end state so they can be submitted again.
    Reset(ResetArgs),

    /// Describe targets as JSON.
    Info(Selection),

    /// Delete output files of targets.
    ///
    /// Endpoint outputs are kept unless `--all` is given.
    Clean(CleanArgs),
}

/// Target name patterns; every target when empty.
#[derive(Debug, Clone, Args)]
pub struct Selection {
    /// Shell-style glob patterns on target names.
    #[arg(value_name = "TARGETS")]
    pub targets: Vec<String>,
}

#[derive(Debug, Clone, Args)]
pub struct ResetArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Also re-arm submitted and running targets, cancelling their jobs.
    #[arg(long)]
    pub force: bool,
}

#[derive(Debug, Clone, Args)]
pub struct CleanArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Include endpoints.
    #[arg(long)]
    pub all: bool,
}

#[derive(Debug, Clone, Args)]
pub struct StatusArgs {
    #[command(flatten)]
    pub selection: Selection,

    /// Show only endpoints.
    #[arg(long, conflicts_with = "no_endpoints")]
    pub endpoints: bool,

    /// Hide endpoints.
    #[arg(long)]
    pub no_endpoints: bool,

    /// Only show per-status counts.
    #[arg(long)]
    pub summary: bool,

    /// Only show targets with this status. May be repeated.
    #[arg(short, long = "status", value_enum, value_name = "STATUS")]
    pub status: Vec<StatusArg>,
}

/// Status names accepted by `status -s`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, ValueEnum)]
pub enum StatusArg {
    Shouldrun,
    Submitted,
    Running,
    Completed,
    Failed,
    Killed,
    Cancelled,
}

impl From<StatusArg> for TargetStatus {
    fn from(arg: StatusArg) -> Self {
        match arg {
            StatusArg::Shouldrun => TargetStatus::ShouldRun,
            StatusArg::Submitted => TargetStatus::Submitted,
            StatusArg::Running => TargetStatus::Running,
            StatusArg::Completed => TargetStatus::Completed,
            StatusArg::Failed => TargetStatus::Failed,
            StatusArg::Killed => TargetStatus::Killed,
            StatusArg::Cancelled => TargetStatus::Cancelled,
        }
    }
}

/// Log level as exposed on the CLI.
#[derive(Debug, Copy, Clone, ValueEnum)]
pub enum LogLevel {
    Error,
    Warn,
    Info,
    Debug,
    Trace,
}

/// Convenience wrapper around `CliArgs::parse()`.
pub fn parse() -> CliArgs {
    CliArgs::parse()
}
