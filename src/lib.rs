// src/lib.rs

pub mod backend;
pub mod clean;
pub mod cli;
pub mod config;
pub mod dag;
pub mod errors;
pub mod exec;
pub mod filter;
pub mod fs;
pub mod logging;
pub mod report;
pub mod scheduler;
pub mod state;
pub mod target;

use std::io::{self, Write};
use std::path::Path;

use tracing::{debug, info, warn};

use crate::backend::{Backend, JobId, ScriptWriter, backend_by_name};
use crate::cli::{CleanArgs, CliArgs, Command, ResetArgs, Selection, StatusArgs};
use crate::config::{Workflow, load_and_validate, validate_backend_name};
use crate::errors::{ClusterflowError, Result};
use crate::filter::{EndpointFilter, NameFilter, StatusFilter, TargetFilter};
use crate::fs::RealFileSystem;
use crate::scheduler::{Scheduler, StatusQuery, TargetStatus, cancel_jobs};
use crate::state::StateStore;
use crate::target::Target;

/// High-level entry point used by `main.rs`. Returns the process exit code.
///
/// `exec` runs a target on the compute node; every other command loads the
/// workflow, opens the state store and works through a `Session`.
pub async fn run(args: CliArgs) -> Result<i32> {
    let CliArgs {
        workflow,
        backend,
        command,
        ..
    } = args;

    match command {
        Command::Exec { target } => exec::exec_from_path(&workflow, &target).await,
        Command::Run(selection) => {
            Session::open(&workflow)?.run(backend.as_deref(), &selection, &mut io::stdout().lock())
        }
        Command::Status(status_args) => {
            Session::open(&workflow)?.status(&status_args, &mut io::stdout().lock())
        }
        Command::Reset(reset_args) => Session::open(&workflow)?.reset(
            backend.as_deref(),
            &reset_args,
            &mut io::stdout().lock(),
        ),
        Command::Info(selection) => {
            Session::open(&workflow)?.info(&selection, &mut io::stdout().lock())
        }
        Command::Clean(clean_args) => {
            Session::open(&workflow)?.clean(&clean_args, &mut io::stdout().lock())
        }
    }
}

/// A loaded workflow with its state store, for the commands run on the
/// submitting side.
struct Session {
    workflow: Workflow,
    store: StateStore,
    fs: RealFileSystem,
}

impl Session {
    fn open(path: &Path) -> Result<Self> {
        let fs = RealFileSystem;
        let workflow = load_and_validate(path, &fs)?;
        let store = workflow.open_store()?;
        debug!(workflow = ?workflow.path, targets = workflow.graph.len(), "workflow ready");
        Ok(Self {
            workflow,
            store,
            fs,
        })
    }

    fn scheduler(&self) -> Scheduler<'_> {
        Scheduler::new(&self.workflow.graph, &self.store, &self.fs)
    }

    fn backend(&self, backend_override: Option<&str>) -> Result<Box<dyn Backend>> {
        let name = backend_override.unwrap_or(&self.workflow.backend);
        validate_backend_name(name)?;
        backend_by_name(name)
            .ok_or_else(|| ClusterflowError::ConfigError(format!("unknown backend '{name}'")))
    }

    fn select(
        &self,
        query: &mut StatusQuery<'_>,
        selection: &Selection,
        mut filters: Vec<TargetFilter>,
    ) -> Result<Vec<&Target>> {
        if !selection.targets.is_empty() {
            filters.push(TargetFilter::Name(NameFilter::new(&selection.targets)?));
        }
        let targets = filter::select(&self.workflow.graph, query, &filters)?;
        if targets.is_empty() && !selection.targets.is_empty() {
            warn!(patterns = ?selection.targets, "no targets matched");
        }
        Ok(targets)
    }

    fn run(
        &self,
        backend_override: Option<&str>,
        selection: &Selection,
        out: &mut dyn Write,
    ) -> Result<i32> {
        let mut backend = self.backend(backend_override)?;
        let executable = std::env::current_exe()?;
        let scripts = ScriptWriter::new(self.workflow.scripts_dir(), executable, &self.workflow.path);

        let scheduler = self.scheduler();
        let mut query = scheduler.query()?;
        let targets = self.select(&mut query, selection, Vec::new())?;
        drop(query);

        let report = scheduler.schedule_many(backend.as_mut(), &scripts, targets)?;
        info!(
            backend = backend.name(),
            submitted = report.submitted.len(),
            failed = report.failed.len(),
            skipped = report.skipped.len(),
            "run finished"
        );

        if report.submitted.is_empty() && report.failed.is_empty() && report.skipped.is_empty() {
            writeln!(out, "nothing to do")?;
        }
        for (name, job_id) in &report.submitted {
            writeln!(out, "submitted {name} (job {job_id})")?;
        }
        for (name, err) in &report.failed {
            writeln!(out, "failed    {name}: {err}")?;
        }
        for name in &report.skipped {
            writeln!(out, "skipped   {name}")?;
        }

        Ok(if report.is_success() { 0 } else { 1 })
    }

    fn status(&self, args: &StatusArgs, out: &mut dyn Write) -> Result<i32> {
        let graph = &self.workflow.graph;
        let mut filters = Vec::new();
        if !args.status.is_empty() {
            let statuses = args.status.iter().copied().map(TargetStatus::from);
            filters.push(TargetFilter::Status(StatusFilter::new(statuses)));
        }
        if args.endpoints {
            filters.push(TargetFilter::Endpoints(EndpointFilter::include(graph)));
        } else if args.no_endpoints {
            filters.push(TargetFilter::Endpoints(EndpointFilter::exclude(graph)));
        }

        let mut query = self.scheduler().query()?;
        let targets = self.select(&mut query, &args.selection, filters)?;

        if args.summary {
            report::render_summary(out, &mut query, &targets)?;
        } else {
            report::render_table(out, &mut query, &targets)?;
        }
        Ok(0)
    }

    /// Re-arm selected targets. In-flight ones only with `--force`, and
    /// their recorded jobs are cancelled through the backend.
    fn reset(
        &self,
        backend_override: Option<&str>,
        args: &ResetArgs,
        out: &mut dyn Write,
    ) -> Result<i32> {
        let backend = self.backend(backend_override)?;
        let mut query = self.scheduler().query()?;
        let targets = self.select(&mut query, &args.selection, Vec::new())?;

        let mut to_cancel = Vec::new();
        for target in targets {
            let Some(rearmed) = self.store.rearm(&target.name, args.force)? else {
                continue;
            };
            if rearmed.previous.is_in_flight() {
                match rearmed.job_id {
                    Some(id) => to_cancel.push(JobId::new(id)),
                    None => warn!(target = %target.name, "no job recorded to cancel"),
                }
            }
            info!(target = %target.name, previous = %rearmed.previous, "target reset");
            writeln!(out, "reset {}", target.name)?;
        }

        if !to_cancel.is_empty() {
            cancel_jobs(backend.as_ref(), &to_cancel);
        }
        Ok(0)
    }

    fn info(&self, selection: &Selection, out: &mut dyn Write) -> Result<i32> {
        let mut query = self.scheduler().query()?;
        let targets = self.select(&mut query, selection, Vec::new())?;
        report::render_info(out, &self.workflow.graph, &mut query, &targets)?;
        Ok(0)
    }

    /// Remove outputs of selected targets; endpoints only with `--all`.
    fn clean(&self, args: &CleanArgs, out: &mut dyn Write) -> Result<i32> {
        let mut filters = Vec::new();
        if !args.all {
            filters.push(TargetFilter::Endpoints(EndpointFilter::exclude(
                &self.workflow.graph,
            )));
        }

        let mut query = self.scheduler().query()?;
        let targets = self.select(&mut query, &args.selection, filters)?;
        for path in clean::remove_outputs(&self.fs, targets)? {
            writeln!(out, "removed {}", path.display())?;
        }
        Ok(0)
    }
}
