// src/scheduler/mod.rs

//! Deciding what runs and submitting it.
//!
//! - [`status`] holds the derived [`TargetStatus`] and [`StatusDistribution`].
//! - [`query`] answers status questions from one snapshot of the store.
//! - [`Scheduler`] ties graph, store and filesystem together and submits
//!   stale targets through a [`Backend`].

use std::collections::{BTreeSet, HashMap, HashSet};
use std::process::Command;

use tracing::{debug, info, warn};

use crate::backend::{Backend, ExternalJobState, JobId, ScriptWriter};
use crate::dag::Graph;
use crate::errors::{BackendError, ClusterflowError, Result};
use crate::fs::FileSystem;
use crate::state::StateStore;
use crate::target::{Target, TargetName};

pub mod query;
pub mod status;

pub use query::StatusQuery;
pub use status::{StatusDistribution, TargetStatus};

/// Outcome of one [`Scheduler::schedule_many`] call.
#[derive(Debug, Default)]
pub struct ScheduleReport {
    /// Accepted by the backend and committed as submitted, in submission order.
    pub submitted: Vec<(TargetName, JobId)>,
    /// Rejected by the backend; their persisted state is unchanged.
    pub failed: Vec<(TargetName, BackendError)>,
    /// Not submitted because a dependency failed or was skipped.
    pub skipped: Vec<TargetName>,
}

impl ScheduleReport {
    pub fn is_success(&self) -> bool {
        self.failed.is_empty() && self.skipped.is_empty()
    }
}

#[derive(Debug)]
pub struct Scheduler<'a> {
    graph: &'a Graph,
    store: &'a StateStore,
    fs: &'a dyn FileSystem,
}

impl<'a> Scheduler<'a> {
    pub fn new(graph: &'a Graph, store: &'a StateStore, fs: &'a dyn FileSystem) -> Self {
        Self { graph, store, fs }
    }

    pub fn graph(&self) -> &'a Graph {
        self.graph
    }

    /// Fresh snapshot query. Use one per report so the memo is shared.
    pub fn query(&self) -> Result<StatusQuery<'a>> {
        StatusQuery::new(self.graph, self.store, self.fs)
    }

    pub fn status(&self, name: &str) -> Result<TargetStatus> {
        self.query()?.status(name)
    }

    pub fn should_run(&self, name: &str) -> Result<bool> {
        self.query()?.should_run(name)
    }

    /// Submit every requested target that should run, plus its stale
    /// dependencies, dependencies first.
    ///
    /// Each target moves to submitted only after the backend accepted it.
    /// A rejected target keeps its persisted state and its dependents in this
    /// call are skipped; unrelated targets are still submitted.
    ///
    /// A dependency that is already in flight contributes the job id recorded
    /// when it was submitted, as long as the backend still knows that job.
    /// Without a live job the dependent is skipped instead of being submitted
    /// unguarded.
    pub fn schedule_many<'t, I>(
        &self,
        backend: &mut dyn Backend,
        scripts: &ScriptWriter,
        targets: I,
    ) -> Result<ScheduleReport>
    where
        I: IntoIterator<Item = &'t Target>,
    {
        let mut query = self.query()?;
        let wanted = self.collect_stale(&mut query, targets)?;
        let mut job_ids = self.in_flight_jobs(&*backend, &query, &wanted)?;

        let mut report = ScheduleReport::default();
        let mut blocked: HashSet<&str> = HashSet::new();

        let order = self
            .graph
            .topological_order()
            .iter()
            .filter(|name| wanted.contains(*name));

        for name in order {
            let Some(target) = self.graph.target(name) else {
                continue;
            };
            let deps = self.graph.dependencies_of(name);

            let unmet = deps.iter().find(|d| {
                blocked.contains(d.as_str())
                    || (query.state(d).is_in_flight() && !job_ids.contains_key(d.as_str()))
            });
            if let Some(dep) = unmet {
                debug!(target = %name, dependency = %dep, "dependency has no job to wait on; skipping");
                blocked.insert(name.as_str());
                report.skipped.push(name.clone());
                continue;
            }

            let dep_jobs: Vec<JobId> = deps
                .iter()
                .filter_map(|d| job_ids.get(d.as_str()).cloned())
                .collect();

            let submitted = scripts
                .write(&*backend, target)
                .and_then(|script| backend.submit_command(target, &script, &dep_jobs));

            match submitted {
                Ok(job_id) => {
                    self.commit_submitted(&*backend, name, &job_id)?;
                    info!(target = %name, job_id = %job_id, "submitted target");
                    job_ids.insert(name.clone(), job_id.clone());
                    report.submitted.push((name.clone(), job_id));
                }
                Err(err) => {
                    warn!(target = %name, error = %err, "submission failed");
                    blocked.insert(name.as_str());
                    report.failed.push((name.clone(), err));
                }
            }
        }

        Ok(report)
    }

    /// Live job ids of in-flight dependencies of the `wanted` targets.
    ///
    /// Ids come from the store and are kept only while the backend reports
    /// the job as submitted or running.
    fn in_flight_jobs(
        &self,
        backend: &dyn Backend,
        query: &StatusQuery<'_>,
        wanted: &BTreeSet<TargetName>,
    ) -> Result<HashMap<TargetName, JobId>> {
        let in_flight: BTreeSet<&str> = wanted
            .iter()
            .flat_map(|name| self.graph.dependencies_of(name))
            .filter(|dep| !wanted.contains(*dep) && query.state(dep).is_in_flight())
            .map(|dep| dep.as_str())
            .collect();
        if in_flight.is_empty() {
            return Ok(HashMap::new());
        }

        let recorded = self.store.job_ids(in_flight.iter().copied())?;
        let ids: Vec<JobId> = recorded.values().cloned().map(JobId::new).collect();
        let external = backend.get_state_of_jobs(&ids)?;

        let live = recorded
            .into_iter()
            .map(|(name, id)| (name, JobId::new(id)))
            .filter(|(name, id)| {
                let state = external.get(id).copied().unwrap_or(ExternalJobState::Unknown);
                let alive = state != ExternalJobState::Unknown;
                if !alive {
                    warn!(target = %name, job_id = %id, "backend no longer knows this job");
                }
                alive
            })
            .collect();
        Ok(live)
    }

    /// Names of the requested targets that should run, closed over their
    /// dependencies that should run too.
    fn collect_stale<'t, I>(
        &self,
        query: &mut StatusQuery<'_>,
        targets: I,
    ) -> Result<BTreeSet<TargetName>>
    where
        I: IntoIterator<Item = &'t Target>,
    {
        let mut wanted = BTreeSet::new();
        let mut stack: Vec<TargetName> = targets.into_iter().map(|t| t.name.clone()).collect();

        while let Some(name) = stack.pop() {
            if wanted.contains(&name) {
                continue;
            }
            if !self.graph.contains(&name) {
                return Err(ClusterflowError::TargetNotFound(name));
            }
            if !query.should_run(&name)? {
                continue;
            }
            stack.extend(self.graph.dependencies_of(&name).iter().cloned());
            wanted.insert(name);
        }
        Ok(wanted)
    }

    /// Re-arm if needed and move to submitted in one committed record,
    /// together with the job id.
    ///
    /// If the commit fails, try to cancel the job that was just accepted so
    /// no external job runs without a matching record.
    fn commit_submitted(&self, backend: &dyn Backend, name: &str, job_id: &JobId) -> Result<()> {
        let committed = self.store.submit(name, job_id.as_str());

        if let Err(err) = committed {
            warn!(target = %name, job_id = %job_id, error = %err, "commit failed; cancelling job");
            cancel_jobs(backend, std::slice::from_ref(job_id));
            return Err(err.into());
        }
        Ok(())
    }
}

/// Run the backend's cancel command, logging instead of failing.
pub fn cancel_jobs(backend: &dyn Backend, job_ids: &[JobId]) {
    let argv = backend.build_cancel_command(job_ids);
    let Some((program, args)) = argv.split_first() else {
        return;
    };
    match Command::new(program).args(args).status() {
        Ok(status) if status.success() => {
            debug!(jobs = job_ids.len(), "cancel command succeeded");
        }
        Ok(status) => warn!(?status, "cancel command failed"),
        Err(e) => warn!(error = %e, program = %program, "could not run cancel command"),
    }
}
