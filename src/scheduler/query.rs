// src/scheduler/query.rs

//! One status query over a snapshot of persisted state.
//!
//! A [`StatusQuery`] loads every target's record once, then answers status
//! questions from that snapshot. Staleness and dependency closures are
//! memoized for the lifetime of the query only; a new query sees new commits.

use std::collections::{BTreeSet, HashMap, HashSet};
use std::time::SystemTime;

use tracing::trace;

use crate::dag::Graph;
use crate::errors::{ClusterflowError, Result};
use crate::fs::FileSystem;
use crate::scheduler::status::{StatusDistribution, TargetStatus};
use crate::state::{State, StateStore, TargetState};
use crate::target::{Target, TargetName};

#[derive(Debug)]
pub struct StatusQuery<'a> {
    graph: &'a Graph,
    fs: &'a dyn FileSystem,
    states: HashMap<TargetName, TargetState>,
    stale: HashMap<TargetName, bool>,
    closures: HashMap<TargetName, BTreeSet<TargetName>>,
}

impl<'a> StatusQuery<'a> {
    /// Snapshot every target's record in one batched load.
    pub fn new(graph: &'a Graph, store: &StateStore, fs: &'a dyn FileSystem) -> Result<Self> {
        let loaded = store.load(graph.targets())?;
        let states = loaded.into_iter().map(|s| (s.name.clone(), s)).collect();
        Ok(Self::from_states(graph, fs, states))
    }

    /// Query over an explicit set of records. Missing names are initial.
    pub fn from_states(
        graph: &'a Graph,
        fs: &'a dyn FileSystem,
        states: HashMap<TargetName, TargetState>,
    ) -> Self {
        Self {
            graph,
            fs,
            states,
            stale: HashMap::new(),
            closures: HashMap::new(),
        }
    }

    /// Persisted state of `name` as seen by this snapshot.
    pub fn state(&self, name: &str) -> State {
        self.states
            .get(name)
            .map(|s| s.state)
            .unwrap_or(State::INITIAL)
    }

    /// Full snapshot record of `name`, if one was loaded.
    pub fn record(&self, name: &str) -> Option<&TargetState> {
        self.states.get(name)
    }

    pub fn status(&mut self, name: &str) -> Result<TargetStatus> {
        let state = self.state(name);
        if matches!(state, State::Submitted | State::Running) {
            return Ok(state.into());
        }

        if self.is_stale(name)? {
            Ok(match state {
                State::Failed | State::Killed | State::Cancelled => state.into(),
                _ => TargetStatus::ShouldRun,
            })
        } else {
            Ok(TargetStatus::Completed)
        }
    }

    pub fn should_run(&mut self, name: &str) -> Result<bool> {
        Ok(self.status(name)?.should_run())
    }

    /// Whether `name` or anything it depends on needs to run again.
    pub fn is_stale(&mut self, name: &str) -> Result<bool> {
        if let Some(stale) = self.stale.get(name) {
            return Ok(*stale);
        }
        let target = self
            .graph
            .target(name)
            .ok_or_else(|| ClusterflowError::TargetNotFound(name.to_string()))?;

        // Walk the closure bottom-up so every dependency is decided first.
        let mut pending: HashSet<TargetName> = self.closure(name).clone().into_iter().collect();
        pending.insert(target.name.clone());
        pending.retain(|n| !self.stale.contains_key(n));

        let order: Vec<TargetName> = self
            .graph
            .topological_order()
            .iter()
            .filter(|n| pending.contains(*n))
            .cloned()
            .collect();

        for current in order {
            let deps_stale = self
                .graph
                .dependencies_of(&current)
                .iter()
                .any(|dep| self.stale.get(dep).copied().unwrap_or(true));

            let stale = deps_stale || self.own_staleness(&current)?;
            trace!(target = %current, stale, "freshness decided");
            self.stale.insert(current, stale);
        }

        Ok(self.stale.get(name).copied().unwrap_or(true))
    }

    /// Distribution over `name` and its whole dependency closure.
    ///
    /// Each target in the closure counts once, however many paths lead to it.
    pub fn distribution(&mut self, name: &str) -> Result<StatusDistribution> {
        let mut dist = StatusDistribution::from_status(self.status(name)?);
        let closure = self.closure(name).clone();
        for dep in &closure {
            dist.record(self.status(dep)?);
        }
        Ok(dist)
    }

    fn closure(&mut self, name: &str) -> &BTreeSet<TargetName> {
        let graph = self.graph;
        self.closures
            .entry(name.to_string())
            .or_insert_with(|| graph.dependency_closure(name))
    }

    /// Staleness from the target's own record and files, ignoring dependencies.
    fn own_staleness(&self, name: &str) -> Result<bool> {
        if self.state(name) != State::Completed {
            return Ok(true);
        }
        let Some(target) = self.graph.target(name) else {
            return Ok(true);
        };
        files_out_of_date(self.fs, target)
    }
}

/// Outputs missing, inputs missing, or an input strictly newer than the oldest output.
///
/// Equal modification times count as fresh.
fn files_out_of_date(fs: &dyn FileSystem, target: &Target) -> Result<bool> {
    let mut oldest_output: Option<SystemTime> = None;
    for output in &target.outputs {
        match fs.modified(output)? {
            Some(mtime) => {
                oldest_output = Some(oldest_output.map_or(mtime, |o| o.min(mtime)));
            }
            None => {
                trace!(target = %target.name, path = ?output, "output missing");
                return Ok(true);
            }
        }
    }

    let mut newest_input: Option<SystemTime> = None;
    for input in &target.inputs {
        match fs.modified(input)? {
            Some(mtime) => {
                newest_input = Some(newest_input.map_or(mtime, |n| n.max(mtime)));
            }
            None => {
                trace!(target = %target.name, path = ?input, "input missing");
                return Ok(true);
            }
        }
    }

    Ok(match (newest_input, oldest_output) {
        (Some(input), Some(output)) => input > output,
        _ => false,
    })
}
