// src/scheduler/status.rs

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign};
use std::str::FromStr;

use serde::Serialize;

use crate::state::State;

/// Derived, never persisted classification of a target.
///
/// Combines the persisted [`State`] with freshness of files and dependencies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum TargetStatus {
    ShouldRun,
    Submitted,
    Running,
    Completed,
    Failed,
    Killed,
    Cancelled,
}

impl TargetStatus {
    pub const ALL: [TargetStatus; 7] = [
        TargetStatus::ShouldRun,
        TargetStatus::Submitted,
        TargetStatus::Running,
        TargetStatus::Completed,
        TargetStatus::Failed,
        TargetStatus::Killed,
        TargetStatus::Cancelled,
    ];

    /// True if the target has to be (re)submitted.
    ///
    /// Failed, killed and cancelled targets are stale by definition and are
    /// run again alongside never-completed ones.
    pub fn should_run(self) -> bool {
        matches!(
            self,
            TargetStatus::ShouldRun
                | TargetStatus::Failed
                | TargetStatus::Killed
                | TargetStatus::Cancelled
        )
    }

    /// Submitted or running: a job exists for it right now.
    pub fn is_in_flight(self) -> bool {
        matches!(self, TargetStatus::Submitted | TargetStatus::Running)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TargetStatus::ShouldRun => "shouldrun",
            TargetStatus::Submitted => "submitted",
            TargetStatus::Running => "running",
            TargetStatus::Completed => "completed",
            TargetStatus::Failed => "failed",
            TargetStatus::Killed => "killed",
            TargetStatus::Cancelled => "cancelled",
        }
    }
}

impl From<State> for TargetStatus {
    fn from(state: State) -> Self {
        match state {
            State::ShouldRun => TargetStatus::ShouldRun,
            State::Submitted => TargetStatus::Submitted,
            State::Running => TargetStatus::Running,
            State::Completed => TargetStatus::Completed,
            State::Failed => TargetStatus::Failed,
            State::Killed => TargetStatus::Killed,
            State::Cancelled => TargetStatus::Cancelled,
        }
    }
}

impl fmt::Display for TargetStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TargetStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let needle = s.trim().to_lowercase();
        TargetStatus::ALL
            .into_iter()
            .find(|status| status.as_str() == needle)
            .ok_or_else(|| format!("invalid target status: {s}"))
    }
}

/// Count of statuses over a target and its dependency closure.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusDistribution {
    counts: BTreeMap<TargetStatus, usize>,
}

impl StatusDistribution {
    pub fn new() -> Self {
        Self::default()
    }

    /// Distribution holding a single status.
    pub fn from_status(status: TargetStatus) -> Self {
        let mut dist = Self::new();
        dist.record(status);
        dist
    }

    pub fn record(&mut self, status: TargetStatus) {
        *self.counts.entry(status).or_insert(0) += 1;
    }

    pub fn count(&self, status: TargetStatus) -> usize {
        self.counts.get(&status).copied().unwrap_or(0)
    }

    pub fn total(&self) -> usize {
        self.counts.values().sum()
    }

    /// Fraction of completed targets in `[0, 1]`; zero when empty.
    pub fn completion(&self) -> f64 {
        match self.total() {
            0 => 0.0,
            total => self.count(TargetStatus::Completed) as f64 / total as f64,
        }
    }

    /// Non-zero counts in status order.
    pub fn iter(&self) -> impl Iterator<Item = (TargetStatus, usize)> + '_ {
        self.counts
            .iter()
            .filter(|(_, n)| **n > 0)
            .map(|(status, n)| (*status, *n))
    }
}

impl AddAssign<&StatusDistribution> for StatusDistribution {
    fn add_assign(&mut self, rhs: &StatusDistribution) {
        for (status, n) in &rhs.counts {
            *self.counts.entry(*status).or_insert(0) += n;
        }
    }
}

impl Add for StatusDistribution {
    type Output = StatusDistribution;

    fn add(mut self, rhs: StatusDistribution) -> Self::Output {
        self += &rhs;
        self
    }
}
