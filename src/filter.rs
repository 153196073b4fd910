// src/filter.rs

//! Target selection for the CLI.
//!
//! Filters are combined with AND; results keep creation order.

use std::collections::HashSet;

use anyhow::Context;
use globset::{Glob, GlobSet, GlobSetBuilder};

use crate::dag::Graph;
use crate::errors::Result;
use crate::scheduler::{StatusQuery, TargetStatus};
use crate::target::{Target, TargetName};

/// Shell-style glob patterns on target names.
#[derive(Debug, Clone)]
pub struct NameFilter {
    set: GlobSet,
}

impl NameFilter {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Result<Self> {
        Ok(Self {
            set: build_globset(patterns)?,
        })
    }

    pub fn matches(&self, name: &str) -> bool {
        self.set.is_match(name)
    }
}

fn build_globset<S: AsRef<str>>(patterns: &[S]) -> Result<GlobSet> {
    let mut builder = GlobSetBuilder::new();
    for pat in patterns {
        let pat = pat.as_ref();
        let glob = Glob::new(pat).with_context(|| format!("invalid glob pattern: {pat}"))?;
        builder.add(glob);
    }
    Ok(builder.build().context("building target name patterns")?)
}

/// Keep only endpoints, or only non-endpoints.
#[derive(Debug, Clone)]
pub struct EndpointFilter {
    endpoints: HashSet<TargetName>,
    include: bool,
}

impl EndpointFilter {
    pub fn include(graph: &Graph) -> Self {
        Self::new(graph, true)
    }

    pub fn exclude(graph: &Graph) -> Self {
        Self::new(graph, false)
    }

    fn new(graph: &Graph, include: bool) -> Self {
        let endpoints = graph.endpoints().into_iter().map(|t| t.name.clone()).collect();
        Self { endpoints, include }
    }

    pub fn matches(&self, name: &str) -> bool {
        self.endpoints.contains(name) == self.include
    }
}

/// Targets whose current status is one of `statuses`.
///
/// Asking for [`TargetStatus::ShouldRun`] selects every status that should
/// run, including failed, killed and cancelled ones.
#[derive(Debug, Clone)]
pub struct StatusFilter {
    statuses: Vec<TargetStatus>,
}

impl StatusFilter {
    pub fn new(statuses: impl IntoIterator<Item = TargetStatus>) -> Self {
        Self {
            statuses: statuses.into_iter().collect(),
        }
    }

    pub fn accepts(&self, status: TargetStatus) -> bool {
        self.statuses.iter().any(|wanted| match wanted {
            TargetStatus::ShouldRun => status.should_run(),
            other => *other == status,
        })
    }
}

#[derive(Debug, Clone)]
pub enum TargetFilter {
    Name(NameFilter),
    Endpoints(EndpointFilter),
    Status(StatusFilter),
}

impl TargetFilter {
    fn matches(&self, target: &Target, query: &mut StatusQuery<'_>) -> Result<bool> {
        Ok(match self {
            TargetFilter::Name(f) => f.matches(&target.name),
            TargetFilter::Endpoints(f) => f.matches(&target.name),
            TargetFilter::Status(f) => f.accepts(query.status(&target.name)?),
        })
    }
}

/// Targets of `graph` passing every filter, in creation order.
pub fn select<'g>(
    graph: &'g Graph,
    query: &mut StatusQuery<'_>,
    filters: &[TargetFilter],
) -> Result<Vec<&'g Target>> {
    let mut selected = Vec::new();
    'targets: for target in graph.targets() {
        for filter in filters {
            if !filter.matches(target, query)? {
                continue 'targets;
            }
        }
        selected.push(target);
    }
    Ok(selected)
}
