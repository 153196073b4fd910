// src/report.rs

//! Plain-text and JSON rendering of target status.

use std::io::Write;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::dag::Graph;
use crate::errors::Result;
use crate::scheduler::{StatusDistribution, StatusQuery, TargetStatus};
use crate::state::{TargetState, Timestamp};
use crate::target::{Target, TargetOptions};

/// Order of rows in the summary.
const SUMMARY_ORDER: [TargetStatus; 7] = [
    TargetStatus::ShouldRun,
    TargetStatus::Submitted,
    TargetStatus::Running,
    TargetStatus::Completed,
    TargetStatus::Killed,
    TargetStatus::Cancelled,
    TargetStatus::Failed,
];

pub fn human_status(status: TargetStatus) -> &'static str {
    match status {
        TargetStatus::ShouldRun => "shouldrun (incomplete)",
        TargetStatus::Failed => "shouldrun (failed)",
        TargetStatus::Killed => "shouldrun (killed)",
        TargetStatus::Cancelled => "shouldrun (cancelled)",
        TargetStatus::Submitted => "submitted",
        TargetStatus::Running => "running",
        TargetStatus::Completed => "completed",
    }
}

/// `HH:MM:SS`, or `--:--:--` when there is nothing to show.
pub fn format_duration(seconds: Option<f64>) -> String {
    match seconds {
        Some(secs) if secs.is_finite() && secs >= 0.0 => {
            let total = secs.round() as u64;
            format!(
                "{:02}:{:02}:{:02}",
                total / 3600,
                (total / 60) % 60,
                total % 60
            )
        }
        _ => "--:--:--".to_string(),
    }
}

fn duration_of(record: Option<&TargetState>, status: TargetStatus) -> Option<f64> {
    let record = record?;
    match status {
        TargetStatus::Running => record.runtime(),
        TargetStatus::Completed => record.walltime(),
        _ => None,
    }
}

/// One line per target: name, status, duration, completion of its closure.
pub fn render_table(
    out: &mut dyn Write,
    query: &mut StatusQuery<'_>,
    targets: &[&Target],
) -> Result<()> {
    let width = targets.iter().map(|t| t.name.len()).max().unwrap_or(0) + 4;

    for target in targets {
        let status = query.status(&target.name)?;
        let completion = query.distribution(&target.name)?.completion();
        let duration = format_duration(duration_of(query.record(&target.name), status));

        writeln!(
            out,
            "{:<width$}{:<24}{:>9}  {:>7.2}%",
            target.name,
            human_status(status),
            duration,
            completion * 100.0,
        )?;
    }
    Ok(())
}

/// Per-status counts over `targets`.
pub fn render_summary(
    out: &mut dyn Write,
    query: &mut StatusQuery<'_>,
    targets: &[&Target],
) -> Result<()> {
    let mut counts = StatusDistribution::new();
    for target in targets {
        counts.record(query.status(&target.name)?);
    }

    writeln!(out, "{:<15}{:>10}", "total", targets.len())?;
    for status in SUMMARY_ORDER {
        writeln!(out, "{:<15}{:>10}", status.as_str(), counts.count(status))?;
    }
    Ok(())
}

#[derive(Debug, Serialize)]
struct TargetInfo<'a> {
    name: &'a str,
    working_dir: String,
    inputs: Vec<String>,
    outputs: Vec<String>,
    options: &'a TargetOptions,
    dependencies: Vec<&'a str>,
    dependents: Vec<&'a str>,
    status: TargetStatus,
    state: StateInfo,
}

#[derive(Debug, Serialize)]
struct StateInfo {
    state: String,
    submitted_at: Option<String>,
    started_at: Option<String>,
    ended_at: Option<String>,
}

fn rfc3339(ts: Option<Timestamp>) -> Option<String> {
    let ts = ts?;
    let secs = ts.floor() as i64;
    let nanos = ((ts - ts.floor()) * 1e9) as u32;
    DateTime::<Utc>::from_timestamp(secs, nanos).map(|dt| dt.to_rfc3339())
}

/// Pretty JSON describing `targets`, keyed by name.
pub fn render_info(
    out: &mut dyn Write,
    graph: &Graph,
    query: &mut StatusQuery<'_>,
    targets: &[&Target],
) -> Result<()> {
    let mut infos = serde_json::Map::new();

    for target in targets {
        let status = query.status(&target.name)?;
        let record = query
            .record(&target.name)
            .cloned()
            .unwrap_or_else(|| TargetState::new(target.name.clone()));

        let info = TargetInfo {
            name: &target.name,
            working_dir: target.working_dir.display().to_string(),
            inputs: target.inputs.iter().map(|p| p.display().to_string()).collect(),
            outputs: target.outputs.iter().map(|p| p.display().to_string()).collect(),
            options: &target.options,
            dependencies: graph.dependencies_of(&target.name).iter().map(String::as_str).collect(),
            dependents: graph.dependents_of(&target.name).iter().map(String::as_str).collect(),
            status,
            state: StateInfo {
                state: record.state.to_string(),
                submitted_at: rfc3339(record.submitted_at),
                started_at: rfc3339(record.started_at),
                ended_at: rfc3339(record.ended_at),
            },
        };
        let value = serde_json::to_value(&info).map_err(anyhow::Error::from)?;
        infos.insert(target.name.clone(), value);
    }

    serde_json::to_writer_pretty(&mut *out, &infos).map_err(anyhow::Error::from)?;
    writeln!(out)?;
    Ok(())
}
