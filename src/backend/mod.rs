// src/backend/mod.rs

//! Job-submission backend abstraction.
//!
//! The scheduler never talks to a cluster scheduler directly; it goes through
//! a [`Backend`]. A concrete backend can target a real cluster queue, a local
//! process pool, or nothing at all.
//!
//! - [`script`] compiles the per-target submission script every backend
//!   submits.
//! - [`testing::TestingBackend`] is the in-process backend used by tests and
//!   by `--backend testing`. It records submissions and never runs anything.

use std::collections::HashMap;
use std::fmt;
use std::io::{self, Write};
use std::path::Path;

use serde::Serialize;

use crate::errors::BackendError;
use crate::target::{Target, TargetOptions};

pub mod script;
pub mod testing;

pub use script::ScriptWriter;
pub use testing::TestingBackend;

/// Identifier the external scheduler assigned to a submitted job.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
pub struct JobId(pub String);

impl JobId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What the external scheduler says about a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ExternalJobState {
    /// The scheduler no longer knows the job (finished, or never existed).
    Unknown,
    /// Queued, waiting for resources or dependencies.
    Submitted,
    Running,
}

/// Capability set the scheduler needs from a job-submission system.
///
/// Object safe so the CLI can pick an implementation at runtime.
pub trait Backend: Send + fmt::Debug {
    /// Short name used on the command line and in logs.
    fn name(&self) -> &str;

    /// Current external state of each job in `job_ids`.
    fn get_state_of_jobs(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExternalJobState>, BackendError>;

    /// Scheduler directives derived from the target's options.
    fn write_script_header(&self, out: &mut dyn Write, options: &TargetOptions)
    -> io::Result<()>;

    /// Environment the job script needs from the scheduler.
    fn write_script_variables(&self, out: &mut dyn Write) -> io::Result<()>;

    /// Submit `script_path` for `target`, held until `dependencies` finish.
    fn submit_command(
        &mut self,
        target: &Target,
        script_path: &Path,
        dependencies: &[JobId],
    ) -> Result<JobId, BackendError>;

    /// Argv that cancels `job_ids`. Empty if there is nothing to run.
    fn build_cancel_command(&self, job_ids: &[JobId]) -> Vec<String>;
}

/// Names accepted by [`backend_by_name`].
pub const BACKEND_NAMES: &[&str] = &["testing"];

/// Construct a backend from its command-line name.
pub fn backend_by_name(name: &str) -> Option<Box<dyn Backend>> {
    match name {
        "testing" => Some(Box::new(TestingBackend::new())),
        _ => None,
    }
}
