// src/backend/testing.rs

use std::collections::HashMap;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use tracing::debug;

use super::{Backend, ExternalJobState, JobId};
use crate::errors::BackendError;
use crate::target::{Target, TargetName, TargetOptions};

/// One accepted submission.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Submission {
    pub target: TargetName,
    pub script: PathBuf,
    pub job_id: JobId,
    pub dependencies: Vec<JobId>,
}

/// Backend that accepts every submission and runs nothing.
///
/// Job ids are sequential. Jobs issued by this instance report
/// [`ExternalJobState::Submitted`] forever; any other id is unknown.
#[derive(Debug, Default)]
pub struct TestingBackend {
    next_id: u64,
    submissions: Vec<Submission>,
}

impl TestingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn submissions(&self) -> &[Submission] {
        &self.submissions
    }
}

impl Backend for TestingBackend {
    fn name(&self) -> &str {
        "testing"
    }

    fn get_state_of_jobs(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExternalJobState>, BackendError> {
        Ok(job_ids
            .iter()
            .map(|id| {
                let issued = self.submissions.iter().any(|s| &s.job_id == id);
                let state = if issued {
                    ExternalJobState::Submitted
                } else {
                    ExternalJobState::Unknown
                };
                (id.clone(), state)
            })
            .collect())
    }

    fn write_script_header(
        &self,
        out: &mut dyn Write,
        options: &TargetOptions,
    ) -> io::Result<()> {
        for (key, value) in options {
            writeln!(out, "#TESTING {key}={value}")?;
        }
        Ok(())
    }

    fn write_script_variables(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "export CLUSTERFLOW_BACKEND=testing")
    }

    fn submit_command(
        &mut self,
        target: &Target,
        script_path: &Path,
        dependencies: &[JobId],
    ) -> Result<JobId, BackendError> {
        self.next_id += 1;
        let job_id = JobId::new(self.next_id.to_string());
        debug!(target = %target.name, job_id = %job_id, "testing backend accepted job");

        self.submissions.push(Submission {
            target: target.name.clone(),
            script: script_path.to_path_buf(),
            job_id: job_id.clone(),
            dependencies: dependencies.to_vec(),
        });
        Ok(job_id)
    }

    fn build_cancel_command(&self, _job_ids: &[JobId]) -> Vec<String> {
        Vec::new()
    }
}
