use std::collections::{HashMap, HashSet};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use clusterflow::backend::{Backend, ExternalJobState, JobId};
use clusterflow::errors::BackendError;
use clusterflow::target::{Target, TargetOptions};

/// A submission seen by [`RecordingBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Recorded {
    pub target: String,
    pub script: PathBuf,
    pub dependencies: Vec<JobId>,
    pub job_id: JobId,
}

#[derive(Debug, Default)]
struct Inner {
    next_id: u64,
    submissions: Vec<Recorded>,
    attempts: Vec<String>,
}

/// Backend double that records every call and can be told to reject targets.
///
/// Clones share the same log, so a test can keep one handle while the
/// scheduler borrows another.
#[derive(Debug, Clone, Default)]
pub struct RecordingBackend {
    inner: Arc<Mutex<Inner>>,
    reject: HashSet<String>,
}

impl RecordingBackend {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail every submission of `name`.
    pub fn rejecting(mut self, name: &str) -> Self {
        self.reject.insert(name.to_string());
        self
    }

    pub fn submissions(&self) -> Vec<Recorded> {
        self.inner.lock().unwrap().submissions.clone()
    }

    pub fn submitted_names(&self) -> Vec<String> {
        self.submissions().into_iter().map(|r| r.target).collect()
    }

    /// Every target passed to `submit_command`, accepted or not.
    pub fn attempts(&self) -> Vec<String> {
        self.inner.lock().unwrap().attempts.clone()
    }

    pub fn job_of(&self, name: &str) -> Option<JobId> {
        self.submissions()
            .into_iter()
            .find(|r| r.target == name)
            .map(|r| r.job_id)
    }
}

impl Backend for RecordingBackend {
    fn name(&self) -> &str {
        "recording"
    }

    fn get_state_of_jobs(
        &self,
        job_ids: &[JobId],
    ) -> Result<HashMap<JobId, ExternalJobState>, BackendError> {
        let inner = self.inner.lock().unwrap();
        Ok(job_ids
            .iter()
            .map(|id| {
                let known = inner.submissions.iter().any(|r| &r.job_id == id);
                let state = if known {
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
            writeln!(out, "#RECORDING --{key}={value}")?;
        }
        Ok(())
    }

    fn write_script_variables(&self, out: &mut dyn Write) -> io::Result<()> {
        writeln!(out, "export RECORDING_JOB=1")
    }

    fn submit_command(
        &mut self,
        target: &Target,
        script_path: &Path,
        dependencies: &[JobId],
    ) -> Result<JobId, BackendError> {
        let mut inner = self.inner.lock().unwrap();
        inner.attempts.push(target.name.clone());

        if self.reject.contains(&target.name) {
            return Err(BackendError::Submit {
                target: target.name.clone(),
                reason: "rejected by test backend".to_string(),
            });
        }

        inner.next_id += 1;
        let job_id = JobId::new(format!("job-{}", inner.next_id));
        inner.submissions.push(Recorded {
            target: target.name.clone(),
            script: script_path.to_path_buf(),
            dependencies: dependencies.to_vec(),
            job_id: job_id.clone(),
        });
        Ok(job_id)
    }

    fn build_cancel_command(&self, job_ids: &[JobId]) -> Vec<String> {
        let mut argv = vec!["true".to_string()];
        argv.extend(job_ids.iter().map(|id| id.to_string()));
        argv
    }
}
