// src/exec/mod.rs

//! Target execution on the compute node.
//!
//! This is what a submitted job runs: resolve one target from the workflow,
//! run its command body under bash and commit the end state.
//!
//! - [`executor`] owns the wait loop and the single commit site.
//! - [`signals`] turns SIGTERM/SIGINT/SIGUSR1 into kill and cancel flags.

pub mod executor;
pub mod signals;

use std::path::Path;

use tracing::debug;

pub use executor::{
    CANCELLED_EXIT_CODE, Executor, ExecutorPhase, KILLED_EXIT_CODE, Outcome,
};
pub use signals::{Interrupt, SignalFlags, install_handlers};

use crate::config::{Workflow, load_and_validate};
use crate::errors::{ClusterflowError, Result};
use crate::fs::RealFileSystem;

/// Execute `name` from an already loaded workflow, watching `flags`.
pub async fn run_target(workflow: &Workflow, name: &str, flags: SignalFlags) -> Result<i32> {
    let target = workflow
        .target(name)
        .ok_or_else(|| ClusterflowError::TargetNotFound(name.to_string()))?;
    let store = workflow.open_store()?;

    let mut executor =
        Executor::new(target, &store, flags).with_poll_interval(workflow.poll_interval);
    executor.execute().await
}

/// Process entry for `exec`: load the workflow, install signal handlers, run.
pub async fn exec_from_path(workflow_path: &Path, name: &str) -> Result<i32> {
    let workflow = load_and_validate(workflow_path, &RealFileSystem)?;

    let flags = SignalFlags::new();
    let handlers = install_handlers(&flags)?;

    let result = run_target(&workflow, name, flags).await;

    for handle in handlers {
        handle.abort();
    }
    debug!(target = %name, "executor finished");
    result
}
