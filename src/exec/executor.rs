// src/exec/executor.rs

//! Runs one target's command body and commits exactly one end state.

use std::fmt;
use std::io::Write;
use std::process::Stdio;
use std::time::Duration;

use anyhow::anyhow;
use tokio::io::AsyncWriteExt;
use tokio::process::{Child, Command};
use tracing::{debug, error, info, warn};

use crate::errors::{ExecError, Result};
use crate::exec::signals::{Interrupt, SignalFlags};
use crate::state::{State, StateStore, TargetState};
use crate::target::Target;

/// Exit code reported when the target was killed.
pub const KILLED_EXIT_CODE: i32 = 137;

/// Exit code reported when the target was cancelled.
pub const CANCELLED_EXIT_CODE: i32 = 138;

/// Reported when the child died from a signal we did not send.
pub const SIGNALLED_EXIT_CODE: i32 = -1;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// In-process phase of one executor run. Never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecutorPhase {
    Starting,
    Running,
    Completed,
    Failed,
    Killed,
    Cancelled,
}

impl ExecutorPhase {
    pub fn is_terminal(self) -> bool {
        !matches!(self, ExecutorPhase::Starting | ExecutorPhase::Running)
    }
}

impl From<State> for ExecutorPhase {
    fn from(state: State) -> Self {
        match state {
            State::Completed => ExecutorPhase::Completed,
            State::Failed => ExecutorPhase::Failed,
            State::Killed => ExecutorPhase::Killed,
            State::Cancelled => ExecutorPhase::Cancelled,
            State::Running => ExecutorPhase::Running,
            State::ShouldRun | State::Submitted => ExecutorPhase::Starting,
        }
    }
}

/// How the wait loop ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    NormalExit(i32),
    Killed,
    Cancelled,
}

impl Outcome {
    /// End state to commit and process exit code to report.
    pub fn resolve(self) -> (State, i32) {
        match self {
            Outcome::NormalExit(0) => (State::Completed, 0),
            Outcome::NormalExit(code) => (State::Failed, code),
            Outcome::Killed => (State::Killed, KILLED_EXIT_CODE),
            Outcome::Cancelled => (State::Cancelled, CANCELLED_EXIT_CODE),
        }
    }
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::NormalExit(code) => write!(f, "exit({code})"),
            Outcome::Killed => f.write_str("killed"),
            Outcome::Cancelled => f.write_str("cancelled"),
        }
    }
}

/// Flushes this process's stdout and stderr when dropped.
struct FlushOnDrop;

impl Drop for FlushOnDrop {
    fn drop(&mut self) {
        let _ = std::io::stdout().flush();
        let _ = std::io::stderr().flush();
    }
}

#[derive(Debug)]
pub struct Executor<'a> {
    target: &'a Target,
    store: &'a StateStore,
    flags: SignalFlags,
    poll_interval: Duration,
    phase: ExecutorPhase,
}

impl<'a> Executor<'a> {
    pub fn new(target: &'a Target, store: &'a StateStore, flags: SignalFlags) -> Self {
        Self {
            target,
            store,
            flags,
            poll_interval: DEFAULT_POLL_INTERVAL,
            phase: ExecutorPhase::Starting,
        }
    }

    pub fn with_poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = interval;
        self
    }

    pub fn phase(&self) -> ExecutorPhase {
        self.phase
    }

    /// Run the target to an end state and return the process exit code.
    ///
    /// The record must be submitted. Once it is running, every path commits
    /// one end state: spawn and wait failures commit failed before the error
    /// is returned.
    pub async fn execute(&mut self) -> Result<i32> {
        let _flush = FlushOnDrop;
        let target: &'a Target = self.target;
        let name = &target.name;

        if self.phase != ExecutorPhase::Starting {
            return Err(anyhow!("executor for target '{name}' already ran").into());
        }

        let mut state = self.store.get(name)?;
        self.store.transition(&mut state, State::Running)?;
        self.phase = ExecutorPhase::Running;
        info!(target = %name, "target running");

        let outcome = match self.wait_for_child().await {
            Ok(outcome) => outcome,
            Err(err) => {
                error!(target = %name, error = %err, "command body could not be run");
                self.commit_end(&mut state, State::Failed)?;
                return Err(err.into());
            }
        };

        let (end, code) = outcome.resolve();
        self.commit_end(&mut state, end)?;
        info!(target = %name, %outcome, state = %end, exit_code = code, "target finished");
        Ok(code)
    }

    fn commit_end(&mut self, state: &mut TargetState, end: State) -> Result<()> {
        self.store.transition(state, end)?;
        self.phase = end.into();
        Ok(())
    }

    async fn wait_for_child(&self) -> std::result::Result<Outcome, ExecError> {
        let name = &self.target.name;
        let mut child = self.spawn()?;

        if let Some(mut stdin) = child.stdin.take() {
            let body = self.target.spec.clone();
            let target = name.clone();
            tokio::spawn(async move {
                if let Err(e) = stdin.write_all(body.as_bytes()).await {
                    debug!(target = %target, error = %e, "child closed stdin early");
                }
            });
        }

        loop {
            if let Some(interrupt) = self.flags.pending() {
                info!(target = %name, ?interrupt, "terminating command body");
                terminate(&mut child).await;
                return Ok(match interrupt {
                    Interrupt::Kill => Outcome::Killed,
                    Interrupt::Cancel => Outcome::Cancelled,
                });
            }

            match child.try_wait() {
                Ok(Some(status)) => {
                    let code = status.code().unwrap_or(SIGNALLED_EXIT_CODE);
                    debug!(target = %name, exit_code = code, "command body exited");
                    return Ok(Outcome::NormalExit(code));
                }
                Ok(None) => {}
                Err(source) => {
                    terminate(&mut child).await;
                    return Err(ExecError::Wait {
                        target: name.clone(),
                        source,
                    });
                }
            }

            tokio::time::sleep(self.poll_interval).await;
        }
    }

    fn spawn(&self) -> std::result::Result<Child, ExecError> {
        let mut cmd = Command::new("/bin/bash");
        cmd.args(["-e", "-o", "pipefail"])
            .current_dir(&self.target.working_dir)
            .stdin(Stdio::piped())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .kill_on_drop(true);

        #[cfg(unix)]
        cmd.process_group(0);

        cmd.spawn().map_err(|source| ExecError::Spawn {
            target: self.target.name.clone(),
            source,
        })
    }
}

/// Kill the child's process group, then the child itself, and reap it.
async fn terminate(child: &mut Child) {
    #[cfg(unix)]
    if let Some(pid) = child.id() {
        let group = format!("-{pid}");
        match Command::new("kill")
            .args(["-KILL", "--", &group])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status()
            .await
        {
            Ok(status) if !status.success() => debug!(pid, "process group already gone"),
            Err(e) => warn!(pid, error = %e, "could not signal process group"),
            Ok(_) => {}
        }
    }

    if let Err(e) = child.kill().await {
        debug!(error = %e, "child already exited");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn outcome_maps_to_end_state_and_exit_code() {
        assert_eq!(Outcome::NormalExit(0).resolve(), (State::Completed, 0));
        assert_eq!(Outcome::NormalExit(3).resolve(), (State::Failed, 3));
        assert_eq!(Outcome::Killed.resolve(), (State::Killed, KILLED_EXIT_CODE));
        assert_eq!(
            Outcome::Cancelled.resolve(),
            (State::Cancelled, CANCELLED_EXIT_CODE)
        );
    }

    #[test]
    fn phases_follow_states() {
        assert!(ExecutorPhase::from(State::Killed).is_terminal());
        assert!(!ExecutorPhase::from(State::Running).is_terminal());
        assert_eq!(ExecutorPhase::from(State::Submitted), ExecutorPhase::Starting);
    }
}
