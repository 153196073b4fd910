// src/errors.rs

//! Crate-wide error types.
//!
//! Each layer has its own enum so callers can match on what actually went
//! wrong; [`ClusterflowError`] wraps them all for the CLI and the executor
//! entry point.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

use crate::state::State;
use crate::target::TargetName;

/// Invalid state transition or an unreadable persisted record.
///
/// Always fatal to the operation that raised it.
#[derive(Error, Debug)]
pub enum StateError {
    #[error("target '{target}': cannot move from state {from} to state {to}")]
    InvalidTransition {
        target: TargetName,
        from: State,
        to: State,
    },

    #[error("target '{target}': cannot move out of end state {state}")]
    TerminalState { target: TargetName, state: State },

    #[error("target '{target}': corrupt state record: {source}")]
    Corrupt {
        target: TargetName,
        #[source]
        source: serde_json::Error,
    },
}

/// The dependency graph contains a cycle.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("cycle detected in target graph involving target '{target}'")]
pub struct CyclicDependencyError {
    pub target: TargetName,
}

#[derive(Error, Debug)]
pub enum GraphError {
    #[error(transparent)]
    Cycle(#[from] CyclicDependencyError),

    #[error("target '{0}' is defined more than once")]
    DuplicateTarget(TargetName),

    #[error("file {path:?} is provided by both '{first}' and '{second}'")]
    MultipleProviders {
        path: PathBuf,
        first: TargetName,
        second: TargetName,
    },

    #[error("target '{target}' requires {path:?}, which no target provides and does not exist")]
    UnresolvedInput { target: TargetName, path: PathBuf },
}

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("state database error: {0}")]
    Database(#[from] redb::Error),

    #[error("failed to acquire state lock {path:?}: {source}")]
    Lock {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    #[error(transparent)]
    State(#[from] StateError),
}

#[derive(Error, Debug)]
pub enum BackendError {
    #[error("failed to submit target '{target}': {reason}")]
    Submit { target: TargetName, reason: String },

    #[error("failed to poll job states: {0}")]
    Poll(String),

    #[error("IO error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Error, Debug)]
pub enum ExecError {
    #[error("failed to spawn command body of target '{target}': {source}")]
    Spawn {
        target: TargetName,
        #[source]
        source: io::Error,
    },

    #[error("failed to wait for command body of target '{target}': {source}")]
    Wait {
        target: TargetName,
        #[source]
        source: io::Error,
    },

    #[error("failed to install signal handler: {0}")]
    Signal(#[source] io::Error),
}

#[derive(Error, Debug)]
pub enum ClusterflowError {
    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("Target not found: {0}")]
    TargetNotFound(String),

    #[error("TOML parsing error: {0}")]
    TomlError(#[from] toml::de::Error),

    #[error(transparent)]
    Graph(#[from] GraphError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    State(#[from] StateError),

    #[error(transparent)]
    Backend(#[from] BackendError),

    #[error(transparent)]
    Exec(#[from] ExecError),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

pub use anyhow::Error;
pub type Result<T> = std::result::Result<T, ClusterflowError>;
