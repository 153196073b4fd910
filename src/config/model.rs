// src/config/model.rs

use std::path::PathBuf;

use serde::Deserialize;

use crate::target::TargetOptions;

/// Workflow file as read from TOML, before validation.
///
/// ```toml
/// [config]
/// metadata_dir = ".clusterflow"
/// poll_interval_ms = 100
/// backend = "testing"
///
/// [defaults.options]
/// cores = "1"
///
/// [[target]]
/// name = "Target1"
/// outputs = ["a.txt"]
/// spec = "echo hello > a.txt"
/// ```
///
/// Targets are an array of tables; their position is the creation order.
#[derive(Debug, Clone, Deserialize)]
pub struct RawWorkflowFile {
    #[serde(default)]
    pub config: ConfigSection,

    #[serde(default)]
    pub defaults: DefaultsSection,

    #[serde(default, rename = "target")]
    pub targets: Vec<TargetConfig>,
}

/// Validated workflow file. Only built through `TryFrom<RawWorkflowFile>`.
#[derive(Debug, Clone)]
pub struct WorkflowFile {
    pub config: ConfigSection,
    pub defaults: DefaultsSection,
    pub targets: Vec<TargetConfig>,
}

impl WorkflowFile {
    pub(crate) fn new_unchecked(
        config: ConfigSection,
        defaults: DefaultsSection,
        targets: Vec<TargetConfig>,
    ) -> Self {
        Self {
            config,
            defaults,
            targets,
        }
    }
}

/// `[config]` section.
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigSection {
    /// Holds the state database, its lock file and compiled scripts.
    /// Relative to the workflow file's directory.
    #[serde(default = "default_metadata_dir")]
    pub metadata_dir: PathBuf,

    /// Executor wait-loop tick.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,

    #[serde(default = "default_backend")]
    pub backend: String,
}

fn default_metadata_dir() -> PathBuf {
    PathBuf::from(".clusterflow")
}

fn default_poll_interval_ms() -> u64 {
    100
}

fn default_backend() -> String {
    "testing".to_string()
}

impl Default for ConfigSection {
    fn default() -> Self {
        Self {
            metadata_dir: default_metadata_dir(),
            poll_interval_ms: default_poll_interval_ms(),
            backend: default_backend(),
        }
    }
}

/// `[defaults]` section.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct DefaultsSection {
    /// Backend options merged under every target's own options.
    #[serde(default)]
    pub options: TargetOptions,
}

/// One `[[target]]` entry.
#[derive(Debug, Clone, Deserialize)]
pub struct TargetConfig {
    pub name: String,

    #[serde(default)]
    pub inputs: Vec<PathBuf>,

    #[serde(default)]
    pub outputs: Vec<PathBuf>,

    /// Command body fed to bash.
    #[serde(default)]
    pub spec: String,

    /// Relative to the workflow file's directory; defaults to it.
    #[serde(default)]
    pub working_dir: Option<PathBuf>,

    #[serde(default)]
    pub options: TargetOptions,
}
