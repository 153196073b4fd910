// src/target.rs

//! The unit of work scheduled by the engine.

use std::collections::BTreeMap;
use std::path::{Component, Path, PathBuf};

use serde::Serialize;

/// Canonical target name type used throughout the engine.
pub type TargetName = String;

/// Backend options attached to a target (cores, memory, walltime, ...).
///
/// Opaque to the core; only a backend's script header interprets them.
pub type TargetOptions = BTreeMap<String, String>;

/// A named unit of work with declared file inputs/outputs and a command body.
///
/// Immutable once the workflow has been loaded. Input and output paths are
/// absolute (resolved against `working_dir` by the loader).
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Target {
    pub name: TargetName,
    pub working_dir: PathBuf,
    /// Command body, fed verbatim to the executor's shell.
    pub spec: String,
    pub inputs: Vec<PathBuf>,
    pub outputs: Vec<PathBuf>,
    pub options: TargetOptions,
    /// Creation order in the workflow definition.
    pub order: usize,
}

impl Target {
    /// A target with no files, no options and an empty command body.
    pub fn empty(name: impl Into<TargetName>, working_dir: impl Into<PathBuf>) -> Self {
        Self {
            name: name.into(),
            working_dir: working_dir.into(),
            spec: String::new(),
            inputs: Vec::new(),
            outputs: Vec::new(),
            options: TargetOptions::new(),
            order: 0,
        }
    }

    pub fn with_inputs<I, P>(mut self, inputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.inputs = resolve_paths(&self.working_dir, inputs);
        self
    }

    pub fn with_outputs<I, P>(mut self, outputs: I) -> Self
    where
        I: IntoIterator<Item = P>,
        P: AsRef<Path>,
    {
        self.outputs = resolve_paths(&self.working_dir, outputs);
        self
    }

    pub fn with_spec(mut self, spec: impl Into<String>) -> Self {
        self.spec = spec.into();
        self
    }

    pub fn with_order(mut self, order: usize) -> Self {
        self.order = order;
        self
    }

    pub fn with_option(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.options.insert(key.into(), value.into());
        self
    }
}

/// Resolve (possibly relative) paths against `base`, normalized lexically.
pub fn resolve_paths<I, P>(base: &Path, paths: I) -> Vec<PathBuf>
where
    I: IntoIterator<Item = P>,
    P: AsRef<Path>,
{
    paths
        .into_iter()
        .map(|p| normalize(&base.join(p.as_ref())))
        .collect()
}

/// Drop `.` components and fold `..` into its parent without touching disk.
///
/// Two spellings of the same file must compare equal so producers and
/// consumers match up.
pub fn normalize(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                if !out.pop() {
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
