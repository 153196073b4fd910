#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use clusterflow::config::{Workflow, load_and_validate};
use clusterflow::fs::RealFileSystem;
use clusterflow::target::Target;
use serde::Serialize;
use tempfile::TempDir;

/// One `[[target]]` entry of a generated workflow file.
#[derive(Debug, Clone, Default, Serialize)]
pub struct TargetSpec {
    name: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    inputs: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    outputs: Vec<String>,
    spec: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    working_dir: Option<String>,
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    options: BTreeMap<String, String>,
}

impl TargetSpec {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            ..Self::default()
        }
    }

    pub fn inputs<const N: usize>(mut self, inputs: [&str; N]) -> Self {
        self.inputs = inputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn outputs<const N: usize>(mut self, outputs: [&str; N]) -> Self {
        self.outputs = outputs.iter().map(|s| s.to_string()).collect();
        self
    }

    pub fn spec(mut self, spec: &str) -> Self {
        self.spec = spec.to_string();
        self
    }

    pub fn working_dir(mut self, dir: &str) -> Self {
        self.working_dir = Some(dir.to_string());
        self
    }

    pub fn option(mut self, key: &str, value: &str) -> Self {
        self.options.insert(key.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, Serialize)]
struct ConfigModel {
    metadata_dir: String,
    poll_interval_ms: u64,
    backend: String,
}

#[derive(Debug, Clone, Serialize)]
struct FileModel<'a> {
    config: &'a ConfigModel,
    #[serde(rename = "target")]
    targets: &'a [TargetSpec],
}

/// Builds a workflow file (plus source files) inside a temp directory.
#[derive(Debug, Clone)]
pub struct WorkflowBuilder {
    config: ConfigModel,
    targets: Vec<TargetSpec>,
    files: Vec<(String, String)>,
}

impl WorkflowBuilder {
    pub fn new() -> Self {
        Self {
            config: ConfigModel {
                metadata_dir: ".clusterflow".to_string(),
                poll_interval_ms: 10,
                backend: "testing".to_string(),
            },
            targets: Vec::new(),
            files: Vec::new(),
        }
    }

    pub fn target(mut self, target: TargetSpec) -> Self {
        self.targets.push(target);
        self
    }

    /// A file that exists before the workflow is loaded.
    pub fn file(mut self, rel: &str, contents: &str) -> Self {
        self.files.push((rel.to_string(), contents.to_string()));
        self
    }

    pub fn poll_interval_ms(mut self, ms: u64) -> Self {
        self.config.poll_interval_ms = ms;
        self
    }

    pub fn to_toml(&self) -> String {
        let model = FileModel {
            config: &self.config,
            targets: &self.targets,
        };
        toml::to_string(&model).expect("serializing workflow file")
    }

    /// Write everything into a fresh temp dir and load the workflow.
    pub fn build(self) -> WorkflowFixture {
        let dir = TempDir::new().expect("creating temp dir");
        for (rel, contents) in &self.files {
            write_file(dir.path(), rel, contents);
        }
        let path = dir.path().join("workflow.toml");
        fs::write(&path, self.to_toml()).expect("writing workflow file");

        let workflow = load_and_validate(&path, &RealFileSystem).expect("loading workflow");
        WorkflowFixture {
            dir,
            path,
            workflow,
        }
    }
}

impl Default for WorkflowBuilder {
    fn default() -> Self {
        Self::new()
    }
}

/// A workflow on disk in a temp dir, removed on drop.
#[derive(Debug)]
pub struct WorkflowFixture {
    pub dir: TempDir,
    pub path: PathBuf,
    pub workflow: Workflow,
}

impl WorkflowFixture {
    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    pub fn file(&self, rel: &str) -> PathBuf {
        self.dir.path().join(rel)
    }

    pub fn write_file(&self, rel: &str, contents: &str) {
        write_file(self.dir.path(), rel, contents);
    }
}

fn write_file(root: &Path, rel: &str, contents: &str) {
    let path = root.join(rel);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent).expect("creating parent dir");
    }
    fs::write(path, contents).expect("writing file");
}

/// `T0 -> T1 -> ... -> T(n-1)` linked through files `f0`, `f1`, ... in `/w`.
pub fn chain(n: usize) -> Vec<Target> {
    (0..n)
        .map(|i| {
            let t = Target::empty(format!("T{i}"), "/w")
                .with_outputs([format!("f{i}")])
                .with_order(i);
            if i == 0 {
                t
            } else {
                t.with_inputs([format!("f{}", i - 1)])
            }
        })
        .collect()
}

/// Target `i` depends on every index listed in `deps[i]` (all lower than `i`).
pub fn layered_dag(deps: &[Vec<usize>]) -> Vec<Target> {
    deps.iter()
        .enumerate()
        .map(|(i, ds)| {
            Target::empty(format!("N{i}"), "/w")
                .with_inputs(ds.iter().map(|d| format!("out{d}")))
                .with_outputs([format!("out{i}")])
                .with_order(i)
        })
        .collect()
}
