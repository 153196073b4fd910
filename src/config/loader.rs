// src/config/loader.rs

use std::path::{self, Path, PathBuf};
use std::time::Duration;

use tracing::debug;

use crate::config::model::{RawWorkflowFile, TargetConfig, WorkflowFile};
use crate::dag::Graph;
use crate::errors::Result;
use crate::fs::FileSystem;
use crate::state::StateStore;
use crate::target::{Target, TargetOptions, normalize};

/// Default workflow file name, looked up in the current directory.
pub const DEFAULT_WORKFLOW_FILE: &str = "workflow.toml";

/// A loaded workflow: resolved targets, their graph and where state lives.
#[derive(Debug, Clone)]
pub struct Workflow {
    /// Absolute path of the workflow file.
    pub path: PathBuf,
    /// Directory containing the workflow file.
    pub root: PathBuf,
    pub metadata_dir: PathBuf,
    pub poll_interval: Duration,
    pub backend: String,
    pub graph: Graph,
}

impl Workflow {
    pub fn targets(&self) -> impl Iterator<Item = &Target> {
        self.graph.targets()
    }

    pub fn target(&self, name: &str) -> Option<&Target> {
        self.graph.target(name)
    }

    pub fn open_store(&self) -> Result<StateStore> {
        Ok(StateStore::open(&self.metadata_dir)?)
    }

    pub fn scripts_dir(&self) -> PathBuf {
        self.metadata_dir.join("scripts")
    }
}

/// Read and deserialize a workflow file without semantic validation.
pub fn load_from_path(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<RawWorkflowFile> {
    let contents = fs.read_to_string(path.as_ref())?;
    let raw: RawWorkflowFile = toml::from_str(&contents)?;
    Ok(raw)
}

/// Load, validate and resolve a workflow file, then build its graph.
///
/// Fails on invalid config, cycles, files with two producers, and inputs that
/// no target produces and that do not exist.
pub fn load_and_validate(path: impl AsRef<Path>, fs: &dyn FileSystem) -> Result<Workflow> {
    let path = path::absolute(path.as_ref())?;
    let root = match path.parent() {
        Some(parent) => parent.to_path_buf(),
        None => PathBuf::from("/"),
    };

    let file = WorkflowFile::try_from(load_from_path(&path, fs)?)?;
    let targets = file
        .targets
        .iter()
        .enumerate()
        .map(|(order, tc)| resolve_target(tc, order, &root, &file.defaults.options));

    let graph = Graph::from_targets(targets)?;
    graph.check_unresolved(fs)?;

    debug!(path = ?path, targets = graph.len(), "workflow loaded");

    Ok(Workflow {
        metadata_dir: root.join(&file.config.metadata_dir),
        poll_interval: Duration::from_millis(file.config.poll_interval_ms),
        backend: file.config.backend,
        path,
        root,
        graph,
    })
}

fn resolve_target(
    tc: &TargetConfig,
    order: usize,
    root: &Path,
    default_options: &TargetOptions,
) -> Target {
    let working_dir = match &tc.working_dir {
        Some(dir) => normalize(&root.join(dir)),
        None => root.to_path_buf(),
    };

    let mut options = default_options.clone();
    options.extend(tc.options.iter().map(|(k, v)| (k.clone(), v.clone())));

    let mut target = Target::empty(tc.name.clone(), working_dir)
        .with_inputs(&tc.inputs)
        .with_outputs(&tc.outputs)
        .with_spec(tc.spec.clone())
        .with_order(order);
    target.options = options;
    target
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::{ClusterflowError, GraphError};
    use crate::fs::mock::MockFileSystem;

    const WORKFLOW: &str = r#"
        [config]
        metadata_dir = "meta"
        poll_interval_ms = 20

        [defaults.options]
        cores = "1"
        memory = "1g"

        [[target]]
        name = "Target1"
        inputs = ["raw.txt"]
        outputs = ["a.txt"]
        spec = "cp raw.txt a.txt"

        [[target]]
        name = "Target2"
        inputs = ["../a.txt"]
        outputs = ["b.txt"]
        working_dir = "sub"
        options = { memory = "4g" }
        spec = "cat ../a.txt > b.txt"
    "#;

    #[test]
    fn resolves_paths_options_and_graph() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/workflow.toml", WORKFLOW);
        fs.add_file("/w/raw.txt", "raw");

        let wf = load_and_validate("/w/workflow.toml", &fs).unwrap();
        assert_eq!(wf.root, PathBuf::from("/w"));
        assert_eq!(wf.metadata_dir, PathBuf::from("/w/meta"));
        assert_eq!(wf.poll_interval, Duration::from_millis(20));

        let t2 = wf.target("Target2").unwrap();
        assert_eq!(t2.working_dir, PathBuf::from("/w/sub"));
        assert_eq!(t2.outputs, vec![PathBuf::from("/w/sub/b.txt")]);
        assert_eq!(t2.options["memory"], "4g");
        assert_eq!(t2.options["cores"], "1");
        assert_eq!(t2.order, 1);

        assert_eq!(t2.inputs, vec![PathBuf::from("/w/a.txt")]);
        assert!(wf.graph.dependencies_of("Target2").contains("Target1"));
    }

    #[test]
    fn missing_source_input_fails() {
        let fs = MockFileSystem::new();
        fs.add_file("/w/workflow.toml", WORKFLOW);

        let err = load_and_validate("/w/workflow.toml", &fs).unwrap_err();
        assert!(matches!(
            err,
            ClusterflowError::Graph(GraphError::UnresolvedInput { .. })
        ));
    }
}
