// tests/workflow.rs

mod common;
use crate::common::{TargetSpec, TestResult, WorkflowBuilder};

use std::fs;

use clusterflow::config::load_and_validate;
use clusterflow::errors::{ClusterflowError, GraphError};
use clusterflow::fs::RealFileSystem;
use tempfile::TempDir;

#[test]
fn dependencies_follow_files_across_directories() -> TestResult {
    let fx = WorkflowBuilder::new()
        .file("raw/reads.fq", "ACGT")
        .target(
            TargetSpec::new("Align")
                .working_dir("raw")
                .inputs(["reads.fq"])
                .outputs(["../aligned/reads.bam"]),
        )
        .target(
            TargetSpec::new("Count")
                .working_dir("aligned")
                .inputs(["reads.bam"])
                .outputs(["counts.txt"]),
        )
        .build();

    let graph = &fx.workflow.graph;
    assert_eq!(graph.topological_order(), ["Align", "Count"]);
    assert!(graph.dependencies_of("Count").contains("Align"));

    let endpoints: Vec<_> = graph.endpoints().iter().map(|t| t.name.clone()).collect();
    assert_eq!(endpoints, ["Count"]);
    assert_eq!(fx.workflow.metadata_dir, fx.root().join(".clusterflow"));
    Ok(())
}

#[test]
fn missing_unprovided_input_is_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("workflow.toml");
    let toml = WorkflowBuilder::new()
        .target(TargetSpec::new("T").inputs(["nowhere.txt"]).outputs(["x"]))
        .to_toml();
    fs::write(&path, toml)?;

    let err = load_and_validate(&path, &RealFileSystem).unwrap_err();
    assert!(matches!(
        err,
        ClusterflowError::Graph(GraphError::UnresolvedInput { ref target, .. }) if target == "T"
    ));
    Ok(())
}

#[test]
fn two_providers_for_one_file_are_rejected() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("workflow.toml");
    let toml = WorkflowBuilder::new()
        .target(TargetSpec::new("A").outputs(["same.txt"]))
        .target(TargetSpec::new("B").outputs(["./same.txt"]))
        .to_toml();
    fs::write(&path, toml)?;

    let err = load_and_validate(&path, &RealFileSystem).unwrap_err();
    assert!(matches!(
        err,
        ClusterflowError::Graph(GraphError::MultipleProviders { .. })
    ));
    Ok(())
}

#[test]
fn self_consuming_target_is_a_cycle() -> TestResult {
    let dir = TempDir::new()?;
    let path = dir.path().join("workflow.toml");
    let toml = WorkflowBuilder::new()
        .target(TargetSpec::new("Loop").inputs(["x"]).outputs(["x"]))
        .to_toml();
    fs::write(&path, toml)?;

    let err = load_and_validate(&path, &RealFileSystem).unwrap_err();
    assert!(matches!(err, ClusterflowError::Graph(GraphError::Cycle(_))));
    Ok(())
}
