#![allow(dead_code)]
#![allow(unused_imports)]

pub use clusterflow_test_utils::{
    RecordingBackend, TargetSpec, WorkflowBuilder, WorkflowFixture, chain, init_tracing,
    layered_dag, with_timeout, with_timeout_secs,
};

pub type TestResult = Result<(), Box<dyn std::error::Error>>;
