// tests/executor.rs

mod common;
use crate::common::{TargetSpec, TestResult, WorkflowBuilder, init_tracing, with_timeout_secs};

use std::path::Path;
use std::time::{Duration, Instant};

use clusterflow::config::Workflow;
use clusterflow::exec::{
    CANCELLED_EXIT_CODE, Executor, ExecutorPhase, KILLED_EXIT_CODE, SignalFlags,
};
use clusterflow::state::{State, StateStore};

const POLL: Duration = Duration::from_millis(10);

fn submit(store: &StateStore, name: &str) -> TestResult {
    let mut s = store.get(name)?;
    store.transition(&mut s, State::Submitted)?;
    Ok(())
}

/// True once `pid` has exited. A zombie waiting for a reaper counts as gone.
fn process_gone(pid: &str) -> bool {
    match std::fs::read_to_string(Path::new("/proc").join(pid).join("stat")) {
        Err(_) => true,
        Ok(stat) => stat
            .rsplit_once(") ")
            .is_some_and(|(_, rest)| rest.starts_with('Z') || rest.starts_with('X')),
    }
}

async fn execute(workflow: &Workflow, name: &str, flags: SignalFlags) -> (i32, ExecutorPhase) {
    let store = workflow.open_store().unwrap();
    let target = workflow.target(name).unwrap();
    let mut executor = Executor::new(target, &store, flags).with_poll_interval(POLL);
    let code = executor.execute().await.unwrap();
    (code, executor.phase())
}

#[tokio::test]
async fn successful_body_completes() -> TestResult {
    init_tracing();
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").outputs(["out.txt"]).spec("echo hello > out.txt"))
        .build();
    let store = fx.workflow.open_store()?;
    submit(&store, "T")?;
    drop(store);

    let (code, phase) = with_timeout_secs(10, execute(&fx.workflow, "T", SignalFlags::new())).await;

    assert_eq!(code, 0);
    assert_eq!(phase, ExecutorPhase::Completed);
    assert_eq!(std::fs::read_to_string(fx.file("out.txt"))?, "hello\n");

    let record = fx.workflow.open_store()?.get("T")?;
    assert_eq!(record.state, State::Completed);
    assert!(record.ended_at > record.started_at);
    assert!(record.started_at >= record.submitted_at);
    Ok(())
}

#[tokio::test]
async fn failing_body_reports_its_exit_code() -> TestResult {
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").spec("false\necho unreachable > never.txt"))
        .build();
    submit(&fx.workflow.open_store()?, "T")?;

    let (code, phase) = with_timeout_secs(10, execute(&fx.workflow, "T", SignalFlags::new())).await;

    assert_eq!(code, 1);
    assert_eq!(phase, ExecutorPhase::Failed);
    assert!(!fx.file("never.txt").exists());
    assert_eq!(fx.workflow.open_store()?.get("T")?.state, State::Failed);
    Ok(())
}

#[tokio::test]
async fn kill_request_terminates_the_body() -> TestResult {
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").spec("sleep 30"))
        .build();
    submit(&fx.workflow.open_store()?, "T")?;

    let flags = SignalFlags::new();
    let trigger = flags.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(200)).await;
        trigger.request_kill();
    });

    let started = Instant::now();
    let (code, phase) = with_timeout_secs(10, execute(&fx.workflow, "T", flags)).await;

    assert!(started.elapsed() < Duration::from_secs(10));
    assert_eq!(code, KILLED_EXIT_CODE);
    assert_eq!(phase, ExecutorPhase::Killed);
    assert_eq!(fx.workflow.open_store()?.get("T")?.state, State::Killed);
    Ok(())
}

#[tokio::test]
async fn cancel_request_records_cancelled() -> TestResult {
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").spec("sleep 30"))
        .build();
    submit(&fx.workflow.open_store()?, "T")?;

    let flags = SignalFlags::new();
    flags.request_cancel();

    let (code, phase) = with_timeout_secs(10, execute(&fx.workflow, "T", flags)).await;

    assert_eq!(code, CANCELLED_EXIT_CODE);
    assert_eq!(phase, ExecutorPhase::Cancelled);
    assert_eq!(fx.workflow.open_store()?.get("T")?.state, State::Cancelled);
    Ok(())
}

#[tokio::test]
async fn body_runs_in_the_working_directory() -> TestResult {
    let fx = WorkflowBuilder::new()
        .file("sub/input.txt", "data")
        .target(
            TargetSpec::new("T")
                .working_dir("sub")
                .inputs(["input.txt"])
                .outputs(["copy.txt"])
                .spec("cp input.txt copy.txt"),
        )
        .build();
    submit(&fx.workflow.open_store()?, "T")?;

    let (code, _) = with_timeout_secs(10, execute(&fx.workflow, "T", SignalFlags::new())).await;

    assert_eq!(code, 0);
    assert_eq!(std::fs::read_to_string(fx.file("sub/copy.txt"))?, "data");
    Ok(())
}

#[tokio::test]
async fn unsubmitted_target_is_refused() -> TestResult {
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").spec("touch ran.txt"))
        .build();
    let store = fx.workflow.open_store()?;
    let target = fx.workflow.target("T").ok_or("missing target")?;

    let mut executor = Executor::new(target, &store, SignalFlags::new()).with_poll_interval(POLL);
    let result = executor.execute().await;

    assert!(result.is_err());
    assert_eq!(executor.phase(), ExecutorPhase::Starting);
    assert!(!fx.file("ran.txt").exists());
    assert_eq!(store.get("T")?.state, State::ShouldRun);
    Ok(())
}

#[tokio::test]
async fn kill_leaves_no_process_of_the_body_behind() -> TestResult {
    let fx = WorkflowBuilder::new()
        .target(TargetSpec::new("T").spec(
            "echo $$ > shell.pid\nsleep 30 &\necho $! > sleep.pid\nwait",
        ))
        .build();
    submit(&fx.workflow.open_store()?, "T")?;

    let flags = SignalFlags::new();
    let trigger = flags.clone();
    let pidfile = fx.file("sleep.pid");
    tokio::spawn(async move {
        while !pidfile.exists() {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        trigger.request_kill();
    });

    let (code, _) = with_timeout_secs(10, execute(&fx.workflow, "T", flags)).await;
    assert_eq!(code, KILLED_EXIT_CODE);

    for file in ["shell.pid", "sleep.pid"] {
        let pid = std::fs::read_to_string(fx.file(file))?.trim().to_string();
        assert!(!pid.is_empty(), "{file} is empty");

        let deadline = Instant::now() + Duration::from_secs(5);
        while !process_gone(&pid) && Instant::now() < deadline {
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
        assert!(process_gone(&pid), "process {pid} from {file} survived the kill");
    }
    Ok(())
}
