//! Test: Matrix jobs - expansion order, isolation, independent failures

use crate::helpers::*;
use envflow::core::{ExecutionStatus, OrchestrationError};
use std::collections::HashSet;
use std::time::Duration;

#[tokio::test]
async fn test_matrix_expands_in_declared_order() {
    let harness = Harness::janus(MockRunner::new());

    let ids: Vec<&str> = harness.workflow.registry().ids().iter().map(String::as_str).collect();
    assert_eq!(ids, vec!["py310", "py311", "py312", "legacy-py311", "docs"]);

    for (id, python) in [("py310", "3.10"), ("py311", "3.11"), ("py312", "3.12")] {
        let spec = harness.workflow.registry().resolve(id).unwrap();
        assert_eq!(spec.python.as_deref(), Some(python));
    }
}

#[tokio::test]
async fn test_failure_in_one_job_leaves_siblings_untouched() {
    let runner = MockRunner::new()
        .fail_when("py311", "pytest")
        .with_delay(Duration::from_millis(5));
    let harness = Harness::janus(runner);

    let report = harness
        .run(&push("main", "stfc/janus-core"), &["py310,py311,py312"])
        .await;

    assert_job_succeeded(&report, "py310");
    assert_job_failed(&report, "py311", "commands");
    assert_job_succeeded(&report, "py312");

    let ids: Vec<_> = report.jobs.iter().map(|j| j.env_id.as_str()).collect();
    assert_eq!(ids, vec!["py310", "py311", "py312"]);

    match &job(&report, "py311").error {
        Some(OrchestrationError::CommandFailure { env_id, exit_code, output, .. }) => {
            assert_eq!(env_id, "py311");
            assert_eq!(*exit_code, 1);
            // The runner's own output reaches the report
            assert!(output.starts_with("pytest --run-extra-mlips"), "output: {}", output);
            assert!(output.ends_with("failed"));
        }
        other => panic!("Expected CommandFailure, got {:?}", other),
    }

    assert_eq!(report.state.status, ExecutionStatus::Failed);
    assert_eq!(report.state.completed_jobs, 2);
    assert_eq!(report.state.failed_jobs, 1);
}

#[tokio::test]
async fn test_each_job_gets_its_own_environment() {
    let harness = Harness::janus(MockRunner::new());

    harness
        .run(&push("main", "stfc/janus-core"), &["py310", "py311", "py312"])
        .await;

    let roots: HashSet<String> = ["py310", "py311", "py312"]
        .iter()
        .map(|id| {
            let calls = harness.runner.calls_for(id);
            let root = calls[0].env["UV_PROJECT_ENVIRONMENT"].clone();
            // Every command of the job targets the same environment
            assert!(calls.iter().all(|c| c.env["UV_PROJECT_ENVIRONMENT"] == root));
            root
        })
        .collect();
    assert_eq!(roots.len(), 3);
}

#[tokio::test]
async fn test_sync_pins_interpreter_per_matrix_value() {
    let harness = Harness::janus(MockRunner::new());

    harness.run(&push("main", "stfc/janus-core"), &["py311"]).await;

    let sync = harness.runner.sync_commands("py311");
    assert_eq!(
        sync,
        vec![vec!["uv", "sync", "--locked", "--python", "3.11", "--extra", "all"]]
    );
}

#[tokio::test]
async fn test_resolution_failure_skips_commands() {
    let runner = MockRunner::new().fail_when("py310", "sync");
    let harness = Harness::janus(runner);

    let report = harness
        .run(&push("main", "stfc/janus-core"), &["py310", "py312"])
        .await;

    assert_job_failed(&report, "py310", "prepare");
    assert!(matches!(
        job(&report, "py310").error,
        Some(OrchestrationError::DependencyResolutionFailure { .. })
    ));
    assert!(harness.runner.recipe_commands("py310").is_empty());
    assert_job_succeeded(&report, "py312");
}

#[tokio::test]
async fn test_unknown_environment_is_rejected() {
    let harness = Harness::janus(MockRunner::new());

    let err = harness
        .workflow
        .dispatch(&push("main", "stfc/janus-core"), &["py39"], &[])
        .await
        .unwrap_err();

    assert_eq!(err, OrchestrationError::UnknownEnvironment("py39".to_string()));
    assert!(harness.runner.calls().is_empty());
}
