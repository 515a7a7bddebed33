//! Test: Trigger gate - admitted runs proceed, rejected runs do nothing

use crate::helpers::*;
use envflow::core::EventType;

#[tokio::test]
async fn test_push_to_main_is_admitted() {
    let harness = Harness::janus(MockRunner::new());

    let report = harness
        .run(&push("refs/heads/main", "stfc/janus-core"), &["py312"])
        .await;

    assert_job_succeeded(&report, "py312");
    assert!(!harness.runner.calls_for("py312").is_empty());
}

#[tokio::test]
async fn test_feature_branch_is_rejected() {
    let harness = Harness::janus(MockRunner::new());

    let outcome = harness
        .dispatch(&push("feature-x", "stfc/janus-core"), &["ALL"])
        .await;

    assert!(outcome.is_skipped());
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test]
async fn test_fork_is_rejected_without_side_effects() {
    let harness = Harness::janus(MockRunner::new());

    let outcome = harness.dispatch(&push("main", "someone/fork"), &["docs"]).await;

    assert!(outcome.is_skipped());
    assert!(outcome.report().is_none());
    // No job, no artifact, no publication
    assert!(harness.runner.calls().is_empty());
    assert!(!harness.project.path().join("docs/build/html").exists());
    assert!(!harness.site.path().join("github-pages").exists());
}

#[tokio::test]
async fn test_manual_dispatch_is_admitted() {
    let harness = Harness::janus(MockRunner::new());

    let report = harness
        .run(&trigger(EventType::Manual, "main", "stfc/janus-core"), &["py310"])
        .await;

    assert_job_succeeded(&report, "py310");
}

#[tokio::test]
async fn test_disabled_event_type_is_rejected() {
    let harness = Harness::janus(MockRunner::new());

    let outcome = harness
        .dispatch(&trigger(EventType::PullRequest, "main", "stfc/janus-core"), &["ALL"])
        .await;

    match outcome {
        envflow::execution::WorkflowOutcome::Skipped { reason, .. } => {
            assert!(reason.contains("pull_request"), "unexpected reason: {}", reason);
        }
        other => panic!("Expected skipped run, got {:?}", other),
    }
    assert!(harness.runner.calls().is_empty());
}

#[tokio::test]
async fn test_workflow_without_gate_admits_everything() {
    let yaml = r#"
name: "ungated"
environments:
  - id: "lint"
    commands: ["pre-commit run --all-files"]
"#;
    let harness = Harness::new(yaml, MockRunner::new(), envflow::execution::SchedulingStrategy::Sequential);

    let report = harness.run(&push("anything", "someone/fork"), &[]).await;

    assert_job_succeeded(&report, "lint");
    assert_eq!(
        harness.runner.recipe_commands("lint"),
        vec![vec!["pre-commit", "run", "--all-files"]]
    );
}
