//! Test: Lockfile and legacy recipes drive the test runner the same way

use crate::helpers::*;
use envflow::core::RunnerStrategy;

/// Drop the package manager's `run` prefix, if any
fn unprefixed(argv: &[String]) -> Vec<String> {
    match argv {
        [manager, run, rest @ ..] if manager == "poetry" && run == "run" => rest.to_vec(),
        _ => argv.to_vec(),
    }
}

#[tokio::test]
async fn test_same_semantic_flags_under_both_strategies() {
    let harness = Harness::janus(MockRunner::new());

    let report = harness
        .run(&push("main", "stfc/janus-core"), &["py311", "legacy-py311"])
        .await;
    assert_job_succeeded(&report, "py311");
    assert_job_succeeded(&report, "legacy-py311");
    assert_eq!(job(&report, "py311").strategy, RunnerStrategy::LockfileSync);
    assert_eq!(
        job(&report, "legacy-py311").strategy,
        RunnerStrategy::LegacyPackageManagerSync
    );

    let lockfile = harness.runner.recipe_commands("py311");
    let legacy = harness.runner.recipe_commands("legacy-py311");
    assert_eq!(lockfile.len(), 1);
    assert_eq!(legacy.len(), 1);

    // The legacy path goes through the package manager, the lockfile path does not
    assert_eq!(&legacy[0][..2], ["poetry", "run"]);
    assert_eq!(lockfile[0][0], "pytest");

    let lockfile_args = unprefixed(&lockfile[0]);
    let legacy_args = unprefixed(&legacy[0]);
    assert_eq!(lockfile_args, legacy_args);
    for flag in ["--run-extra-mlips", "--cov", "janus_core"] {
        assert!(lockfile_args.iter().any(|a| a == flag), "missing {}", flag);
    }
}

#[tokio::test]
async fn test_dependency_sync_differs_by_strategy() {
    let harness = Harness::janus(MockRunner::new());

    harness
        .run(&push("main", "stfc/janus-core"), &["py311", "legacy-py311"])
        .await;

    assert_eq!(
        harness.runner.sync_commands("py311"),
        vec![vec!["uv", "sync", "--locked", "--python", "3.11", "--extra", "all"]]
    );
    assert_eq!(
        harness.runner.sync_commands("legacy-py311"),
        vec![
            vec!["poetry", "env", "use", "3.11"],
            vec!["poetry", "install", "--no-root", "--sync", "--with", "extra-mlips"],
        ]
    );

    let legacy_env = &harness.runner.calls_for("legacy-py311")[0].env;
    assert!(legacy_env.contains_key("POETRY_VIRTUALENVS_PATH"));
    assert!(!legacy_env.contains_key("UV_PROJECT_ENVIRONMENT"));
}

#[tokio::test]
async fn test_posargs_reach_both_strategies() {
    let harness = Harness::janus(MockRunner::new());
    let posargs = vec!["-k".to_string(), "test_single_point".to_string()];

    harness
        .workflow
        .dispatch(&push("main", "stfc/janus-core"), &["py312", "legacy-py311"], &posargs)
        .await
        .unwrap();

    for env_id in ["py312", "legacy-py311"] {
        let argv = unprefixed(&harness.runner.recipe_commands(env_id)[0]);
        let k = argv.iter().position(|a| a == "-k").expect("posargs missing");
        assert_eq!(argv[k + 1], "test_single_point");
        assert_eq!(argv.last().map(String::as_str), Some("."));
    }
}

#[tokio::test]
async fn test_lean_environment_without_dev_dependencies() {
    let yaml = r#"
name: "lean"
environments:
  - id: "lockfile"
    extras: ["d3"]
    with_dev: false
    commands: ["pytest"]
  - id: "legacy"
    runner: poetry
    extras: ["d3"]
    with_dev: false
    commands: ["pytest"]
"#;
    let harness = Harness::new(yaml, MockRunner::new(), envflow::execution::SchedulingStrategy::Sequential);

    harness.run(&push("main", "stfc/janus-core"), &["ALL"]).await;

    assert_eq!(
        harness.runner.sync_commands("lockfile"),
        vec![vec!["uv", "sync", "--locked", "--extra", "d3", "--no-dev"]]
    );
    assert_eq!(
        harness.runner.sync_commands("legacy"),
        vec![vec!["poetry", "install", "--no-root", "--sync", "--with", "d3", "--without", "dev"]]
    );
    assert_eq!(
        harness.runner.recipe_commands("legacy"),
        vec![vec!["poetry", "run", "pytest"]]
    );
}
