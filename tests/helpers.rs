//! Test utility functions for envflow

#![allow(dead_code)]

use async_trait::async_trait;
use envflow::core::config::OrchestrationConfig;
use envflow::core::{EventType, JobState, TriggerEvent};
use envflow::execution::{ExecutionEngine, JobOutcome, RunReport, SchedulingStrategy, Workflow, WorkflowOutcome};
use envflow::resolver::{StrategyResolver, WorkspaceLayout};
use envflow::runner::{CommandInvocation, CommandOutput, CommandRunner, RunnerError};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tempfile::TempDir;

/// The janus-core layout: a python matrix, a legacy job, docs and publication
pub const JANUS_YAML: &str = r#"
name: "janus-core"
defaults:
  runner: lockfile-sync
  extras: ["all"]
  with_dev: true
matrix:
  - pattern: "py{310,311,312}"
    recipe:
      python: "{{ python_dotted }}"
      commands:
        - "pytest --run-extra-mlips --cov janus_core --cov-append {{ posargs }} ."
environments:
  - id: "legacy-py311"
    runner: legacy-package-manager-sync
    python: "3.11"
    extras: ["extra-mlips"]
    commands:
      - "pytest --run-extra-mlips --cov janus_core --cov-append {{ posargs }} ."
  - id: "docs"
    commands:
      - "sphinx-build -nW --keep-going -b html {{ posargs }} docs/source docs/build/html"
    artifact_dir: "docs/build/html"
gate:
  branch: main
  repository: stfc/janus-core
  events: [push, manual]
publication:
  environment: docs
  target: github-pages
  concurrency_group: pages
"#;

/// Mock runner that records every invocation.
///
/// `sphinx-build` writes an `index.html` into its output directory so the
/// docs job leaves a publishable site behind.
#[derive(Default)]
pub struct MockRunner {
    calls: Mutex<Vec<CommandInvocation>>,
    failures: Vec<(String, String)>,
    delay: Option<Duration>,
}

impl MockRunner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail commands of `env_id` whose argv contains `needle`
    pub fn fail_when(mut self, env_id: &str, needle: &str) -> Self {
        self.failures.push((env_id.to_string(), needle.to_string()));
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn calls(&self) -> Vec<CommandInvocation> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_for(&self, env_id: &str) -> Vec<CommandInvocation> {
        self.calls()
            .into_iter()
            .filter(|call| call.env_id == env_id)
            .collect()
    }

    /// Recipe commands of one environment, without the dependency sync
    pub fn recipe_commands(&self, env_id: &str) -> Vec<Vec<String>> {
        self.calls_for(env_id)
            .into_iter()
            .filter(|call| !is_sync_command(&call.argv))
            .map(|call| call.argv)
            .collect()
    }

    /// Dependency sync commands of one environment
    pub fn sync_commands(&self, env_id: &str) -> Vec<Vec<String>> {
        self.calls_for(env_id)
            .into_iter()
            .filter(|call| is_sync_command(&call.argv))
            .map(|call| call.argv)
            .collect()
    }

    fn should_fail(&self, invocation: &CommandInvocation) -> bool {
        self.failures.iter().any(|(env_id, needle)| {
            *env_id == invocation.env_id && invocation.argv.iter().any(|arg| arg == needle)
        })
    }
}

pub fn is_sync_command(argv: &[String]) -> bool {
    match argv.first().map(String::as_str) {
        Some("uv") => true,
        Some("poetry") => matches!(argv.get(1).map(String::as_str), Some("install" | "env")),
        _ => false,
    }
}

#[async_trait]
impl CommandRunner for MockRunner {
    async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, RunnerError> {
        self.calls.lock().unwrap().push(invocation.clone());

        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        if self.should_fail(invocation) {
            return Ok(CommandOutput::failure(1, format!("{} failed", invocation.display())));
        }

        if invocation.program() == Some("sphinx-build") {
            if let Some(out_dir) = invocation.argv.last() {
                let out_dir = invocation.working_dir.join(out_dir);
                std::fs::create_dir_all(&out_dir).unwrap();
                std::fs::write(out_dir.join("index.html"), "<h1>janus-core</h1>").unwrap();
            }
        }

        Ok(CommandOutput::success(""))
    }
}

/// A workflow wired to a mock runner inside temporary directories
pub struct Harness {
    pub project: TempDir,
    pub site: TempDir,
    pub runner: Arc<MockRunner>,
    pub workflow: Workflow<Arc<MockRunner>>,
}

impl Harness {
    pub fn new(yaml: &str, runner: MockRunner, strategy: SchedulingStrategy) -> Self {
        let project = tempfile::tempdir().unwrap();
        let site = tempfile::tempdir().unwrap();

        let mut config = OrchestrationConfig::from_yaml(yaml).expect("Should parse YAML");
        if let Some(publication) = config.publication.as_mut() {
            publication.site_root = Some(site.path().to_path_buf());
        }

        let runner = Arc::new(runner);
        let engine = ExecutionEngine::new(
            Arc::clone(&runner),
            StrategyResolver::new(WorkspaceLayout::new(project.path())),
            strategy,
        );
        let workflow = Workflow::from_config(&config, engine).expect("Should build workflow");

        Self {
            project,
            site,
            runner,
            workflow,
        }
    }

    pub fn janus(runner: MockRunner) -> Self {
        Self::new(JANUS_YAML, runner, SchedulingStrategy::Parallel)
    }

    pub async fn dispatch(&self, event: &TriggerEvent, selection: &[&str]) -> WorkflowOutcome {
        self.workflow
            .dispatch(event, selection, &[])
            .await
            .expect("Selection should resolve")
    }

    pub async fn run(&self, event: &TriggerEvent, selection: &[&str]) -> RunReport {
        match self.dispatch(event, selection).await {
            WorkflowOutcome::Completed(report) => report,
            WorkflowOutcome::Skipped { reason, .. } => panic!("Run was skipped: {}", reason),
        }
    }
}

pub fn push(branch: &str, repo: &str) -> TriggerEvent {
    TriggerEvent::new(EventType::Push, branch, repo.parse().unwrap())
}

pub fn trigger(event_type: EventType, branch: &str, repo: &str) -> TriggerEvent {
    TriggerEvent::new(event_type, branch, repo.parse().unwrap())
}

pub fn job<'a>(report: &'a RunReport, env_id: &str) -> &'a JobOutcome {
    report
        .jobs
        .iter()
        .find(|job| job.env_id == env_id)
        .unwrap_or_else(|| panic!("Job '{}' not found in report", env_id))
}

/// Assert a job completed
pub fn assert_job_succeeded(report: &RunReport, env_id: &str) {
    let job = job(report, env_id);
    assert!(
        matches!(job.state, JobState::Completed { .. }),
        "Job '{}' should be completed, but was in state: {:?}",
        env_id,
        job.state
    );
}

/// Assert a job failed at `expected_step`
pub fn assert_job_failed(report: &RunReport, env_id: &str, expected_step: &str) {
    let job = job(report, env_id);
    match &job.state {
        JobState::Failed { step, .. } => assert_eq!(
            step, expected_step,
            "Job '{}' failed at '{}', expected '{}'",
            env_id, step, expected_step
        ),
        other => panic!("Job '{}' should have failed, but was in state: {:?}", env_id, other),
    }
}
