//! Workflow dispatch - gate, run the selected jobs, publish the artifact

use crate::{
    core::{
        config::{OrchestrationConfig, PublicationConfig},
        EnvironmentRegistry, OrchestrationError, RunState, TriggerEvent, TriggerGate,
    },
    execution::{ExecutionEngine, ExecutionEvent, JobOutcome},
    publication::{DirectoryHost, PublicationJob, PublicationPipeline, PublicationResult},
    runner::CommandRunner,
};
use serde::Serialize;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

/// Publication wiring for a workflow
pub struct PublicationStage {
    pub settings: PublicationConfig,
    pub pipeline: Arc<PublicationPipeline>,
}

/// What happened to the publication of a run's artifact
#[derive(Debug, Clone, Serialize)]
pub struct PublicationOutcome {
    pub env_id: String,
    pub target: String,
    pub concurrency_group: String,
    pub result: Option<PublicationResult>,
    pub failure: Option<String>,
    #[serde(skip)]
    pub error: Option<OrchestrationError>,
}

impl PublicationOutcome {
    pub fn new(job: &PublicationJob, result: Result<PublicationResult, OrchestrationError>) -> Self {
        let (result, error) = match result {
            Ok(published) => (Some(published), None),
            Err(err) => (None, Some(err)),
        };
        Self {
            env_id: job.env_id.clone(),
            target: job.target.clone(),
            concurrency_group: job.concurrency_group.clone(),
            result,
            failure: error.as_ref().map(ToString::to_string),
            error,
        }
    }

    pub fn is_success(&self) -> bool {
        self.result.is_some()
    }
}

/// Everything an admitted run produced
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub workflow: String,
    pub trigger: TriggerEvent,
    pub state: RunState,
    pub jobs: Vec<JobOutcome>,
    pub publication: Option<PublicationOutcome>,
}

impl RunReport {
    pub fn is_success(&self) -> bool {
        self.jobs.iter().all(JobOutcome::is_success)
            && self.publication.as_ref().map_or(true, PublicationOutcome::is_success)
    }

    pub fn failed_jobs(&self) -> impl Iterator<Item = &JobOutcome> {
        self.jobs.iter().filter(|job| !job.is_success())
    }
}

/// Result of dispatching a trigger event
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum WorkflowOutcome {
    /// The gate rejected the event; nothing ran
    Skipped { run_id: Uuid, reason: String },
    Completed(RunReport),
}

impl WorkflowOutcome {
    pub fn is_skipped(&self) -> bool {
        matches!(self, WorkflowOutcome::Skipped { .. })
    }

    pub fn report(&self) -> Option<&RunReport> {
        match self {
            WorkflowOutcome::Completed(report) => Some(report),
            WorkflowOutcome::Skipped { .. } => None,
        }
    }
}

/// A named workflow: one gate, a registry, an engine, optional publication
pub struct Workflow<R> {
    name: String,
    registry: Arc<EnvironmentRegistry>,
    gate: Option<TriggerGate>,
    engine: ExecutionEngine<R>,
    publication: Option<PublicationStage>,
}

impl<R: CommandRunner + 'static> Workflow<R> {
    pub fn new(name: impl Into<String>, registry: Arc<EnvironmentRegistry>, engine: ExecutionEngine<R>) -> Self {
        Self {
            name: name.into(),
            registry,
            gate: None,
            engine,
            publication: None,
        }
    }

    /// Wire a workflow from configuration; publication goes to a directory host
    pub fn from_config(config: &OrchestrationConfig, engine: ExecutionEngine<R>) -> anyhow::Result<Self> {
        let registry = Arc::new(config.to_registry()?);
        let project_dir = engine.resolver().layout().project_dir.clone();

        let mut workflow = Self::new(config.name.clone(), registry, engine);
        if let Some(gate) = config.trigger_gate()? {
            workflow = workflow.with_gate(gate);
        }
        if let Some(settings) = &config.publication {
            let host = DirectoryHost::new(settings.site_root_in(&project_dir));
            workflow = workflow.with_publication(
                settings.clone(),
                Arc::new(PublicationPipeline::new(Arc::new(host))),
            );
        }
        Ok(workflow)
    }

    pub fn with_gate(mut self, gate: TriggerGate) -> Self {
        self.gate = Some(gate);
        self
    }

    pub fn with_publication(mut self, settings: PublicationConfig, pipeline: Arc<PublicationPipeline>) -> Self {
        self.publication = Some(PublicationStage { settings, pipeline });
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn registry(&self) -> &EnvironmentRegistry {
        &self.registry
    }

    pub fn engine(&self) -> &ExecutionEngine<R> {
        &self.engine
    }

    pub fn gate(&self) -> Option<&TriggerGate> {
        self.gate.as_ref()
    }

    pub fn publication(&self) -> Option<&PublicationStage> {
        self.publication.as_ref()
    }

    /// Run the workflow for one trigger event.
    ///
    /// The gate is consulted once, before anything else. A rejected event
    /// yields `Skipped` without touching the runner or the publisher. Job
    /// and publication failures are reported in the `RunReport`; only
    /// selection errors are returned as `Err`.
    pub async fn dispatch<S: AsRef<str>>(
        &self,
        event: &TriggerEvent,
        selection: &[S],
        posargs: &[String],
    ) -> Result<WorkflowOutcome, OrchestrationError> {
        let mut state = RunState::new();
        let events = self.engine.events();

        if let Some(reason) = self.gate.as_ref().and_then(|g| g.rejection_reason(event)) {
            info!("Workflow {} skipped: {}", self.name, reason);
            state.skip();
            events.emit(ExecutionEvent::RunSkipped {
                run_id: state.run_id,
                reason: reason.clone(),
            });
            return Ok(WorkflowOutcome::Skipped {
                run_id: state.run_id,
                reason,
            });
        }

        let specs: Vec<_> = self.registry.select(selection)?.into_iter().cloned().collect();

        state.start(specs.len());
        info!("Workflow {} started with {} job(s)", self.name, specs.len());
        events.emit(ExecutionEvent::RunStarted {
            run_id: state.run_id,
            workflow: self.name.clone(),
            jobs: specs.len(),
        });

        let jobs = self.engine.run_jobs(specs, posargs).await;
        for job in &jobs {
            state.record(job.is_success());
        }

        let publication = match &self.publication {
            Some(stage) if stage.settings.allows(event.event_type) => {
                self.publish_artifact(stage, &jobs, &mut state).await
            }
            _ => None,
        };

        state.finish();
        events.emit(ExecutionEvent::RunCompleted {
            run_id: state.run_id,
            status: state.status,
        });

        Ok(WorkflowOutcome::Completed(RunReport {
            workflow: self.name.clone(),
            trigger: event.clone(),
            state,
            jobs,
            publication,
        }))
    }

    async fn publish_artifact(
        &self,
        stage: &PublicationStage,
        jobs: &[JobOutcome],
        state: &mut RunState,
    ) -> Option<PublicationOutcome> {
        let settings = &stage.settings;
        let producer = jobs.iter().find(|job| job.env_id == settings.environment)?;

        let Some(artifact) = producer.artifact.clone().filter(|_| producer.is_success()) else {
            warn!(
                "Environment {} did not succeed, nothing to publish",
                settings.environment
            );
            return None;
        };

        state.total_jobs += 1;
        let job = PublicationJob::new(
            &settings.environment,
            artifact,
            &settings.target,
            &settings.concurrency_group,
        );

        let events = self.engine.events();
        events.emit(ExecutionEvent::PublicationQueued {
            target: job.target.clone(),
            concurrency_group: job.concurrency_group.clone(),
        });

        let result = stage.pipeline.publish(&job).await;
        match &result {
            Ok(published) => events.emit(ExecutionEvent::PublicationCompleted {
                target: published.target.clone(),
                url: published.url.clone(),
            }),
            Err(err) => {
                if let OrchestrationError::PublicationFailure { step, .. } = err {
                    events.emit(ExecutionEvent::PublicationFailed {
                        target: job.target.clone(),
                        step: *step,
                        error: err.to_string(),
                    });
                }
            }
        }
        state.record(result.is_ok());

        Some(PublicationOutcome::new(&job, result))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{EnvironmentRecipe, EventType, ExecutionStatus, RepositoryIdentity};
    use crate::execution::SchedulingStrategy;
    use crate::publication::DirectoryHost;
    use crate::resolver::{StrategyResolver, WorkspaceLayout};
    use crate::runner::{CommandInvocation, CommandOutput, RunnerError};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::atomic::{AtomicUsize, Ordering};

    /// Succeeds everything; `touch` writes the file so the docs job leaves a site
    #[derive(Default)]
    struct SiteRunner {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl CommandRunner for SiteRunner {
        async fn run(&self, invocation: &CommandInvocation) -> Result<CommandOutput, RunnerError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if invocation.program() == Some("touch") {
                for path in &invocation.argv[1..] {
                    let path = invocation.working_dir.join(path);
                    std::fs::create_dir_all(path.parent().unwrap()).unwrap();
                    std::fs::write(path, "<html></html>").unwrap();
                }
            }
            Ok(CommandOutput::success(""))
        }
    }

    fn registry() -> Arc<EnvironmentRegistry> {
        let mut registry = EnvironmentRegistry::new();
        registry
            .register(
                EnvironmentRecipe {
                    command_sequence: vec!["pytest --run-extra-mlips --cov janus_core .".to_string()],
                    ..Default::default()
                }
                .into_spec("py312"),
            )
            .unwrap();
        registry
            .register(
                EnvironmentRecipe {
                    command_sequence: vec!["touch docs/build/html/index.html".to_string()],
                    artifact_dir: Some(PathBuf::from("docs/build/html")),
                    ..Default::default()
                }
                .into_spec("docs"),
            )
            .unwrap();
        Arc::new(registry)
    }

    fn workflow(project: &std::path::Path, site_root: &std::path::Path) -> Workflow<Arc<SiteRunner>> {
        let engine = ExecutionEngine::new(
            Arc::new(SiteRunner::default()),
            StrategyResolver::new(WorkspaceLayout::new(project)),
            SchedulingStrategy::Sequential,
        );
        let settings = PublicationConfig {
            environment: "docs".to_string(),
            target: "github-pages".to_string(),
            concurrency_group: "pages".to_string(),
            events: vec![],
            site_root: None,
        };
        Workflow::new("janus-core", registry(), engine)
            .with_gate(TriggerGate::new("main", RepositoryIdentity::new("stfc", "janus-core")))
            .with_publication(
                settings,
                Arc::new(PublicationPipeline::new(Arc::new(DirectoryHost::new(site_root)))),
            )
    }

    fn push(branch: &str, repo: &str) -> TriggerEvent {
        TriggerEvent::new(EventType::Push, branch, repo.parse().unwrap())
    }

    #[tokio::test]
    async fn test_admitted_run_publishes_docs() {
        let project = tempfile::tempdir().unwrap();
        let site_root = tempfile::tempdir().unwrap();
        let workflow = workflow(project.path(), site_root.path());

        let outcome = workflow
            .dispatch(&push("refs/heads/main", "stfc/janus-core"), &["ALL"], &[])
            .await
            .unwrap();

        let report = outcome.report().expect("run should be admitted");
        assert!(report.is_success());
        assert_eq!(report.state.status, ExecutionStatus::Completed);
        assert_eq!(report.state.total_jobs, 3);

        let published = report.publication.as_ref().unwrap().result.as_ref().unwrap();
        assert!(published.url.starts_with("file://"));
        assert!(site_root.path().join("github-pages/index.html").exists());
    }

    #[tokio::test]
    async fn test_rejected_event_is_silent_noop() {
        let project = tempfile::tempdir().unwrap();
        let site_root = tempfile::tempdir().unwrap();
        let workflow = workflow(project.path(), site_root.path());

        for event in [push("feature-x", "stfc/janus-core"), push("main", "someone/fork")] {
            let outcome = workflow.dispatch(&event, &["ALL"], &[]).await.unwrap();
            assert!(outcome.is_skipped());
        }

        assert!(!site_root.path().join("github-pages").exists());
        assert!(!project.path().join(".envflow").exists());
    }

    #[tokio::test]
    async fn test_publication_respects_event_filter() {
        let project = tempfile::tempdir().unwrap();
        let site_root = tempfile::tempdir().unwrap();
        let mut workflow = workflow(project.path(), site_root.path());
        if let Some(stage) = workflow.publication.as_mut() {
            stage.settings.events = vec![EventType::Manual];
        }

        let outcome = workflow
            .dispatch(&push("main", "stfc/janus-core"), &["docs"], &[])
            .await
            .unwrap();

        let report = outcome.report().unwrap();
        assert!(report.is_success());
        assert!(report.publication.is_none());
        assert_eq!(report.state.total_jobs, 1);
    }

    #[tokio::test]
    async fn test_unknown_selection_is_an_error() {
        let project = tempfile::tempdir().unwrap();
        let site_root = tempfile::tempdir().unwrap();
        let workflow = workflow(project.path(), site_root.path());

        let err = workflow
            .dispatch(&push("main", "stfc/janus-core"), &["py39"], &[])
            .await
            .unwrap_err();
        assert_eq!(err, OrchestrationError::UnknownEnvironment("py39".to_string()));
    }
}
